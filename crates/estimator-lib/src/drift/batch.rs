//! Prediction batch buffered until the flush threshold

use crate::models::DriftRow;

/// Append-only batch that is drained once it reaches `threshold` rows
#[derive(Debug)]
pub struct DriftBatch {
    rows: Vec<DriftRow>,
    threshold: usize,
}

impl DriftBatch {
    /// A threshold of 0 is treated as 1
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            rows: Vec::with_capacity(threshold.min(10_000)),
            threshold,
        }
    }

    /// Append a row; returns the drained rows when the threshold is reached
    pub fn push(&mut self, row: DriftRow) -> Option<Vec<DriftRow>> {
        self.rows.push(row);
        if self.rows.len() >= self.threshold {
            Some(self.drain())
        } else {
            None
        }
    }

    /// Take every buffered row, leaving the batch empty
    pub fn drain(&mut self) -> Vec<DriftRow> {
        std::mem::replace(&mut self.rows, Vec::with_capacity(self.threshold.min(10_000)))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
