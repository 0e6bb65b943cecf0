//! Column-oriented numeric tables for drift comparison

use crate::error::DriftError;
use crate::models::{columns, DriftRow};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Named numeric columns; columns may have different lengths once
/// missing values are dropped
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    names: Vec<String>,
    data: HashMap<String, Vec<f64>>,
    rows: usize,
}

impl DataFrame {
    /// Build a frame from buffered prediction rows
    pub fn from_rows(rows: &[DriftRow]) -> Self {
        let mut frame = Self {
            rows: rows.len(),
            ..Default::default()
        };
        for name in columns::ALL {
            let values = rows.iter().filter_map(|r| r.value(name)).collect();
            frame.names.push(name.to_string());
            frame.data.insert(name.to_string(), values);
        }
        frame
    }

    /// Load a reference table from CSV, keeping only numeric columns
    pub fn from_csv(path: &Path) -> Result<Self, DriftError> {
        let load_error = |message: String| DriftError::ReferenceLoad {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| load_error(e.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|e| load_error(e.to_string()))?
            .clone();

        let mut values: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        let mut numeric = vec![true; headers.len()];
        let mut rows = 0;

        for record in reader.records() {
            let record = record.map_err(|e| load_error(e.to_string()))?;
            rows += 1;
            for (i, field) in record.iter().enumerate().take(headers.len()) {
                if !numeric[i] {
                    continue;
                }
                let field = field.trim();
                if field.is_empty() {
                    continue;
                }
                match field.parse::<f64>() {
                    Ok(v) if v.is_finite() => values[i].push(v),
                    Ok(_) => {}
                    Err(_) => numeric[i] = false,
                }
            }
        }

        let mut frame = Self {
            rows,
            ..Default::default()
        };
        for (i, header) in headers.iter().enumerate() {
            if !numeric[i] {
                debug!(column = %header, "Skipping non-numeric reference column");
                continue;
            }
            frame.names.push(header.to_string());
            frame.data.insert(header.to_string(), std::mem::take(&mut values[i]));
        }

        info!(path = %path.display(), rows, columns = frame.names.len(), "Reference dataset loaded");
        Ok(frame)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.data.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows read, including rows with missing values
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}
