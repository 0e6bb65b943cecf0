//! Data drift report
//!
//! Compares the current batch against the reference dataset column by
//! column. Small references use a two-sample Kolmogorov-Smirnov test;
//! large references use the Wasserstein distance normalised by the
//! reference standard deviation.

use super::frame::DataFrame;
use super::stats;
use crate::error::DriftError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// P-value below which the K-S test flags drift
pub const KS_P_VALUE_THRESHOLD: f64 = 0.05;

/// Normed Wasserstein distance at or above which drift is flagged
pub const WASSERSTEIN_THRESHOLD: f64 = 0.1;

/// Largest reference size for which the K-S test is used
pub const KS_MAX_REFERENCE_ROWS: usize = 1000;

/// Default share of drifted columns that flags dataset drift
pub const DEFAULT_DRIFT_SHARE: f64 = 0.5;

/// Floor for the Wasserstein normalisation
const MIN_NORM: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatTest {
    #[serde(rename = "K-S p_value")]
    KolmogorovSmirnov,
    #[serde(rename = "Wasserstein distance (normed)")]
    Wasserstein,
}

impl std::fmt::Display for StatTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatTest::KolmogorovSmirnov => write!(f, "K-S p_value"),
            StatTest::Wasserstein => write!(f, "Wasserstein distance (normed)"),
        }
    }
}

/// Drift result for one column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub stattest: StatTest,
    /// p-value for K-S, normed distance for Wasserstein
    pub statistic: f64,
    pub threshold: f64,
    pub drift_detected: bool,
    pub current_mean: f64,
    pub reference_mean: f64,
}

/// Comparison of one batch against the reference dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    /// Calendar period label, e.g. `March_2025`
    pub period: String,
    pub current_rows: usize,
    pub reference_rows: usize,
    pub columns: Vec<ColumnDrift>,
    pub drifted_columns: usize,
    pub share_of_drifted_columns: f64,
    pub drift_share_threshold: f64,
    pub dataset_drift: bool,
}

/// Period label used in report file names
pub fn period_label(at: DateTime<Utc>) -> String {
    at.format("%B_%Y").to_string()
}

/// Builds drift reports with fixed thresholds
#[derive(Debug, Clone)]
pub struct DriftReportBuilder {
    drift_share: f64,
    ks_threshold: f64,
    wasserstein_threshold: f64,
    ks_max_reference_rows: usize,
}

impl Default for DriftReportBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_SHARE)
    }
}

impl DriftReportBuilder {
    pub fn new(drift_share: f64) -> Self {
        Self {
            drift_share,
            ks_threshold: KS_P_VALUE_THRESHOLD,
            wasserstein_threshold: WASSERSTEIN_THRESHOLD,
            ks_max_reference_rows: KS_MAX_REFERENCE_ROWS,
        }
    }

    pub fn drift_share(&self) -> f64 {
        self.drift_share
    }

    /// Compare every column of `current` against `reference`
    pub fn build(
        &self,
        current: &DataFrame,
        reference: &DataFrame,
        generated_at: DateTime<Utc>,
    ) -> Result<DriftReport, DriftError> {
        if current.is_empty() {
            return Err(DriftError::EmptyBatch);
        }

        let mut columns = Vec::with_capacity(current.column_names().len());
        for name in current.column_names() {
            let cur = current.column(name).unwrap_or_default();
            let reference_values = reference
                .column(name)
                .filter(|values| !values.is_empty())
                .ok_or_else(|| DriftError::MissingColumn(name.clone()))?;
            if cur.is_empty() {
                continue;
            }
            columns.push(self.compare_column(name, cur, reference_values));
        }

        let drifted_columns = columns.iter().filter(|c| c.drift_detected).count();
        let share = if columns.is_empty() {
            0.0
        } else {
            drifted_columns as f64 / columns.len() as f64
        };

        Ok(DriftReport {
            generated_at,
            period: period_label(generated_at),
            current_rows: current.len(),
            reference_rows: reference.len(),
            columns,
            drifted_columns,
            share_of_drifted_columns: share,
            drift_share_threshold: self.drift_share,
            dataset_drift: share >= self.drift_share && drifted_columns > 0,
        })
    }

    fn compare_column(&self, name: &str, current: &[f64], reference: &[f64]) -> ColumnDrift {
        let current_mean = stats::mean(current).unwrap_or_default();
        let reference_mean = stats::mean(reference).unwrap_or_default();

        let (stattest, statistic, threshold, drift_detected) =
            if reference.len() <= self.ks_max_reference_rows {
                let (_, p_value) = stats::ks_two_sample(current, reference).unwrap_or((0.0, 1.0));
                (
                    StatTest::KolmogorovSmirnov,
                    p_value,
                    self.ks_threshold,
                    p_value < self.ks_threshold,
                )
            } else {
                let norm = stats::std_dev(reference).unwrap_or_default().max(MIN_NORM);
                let distance = stats::wasserstein_distance(current, reference).unwrap_or_default() / norm;
                (
                    StatTest::Wasserstein,
                    distance,
                    self.wasserstein_threshold,
                    distance >= self.wasserstein_threshold,
                )
            };

        ColumnDrift {
            column: name.to_string(),
            stattest,
            statistic,
            threshold,
            drift_detected,
            current_mean,
            reference_mean,
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl DriftReport {
    /// Render a standalone HTML page
    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for c in &self.columns {
            let _ = write!(
                rows,
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{:.4}</td><td>{:.4}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>\n",
                if c.drift_detected { "drift" } else { "ok" },
                escape_html(&c.column),
                c.stattest,
                c.statistic,
                c.threshold,
                if c.drift_detected { "Detected" } else { "Not detected" },
                c.current_mean,
                c.reference_mean,
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="utf-8">
<title>Data drift report {period}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; }}
td, th {{ border: 1px solid #ccc; padding: 4px 8px; }}
tr.drift td {{ background: #fde2e2; }}
</style>
</head>
<body>
<h1>Data drift report</h1>
<p>Generated at {generated_at} for period {period}.</p>
<p>Current rows: {current_rows}. Reference rows: {reference_rows}.</p>
<p>Dataset drift: <strong>{dataset_drift}</strong> ({drifted} of {total} columns drifted, share {share:.2}, threshold {threshold:.2}).</p>
<table>
<tr><th>Column</th><th>Test</th><th>Statistic</th><th>Threshold</th><th>Drift</th><th>Current mean</th><th>Reference mean</th></tr>
{rows}</table>
</body>
</html>
"#,
            period = escape_html(&self.period),
            generated_at = self.generated_at.to_rfc3339(),
            current_rows = self.current_rows,
            reference_rows = self.reference_rows,
            dataset_drift = if self.dataset_drift { "detected" } else { "not detected" },
            drifted = self.drifted_columns,
            total = self.columns.len(),
            share = self.share_of_drifted_columns,
            threshold = self.drift_share_threshold,
            rows = rows,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{columns, DriftRow, FeatureRow};
    use chrono::TimeZone;

    fn row(surface: f64, price: f64) -> DriftRow {
        DriftRow::new(
            FeatureRow {
                surface_reelle_bati: surface,
                nombre_pieces_principales: 3.0,
                surface_terrain: 0.0,
                nombre_de_lots: 1.0,
            },
            price,
        )
    }

    fn frame(n: usize, offset: f64) -> DataFrame {
        let rows: Vec<DriftRow> = (0..n)
            .map(|i| row(40.0 + i as f64 + offset, 3000.0 + 10.0 * i as f64 + offset))
            .collect();
        DataFrame::from_rows(&rows)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_period_label() {
        assert_eq!(period_label(at()), "March_2025");
    }

    #[test]
    fn test_no_drift_against_same_distribution() {
        let builder = DriftReportBuilder::default();
        let report = builder.build(&frame(60, 0.0), &frame(60, 0.0), at()).unwrap();

        assert_eq!(report.columns.len(), 5);
        assert!(report.columns.iter().all(|c| c.stattest == StatTest::KolmogorovSmirnov));
        assert!(!report.dataset_drift);
        assert_eq!(report.period, "March_2025");
    }

    #[test]
    fn test_drift_detected_on_shifted_columns() {
        let builder = DriftReportBuilder::default();
        let report = builder.build(&frame(60, 5000.0), &frame(60, 0.0), at()).unwrap();

        let surface = report
            .columns
            .iter()
            .find(|c| c.column == columns::SURFACE_BATI)
            .unwrap();
        assert!(surface.drift_detected);
        // Surface and price drift, the three constant columns do not
        assert_eq!(report.drifted_columns, 2);
        assert!(!report.dataset_drift);

        let strict = DriftReportBuilder::new(0.3);
        assert!(strict.build(&frame(60, 5000.0), &frame(60, 0.0), at()).unwrap().dataset_drift);
    }

    #[test]
    fn test_single_extreme_row_drifts() {
        let builder = DriftReportBuilder::default();
        let current = DataFrame::from_rows(&[row(1e6, 1e9)]);
        let report = builder.build(&current, &frame(200, 0.0), at()).unwrap();

        for column in [columns::SURFACE_BATI, columns::PRIX_M2] {
            let drift = report.columns.iter().find(|c| c.column == column).unwrap();
            assert_eq!(drift.stattest, StatTest::KolmogorovSmirnov);
            assert!(drift.drift_detected, "{} should drift", column);
            assert!(drift.statistic < KS_P_VALUE_THRESHOLD);
        }
        assert_eq!(report.drifted_columns, 2);

        let typical = DataFrame::from_rows(&[row(140.0, 4000.0)]);
        let report = builder.build(&typical, &frame(200, 0.0), at()).unwrap();
        assert_eq!(report.drifted_columns, 0);
    }

    #[test]
    fn test_large_reference_uses_wasserstein() {
        let builder = DriftReportBuilder::default();
        let report = builder.build(&frame(10, 0.0), &frame(1500, 0.0), at()).unwrap();
        assert!(report.columns.iter().all(|c| c.stattest == StatTest::Wasserstein));
    }

    #[test]
    fn test_missing_reference_column() {
        let builder = DriftReportBuilder::default();
        let err = builder
            .build(&frame(5, 0.0), &DataFrame::default(), at())
            .unwrap_err();
        assert!(matches!(err, DriftError::MissingColumn(_)));
    }

    #[test]
    fn test_empty_batch() {
        let builder = DriftReportBuilder::default();
        let err = builder
            .build(&DataFrame::default(), &frame(5, 0.0), at())
            .unwrap_err();
        assert!(matches!(err, DriftError::EmptyBatch));
    }

    #[test]
    fn test_html_lists_columns() {
        let report = DriftReportBuilder::default()
            .build(&frame(20, 0.0), &frame(20, 0.0), at())
            .unwrap();
        let html = report.to_html();
        assert!(html.contains("March_2025"));
        assert!(html.contains(columns::NOMBRE_PIECES));
        assert!(html.contains("K-S p_value"));
    }
}
