//! Observability infrastructure for the price estimator
//!
//! Provides:
//! - Prometheus metrics (request traffic and latency, predictions, drift batches)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ApiMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ApiMetricsInner {
    requests_total: IntCounterVec,
    errors_total: IntCounterVec,
    request_latency_seconds: HistogramVec,
    predictions_total: IntCounterVec,
    model_loaded: IntGaugeVec,
    drift_batch_rows: IntGauge,
    drift_flushes_total: IntCounter,
    drift_publish_failures_total: IntCounter,
    drift_dataset_drift: Gauge,
}

impl ApiMetricsInner {
    fn new() -> Self {
        Self {
            requests_total: register_int_counter_vec!(
                "api_requests_total",
                "Total API requests",
                &["method", "endpoint"]
            )
            .expect("Failed to register api_requests_total"),

            errors_total: register_int_counter_vec!(
                "api_errors_total",
                "Total failed requests",
                &["method", "endpoint", "status_code"]
            )
            .expect("Failed to register api_errors_total"),

            request_latency_seconds: register_histogram_vec!(
                "api_request_latency_seconds",
                "Request latency",
                &["method", "endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register api_request_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "predictions_total",
                "Total predictions made",
                &["model", "city"]
            )
            .expect("Failed to register predictions_total"),

            model_loaded: register_int_gauge_vec!(
                "model_loaded",
                "1 if model loaded successfully, 0 otherwise",
                &["model", "city"]
            )
            .expect("Failed to register model_loaded"),

            drift_batch_rows: register_int_gauge!(
                "drift_batch_rows",
                "Number of predictions waiting in the drift batch"
            )
            .expect("Failed to register drift_batch_rows"),

            drift_flushes_total: register_int_counter!(
                "drift_flushes_total",
                "Total number of drift batch flushes"
            )
            .expect("Failed to register drift_flushes_total"),

            drift_publish_failures_total: register_int_counter!(
                "drift_publish_failures_total",
                "Total number of drift reports that could not be published"
            )
            .expect("Failed to register drift_publish_failures_total"),

            drift_dataset_drift: register_gauge!(
                "drift_dataset_drift",
                "1 if the last drift report detected dataset drift, 0 otherwise"
            )
            .expect("Failed to register drift_dataset_drift"),
        }
    }
}

/// API metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Debug)]
pub struct ApiMetrics {
    _private: (),
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ApiMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ApiMetricsInner {
        GLOBAL_METRICS.get_or_init(ApiMetricsInner::new)
    }

    /// Record a served request and its latency
    pub fn observe_request(&self, method: &str, endpoint: &str, duration_secs: f64) {
        self.inner()
            .requests_total
            .with_label_values(&[method, endpoint])
            .inc();
        self.inner()
            .request_latency_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration_secs);
    }

    /// Record a request answered with an error status
    pub fn inc_errors(&self, method: &str, endpoint: &str, status_code: u16) {
        self.inner()
            .errors_total
            .with_label_values(&[method, endpoint, &status_code.to_string()])
            .inc();
    }

    pub fn inc_predictions(&self, model: &str, city: &str) {
        self.inner()
            .predictions_total
            .with_label_values(&[model, city])
            .inc();
    }

    pub fn set_model_loaded(&self, model: &str, city: &str, loaded: bool) {
        self.inner()
            .model_loaded
            .with_label_values(&[model, city])
            .set(i64::from(loaded));
    }

    pub fn set_drift_batch_rows(&self, rows: usize) {
        self.inner().drift_batch_rows.set(rows as i64);
    }

    pub fn inc_drift_flushes(&self) {
        self.inner().drift_flushes_total.inc();
    }

    pub fn inc_drift_publish_failures(&self) {
        self.inner().drift_publish_failures_total.inc();
    }

    pub fn set_dataset_drift(&self, detected: bool) {
        self.inner()
            .drift_dataset_drift
            .set(if detected { 1.0 } else { 0.0 });
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for predictions,
/// drift reports, and lifecycle events.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a served prediction
    pub fn log_prediction(&self, city: &str, property_type: &str, model: &str, price_per_m2: f64) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            city = %city,
            property_type = %property_type,
            model = %model,
            prix_m2_estime = price_per_m2,
            "Served price prediction"
        );
    }

    /// Log a generated drift report
    pub fn log_drift_report(
        &self,
        period: &str,
        rows: usize,
        drifted_columns: usize,
        share: f64,
        dataset_drift: bool,
        path: Option<&str>,
    ) {
        if dataset_drift {
            warn!(
                event = "drift_report_generated",
                instance = %self.instance,
                period = %period,
                rows = rows,
                drifted_columns = drifted_columns,
                share = share,
                dataset_drift = true,
                path = ?path,
                "Dataset drift detected"
            );
        } else {
            info!(
                event = "drift_report_generated",
                instance = %self.instance,
                period = %period,
                rows = rows,
                drifted_columns = drifted_columns,
                share = share,
                dataset_drift = false,
                path = ?path,
                "Drift report generated"
            );
        }
    }

    /// Log a report that could not be published
    pub fn log_publish_failure(&self, project_id: &str, error: &str) {
        warn!(
            event = "drift_publish_failed",
            instance = %self.instance,
            project_id = %project_id,
            error = %error,
            "Failed to publish drift report, keeping local copy"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, bundles: usize) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            bundles = bundles,
            "Price estimator started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Price estimator shutting down"
        );
    }
}
