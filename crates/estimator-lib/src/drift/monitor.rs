//! Drift monitor
//!
//! Buffers served predictions and, every `batch_size` rows, builds a drift
//! report, writes it to `report_dir` and publishes it to the monitoring
//! workspace. The reference dataset, the report builder and the workspace
//! handle are created on first use and shared afterwards.
//!
//! Nothing in here returns an error to the prediction path: every failure
//! is logged and counted, and the batch is cleared either way.

use super::batch::DriftBatch;
use super::frame::DataFrame;
use super::report::{DriftReport, DriftReportBuilder, DEFAULT_DRIFT_SHARE};
use super::workspace::{MonitoringWorkspace, WorkspaceConnector};
use crate::error::DriftError;
use crate::health::{components, HealthRegistry};
use crate::models::{DriftRow, FeatureRow};
use crate::observability::{ApiMetrics, StructuredLogger};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Drift monitor configuration
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Rows buffered before a report is produced (0 is treated as 1)
    pub batch_size: usize,
    pub report_dir: PathBuf,
    pub reference_path: PathBuf,
    pub project_id: String,
    /// Share of drifted columns that flags dataset drift
    pub drift_share: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            report_dir: PathBuf::from("drift_reports"),
            reference_path: PathBuf::from("reference_data/reference_data_appart_lille.csv"),
            project_id: "019aeec9-bca8-76bf-8664-db17237a0e87".to_string(),
            drift_share: DEFAULT_DRIFT_SHARE,
        }
    }
}

/// Batches predictions and reports drift against the reference dataset
pub struct DriftMonitor {
    config: DriftConfig,
    batch: Mutex<DriftBatch>,
    /// Serializes flushes so report files are never written concurrently
    flush_lock: Mutex<()>,
    connector: Arc<dyn WorkspaceConnector>,
    /// Only a successful connection is kept
    workspace: OnceCell<Arc<dyn MonitoringWorkspace>>,
    reference: OnceCell<Arc<DataFrame>>,
    report_builder: OnceLock<Arc<DriftReportBuilder>>,
    flushes: AtomicU64,
    metrics: Option<ApiMetrics>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig, connector: Arc<dyn WorkspaceConnector>) -> Self {
        let batch = DriftBatch::new(config.batch_size);
        Self {
            config,
            batch: Mutex::new(batch),
            flush_lock: Mutex::new(()),
            connector,
            workspace: OnceCell::new(),
            reference: OnceCell::new(),
            report_builder: OnceLock::new(),
            flushes: AtomicU64::new(0),
            metrics: None,
            health: None,
            logger: StructuredLogger::new("drift-monitor"),
        }
    }

    pub fn with_metrics(mut self, metrics: ApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Append a served prediction; flushes when the batch is full
    pub async fn record(&self, row: FeatureRow, predicted: f64) -> Option<DriftReport> {
        let drained = {
            let mut batch = self.batch.lock().await;
            let drained = batch.push(DriftRow::new(row, predicted));
            if let Some(metrics) = &self.metrics {
                metrics.set_drift_batch_rows(batch.len());
            }
            drained
        };

        match drained {
            Some(rows) => self.flush(rows).await,
            None => None,
        }
    }

    /// Flush whatever is buffered, regardless of the threshold
    pub async fn flush_pending(&self) -> Option<DriftReport> {
        let rows = {
            let mut batch = self.batch.lock().await;
            if batch.is_empty() {
                return None;
            }
            let rows = batch.drain();
            if let Some(metrics) = &self.metrics {
                metrics.set_drift_batch_rows(0);
            }
            rows
        };
        self.flush(rows).await
    }

    /// Rows waiting for the next flush
    pub async fn pending(&self) -> usize {
        self.batch.lock().await.len()
    }

    /// Number of flushes started since creation
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Reference dataset, loaded on first call
    ///
    /// A failed load is not cached; the next call retries.
    pub async fn reference_data(&self) -> Result<Arc<DataFrame>, DriftError> {
        self.reference
            .get_or_try_init(|| async {
                let path = self.config.reference_path.clone();
                let frame = tokio::task::spawn_blocking(move || DataFrame::from_csv(&path))
                    .await
                    .map_err(|e| DriftError::ReferenceLoad {
                        path: self.config.reference_path.clone(),
                        message: format!("load task failed: {}", e),
                    })??;
                Ok::<_, DriftError>(Arc::new(frame))
            })
            .await
            .cloned()
    }

    pub fn report_builder(&self) -> Arc<DriftReportBuilder> {
        self.report_builder
            .get_or_init(|| Arc::new(DriftReportBuilder::new(self.config.drift_share)))
            .clone()
    }

    /// Workspace handle, connected on first successful call
    ///
    /// A failed connection is not cached; the next flush connects again.
    pub async fn workspace(&self) -> Option<Arc<dyn MonitoringWorkspace>> {
        let connected = self
            .workspace
            .get_or_try_init(|| async {
                let workspace = self.connector.connect().await?;
                self.set_health(components::MONITORING_WORKSPACE, None).await;
                Ok::<_, DriftError>(workspace)
            })
            .await;

        match connected {
            Ok(workspace) => Some(workspace.clone()),
            Err(e) => {
                warn!(error = %e, "Monitoring workspace unreachable, report stays local");
                self.set_health(components::MONITORING_WORKSPACE, Some(e.to_string()))
                    .await;
                None
            }
        }
    }

    /// Path of the report file for a period label
    pub fn report_path(&self, period: &str) -> PathBuf {
        self.config
            .report_dir
            .join(format!("drift_report_{}.html", period))
    }

    async fn flush(&self, rows: Vec<DriftRow>) -> Option<DriftReport> {
        let _guard = self.flush_lock.lock().await;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.inc_drift_flushes();
        }
        debug!(rows = rows.len(), "Flushing drift batch");

        let reference = match self.reference_data().await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(error = %e, dropped_rows = rows.len(), "Skipping drift report");
                self.set_health(components::DRIFT_MONITOR, Some(e.to_string()))
                    .await;
                return None;
            }
        };

        let current = DataFrame::from_rows(&rows);
        let report = match self.report_builder().build(&current, &reference, Utc::now()) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to build drift report");
                self.set_health(components::DRIFT_MONITOR, Some(e.to_string()))
                    .await;
                return None;
            }
        };

        let written = match self.write_report(&report).await {
            Ok(path) => {
                self.set_health(components::DRIFT_MONITOR, None).await;
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, period = %report.period, "Failed to write drift report");
                self.set_health(components::DRIFT_MONITOR, Some(e.to_string()))
                    .await;
                None
            }
        };

        let path = written.as_ref().map(|p| p.display().to_string());
        self.logger.log_drift_report(
            &report.period,
            report.current_rows,
            report.drifted_columns,
            report.share_of_drifted_columns,
            report.dataset_drift,
            path.as_deref(),
        );
        if let Some(metrics) = &self.metrics {
            metrics.set_dataset_drift(report.dataset_drift);
        }

        self.publish(&report).await;
        Some(report)
    }

    async fn publish(&self, report: &DriftReport) {
        let Some(workspace) = self.workspace().await else {
            return;
        };

        if let Err(e) = workspace.add_run(&self.config.project_id, report).await {
            self.logger
                .log_publish_failure(&self.config.project_id, &e.to_string());
            if let Some(metrics) = &self.metrics {
                metrics.inc_drift_publish_failures();
            }
            self.set_health(components::MONITORING_WORKSPACE, Some(e.to_string()))
                .await;
        } else {
            self.set_health(components::MONITORING_WORKSPACE, None).await;
        }
    }

    /// Write the report atomically, replacing any report for the same period
    async fn write_report(&self, report: &DriftReport) -> Result<PathBuf, DriftError> {
        let path = self.report_path(&report.period);
        let html = report.to_html();
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&target, html.as_bytes()))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(path)
    }

    async fn set_health(&self, component: &str, failure: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        match failure {
            None => health.set_healthy(component).await,
            Some(message) => health.set_degraded(component, message).await,
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("html.tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;

    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::models::columns;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tempfile::TempDir;

    struct RecordingWorkspace {
        runs: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl MonitoringWorkspace for RecordingWorkspace {
        async fn add_run(&self, project_id: &str, report: &DriftReport) -> Result<(), DriftError> {
            self.runs
                .lock()
                .unwrap()
                .push(format!("{}:{}", project_id, report.current_rows));
            if self.fail {
                Err(DriftError::MonitoringUnavailable("publish rejected".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct TestConnector {
        workspace: Arc<RecordingWorkspace>,
        up: AtomicBool,
        connects: AtomicUsize,
    }

    impl TestConnector {
        fn build(up: bool, fail_publish: bool) -> Arc<Self> {
            Arc::new(Self {
                workspace: Arc::new(RecordingWorkspace {
                    runs: std::sync::Mutex::new(Vec::new()),
                    fail: fail_publish,
                }),
                up: AtomicBool::new(up),
                connects: AtomicUsize::new(0),
            })
        }

        fn reachable(fail_publish: bool) -> Arc<Self> {
            Self::build(true, fail_publish)
        }

        fn unreachable() -> Arc<Self> {
            Self::build(false, false)
        }

        fn bring_up(&self) {
            self.up.store(true, Ordering::SeqCst);
        }

        fn runs(&self) -> Vec<String> {
            self.workspace.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkspaceConnector for TestConnector {
        async fn connect(&self) -> Result<Arc<dyn MonitoringWorkspace>, DriftError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(self.workspace.clone() as Arc<dyn MonitoringWorkspace>)
            } else {
                Err(DriftError::MonitoringUnavailable("connection refused".to_string()))
            }
        }
    }

    fn write_reference(dir: &Path) -> PathBuf {
        let path = dir.join("reference.csv");
        let mut csv = format!(
            "{},{},{},{},Type local,{}\n",
            columns::SURFACE_BATI,
            columns::NOMBRE_PIECES,
            columns::SURFACE_TERRAIN,
            columns::NOMBRE_LOTS,
            columns::PRIX_M2
        );
        for i in 0..40 {
            csv.push_str(&format!(
                "{},{},0,{},Appartement,{}\n",
                30 + i,
                1 + i % 5,
                1 + i % 3,
                2800 + 25 * i
            ));
        }
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn row(surface: f64) -> FeatureRow {
        FeatureRow {
            surface_reelle_bati: surface,
            nombre_pieces_principales: 3.0,
            surface_terrain: 0.0,
            nombre_de_lots: 2.0,
        }
    }

    fn monitor(dir: &TempDir, batch_size: usize, connector: Arc<TestConnector>) -> DriftMonitor {
        let config = DriftConfig {
            batch_size,
            report_dir: dir.path().join("reports"),
            reference_path: write_reference(dir.path()),
            project_id: "project-1".to_string(),
            drift_share: DEFAULT_DRIFT_SHARE,
        };
        DriftMonitor::new(config, connector)
    }

    fn report_files(dir: &TempDir) -> Vec<String> {
        match std::fs::read_dir(dir.path().join("reports")) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_flush_only_when_batch_is_full() {
        let dir = TempDir::new().unwrap();
        let connector = TestConnector::reachable(false);
        let monitor = monitor(&dir, 3, connector.clone());

        assert!(monitor.record(row(40.0), 3000.0).await.is_none());
        assert!(monitor.record(row(45.0), 3100.0).await.is_none());
        assert_eq!(monitor.pending().await, 2);
        assert_eq!(monitor.flush_count(), 0);
        assert!(report_files(&dir).is_empty());

        let report = monitor.record(row(50.0), 3200.0).await.unwrap();
        assert_eq!(report.current_rows, 3);
        assert_eq!(monitor.pending().await, 0);
        assert_eq!(monitor.flush_count(), 1);

        let files = report_files(&dir);
        assert_eq!(files, vec![format!("drift_report_{}.html", report.period)]);
        assert_eq!(connector.runs(), vec!["project-1:3".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_size_one_flushes_every_prediction() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, 1, TestConnector::reachable(false));

        assert!(monitor.record(row(40.0), 3000.0).await.is_some());
        assert!(monitor.record(row(41.0), 3010.0).await.is_some());
        assert_eq!(monitor.flush_count(), 2);
        // Same period, so the second report replaces the first
        assert_eq!(report_files(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let monitor = Arc::new(monitor(&dir, 10, TestConnector::reachable(false)));

        let handles: Vec<_> = (0..47)
            .map(|i| {
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    monitor.record(row(30.0 + i as f64), 3000.0).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(monitor.flush_count(), 4);
        assert_eq!(monitor.pending().await, 7);

        assert!(monitor.flush_pending().await.is_some());
        assert_eq!(monitor.pending().await, 0);
        assert!(monitor.flush_pending().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_local_report() {
        let dir = TempDir::new().unwrap();
        let connector = TestConnector::reachable(true);
        let health = HealthRegistry::new();
        let monitor = monitor(&dir, 2, connector.clone()).with_health(health.clone());

        monitor.record(row(40.0), 3000.0).await;
        let report = monitor.record(row(42.0), 3050.0).await;

        assert!(report.is_some());
        assert_eq!(monitor.pending().await, 0);
        assert_eq!(report_files(&dir).len(), 1);
        assert_eq!(connector.runs().len(), 1);

        let status = health.health().await;
        assert_eq!(
            status.components[components::MONITORING_WORKSPACE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            status.components[components::DRIFT_MONITOR].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_write_failure_still_publishes() {
        let dir = TempDir::new().unwrap();
        // A regular file where the report directory should be
        std::fs::write(dir.path().join("reports"), b"not a directory").unwrap();
        let connector = TestConnector::reachable(false);
        let health = HealthRegistry::new();
        let monitor = monitor(&dir, 1, connector.clone()).with_health(health.clone());

        let report = monitor.record(row(40.0), 3000.0).await;

        assert!(report.is_some());
        assert_eq!(monitor.pending().await, 0);
        assert_eq!(connector.runs(), vec!["project-1:1".to_string()]);

        let status = health.health().await;
        assert_eq!(
            status.components[components::DRIFT_MONITOR].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            status.components[components::MONITORING_WORKSPACE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_unreachable_workspace_is_retried_each_flush() {
        let dir = TempDir::new().unwrap();
        let connector = TestConnector::unreachable();
        let health = HealthRegistry::new();
        let monitor = monitor(&dir, 1, connector.clone()).with_health(health.clone());

        assert!(monitor.record(row(40.0), 3000.0).await.is_some());
        assert!(monitor.record(row(40.0), 3000.0).await.is_some());

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert!(connector.runs().is_empty());
        assert_eq!(report_files(&dir).len(), 1);
        assert_eq!(
            health.health().await.components[components::MONITORING_WORKSPACE].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_workspace_coming_up_later_receives_reports() {
        let dir = TempDir::new().unwrap();
        let connector = TestConnector::unreachable();
        let health = HealthRegistry::new();
        let monitor = monitor(&dir, 1, connector.clone()).with_health(health.clone());

        assert!(monitor.record(row(40.0), 3000.0).await.is_some());
        assert!(connector.runs().is_empty());

        connector.bring_up();
        for i in 0..5 {
            assert!(monitor.record(row(41.0 + i as f64), 3000.0).await.is_some());
        }

        assert_eq!(connector.runs().len(), 5);
        // Connected once it came up, then reused
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(
            health.health().await.components[components::MONITORING_WORKSPACE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_lazy_handles_are_shared() {
        let dir = TempDir::new().unwrap();
        let connector = TestConnector::reachable(false);
        let monitor = monitor(&dir, 5, connector.clone());

        let first = monitor.reference_data().await.unwrap();
        let second = monitor.reference_data().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 40);

        assert!(Arc::ptr_eq(&monitor.report_builder(), &monitor.report_builder()));

        assert!(monitor.workspace().await.is_some());
        assert!(monitor.workspace().await.is_some());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_reference_is_retried() {
        let dir = TempDir::new().unwrap();
        let config = DriftConfig {
            batch_size: 1,
            report_dir: dir.path().join("reports"),
            reference_path: dir.path().join("reference.csv"),
            project_id: "project-1".to_string(),
            drift_share: DEFAULT_DRIFT_SHARE,
        };
        let monitor = DriftMonitor::new(config, TestConnector::reachable(false));

        assert!(monitor.record(row(40.0), 3000.0).await.is_none());
        assert_eq!(monitor.pending().await, 0);
        assert!(report_files(&dir).is_empty());

        write_reference(dir.path());
        assert!(monitor.record(row(40.0), 3000.0).await.is_some());
        assert_eq!(monitor.flush_count(), 2);
    }
}
