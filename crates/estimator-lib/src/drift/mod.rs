//! Drift monitoring
//!
//! Predictions are buffered into batches; each full batch is compared
//! against a reference dataset and the resulting report is written
//! locally and published to a monitoring workspace.

mod batch;
mod frame;
mod monitor;
mod report;
mod stats;
mod workspace;

pub use batch::DriftBatch;
pub use frame::DataFrame;
pub use monitor::{DriftConfig, DriftMonitor};
pub use report::{
    period_label, ColumnDrift, DriftReport, DriftReportBuilder, StatTest, DEFAULT_DRIFT_SHARE,
    KS_MAX_REFERENCE_ROWS, KS_P_VALUE_THRESHOLD, WASSERSTEIN_THRESHOLD,
};
pub use workspace::{MonitoringWorkspace, RemoteConnector, RemoteWorkspace, WorkspaceConnector};
