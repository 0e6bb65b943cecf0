//! Remote monitoring workspace client
//!
//! Drift reports are published as snapshots to a monitoring server. The
//! server is optional: connecting and publishing are both best-effort.

use super::report::DriftReport;
use crate::error::DriftError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Timeout for every call to the monitoring server
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for drift reports
#[async_trait]
pub trait MonitoringWorkspace: Send + Sync {
    async fn add_run(&self, project_id: &str, report: &DriftReport) -> Result<(), DriftError>;
}

/// Creates a workspace handle; called at most once per monitor
#[async_trait]
pub trait WorkspaceConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MonitoringWorkspace>, DriftError>;
}

/// HTTP client for a remote monitoring workspace
pub struct RemoteWorkspace {
    client: Client,
    base_url: Url,
}

impl RemoteWorkspace {
    /// Connect to the workspace, probing its version endpoint
    pub async fn connect(base_url: &str) -> Result<Self, DriftError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| DriftError::MonitoringUnavailable(format!("invalid url {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let workspace = Self { client, base_url };

        let version_url = workspace.endpoint("api/version")?;
        let response = workspace.client.get(version_url).send().await?;
        if !response.status().is_success() {
            return Err(DriftError::MonitoringUnavailable(format!(
                "version check returned {}",
                response.status()
            )));
        }

        info!(url = %workspace.base_url, "Connected to monitoring workspace");
        Ok(workspace)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriftError> {
        self.base_url
            .join(path)
            .map_err(|e| DriftError::MonitoringUnavailable(format!("invalid path {}: {}", path, e)))
    }
}

#[async_trait]
impl MonitoringWorkspace for RemoteWorkspace {
    async fn add_run(&self, project_id: &str, report: &DriftReport) -> Result<(), DriftError> {
        let url = self.endpoint(&format!("api/v2/snapshots/{}", project_id))?;
        let response = self.client.post(url).json(report).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriftError::MonitoringUnavailable(format!(
                "publish returned {}: {}",
                status, body
            )));
        }

        debug!(project_id = %project_id, period = %report.period, "Snapshot published");
        Ok(())
    }
}

/// Connector for [`RemoteWorkspace`]
#[derive(Debug, Clone)]
pub struct RemoteConnector {
    url: String,
}

impl RemoteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl WorkspaceConnector for RemoteConnector {
    async fn connect(&self) -> Result<Arc<dyn MonitoringWorkspace>, DriftError> {
        let workspace = RemoteWorkspace::connect(&self.url).await?;
        Ok(Arc::new(workspace))
    }
}
