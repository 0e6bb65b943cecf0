//! Service configuration

use anyhow::{bail, Context, Result};
use estimator_lib::drift::DriftConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Price estimator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    /// Port for the prediction, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding `best_model_<city>.json`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// CSV the drift monitor compares batches against
    #[serde(default = "default_reference_data_path")]
    pub reference_data_path: PathBuf,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Predictions buffered before a drift report is produced
    #[serde(default = "default_drift_batch_size")]
    pub drift_batch_size: usize,

    #[serde(default = "default_drift_share")]
    pub drift_share: f64,

    #[serde(default = "default_monitoring_url")]
    pub monitoring_url: String,

    #[serde(default = "default_monitoring_project_id")]
    pub monitoring_project_id: String,

    /// Comma-separated `user:password` pairs
    #[serde(default = "default_api_users")]
    pub api_users: String,
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_reference_data_path() -> PathBuf {
    PathBuf::from("reference_data/reference_data_appart_lille.csv")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("drift_reports")
}

fn default_drift_batch_size() -> usize {
    1
}

fn default_drift_share() -> f64 {
    0.5
}

fn default_monitoring_url() -> String {
    "http://evidently:8000".to_string()
}

fn default_monitoring_project_id() -> String {
    "019aeec9-bca8-76bf-8664-db17237a0e87".to_string()
}

fn default_api_users() -> String {
    std::env::var("API_USERS").unwrap_or_default()
}

impl EstimatorConfig {
    /// Load configuration from `estimator.{toml,yaml,json}` and `ESTIMATOR_*` variables
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    /// Same as [`load`](Self::load), reading variables from `env` instead of the process
    pub fn load_with_env(env: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("estimator").required(false))
            .add_source(config::Environment::with_prefix("ESTIMATOR").source(env))
            .build()
            .context("Failed to read configuration")?;

        let config: EstimatorConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.drift_batch_size == 0 {
            bail!("drift_batch_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.drift_share) {
            bail!("drift_share must be between 0 and 1, got {}", self.drift_share);
        }
        Ok(())
    }

    /// Parsed `user:password` pairs; malformed entries are skipped
    pub fn users(&self) -> Vec<(String, String)> {
        self.api_users
            .split(',')
            .filter_map(|pair| {
                let (user, password) = pair.trim().split_once(':')?;
                if user.is_empty() {
                    return None;
                }
                Some((user.to_string(), password.to_string()))
            })
            .collect()
    }

    pub fn drift_config(&self) -> DriftConfig {
        DriftConfig {
            batch_size: self.drift_batch_size,
            report_dir: self.report_dir.clone(),
            reference_path: self.reference_data_path.clone(),
            project_id: self.monitoring_project_id.clone(),
            drift_share: self.drift_share,
        }
    }
}
