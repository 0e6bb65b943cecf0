//! Error types for prediction, artifact loading and drift reporting

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the prediction dispatcher
#[derive(Debug, Error)]
pub enum PredictError {
    /// City is not one of the configured cities
    #[error("Ville non prise en charge: {0}")]
    UnsupportedCity(String),

    /// Property type has no bundle
    #[error("Type de logement non supporté: {0}")]
    UnsupportedPropertyType(String),

    /// Input features failed validation
    #[error("Caractéristiques invalides: {0}")]
    InvalidFeatures(String),

    /// Scaler or model evaluation failed
    #[error("Inference failure: {0}")]
    InferenceFailure(String),
}

impl PredictError {
    /// Returns true when the error is caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PredictError::InferenceFailure(_))
    }
}

/// Errors raised while loading model bundles at startup
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse artifact {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact {path:?} has no entry {entry}")]
    MissingEntry { path: PathBuf, entry: String },

    #[error("Invalid artifact shape: {0}")]
    Shape(String),
}

/// Errors raised inside the drift monitor; never surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum DriftError {
    #[error("Failed to load reference dataset {path:?}: {message}")]
    ReferenceLoad { path: PathBuf, message: String },

    #[error("Column {0} missing from reference dataset")]
    MissingColumn(String),

    #[error("Cannot build a drift report from an empty batch")]
    EmptyBatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Monitoring workspace unavailable: {0}")]
    MonitoringUnavailable(String),
}

impl From<reqwest::Error> for DriftError {
    fn from(e: reqwest::Error) -> Self {
        DriftError::MonitoringUnavailable(e.to_string())
    }
}
