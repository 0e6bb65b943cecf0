//! Library for real-estate price-per-area estimation
//!
//! This crate provides the core functionality for:
//! - Loading per-city regression bundles (model + scalers)
//! - Dispatching predictions to the right bundle
//! - Batching predictions and reporting input drift
//! - Health checks and observability

pub mod artifacts;
pub mod drift;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;

pub use error::{ArtifactError, DriftError, PredictError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ApiMetrics, StructuredLogger};
