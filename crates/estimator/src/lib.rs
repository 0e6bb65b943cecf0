//! Price estimator HTTP service
//!
//! Exposes the prediction dispatcher over axum, with Basic authentication,
//! health checks and Prometheus metrics. The binary in `main.rs` wires the
//! pieces together from [`config::EstimatorConfig`].

pub mod api;
pub mod auth;
pub mod config;
