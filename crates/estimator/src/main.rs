//! Price Estimator - real-estate price-per-m² prediction service
//!
//! Loads every per-city model bundle, then serves predictions while a drift
//! monitor compares served inputs against a reference dataset.

use anyhow::{Context, Result};
use estimator_lib::{
    artifacts::{BundleRegistry, JsonArtifactStore},
    drift::{DriftMonitor, RemoteConnector},
    health::{components, HealthRegistry},
    observability::{ApiMetrics, StructuredLogger},
    predictor::Dispatcher,
    City,
};
use price_estimator::{api, auth::Credentials, config::EstimatorConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting price-estimator");

    let config = EstimatorConfig::load()?;
    info!(
        model_dir = %config.model_dir.display(),
        drift_batch_size = config.drift_batch_size,
        monitoring_url = %config.monitoring_url,
        "Estimator configured"
    );

    let health_registry = HealthRegistry::new();
    let metrics = ApiMetrics::new();
    let logger = StructuredLogger::new("price-estimator");

    // Every bundle must load before the listener is bound
    let store = JsonArtifactStore::new(config.model_dir.clone());
    let bundles = BundleRegistry::load_all(&store, &City::ALL)
        .with_context(|| format!("Failed to load model artifacts from {:?}", config.model_dir))?;
    for ((city, _), bundle) in bundles.iter() {
        metrics.set_model_loaded(bundle.model_name(), city.as_str(), true);
    }
    health_registry.register(components::ARTIFACTS).await;

    let credentials = Credentials::new(config.users());
    if credentials.is_enabled() {
        info!(users = credentials.len(), "Basic authentication enabled");
    } else {
        warn!("API_USERS is empty, prediction routes are not authenticated");
    }

    let connector = Arc::new(RemoteConnector::new(config.monitoring_url.clone()));
    let drift_monitor = Arc::new(
        DriftMonitor::new(config.drift_config(), connector)
            .with_metrics(metrics.clone())
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );
    health_registry.register(components::DRIFT_MONITOR).await;

    logger.log_startup(SERVICE_VERSION, bundles.len());

    let app_state = Arc::new(
        api::AppState::new(
            Dispatcher::new(Arc::new(bundles)),
            drift_monitor.clone(),
            health_registry.clone(),
            metrics,
        )
        .with_credentials(credentials)
        .with_logger(logger.clone()),
    );

    health_registry.set_ready(true).await;

    api::serve(config.api_port, app_state.clone(), shutdown_signal()).await?;

    logger.log_shutdown("SIGINT received");
    app_state.drain_drift_tasks().await;
    if let Some(report) = drift_monitor.flush_pending().await {
        info!(period = %report.period, rows = report.current_rows, "Flushed pending drift rows");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
