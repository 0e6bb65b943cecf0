//! HTTP API: predictions, health checks and Prometheus metrics

use crate::auth::{self, Credentials};
use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use estimator_lib::{
    drift::DriftMonitor,
    health::{ComponentStatus, HealthRegistry},
    observability::{ApiMetrics, StructuredLogger},
    predictor::Dispatcher,
    City, CityHouseInput, FeatureRecord, HouseInput, PredictError, PredictionResult,
};
use prometheus::{Encoder, TextEncoder};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub drift_monitor: Arc<DriftMonitor>,
    pub health_registry: HealthRegistry,
    pub metrics: ApiMetrics,
    pub logger: StructuredLogger,
    pub credentials: Arc<Credentials>,
    /// Detached drift recordings still in flight
    pub drift_tasks: TaskTracker,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        drift_monitor: Arc<DriftMonitor>,
        health_registry: HealthRegistry,
        metrics: ApiMetrics,
    ) -> Self {
        Self {
            dispatcher,
            drift_monitor,
            health_registry,
            metrics,
            logger: StructuredLogger::new("price-estimator"),
            credentials: Arc::new(Credentials::default()),
            drift_tasks: TaskTracker::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Wait for every drift recording spawned so far
    pub async fn drain_drift_tasks(&self) {
        self.drift_tasks.close();
        self.drift_tasks.wait().await;
    }
}

/// Prediction error rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError(PredictError);

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "Prediction failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "detail": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn predict_lille(
    State(state): State<Arc<AppState>>,
    Json(input): Json<HouseInput>,
) -> Result<Json<PredictionResult>, ApiError> {
    serve_prediction(&state, City::Lille, input).await
}

async fn predict_bordeaux(
    State(state): State<Arc<AppState>>,
    Json(input): Json<HouseInput>,
) -> Result<Json<PredictionResult>, ApiError> {
    serve_prediction(&state, City::Bordeaux, input).await
}

/// Generic route; the city is checked before any bundle lookup
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CityHouseInput>,
) -> Result<Json<PredictionResult>, ApiError> {
    let city: City = body.ville.parse()?;
    serve_prediction(&state, city, body.features).await
}

async fn serve_prediction(
    state: &AppState,
    city: City,
    input: HouseInput,
) -> Result<Json<PredictionResult>, ApiError> {
    let features = FeatureRecord::try_from(input)?;
    let property_type = features.type_local();
    let prediction = state.dispatcher.predict_offloaded(features, city).await?;

    let result = prediction.result;
    state.metrics.inc_predictions(&result.model_name, city.as_str());
    state.logger.log_prediction(
        city.as_str(),
        property_type.as_str(),
        &result.model_name,
        result.estimated_price_per_area,
    );

    // Drift recording never delays or fails the response
    let monitor = state.drift_monitor.clone();
    let row = prediction.row;
    let value = result.estimated_price_per_area;
    state.drift_tasks.spawn(async move {
        monitor.record(row, value).await;
    });

    Ok(Json(result))
}

/// Health check response - returns 200 unless a component is unhealthy
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Count requests, latency and error statuses per route
async fn track_metrics(
    State(metrics): State<ApiMetrics>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    metrics.observe_request(&method, &endpoint, start.elapsed().as_secs_f64());
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        metrics.inc_errors(&method, &endpoint, status.as_u16());
    }

    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let predict_routes = Router::new()
        .route("/predict/lille", post(predict_lille))
        .route("/predict/bordeaux", post(predict_bordeaux))
        .route("/predict", post(predict))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .merge(predict_routes)
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
