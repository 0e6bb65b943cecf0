//! Integration tests for the estimator API endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use estimator_lib::{
    artifacts::{BundleRegistry, ModelBundle, RegressionModel, Scaler},
    drift::{DriftConfig, DriftMonitor, RemoteConnector},
    health::{components, HealthRegistry},
    observability::ApiMetrics,
    predictor::Dispatcher,
    City, PropertyType,
};
use price_estimator::{
    api::{create_router, AppState},
    auth::Credentials,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const LINEAR: &str =
    r#"{"type": "LinearRegression", "coefficients": [0.5, 0.2, 0.1, 0.0], "intercept": 0.0}"#;
const FOREST: &str = r#"{"type": "RandomForestRegressor", "trees": [
    {"nodes": [
        {"kind": "split", "feature": 0, "threshold": 0.0, "left": 1, "right": 2},
        {"kind": "leaf", "value": 0.5},
        {"kind": "leaf", "value": 1.0}
    ]}
]}"#;

fn bundle(model: &str) -> ModelBundle {
    let model: RegressionModel = serde_json::from_str(model).unwrap();
    let input_scaler: Scaler = serde_json::from_value(json!({
        "type": "StandardScaler",
        "mean": [70.0, 3.0, 100.0, 1.0],
        "scale": [30.0, 1.0, 200.0, 2.0]
    }))
    .unwrap();
    let output_scaler: Scaler = serde_json::from_value(json!({
        "type": "StandardScaler",
        "mean": [3000.0],
        "scale": [500.0]
    }))
    .unwrap();
    ModelBundle::new(model, input_scaler, output_scaler).unwrap()
}

fn registry() -> BundleRegistry {
    let mut registry = BundleRegistry::new();
    for city in City::ALL {
        registry.insert(city, PropertyType::Appartement, bundle(LINEAR));
        registry.insert(city, PropertyType::Maison, bundle(FOREST));
    }
    registry
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _dir: TempDir,
}

async fn setup_test_app(credentials: Credentials) -> TestApp {
    let dir = TempDir::new().unwrap();
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::DRIFT_MONITOR).await;

    let metrics = ApiMetrics::new();
    let drift_monitor = Arc::new(
        DriftMonitor::new(
            DriftConfig {
                batch_size: 1,
                report_dir: dir.path().join("reports"),
                reference_path: dir.path().join("missing.csv"),
                project_id: "test-project".to_string(),
                drift_share: 0.5,
            },
            Arc::new(RemoteConnector::new("http://127.0.0.1:9")),
        )
        .with_health(health_registry.clone()),
    );

    let state = Arc::new(
        AppState::new(
            Dispatcher::new(Arc::new(registry())),
            drift_monitor,
            health_registry,
            metrics,
        )
        .with_credentials(credentials),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        _dir: dir,
    }
}

fn maison_payload() -> Value {
    json!({
        "surface_bati": 80,
        "nombre_pieces": 4,
        "type_local": "maison",
        "surface_terrain": 150,
        "nombre_lots": 1
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_predict_lille_maison() {
    let app = setup_test_app(Credentials::default()).await;

    let response = app
        .router
        .oneshot(post("/predict/lille", &maison_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let price = body["prix_m2_estime"].as_f64().unwrap();
    assert!(price.is_finite() && price > 0.0);
    assert_eq!(price, 3500.0);
    assert_eq!(body["ville_modele"], "Lille");
    assert_eq!(body["model"], "RandomForestRegressor");
}

#[tokio::test]
async fn test_predict_bordeaux_appartement() {
    let app = setup_test_app(Credentials::default()).await;
    let mut payload = maison_payload();
    payload["type_local"] = json!("Appartement");

    let response = app
        .router
        .oneshot(post("/predict/bordeaux", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ville_modele"], "Bordeaux");
    assert_eq!(body["model"], "LinearRegression");
    assert!(body["prix_m2_estime"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_generic_route_dispatches_by_city() {
    let app = setup_test_app(Credentials::default()).await;

    let response = app
        .router
        .oneshot(post(
            "/predict",
            &json!({ "ville": "Lille", "features": maison_payload() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ville_modele"], "Lille");
}

#[tokio::test]
async fn test_unsupported_city_is_rejected() {
    let app = setup_test_app(Credentials::default()).await;

    let response = app
        .router
        .oneshot(post(
            "/predict",
            &json!({ "ville": "marseille", "features": maison_payload() }),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Ville non prise en charge"));
}

#[tokio::test]
async fn test_unsupported_property_type_is_rejected() {
    let app = setup_test_app(Credentials::default()).await;
    let mut payload = maison_payload();
    payload["type_local"] = json!("chateau");

    let response = app
        .router
        .oneshot(post("/predict/lille", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Type de logement non supporté"));
}

#[tokio::test]
async fn test_negative_surface_is_rejected() {
    let app = setup_test_app(Credentials::default()).await;
    let mut payload = maison_payload();
    payload["surface_bati"] = json!(-10.0);

    let response = app
        .router
        .oneshot(post("/predict/lille", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = setup_test_app(Credentials::default()).await;

    let response = app
        .router
        .oneshot(post("/predict/lille", &json!({ "surface_bati": "large" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_prediction_is_recorded_for_drift() {
    let app = setup_test_app(Credentials::default()).await;
    let monitor = app.state.drift_monitor.clone();

    let response = app
        .router
        .oneshot(post("/predict/lille", &maison_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Recording happens on a tracked task
    app.state.drain_drift_tasks().await;
    assert_eq!(monitor.flush_count(), 1);
    assert_eq!(monitor.pending().await, 0);
}

#[tokio::test]
async fn test_shutdown_drain_keeps_last_rows() {
    let app = setup_test_app(Credentials::default()).await;
    let monitor = Arc::new(DriftMonitor::new(
        DriftConfig {
            batch_size: 10,
            ..app.state.drift_monitor.config().clone()
        },
        Arc::new(RemoteConnector::new("http://127.0.0.1:9")),
    ));
    let state = Arc::new(AppState {
        drift_monitor: monitor.clone(),
        ..(*app.state).clone()
    });
    let router = create_router(state.clone());

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(post("/predict/lille", &maison_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    state.drain_drift_tasks().await;
    assert_eq!(monitor.pending().await, 3);
    assert_eq!(monitor.flush_count(), 0);

    monitor.flush_pending().await;
    assert_eq!(monitor.pending().await, 0);
    assert_eq!(monitor.flush_count(), 1);
}

#[tokio::test]
async fn test_auth_required_when_users_configured() {
    let app = setup_test_app(Credentials::new([("admin", "admin123")])).await;

    let response = app
        .router
        .clone()
        .oneshot(post("/predict/lille", &maison_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic"
    );

    let mut wrong = post("/predict/lille", &maison_payload());
    wrong.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", general_purpose::STANDARD.encode("admin:nope"))
            .parse()
            .unwrap(),
    );
    let response = app.router.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut valid = post("/predict/lille", &maison_payload());
    valid.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", general_purpose::STANDARD.encode("admin:admin123"))
            .parse()
            .unwrap(),
    );
    let response = app.router.oneshot(valid).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup_test_app(Credentials::new([("admin", "admin123")])).await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"][components::ARTIFACTS]["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_follows_startup() {
    let app = setup_test_app(Credentials::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.state.health_registry.set_ready(true).await;
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_test_app(Credentials::default()).await;

    app.router
        .clone()
        .oneshot(post("/predict/lille", &maison_payload()))
        .await
        .unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("api_requests_total"));
    assert!(text.contains("predictions_total"));
}
