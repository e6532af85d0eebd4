use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use prometheus::Registry;
use rotator::http::health::HealthResponse;
use rotator::http::{HttpState, create_router, run_http_server};
use rotator::metrics::{MetricsSink, RotatorMetrics};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn state() -> (HttpState, Arc<RotatorMetrics>) {
    let registry = Registry::new();
    let metrics = Arc::new(RotatorMetrics::new(&registry).unwrap());
    let state = HttpState::new(Arc::new(registry), Arc::new(AtomicBool::new(false)));
    (state, metrics)
}

async fn get(state: HttpState, uri: &str) -> (StatusCode, String) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_live_is_always_ok() {
    let (state, _) = state();
    let (status, _) = get(state, "/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ready_follows_flag() {
    let (state, _) = state();
    let (status, _) = get(state.clone(), "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.ready.store(true, Ordering::Release);
    let (status, _) = get(state, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_json() {
    let (state, _) = state();
    state.ready.store(true, Ordering::Release);
    let (status, body) = get(state, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(health.ready);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (state, metrics) = state();
    metrics.record_bytes_rotated("payments", 125_829_120);
    metrics.set_namespace_usage("payments", 125_829_120);

    let (status, body) = get(state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"rotator_bytes_rotated_total{namespace="payments"} 125829120"#));
    assert!(body.contains(r#"rotator_ns_usage_bytes{namespace="payments"} 125829120"#));
    assert!(body.contains(r#"rotator_errors_total{type="discovery"} 0"#));
}

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let (state, _) = state();
    let listener = rotator::http::bind("127.0.0.1:0").await.unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run_http_server(listener, state, shutdown.clone()));

    shutdown.cancel();
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
