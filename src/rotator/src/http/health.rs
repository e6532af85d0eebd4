use std::sync::atomic::Ordering;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use super::HttpState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub ready: bool,
}

pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn ready_handler(State(state): State<HttpState>) -> StatusCode {
    if state.ready.load(Ordering::Acquire) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn health_handler(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = state.service_start_time.elapsed().as_secs();
    let ready = state.ready.load(Ordering::Acquire);

    let response = HealthResponse {
        status: if ready { "healthy" } else { "starting" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        ready,
    };

    (StatusCode::OK, Json(response))
}
