//! Health check route.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub backend: String,
    pub cached_urls: usize,
    pub in_flight: usize,
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        backend: state.resolver.backend_name().to_string(),
        cached_urls: state.resolver.cache().len(),
        in_flight: state.resolver.in_flight_count(),
    })
}
