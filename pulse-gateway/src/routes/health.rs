use axum::Json;
use pulse_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("pulse-gateway", env!("CARGO_PKG_VERSION")))
}
