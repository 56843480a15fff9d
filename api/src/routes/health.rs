use axum::{Json, Router, response::IntoResponse, routing::get};
use serde_json::json;

use crate::response::ApiResponse;
use crate::state::AppState;

/// GET /api/health
///
/// Liveness check; intentionally mounted outside the network gate so
/// monitoring keeps working when the allowlist changes.
async fn health() -> impl IntoResponse {
    Json(ApiResponse::success(
        json!({ "status": "ok" }),
        "Service is healthy",
    ))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}
