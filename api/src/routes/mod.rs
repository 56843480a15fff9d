//! HTTP route entry point for `/api/...`.
//!
//! Route groups:
//! - `/health` → liveness check (public, outside the network gate)
//! - `/auth` → Google sign-in and logout
//! - `/attendance` → form context, submission, success summary
//! - `/admin` → admin authentication and password rotation
//!
//! Everything except `/health` sits behind the network admission gate, so a
//! disallowed address is rejected before any session or auth logic runs.

use axum::{Router, middleware::from_fn_with_state};

use crate::middleware::network_gate;
use crate::routes::{
    admin::admin_routes, attendance::attendance_routes, auth::auth_routes, health::health_routes,
};
use crate::state::AppState;

pub mod admin;
pub mod attendance;
pub mod auth;
pub mod health;

/// Builds the complete application router for all HTTP endpoints.
pub fn routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/attendance", attendance_routes())
        .nest("/admin", admin_routes())
        .route_layer(from_fn_with_state(app_state, network_gate))
        .nest("/health", health_routes())
}
