use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod common;
pub mod get;
pub mod post;

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/form", get(get::form_context))
        .route("/submit", post(post::submit_attendance))
        .route("/success", get(get::success_summary))
}
