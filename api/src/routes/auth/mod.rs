use axum::{Router, routing::post};

use crate::state::AppState;

pub mod post;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(post::login))
        .route("/logout", post(post::logout))
}
