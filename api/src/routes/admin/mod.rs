use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod get;
pub mod post;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get::admin_session))
        .route("/login", post(post::admin_login))
        .route("/logout", post(post::admin_logout))
        .route("/password", post(post::change_password))
}
