use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, Default)]
pub struct AdminSession {
    pub authed: bool,
    pub csrf: Option<String>,
}

/// GET /api/admin/session
///
/// Whether this session is admin-authenticated, plus the admin CSRF token
/// the login and password forms must echo back.
pub async fn admin_session(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    let authed = state
        .sessions
        .get(&session_id)
        .map(|s| s.admin_authed)
        .unwrap_or(false);
    let csrf = state.sessions.issue_admin_csrf(&session_id);

    (
        jar,
        Json(ApiResponse::success(
            AdminSession { authed, csrf },
            "Admin session",
        )),
    )
}
