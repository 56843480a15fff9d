use std::time::Duration;

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use validator::Validate;

use common::format_validation_errors;
use services::access::constant_time_eq;
use services::policy::sha1_hex;

use crate::middleware::{ClientIp, PolicySnapshot};
use crate::response::ApiResponse;
use crate::session::{random_token, session_cookie};
use crate::state::AppState;

/// Admin login budget: 8 attempts per 5 minutes per client.
const ADMIN_RATE_KEY: &str = "admin_login";
const ADMIN_RATE_MAX: u32 = 8;
const ADMIN_RATE_WINDOW_SECS: i64 = 300;

/// Flat delay added to every failed password check to blunt brute force.
const FAILED_LOGIN_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub new_password2: String,
    #[serde(default)]
    pub csrf: String,
}

fn forbidden(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ApiResponse::<()>::error(message)),
    )
        .into_response()
}

/// POST /api/admin/login
///
/// Password login for the admin surface. Keyed independently of the user
/// session state; failures are deliberately generic and slowed down.
///
/// ### Responses
/// - `200 OK` → admin session established, fresh session cookie
/// - `401 Unauthorized` → wrong password (after a fixed delay)
/// - `403 Forbidden` → CSRF failed
/// - `429 Too Many Requests` → attempt budget exhausted (`Retry-After` set)
/// - `500 Internal Server Error` → no admin password configured
pub async fn admin_login(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Extension(PolicySnapshot(doc)): Extension<PolicySnapshot>,
    jar: CookieJar,
    Json(req): Json<AdminLoginRequest>,
) -> Response {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    if !state.sessions.verify_admin_csrf(&session_id, &req.csrf) {
        return (jar, forbidden("CSRF failed")).into_response();
    }

    let decision = state
        .limiter
        .allow(ADMIN_RATE_KEY, ADMIN_RATE_MAX, ADMIN_RATE_WINDOW_SECS, &ip)
        .await;
    if !decision.permitted {
        let mut res = (
            jar,
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ApiResponse::<()>::error(format!(
                    "Too many attempts. Try again in {} seconds.",
                    decision.retry_after_seconds
                ))),
            ),
        )
            .into_response();
        if let Ok(value) = decision.retry_after_seconds.to_string().parse() {
            res.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return res;
    }

    let stored = doc.admin_password_digest();
    if stored.is_empty() {
        return (
            jar,
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    "Admin password is not configured.",
                )),
            ),
        )
            .into_response();
    }

    if !constant_time_eq(&stored, &sha1_hex(&req.password)) {
        tokio::time::sleep(Duration::from_millis(FAILED_LOGIN_DELAY_MS)).await;
        tracing::warn!(ip = %ip, "failed admin login attempt");
        return (
            jar,
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error("Wrong password.")),
            ),
        )
            .into_response();
    }

    // Privilege change: fresh session id against fixation.
    let new_id = state.sessions.regenerate(&session_id);
    state.sessions.with(&new_id, |s| s.admin_authed = true);
    let jar = jar.add(session_cookie(new_id, state.cookie_secure));

    tracing::info!(ip = %ip, "admin logged in");

    (
        jar,
        Json(ApiResponse::success((), "Admin session established")),
    )
        .into_response()
}

/// POST /api/admin/logout
pub async fn admin_logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);
    state.sessions.with(&session_id, |s| s.admin_authed = false);
    (jar, Json(ApiResponse::success((), "Admin logged out")))
}

/// POST /api/admin/password
///
/// Rotate the admin password. Verifies the current password against the
/// stored digest, persists the new one through the policy store (stamping
/// `updated_at`) and rotates the admin CSRF token on success.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(PolicySnapshot(doc)): Extension<PolicySnapshot>,
    jar: CookieJar,
    Json(req): Json<ChangePasswordRequest>,
) -> Response {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    let authed = state
        .sessions
        .get(&session_id)
        .map(|s| s.admin_authed)
        .unwrap_or(false);
    if !authed {
        return (jar, forbidden("Admin access required")).into_response();
    }
    if !state.sessions.verify_admin_csrf(&session_id, &req.csrf) {
        return (jar, forbidden("CSRF failed")).into_response();
    }

    let stored = doc.admin_password_digest();

    let bad_request = |message: &str| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(message)),
        )
            .into_response()
    };

    if stored.is_empty() {
        return (
            jar,
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    "Admin password is not configured.",
                )),
            ),
        )
            .into_response();
    }
    if req.current_password.is_empty() || req.new_password.is_empty() || req.new_password2.is_empty()
    {
        return (jar, bad_request("All fields are required.")).into_response();
    }
    if !constant_time_eq(&stored, &sha1_hex(&req.current_password)) {
        tokio::time::sleep(Duration::from_millis(FAILED_LOGIN_DELAY_MS)).await;
        return (
            jar,
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error("Current password is incorrect.")),
            ),
        )
            .into_response();
    }
    if req.new_password != req.new_password2 {
        return (jar, bad_request("New passwords do not match.")).into_response();
    }
    if let Err(errors) = req.validate() {
        return (jar, bad_request(&format_validation_errors(&errors))).into_response();
    }

    match state
        .policy
        .update(|doc| doc.admin_password_sha1 = sha1_hex(&req.new_password))
        .await
    {
        Ok(_) => {
            // Rotate the admin CSRF token now that the credential changed.
            state
                .sessions
                .with(&session_id, |s| s.admin_csrf = Some(random_token(16)));
            (
                jar,
                Json(ApiResponse::success((), "Password changed successfully.")),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to persist rotated admin password");
            (
                jar,
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::<()>::error(
                        "Failed to save settings (permission issue).",
                    )),
                ),
            )
                .into_response()
        }
    }
}
