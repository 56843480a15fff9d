use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use services::access;
use services::policy::EmailMode;

use crate::middleware::{ClientIp, PolicySnapshot};
use crate::response::ApiResponse;
use crate::session::{SESSION_COOKIE, random_token, removal_cookie, session_cookie};
use crate::state::AppState;

/// Identity-provider verification budget: 30 calls per 5 minutes per client.
const LOGIN_RATE_KEY: &str = "google_login";
const LOGIN_RATE_MAX: u32 = 30;
const LOGIN_RATE_WINDOW_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub credential: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct LoginResponse {
    pub email: String,
    pub name: String,
}

/// POST /api/auth/login
///
/// Accepts a Google Identity Services credential as JSON and establishes an
/// authenticated session.
///
/// ### Responses
/// - `200 OK` → `{ "email": ..., "name": ... }`, fresh session cookie
/// - `400 Bad Request` → missing token
/// - `401 Unauthorized` → invalid token, audience mismatch or missing email
/// - `403 Forbidden` → email rejected by policy
/// - `429 Too Many Requests` → verification budget exhausted (`Retry-After` set)
pub async fn login(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Extension(PolicySnapshot(doc)): Extension<PolicySnapshot>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Response {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    let token = match req.credential {
        Some(token) if !token.is_empty() => token,
        _ => {
            return (
                jar,
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::<LoginResponse>::error("Missing token")),
                ),
            )
                .into_response();
        }
    };

    let decision = state
        .limiter
        .allow(LOGIN_RATE_KEY, LOGIN_RATE_MAX, LOGIN_RATE_WINDOW_SECS, &ip)
        .await;
    if !decision.permitted {
        let mut res = (
            jar,
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ApiResponse::<LoginResponse>::error(format!(
                    "Too many requests. Try again in {} seconds.",
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

    let identity = match state.broker.verify(&token, &state.google_client_id).await {
        Ok(identity) => identity,
        Err(err) => {
            return (
                jar,
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiResponse::<LoginResponse>::error(err.to_string())),
                ),
            )
                .into_response();
        }
    };

    if !access::email_is_allowed(&identity.email, &doc) {
        let message = match doc.email_mode {
            EmailMode::AllGmail => "Only @gmail.com accounts are allowed right now.",
            EmailMode::Domains => "Use your official BRACU Google account to access the portal.",
        };
        return (
            jar,
            (
                StatusCode::FORBIDDEN,
                Json(ApiResponse::<LoginResponse>::error(message)),
            ),
        )
            .into_response();
    }

    // Privilege change: fresh session id against fixation, fresh form token.
    let new_id = state.sessions.regenerate(&session_id);
    state.sessions.with(&new_id, |s| {
        s.user = Some(identity.clone());
        s.csrf = Some(random_token(32));
    });
    let jar = jar.add(session_cookie(new_id, state.cookie_secure));

    tracing::info!(email = %identity.email, "user logged in");

    (
        jar,
        (
            StatusCode::OK,
            Json(ApiResponse::success(
                LoginResponse {
                    email: identity.email,
                    name: identity.name,
                },
                "Logged in",
            )),
        ),
    )
        .into_response()
}

/// POST /api/auth/logout
///
/// Drops all server-side session state and expires the cookie immediately.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value());
    }
    let jar = jar.remove(removal_cookie());
    (jar, Json(ApiResponse::success((), "Logged out")))
}
