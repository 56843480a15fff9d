//! Request-level middleware: logging, security headers and the network gate.

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::TypedHeader;
use headers::UserAgent;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use services::access;
use services::policy::PolicyDocument;

use crate::response::ApiResponse;
use crate::state::AppState;

/// Resolved client address, inserted by [`network_gate`] for downstream
/// handlers (rate limiting, the appended row's IP column).
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

/// Immutable snapshot of the policy document taken once per request by
/// [`network_gate`]; every later decision on the request reads this same
/// snapshot.
#[derive(Clone)]
pub struct PolicySnapshot(pub Arc<PolicyDocument>);

fn header_str<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Best-effort peer address; requests served without connect info (tests)
/// fall back to an unspecified address.
fn peer_addr(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "0.0.0.0".into())
}

/// Logs method, path, IP address and user-agent for each incoming HTTP
/// request. Automatically skips CORS preflight `OPTIONS` requests.
pub async fn log_request(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let (mut parts, body) = req.into_parts();

    let user_agent = TypedHeader::<UserAgent>::from_request_parts(&mut parts, &())
        .await
        .ok()
        .map(|TypedHeader(ua)| ua.to_string());

    let req = Request::from_parts(parts, body);
    let ip = peer_addr(&req);

    info!(
        method = ?req.method(),
        path = %req.uri().path(),
        ip = %ip,
        user_agent = user_agent.unwrap_or_else(|| "unknown".into()),
        "Incoming request"
    );

    Ok(next.run(req).await)
}

use axum::extract::FromRequestParts;

/// Hardening headers on every response; HSTS only when cookies are already
/// marked secure (i.e. the deployment terminates TLS).
pub async fn security_headers(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let secure = state.cookie_secure;
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    if secure {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    // Allows the Google Identity Services scripts the sign-in page embeds.
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(
            "default-src 'self'; base-uri 'self'; form-action 'self'; frame-ancestors 'none'; \
             object-src 'none'; script-src 'self' https://accounts.google.com https://www.gstatic.com; \
             frame-src https://accounts.google.com; \
             connect-src 'self' https://accounts.google.com https://oauth2.googleapis.com https://www.googleapis.com",
        ),
    );

    res
}

/// Network admission gate, evaluated before any session or auth logic.
///
/// Resolves the real client address (edge-proxy header, forwarded-for, then
/// the transport peer) and rejects the request outright when the policy
/// document does not admit it.
pub async fn network_gate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<()>>)> {
    let peer = peer_addr(&req);
    let ip = access::real_client_ip(
        header_str(&req, "cf-connecting-ip"),
        header_str(&req, "x-forwarded-for"),
        &peer,
    );

    let doc = Arc::new(state.policy.load());
    if !access::network_is_allowed(&ip, &doc, state.lookup.as_ref()).await {
        info!(ip = %ip, "request blocked by network policy");
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error(format!(
                "You are not allowed to access this portal from your current network. Your IP: {ip}"
            ))),
        ));
    }

    req.extensions_mut().insert(ClientIp(ip));
    req.extensions_mut().insert(PolicySnapshot(doc));
    Ok(next.run(req).await)
}
