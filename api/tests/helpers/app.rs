//! Test harness: the full router wired to in-memory doubles for every
//! external collaborator, plus a temp-dir policy document and rate-limit
//! store seeded with the values the scenarios expect.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{FixedOffset, Utc};
use tempfile::TempDir;
use tower::ServiceExt;

use api::routes::routes;
use api::session::SessionStore;
use api::state::AppState;
use services::access::AsnLookup;
use services::error::{IdentityError, TableError, TokenError};
use services::identity::{Identity, IdentityBroker};
use services::policy::{PolicyDocument, PolicyStore, sha1_hex};
use services::rate_limit::RateLimiter;
use services::sheets::AttendanceTable;
use services::token::{Credential, TokenProvider};

pub const CLIENT_ID: &str = "test-client-id";
pub const CAMPUS_IP: &str = "203.0.113.7";
pub const OUTSIDE_IP: &str = "198.51.100.99";
pub const ADMIN_PASSWORD: &str = "original-password";

/// Credential the stub broker resolves to a BRACU identity.
pub const GOOD_TOKEN: &str = "good-token";
/// Credential resolving to an identity outside the domain allowlist.
pub const OUTSIDER_TOKEN: &str = "outsider-token";
/// Credential minted for a different OAuth client.
pub const WRONG_AUDIENCE_TOKEN: &str = "wrong-audience-token";

pub struct StubLookup {
    pub org: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl AsnLookup for StubLookup {
    async fn org(&self, _ip: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.org.clone()
    }
}

pub struct StubBroker {
    identities: HashMap<String, Identity>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl IdentityBroker for StubBroker {
    async fn verify(&self, id_token: &str, _expected_aud: &str) -> Result<Identity, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if id_token == WRONG_AUDIENCE_TOKEN {
            return Err(IdentityError::AudienceMismatch);
        }
        self.identities
            .get(id_token)
            .cloned()
            .ok_or(IdentityError::Invalid)
    }
}

pub struct StubTokens {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for StubTokens {
    async fn access_token(&self) -> Result<Credential, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credential {
            access_token: "test-access-token".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
        })
    }
}

pub struct StubTable {
    pub duplicate: AtomicBool,
    pub rows: Mutex<Vec<Vec<String>>>,
    pub read_calls: AtomicUsize,
}

#[async_trait]
impl AttendanceTable for StubTable {
    async fn has_submitted(
        &self,
        _access_token: &str,
        _email: &str,
        _date: &str,
    ) -> Result<bool, TableError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.duplicate.load(Ordering::SeqCst))
    }

    async fn append(&self, _access_token: &str, row: &[String]) -> Result<(), TableError> {
        self.rows.lock().unwrap().push(row.to_vec());
        Ok(())
    }
}

pub struct TestApp {
    router: Router,
    pub policy: Arc<PolicyStore>,
    pub lookup: Arc<StubLookup>,
    pub broker: Arc<StubBroker>,
    pub tokens: Arc<StubTokens>,
    pub table: Arc<StubTable>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(|_| {}).await
    }

    /// Build the app with the baseline policy document (campus IP
    /// whitelisted, bracu.ac.bd domain, one course, one section, admin
    /// password set) after applying `mutate` on top.
    pub async fn with_policy(mutate: impl FnOnce(&mut PolicyDocument)) -> Self {
        let dir = TempDir::new().unwrap();
        let policy = Arc::new(PolicyStore::new(dir.path().join("settings.json"), 360));
        policy
            .update(|doc| {
                doc.ip_whitelist = vec![CAMPUS_IP.into()];
                doc.allow_all_ip = false;
                doc.domain_allowlist = vec!["bracu.ac.bd".into()];
                doc.course_codes = vec!["MAT120 LAB".into()];
                doc.sections = vec!["14".into()];
                doc.admin_password_sha1 = sha1_hex(ADMIN_PASSWORD);
                mutate(doc);
            })
            .await
            .unwrap();

        let mut identities = HashMap::new();
        identities.insert(
            GOOD_TOKEN.to_string(),
            Identity {
                email: "user@bracu.ac.bd".into(),
                name: "Test User".into(),
            },
        );
        identities.insert(
            OUTSIDER_TOKEN.to_string(),
            Identity {
                email: "outsider@gmail.com".into(),
                name: "Outsider".into(),
            },
        );

        let lookup = Arc::new(StubLookup {
            org: None,
            calls: AtomicUsize::new(0),
        });
        let broker = Arc::new(StubBroker {
            identities,
            calls: AtomicUsize::new(0),
        });
        let tokens = Arc::new(StubTokens {
            calls: AtomicUsize::new(0),
        });
        let table = Arc::new(StubTable {
            duplicate: AtomicBool::new(false),
            rows: Mutex::new(Vec::new()),
            read_calls: AtomicUsize::new(0),
        });

        let state = AppState {
            sessions: SessionStore::new(),
            policy: policy.clone(),
            limiter: Arc::new(RateLimiter::new(dir.path().join("ratelimit"))),
            lookup: lookup.clone(),
            broker: broker.clone(),
            tokens: tokens.clone(),
            table: table.clone(),
            google_client_id: CLIENT_ID.into(),
            tz: FixedOffset::east_opt(6 * 3600).unwrap(),
            cookie_secure: false,
        };

        let router = Router::new()
            .nest("/api", routes(state.clone()))
            .with_state(state);

        Self {
            router,
            policy,
            lookup,
            broker,
            tokens,
            table,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

// --- request builders -------------------------------------------------------

pub fn get(uri: &str, ip: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", ip);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(
    uri: &str,
    ip: &str,
    cookie: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_form(uri: &str, ip: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// --- response helpers -------------------------------------------------------

/// The `attendance_session=<id>` pair from Set-Cookie, ready for a Cookie
/// header. When the handler rotated the session the last pair wins.
pub fn session_cookie(res: &Response<Body>) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with("attendance_session="))
        .filter_map(|v| v.split(';').next())
        .map(str::to_string)
        .last()
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(res: &Response<Body>) -> String {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
