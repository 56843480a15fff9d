//! Server-side sessions bound to one opaque cookie.
//!
//! The cookie carries only a random identifier; all state lives in the
//! process. The identifier is regenerated on every privilege change (user
//! login, admin login) so a fixated pre-auth id never survives
//! authentication. CSRF tokens are per-session: one for the attendance form,
//! an independently keyed one for the admin surface.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use services::access::constant_time_eq;
use services::identity::Identity;
use services::submission::AttendanceRecord;

pub const SESSION_COOKIE: &str = "attendance_session";

/// Hex-encoded random token of `bytes` entropy bytes.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<Identity>,
    pub csrf: Option<String>,
    pub admin_csrf: Option<String>,
    pub admin_authed: bool,
    pub last_submission: Option<AttendanceRecord>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the session referenced by the jar, creating one on first
    /// contact. Returns the id and the jar to send back (it carries the new
    /// cookie when a session was created).
    pub fn attach(&self, jar: CookieJar, secure: bool) -> (String, CookieJar) {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            let id = cookie.value().to_string();
            if self.inner.read().unwrap().contains_key(&id) {
                return (id, jar);
            }
        }
        let id = self.create();
        let jar = jar.add(session_cookie(id.clone(), secure));
        (id, jar)
    }

    pub fn create(&self) -> String {
        let id = random_token(32);
        self.inner
            .write()
            .unwrap()
            .insert(id.clone(), Session::default());
        id
    }

    /// Snapshot of the session state, if the id is live.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().unwrap().get(id).cloned()
    }

    /// Mutate the session in place. Returns `None` for a dead id.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.inner.write().unwrap().get_mut(id).map(f)
    }

    /// Move the state to a freshly generated id, invalidating the old one.
    /// Called immediately after any successful authentication.
    pub fn regenerate(&self, id: &str) -> String {
        let mut sessions = self.inner.write().unwrap();
        let state = sessions.remove(id).unwrap_or_default();
        let new_id = random_token(32);
        sessions.insert(new_id.clone(), state);
        new_id
    }

    pub fn destroy(&self, id: &str) {
        self.inner.write().unwrap().remove(id);
    }

    /// The form CSRF token, generated once per session and reused until
    /// rotated.
    pub fn issue_csrf(&self, id: &str) -> Option<String> {
        self.with(id, |s| s.csrf.get_or_insert_with(|| random_token(32)).clone())
    }

    pub fn issue_admin_csrf(&self, id: &str) -> Option<String> {
        self.with(id, |s| {
            s.admin_csrf.get_or_insert_with(|| random_token(16)).clone()
        })
    }

    /// Constant-time verification; absence of either side is a failure.
    pub fn verify_csrf(&self, id: &str, submitted: &str) -> bool {
        if submitted.is_empty() {
            return false;
        }
        self.get(id)
            .and_then(|s| s.csrf)
            .map(|expected| constant_time_eq(&expected, submitted))
            .unwrap_or(false)
    }

    pub fn verify_admin_csrf(&self, id: &str, submitted: &str) -> bool {
        if submitted.is_empty() {
            return false;
        }
        self.get(id)
            .and_then(|s| s.admin_csrf)
            .map(|expected| constant_time_eq(&expected, submitted))
            .unwrap_or(false)
    }
}

pub fn session_cookie(id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Removal cookie matching the issued attributes, expiring it immediately.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_is_idempotent_until_rotated() {
        let store = SessionStore::new();
        let id = store.create();

        let first = store.issue_csrf(&id).unwrap();
        let second = store.issue_csrf(&id).unwrap();
        assert_eq!(first, second);

        store.with(&id, |s| s.csrf = Some(random_token(32)));
        let third = store.issue_csrf(&id).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn verify_csrf_rejects_absent_or_mismatched_tokens() {
        let store = SessionStore::new();
        let id = store.create();

        // no token issued yet
        assert!(!store.verify_csrf(&id, "anything"));

        let token = store.issue_csrf(&id).unwrap();
        assert!(store.verify_csrf(&id, &token));
        assert!(!store.verify_csrf(&id, ""));
        assert!(!store.verify_csrf(&id, "wrong"));
        assert!(!store.verify_csrf("dead-id", &token));
    }

    #[test]
    fn user_and_admin_csrf_are_independent() {
        let store = SessionStore::new();
        let id = store.create();

        let user_token = store.issue_csrf(&id).unwrap();
        let admin_token = store.issue_admin_csrf(&id).unwrap();
        assert_ne!(user_token, admin_token);
        assert!(!store.verify_admin_csrf(&id, &user_token));
        assert!(!store.verify_csrf(&id, &admin_token));
    }

    #[test]
    fn regenerate_moves_state_and_kills_the_old_id() {
        let store = SessionStore::new();
        let id = store.create();
        store.with(&id, |s| {
            s.user = Some(Identity {
                email: "user@bracu.ac.bd".into(),
                name: "User".into(),
            })
        });

        let new_id = store.regenerate(&id);
        assert_ne!(id, new_id);
        assert!(store.get(&id).is_none());
        assert_eq!(
            store.get(&new_id).unwrap().user.unwrap().email,
            "user@bracu.ac.bd"
        );
    }

    #[test]
    fn destroy_clears_all_state() {
        let store = SessionStore::new();
        let id = store.create();
        store.issue_csrf(&id);
        store.destroy(&id);
        assert!(store.get(&id).is_none());
    }
}
