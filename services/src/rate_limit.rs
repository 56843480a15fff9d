//! Fixed-window attempt counter backed by small per-key files.
//!
//! State survives process restarts so a redeploy does not reset an attacker's
//! budget. One file per `(action, client)` pair; the whole read-modify-write
//! cycle runs under the store mutex. Storage errors fail open: an unreadable
//! or corrupt state file counts as "no prior attempts".

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub permitted: bool,
    pub retry_after_seconds: u64,
    pub remaining: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WindowState {
    start: i64,
    count: u32,
}

pub struct RateLimiter {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl RateLimiter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            guard: Mutex::new(()),
        }
    }

    /// Record an attempt for `key` by `client` and decide whether it is
    /// within `max` attempts per `window_seconds`.
    pub async fn allow(
        &self,
        key: &str,
        max: u32,
        window_seconds: i64,
        client: &str,
    ) -> RateLimitDecision {
        self.allow_at(key, max, window_seconds, client, Utc::now().timestamp())
            .await
    }

    /// Deterministic-clock variant of [`allow`](Self::allow).
    pub async fn allow_at(
        &self,
        key: &str,
        max: u32,
        window_seconds: i64,
        client: &str,
        now: i64,
    ) -> RateLimitDecision {
        let _guard = self.guard.lock().await;

        if let Err(err) = fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "cannot create rate limit dir");
        }

        let file = self.state_file(key, client);
        let mut state = fs::read_to_string(&file)
            .ok()
            .and_then(|raw| serde_json::from_str::<WindowState>(&raw).ok())
            .unwrap_or(WindowState { start: now, count: 0 });

        // Window expired, start a fresh one.
        if now - state.start >= window_seconds {
            state.start = now;
            state.count = 0;
        }

        if state.count >= max {
            let retry = (window_seconds - (now - state.start)).max(1) as u64;
            return RateLimitDecision {
                permitted: false,
                retry_after_seconds: retry,
                remaining: 0,
            };
        }

        state.count += 1;
        match serde_json::to_string(&state) {
            Ok(json) => {
                if let Err(err) = fs::write(&file, json) {
                    tracing::warn!(file = %file.display(), error = %err, "failed to persist rate limit state");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize rate limit state");
            }
        }

        RateLimitDecision {
            permitted: true,
            retry_after_seconds: 0,
            remaining: max.saturating_sub(state.count),
        }
    }

    fn state_file(&self, key: &str, client: &str) -> PathBuf {
        let safe_key = sanitize(key, |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
        });
        let safe_client = sanitize(client, |c: char| c.is_ascii_hexdigit() || c == ':' || c == '.');
        self.dir.join(format!("{safe_key}__{safe_client}.json"))
    }
}

fn sanitize(input: &str, keep: impl Fn(char) -> bool) -> String {
    input
        .chars()
        .map(|c| if keep(c) { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAX: u32 = 3;
    const WINDOW: i64 = 300;

    #[tokio::test]
    async fn permits_up_to_max_then_denies_with_retry_hint() {
        let dir = TempDir::new().unwrap();
        let limiter = RateLimiter::new(dir.path());
        let now = 1_700_000_000;

        for i in 0..MAX {
            let d = limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now + i as i64).await;
            assert!(d.permitted, "attempt {} should pass", i + 1);
            assert_eq!(d.remaining, MAX - 1 - i);
        }

        let denied = limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now + 10).await;
        assert!(!denied.permitted);
        assert!(denied.retry_after_seconds >= 1);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        let dir = TempDir::new().unwrap();
        let limiter = RateLimiter::new(dir.path());
        let now = 1_700_000_000;

        for _ in 0..MAX {
            limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now).await;
        }
        assert!(!limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now).await.permitted);

        let after = limiter
            .allow_at("login", MAX, WINDOW, "10.0.0.9", now + WINDOW)
            .await;
        assert!(after.permitted);
        // fresh window: this was the first attempt
        assert_eq!(after.remaining, MAX - 1);
    }

    #[tokio::test]
    async fn keys_and_clients_are_counted_independently() {
        let dir = TempDir::new().unwrap();
        let limiter = RateLimiter::new(dir.path());
        let now = 1_700_000_000;

        for _ in 0..MAX {
            limiter.allow_at("admin_login", MAX, WINDOW, "10.0.0.9", now).await;
        }
        assert!(!limiter.allow_at("admin_login", MAX, WINDOW, "10.0.0.9", now).await.permitted);

        assert!(limiter.allow_at("google_login", MAX, WINDOW, "10.0.0.9", now).await.permitted);
        assert!(limiter.allow_at("admin_login", MAX, WINDOW, "10.0.0.10", now).await.permitted);
    }

    #[tokio::test]
    async fn corrupt_state_counts_as_no_prior_attempts() {
        let dir = TempDir::new().unwrap();
        let limiter = RateLimiter::new(dir.path());
        let now = 1_700_000_000;

        limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now).await;
        let file = limiter.state_file("login", "10.0.0.9");
        fs::write(&file, "garbage").unwrap();

        let d = limiter.allow_at("login", MAX, WINDOW, "10.0.0.9", now + 1).await;
        assert!(d.permitted);
        assert_eq!(d.remaining, MAX - 1);
    }

    #[test]
    fn state_file_names_are_sanitized() {
        let limiter = RateLimiter::new("/tmp/rl");
        let file = limiter.state_file("goo gle/login", "10.0.0.9");
        assert_eq!(
            file.file_name().unwrap().to_str().unwrap(),
            "goo_gle_login__10.0.0.9.json"
        );
    }
}
