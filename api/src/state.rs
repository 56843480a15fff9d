//! Shared application state handed to every handler.
//!
//! External collaborators (identity broker, ASN lookup, credential exchange,
//! attendance table) are held as trait objects so the test harness can swap
//! in doubles without touching the router.

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use common::config;
use services::access::{AsnLookup, IpinfoLookup};
use services::identity::{GoogleTokenInfo, IdentityBroker};
use services::policy::PolicyStore;
use services::rate_limit::RateLimiter;
use services::sheets::{AttendanceTable, SheetsClient};
use services::token::{ServiceAccountExchange, ServiceAccountKey, TokenProvider};

use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub policy: Arc<PolicyStore>,
    pub limiter: Arc<RateLimiter>,
    pub lookup: Arc<dyn AsnLookup>,
    pub broker: Arc<dyn IdentityBroker>,
    pub tokens: Arc<dyn TokenProvider>,
    pub table: Arc<dyn AttendanceTable>,
    pub google_client_id: String,
    pub tz: FixedOffset,
    pub cookie_secure: bool,
}

impl AppState {
    /// Build production state from the global configuration. Missing or
    /// invalid service-account material is fatal here, at startup, rather
    /// than on the first submission.
    pub fn from_config() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()?;

        let key = ServiceAccountKey::from_file(&config::service_account_json_path())?;

        let tz_offset_minutes = config::tz_offset_minutes();
        let tz = FixedOffset::east_opt(tz_offset_minutes * 60)
            .ok_or_else(|| anyhow::anyhow!("TZ_OFFSET_MINUTES out of range: {tz_offset_minutes}"))?;

        Ok(Self {
            sessions: SessionStore::new(),
            policy: Arc::new(PolicyStore::new(config::settings_file(), tz_offset_minutes)),
            limiter: Arc::new(RateLimiter::new(config::rate_limit_dir())),
            lookup: Arc::new(IpinfoLookup::new(client.clone())),
            broker: Arc::new(GoogleTokenInfo::new(client.clone())),
            tokens: Arc::new(ServiceAccountExchange::new(client.clone(), key)),
            table: Arc::new(SheetsClient::new(
                client,
                config::spreadsheet_id(),
                config::sheet_tab_name(),
            )),
            google_client_id: config::google_client_id(),
            tz,
            cookie_secure: config::cookie_secure(),
        })
    }
}
