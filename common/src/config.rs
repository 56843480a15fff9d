//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and mutation for testing or overrides in runtime environments.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub host: String,
    pub port: u16,
    pub google_client_id: String,
    pub spreadsheet_id: String,
    pub sheet_tab_name: String,
    pub service_account_json_path: String,
    pub settings_file: String,
    pub rate_limit_dir: String,
    pub tz_offset_minutes: i32,
    pub cookie_secure: bool,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// This method is used internally to populate the singleton. It panics
    /// if required variables are missing or improperly formatted.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-api".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "api=info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "api.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .unwrap(),
            google_client_id: env::var("GOOGLE_CLIENT_ID").expect("GOOGLE_CLIENT_ID is required"),
            spreadsheet_id: env::var("SPREADSHEET_ID").expect("SPREADSHEET_ID is required"),
            sheet_tab_name: env::var("SHEET_TAB_NAME").unwrap_or_else(|_| "Attendance".into()),
            service_account_json_path: env::var("SERVICE_ACCOUNT_JSON_PATH")
                .unwrap_or_else(|_| "service-account.json".into()),
            settings_file: env::var("SETTINGS_FILE").unwrap_or_else(|_| "settings.json".into()),
            rate_limit_dir: env::var("RATE_LIMIT_DIR").unwrap_or_else(|_| ".ratelimit".into()),
            tz_offset_minutes: env::var("TZ_OFFSET_MINUTES")
                .unwrap_or_else(|_| "360".into())
                .parse()
                .unwrap(),
            cookie_secure: env::var("COOKIE_SECURE").unwrap_or_else(|_| "false".into()) == "true",
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    /// Generic internal setter for any field in the config.
    ///
    /// Used by public per-field setter methods.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_project_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.project_name = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_host(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.host = value.into());
    }

    pub fn set_port(value: u16) {
        AppConfig::set_field(|cfg| cfg.port = value);
    }

    pub fn set_google_client_id(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.google_client_id = value.into());
    }

    pub fn set_spreadsheet_id(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.spreadsheet_id = value.into());
    }

    pub fn set_sheet_tab_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.sheet_tab_name = value.into());
    }

    pub fn set_service_account_json_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.service_account_json_path = value.into());
    }

    pub fn set_settings_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.settings_file = value.into());
    }

    pub fn set_rate_limit_dir(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.rate_limit_dir = value.into());
    }

    pub fn set_tz_offset_minutes(value: i32) {
        AppConfig::set_field(|cfg| cfg.tz_offset_minutes = value);
    }

    pub fn set_cookie_secure(value: bool) {
        AppConfig::set_field(|cfg| cfg.cookie_secure = value);
    }
}

// Thin accessors so call sites can write `config::host()` etc.

pub fn env() -> String {
    AppConfig::global().env.clone()
}

pub fn project_name() -> String {
    AppConfig::global().project_name.clone()
}

pub fn log_level() -> String {
    AppConfig::global().log_level.clone()
}

pub fn log_file() -> String {
    AppConfig::global().log_file.clone()
}

pub fn log_to_stdout() -> bool {
    AppConfig::global().log_to_stdout
}

pub fn host() -> String {
    AppConfig::global().host.clone()
}

pub fn port() -> u16 {
    AppConfig::global().port
}

pub fn google_client_id() -> String {
    AppConfig::global().google_client_id.clone()
}

pub fn spreadsheet_id() -> String {
    AppConfig::global().spreadsheet_id.clone()
}

pub fn sheet_tab_name() -> String {
    AppConfig::global().sheet_tab_name.clone()
}

pub fn service_account_json_path() -> String {
    AppConfig::global().service_account_json_path.clone()
}

pub fn settings_file() -> String {
    AppConfig::global().settings_file.clone()
}

pub fn rate_limit_dir() -> String {
    AppConfig::global().rate_limit_dir.clone()
}

pub fn tz_offset_minutes() -> i32 {
    AppConfig::global().tz_offset_minutes
}

pub fn cookie_secure() -> bool {
    AppConfig::global().cookie_secure
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        env::set_var("GOOGLE_CLIENT_ID", "client-under-test");
        env::set_var("SPREADSHEET_ID", "sheet-under-test");
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_vars_are_absent() {
        set_required_vars();
        env::remove_var("SHEET_TAB_NAME");
        env::remove_var("TZ_OFFSET_MINUTES");
        env::remove_var("RATE_LIMIT_DIR");
        AppConfig::reset();

        assert_eq!(google_client_id(), "client-under-test");
        assert_eq!(sheet_tab_name(), "Attendance");
        assert_eq!(tz_offset_minutes(), 360);
        assert_eq!(rate_limit_dir(), ".ratelimit");
    }

    #[test]
    #[serial]
    fn setters_override_loaded_values() {
        set_required_vars();
        AppConfig::reset();

        AppConfig::set_cookie_secure(true);
        assert!(cookie_secure());
        AppConfig::set_spreadsheet_id("other-sheet");
        assert_eq!(spreadsheet_id(), "other-sheet");

        AppConfig::reset();
    }
}
