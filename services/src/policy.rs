//! The admin-controlled policy document: defaults, load-merge-normalize,
//! and whole-file persistence.
//!
//! The document is the single source of truth for admission rules. `load`
//! never fails: it starts from the built-in defaults and shallow-merges any
//! readable override on top, key by key. `save` rewrites the whole file and
//! stamps `updated_at`.

use std::fs;
use std::path::PathBuf;

use chrono::{FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;

use crate::error::PolicyError;

/// Email admission mode. `AllGmail` historically meant "gmail.com only" but
/// the evaluated policy accepts any well-formed address in that mode; the
/// literal behavior is preserved (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailMode {
    Domains,
    AllGmail,
}

impl<'de> Deserialize<'de> for EmailMode {
    /// Lenient by design: anything but the exact string `"all_gmail"` is
    /// coerced to `Domains`, so a hand-edited document cannot poison a load.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("all_gmail") => EmailMode::AllGmail,
            _ => EmailMode::Domains,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub accepting_responses: bool,
    pub allow_all_ip: bool,
    pub asn_allowlist: Vec<String>,
    pub ip_whitelist: Vec<String>,
    pub email_mode: EmailMode,
    pub domain_allowlist: Vec<String>,
    pub course_codes: Vec<String>,
    pub sections: Vec<String>,
    pub admin_password_sha1: String,
    pub updated_at: String,
}

impl PolicyDocument {
    /// Stored admin password digest, canonicalized for comparison.
    pub fn admin_password_digest(&self) -> String {
        self.admin_password_sha1.trim().to_lowercase()
    }

    fn normalize(&mut self) {
        self.asn_allowlist = normalize_list(&self.asn_allowlist);
        self.ip_whitelist = normalize_list(&self.ip_whitelist);
        self.domain_allowlist = normalize_list(&self.domain_allowlist);
        self.course_codes = normalize_list(&self.course_codes);
        self.sections = normalize_list(&self.sections);
    }
}

/// Trim entries, drop empties and de-duplicate, preserving first-occurrence
/// order. Idempotent.
pub fn normalize_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Lowercase hex SHA-1 digest, the format the document stores for the admin
/// password.
pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Typed shadow of the persisted document used for the shallow merge: every
/// field is optional, missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyOverride {
    accepting_responses: Option<bool>,
    allow_all_ip: Option<bool>,
    asn_allowlist: Option<Vec<String>>,
    ip_whitelist: Option<Vec<String>>,
    email_mode: Option<EmailMode>,
    domain_allowlist: Option<Vec<String>>,
    course_codes: Option<Vec<String>>,
    sections: Option<Vec<String>>,
    admin_password_sha1: Option<String>,
    updated_at: Option<String>,
}

/// Durable store for the policy document.
///
/// The internal mutex serializes read-modify-write cycles (`update`) so
/// concurrent writers cannot lose updates; plain `load` calls are lock-free
/// snapshots.
pub struct PolicyStore {
    path: PathBuf,
    tz: FixedOffset,
    guard: Mutex<()>,
}

impl PolicyStore {
    pub fn new(path: impl Into<PathBuf>, tz_offset_minutes: i32) -> Self {
        let tz = FixedOffset::east_opt(tz_offset_minutes * 60)
            .expect("TZ_OFFSET_MINUTES out of range");
        Self {
            path: path.into(),
            tz,
            guard: Mutex::new(()),
        }
    }

    fn now_rfc3339(&self) -> String {
        Utc::now()
            .with_timezone(&self.tz)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// Built-in defaults used when no override document exists.
    pub fn defaults(&self) -> PolicyDocument {
        PolicyDocument {
            accepting_responses: true,
            allow_all_ip: false,
            asn_allowlist: vec!["AS151981".into()],
            ip_whitelist: Vec::new(),
            email_mode: EmailMode::Domains,
            domain_allowlist: vec!["bracu.ac.bd".into(), "g.bracu.ac.bd".into()],
            course_codes: vec!["MAT120 LAB".into()],
            sections: vec!["14".into(), "15".into(), "16".into()],
            admin_password_sha1: String::new(),
            updated_at: self.now_rfc3339(),
        }
    }

    /// Load the effective document: defaults, shallow-merged with any
    /// readable override, lists normalized. Never fails; an unreadable or
    /// malformed override simply leaves the defaults in place.
    pub fn load(&self) -> PolicyDocument {
        let defaults = self.defaults();

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return defaults,
        };
        let over: PolicyOverride = match serde_json::from_str(&raw) {
            Ok(over) => over,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring malformed policy document");
                return defaults;
            }
        };

        let mut doc = PolicyDocument {
            accepting_responses: over
                .accepting_responses
                .unwrap_or(defaults.accepting_responses),
            allow_all_ip: over.allow_all_ip.unwrap_or(defaults.allow_all_ip),
            asn_allowlist: over.asn_allowlist.unwrap_or(defaults.asn_allowlist),
            ip_whitelist: over.ip_whitelist.unwrap_or(defaults.ip_whitelist),
            email_mode: over.email_mode.unwrap_or(defaults.email_mode),
            domain_allowlist: over.domain_allowlist.unwrap_or(defaults.domain_allowlist),
            course_codes: over.course_codes.unwrap_or(defaults.course_codes),
            sections: over.sections.unwrap_or(defaults.sections),
            admin_password_sha1: over
                .admin_password_sha1
                .unwrap_or(defaults.admin_password_sha1),
            updated_at: over.updated_at.unwrap_or(defaults.updated_at),
        };
        doc.normalize();
        doc
    }

    /// Persist the document wholesale, stamping `updated_at` first. Write
    /// failures are returned; callers reload afterwards so in-memory state
    /// reflects what is actually on disk.
    pub fn save(&self, doc: &mut PolicyDocument) -> Result<(), PolicyError> {
        doc.updated_at = self.now_rfc3339();
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, json).map_err(|source| PolicyError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Exclusive load-modify-save cycle. Returns the persisted document.
    pub async fn update<F>(&self, mutate: F) -> Result<PolicyDocument, PolicyError>
    where
        F: FnOnce(&mut PolicyDocument),
    {
        let _guard = self.guard.lock().await;
        let mut doc = self.load();
        mutate(&mut doc);
        doc.normalize();
        self.save(&mut doc)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> PolicyStore {
        PolicyStore::new(dir.path().join("settings.json"), 360)
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let doc = store(&dir).load();

        assert!(doc.accepting_responses);
        assert!(!doc.allow_all_ip);
        assert_eq!(doc.email_mode, EmailMode::Domains);
        assert_eq!(doc.domain_allowlist, vec!["bracu.ac.bd", "g.bracu.ac.bd"]);
        assert_eq!(doc.sections, vec!["14", "15", "16"]);
    }

    #[test]
    fn override_wins_key_by_key_and_missing_keys_keep_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"allow_all_ip": true, "sections": ["1", "2"]}"#,
        )
        .unwrap();

        let doc = PolicyStore::new(&path, 360).load();
        assert!(doc.allow_all_ip);
        assert_eq!(doc.sections, vec!["1", "2"]);
        // untouched keys come from the defaults
        assert_eq!(doc.course_codes, vec!["MAT120 LAB"]);
        assert!(doc.accepting_responses);
    }

    #[test]
    fn malformed_document_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let doc = PolicyStore::new(&path, 360).load();
        assert_eq!(doc.domain_allowlist, vec!["bracu.ac.bd", "g.bracu.ac.bd"]);
    }

    #[test]
    fn invalid_email_mode_is_coerced_to_domains() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"email_mode": "everything"}"#).unwrap();
        assert_eq!(PolicyStore::new(&path, 360).load().email_mode, EmailMode::Domains);

        std::fs::write(&path, r#"{"email_mode": "all_gmail"}"#).unwrap();
        assert_eq!(PolicyStore::new(&path, 360).load().email_mode, EmailMode::AllGmail);
    }

    #[test]
    fn normalize_list_trims_dedupes_and_is_idempotent() {
        let input = vec![
            "  AS151981 ".to_string(),
            "".to_string(),
            "AS151981".to_string(),
            "AS2".to_string(),
            "   ".to_string(),
        ];
        let once = normalize_list(&input);
        assert_eq!(once, vec!["AS151981", "AS2"]);
        assert_eq!(normalize_list(&once), once);
    }

    #[test]
    fn save_stamps_updated_at_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        let mut doc = st.defaults();
        doc.updated_at = String::new();
        doc.ip_whitelist = vec!["10.0.0.1".into()];

        st.save(&mut doc).unwrap();
        assert!(!doc.updated_at.is_empty());

        let reloaded = st.load();
        assert_eq!(reloaded.ip_whitelist, vec!["10.0.0.1"]);
        assert_eq!(reloaded.updated_at, doc.updated_at);
    }

    #[tokio::test]
    async fn update_persists_mutation() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);

        let saved = st
            .update(|doc| doc.admin_password_sha1 = sha1_hex("hunter22"))
            .await
            .unwrap();
        assert_eq!(saved.admin_password_sha1, sha1_hex("hunter22"));
        assert_eq!(st.load().admin_password_sha1, sha1_hex("hunter22"));
    }

    #[test]
    fn sha1_hex_matches_known_vector() {
        // sha1("abc")
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
