//! Network and email admission rules.
//!
//! All decisions are pure over a policy snapshot except the ASN lookup,
//! which is the one call with external latency and failure risk. Evaluation
//! order is fixed (whitelist, allow-all, ASN) so the lookup is skipped
//! whenever an earlier stage already decides.

use std::time::Duration;

use async_trait::async_trait;

use crate::policy::{EmailMode, PolicyDocument};

/// Timing-safe string equality (whitelist entries, CSRF tokens, password
/// digests). Length is not secret here.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Exact-match IP whitelist; no CIDR parsing.
pub fn ip_is_whitelisted(ip: &str, whitelist: &[String]) -> bool {
    if ip.is_empty() {
        return false;
    }
    whitelist
        .iter()
        .any(|entry| !entry.is_empty() && constant_time_eq(entry, ip))
}

/// Source of the "org" string for an address, e.g. `"AS151981 BRAC University"`.
/// `None` means no usable answer; callers treat that as no match.
#[async_trait]
pub trait AsnLookup: Send + Sync {
    async fn org(&self, ip: &str) -> Option<String>;
}

/// Production lookup against ipinfo.io. Any transport failure, non-2xx
/// status, unparsable body or empty org field yields `None`.
pub struct IpinfoLookup {
    client: reqwest::Client,
}

impl IpinfoLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AsnLookup for IpinfoLookup {
    async fn org(&self, ip: &str) -> Option<String> {
        let url = format!("https://ipinfo.io/{ip}/json");
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "attendance-portal/1.0")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: serde_json::Value = resp.json().await.ok()?;
        let org = body.get("org")?.as_str()?.trim().to_string();
        if org.is_empty() {
            None
        } else {
            Some(org)
        }
    }
}

async fn ip_is_from_allowed_asn(ip: &str, allowed: &[String], lookup: &dyn AsnLookup) -> bool {
    if ip.is_empty() || allowed.is_empty() {
        return false;
    }
    let Some(org) = lookup.org(ip).await else {
        return false;
    };
    let org = org.to_lowercase();
    allowed.iter().any(|asn| {
        let asn = asn.trim().to_lowercase();
        !asn.is_empty() && org.contains(&asn)
    })
}

/// Network admission: whitelist hit, then the allow-all toggle, then an ASN
/// match. Only the last step performs I/O.
pub async fn network_is_allowed(ip: &str, doc: &PolicyDocument, lookup: &dyn AsnLookup) -> bool {
    if ip_is_whitelisted(ip, &doc.ip_whitelist) {
        return true;
    }
    if doc.allow_all_ip {
        return true;
    }
    ip_is_from_allowed_asn(ip, &doc.asn_allowlist, lookup).await
}

/// Email admission. In `Domains` mode the domain after the last `@` must
/// match an allowlisted domain, case-insensitively. `AllGmail` accepts any
/// well-formed address (see the note on [`EmailMode`]).
pub fn email_is_allowed(email: &str, doc: &PolicyDocument) -> bool {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return false;
    }
    let Some(at) = email.rfind('@') else {
        return false;
    };
    let domain = &email[at + 1..];
    if domain.is_empty() {
        return false;
    }

    match doc.email_mode {
        EmailMode::AllGmail => true,
        EmailMode::Domains => doc
            .domain_allowlist
            .iter()
            .any(|allowed| !allowed.is_empty() && allowed.to_lowercase() == domain),
    }
}

/// Form allowlist check. An empty allowlist means the administrator opted
/// out of restricting that field; any non-empty value passes.
pub fn form_value_allowed(value: &str, allowlist: &[String]) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    if allowlist.is_empty() {
        return true;
    }
    allowlist.iter().any(|entry| entry.trim() == value)
}

/// Best-effort real client address: trusted edge-proxy header first, then
/// the first forwarded-for hop, then the transport peer.
pub fn real_client_ip(
    cf_connecting_ip: Option<&str>,
    forwarded_for: Option<&str>,
    peer: &str,
) -> String {
    if let Some(ip) = cf_connecting_ip {
        let ip = ip.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }
    if let Some(fwd) = forwarded_for {
        if let Some(first) = fwd.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.to_string()
}
