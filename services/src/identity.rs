//! Identity-broker token verification.
//!
//! The client presents an opaque ID token; we forward it to the broker's
//! token-info endpoint and require the audience to match our configured
//! client id before trusting the email/name it carries.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

pub const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// A verified user identity as attested by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityBroker: Send + Sync {
    async fn verify(&self, id_token: &str, expected_aud: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    aud: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

/// Google token-info verification over HTTPS.
pub struct GoogleTokenInfo {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTokenInfo {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, TOKENINFO_URL)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IdentityBroker for GoogleTokenInfo {
    async fn verify(&self, id_token: &str, expected_aud: &str) -> Result<Identity, IdentityError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| IdentityError::Invalid)?;

        if !resp.status().is_success() {
            return Err(IdentityError::Invalid);
        }
        let info: TokenInfo = resp.json().await.map_err(|_| IdentityError::Invalid)?;

        if info.aud != expected_aud {
            return Err(IdentityError::AudienceMismatch);
        }

        let email = info.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(IdentityError::MissingEmail);
        }

        Ok(Identity {
            email,
            name: info.name.trim().to_string(),
        })
    }
}
