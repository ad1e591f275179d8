#![forbid(unsafe_code)]

//! Credential providers injected into the YouTube client.
//!
//! [`ApiKey`] sends a static key as a query parameter. [`OAuthRefresh`]
//! trades a long-lived refresh token for short-lived bearer tokens and keeps
//! the current one in memory only.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::RemoteError;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

// Refresh a little early so a token never expires mid-request.
const EXPIRY_SKEW_SECS: i64 = 60;
// Google hands out one-hour tokens; assume that when `expires_in` is missing.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// How a single outbound request is authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl Credential {
    pub(crate) fn apply(&self, request: ureq::Request) -> ureq::Request {
        match self {
            Self::ApiKey(key) => request.query("key", key),
            Self::Bearer(token) => request.set("Authorization", &format!("Bearer {token}")),
        }
    }

    pub(crate) fn secret(&self) -> &str {
        match self {
            Self::ApiKey(value) | Self::Bearer(value) => value,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

/// Source of credentials for outbound calls. May block (token refresh), so
/// callers run it off the async runtime.
pub trait CredentialProvider: Send + Sync + 'static {
    fn credential(&self) -> Result<Credential, RemoteError>;

    /// Short name for logs.
    fn label(&self) -> &'static str;
}

pub struct ApiKey {
    key: String,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CredentialProvider for ApiKey {
    fn credential(&self) -> Result<Credential, RemoteError> {
        if self.key.trim().is_empty() {
            return Err(RemoteError::Credentials("API key is empty".into()));
        }
        Ok(Credential::ApiKey(self.key.clone()))
    }

    fn label(&self) -> &'static str {
        "api_key"
    }
}

/// OAuth client settings needed for the refresh-token grant.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct OAuthRefresh {
    agent: ureq::Agent,
    settings: OAuthSettings,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthRefresh {
    pub fn new(settings: OAuthSettings, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            settings,
            cached: Mutex::new(None),
        }
    }

    fn request_token(&self) -> Result<CachedToken, RemoteError> {
        let settings = &self.settings;
        let secrets = [settings.client_secret.as_str(), settings.refresh_token.as_str()];
        let response = self
            .agent
            .post(&settings.token_url)
            .send_form(&[
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("refresh_token", settings.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .map_err(|err| match RemoteError::from_ureq(err, &secrets) {
                RemoteError::Status { status, message } => {
                    RemoteError::Credentials(format!("token refresh rejected ({status}): {message}"))
                }
                other => other,
            })?;
        let token: TokenResponse = response
            .into_json()
            .map_err(|err| RemoteError::Decode(format!("token response: {err}")))?;
        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS).max(0);
        tracing::debug!(lifetime, "refreshed OAuth access token");
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + TimeDelta::seconds(lifetime),
        })
    }
}

impl CredentialProvider for OAuthRefresh {
    fn credential(&self) -> Result<Credential, RemoteError> {
        // Holding the lock across the refresh keeps concurrent requests from
        // each trading the refresh token at once.
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref()
            && token.expires_at - TimeDelta::seconds(EXPIRY_SKEW_SECS) > Utc::now()
        {
            return Ok(Credential::Bearer(token.access_token.clone()));
        }
        let token = self.request_token()?;
        let credential = Credential::Bearer(token.access_token.clone());
        *cached = Some(token);
        Ok(credential)
    }

    fn label(&self) -> &'static str {
        "oauth"
    }
}
