#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::credentials::{DEFAULT_TOKEN_URL, OAuthSettings};
use crate::lookup::DEFAULT_PAGE_SIZE;
use crate::youtube::{DEFAULT_API_BASE, MAX_RESULTS_LIMIT};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_WWW_ROOT: &str = "frontend";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Credentials the backend was configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSettings {
    ApiKey(String),
    OAuth(OAuthConfig),
}

/// OAuth values as read from the environment; see
/// [`OAuthConfig::into_settings`].
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn into_settings(self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.client_id,
            client_secret: self.client_secret,
            refresh_token: self.refresh_token,
            token_url: self.token_url,
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub www_root: PathBuf,
    pub page_size: usize,
    pub request_timeout: Duration,
    pub api_base: String,
    pub auth: Option<AuthSettings>,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub www_root: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_runtime_config(&file_vars, env_var_string, overrides)
}

fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("TUBECHECK_HOST"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let www_root = overrides
        .www_root
        .or_else(|| lookup("WWW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT));
    let page_size = lookup("TUBECHECK_PAGE_SIZE")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_RESULTS_LIMIT);
    let timeout_secs = lookup("TUBECHECK_TIMEOUT_SECS")
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let api_base = lookup("YOUTUBE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let auth = resolve_auth(&lookup)?;

    Ok(RuntimeConfig {
        host,
        port,
        www_root,
        page_size,
        request_timeout: Duration::from_secs(timeout_secs),
        api_base,
        auth,
    })
}

/// Picks the credential flow. An explicit `YOUTUBE_AUTH_MODE` must be fully
/// configured; without one the API key wins, then a complete OAuth set.
fn resolve_auth(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<AuthSettings>> {
    let api_key = lookup("YOUTUBE_API_KEY").map(AuthSettings::ApiKey);
    let oauth = || -> Result<OAuthConfig> {
        let require = |key: &'static str| lookup(key).ok_or_else(|| anyhow!("{key} not set"));
        Ok(OAuthConfig {
            client_id: require("YOUTUBE_CLIENT_ID")?,
            client_secret: require("YOUTUBE_CLIENT_SECRET")?,
            refresh_token: require("YOUTUBE_REFRESH_TOKEN")?,
            token_url: lookup("YOUTUBE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        })
    };

    let mode = lookup("YOUTUBE_AUTH_MODE").map(|value| value.trim().to_ascii_lowercase());
    match mode.as_deref() {
        Some("api_key" | "apikey" | "key") => api_key
            .map(Some)
            .ok_or_else(|| anyhow!("YOUTUBE_AUTH_MODE=api_key requires YOUTUBE_API_KEY")),
        Some("oauth") => oauth()
            .map(|config| Some(AuthSettings::OAuth(config)))
            .context("YOUTUBE_AUTH_MODE=oauth"),
        Some(other) => bail!("unknown YOUTUBE_AUTH_MODE: {other}"),
        None => Ok(api_key.or_else(|| oauth().ok().map(AuthSettings::OAuth))),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
