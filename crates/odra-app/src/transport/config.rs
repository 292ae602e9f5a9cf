use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Url;

use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_KEY: &str = "dev-key-change-in-production";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BASE_URL: &str = "ODRA_API_URL";
pub const ENV_API_KEY: &str = "ODRA_API_KEY";
pub const ENV_REQUEST_TIMEOUT: &str = "ODRA_REQUEST_TIMEOUT_SECS";

/// Where the audit backend lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        config.base_url = normalize_base_url(&config.base_url)?;

        if let Some(api_key) = lookup(ENV_API_KEY) {
            config.api_key = api_key;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT)? {
            if secs == 0 {
                return Err(AppError::InvalidConfig {
                    key: ENV_REQUEST_TIMEOUT,
                    reason: "must be positive".into(),
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

pub(crate) fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("Ignoring unreadable .env file: {}", err),
    }
}

pub(crate) fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|err: T::Err| AppError::InvalidConfig {
            key,
            reason: format!("{raw:?}: {err}"),
        }),
    }
}

fn normalize_base_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|err| AppError::InvalidConfig {
        key: ENV_BASE_URL,
        reason: format!("{raw:?}: {err}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::InvalidConfig {
            key: ENV_BASE_URL,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(trimmed.to_string())
}
