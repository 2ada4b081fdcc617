use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Environment variable holding the Qualifire API key.
pub const API_KEY_ENV_VAR: &str = "QUALIFIRE_API_KEY";
/// Environment variable overriding the gateway base URL.
pub const BASE_URL_ENV_VAR: &str = "QUALIFIRE_BASE_URL";
/// Gateway used when no explicit base URL or environment override is set.
pub const DEFAULT_BASE_URL: &str = "https://gateway.qualifire.ai/";
/// Default network timeout applied to HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Minimal data required to build a [`crate::Client`] or
/// [`crate::interceptor::Interceptor`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit API key; falls back to `QUALIFIRE_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Explicit base URL; falls back to `QUALIFIRE_BASE_URL`, then the
    /// default gateway.
    pub base_url: Option<String>,
    /// Timeout applied to every HTTP request. The only cancellation tool
    /// available; requests cannot be aborted once sent.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url,
            ..Self::default()
        }
    }
}

/// Resolve the API key from an explicit argument or the environment.
///
/// A missing key is a fatal configuration error at the point of first use.
pub fn resolve_api_key(explicit: Option<&str>) -> Result<String> {
    if let Some(key) = explicit {
        if !key.is_empty() {
            return Ok(key.to_owned());
        }
    }
    match env::var(API_KEY_ENV_VAR) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(Error::Configuration(format!(
            "Qualifire API key not found; pass it explicitly or set {API_KEY_ENV_VAR}"
        ))),
    }
}

/// Resolve the gateway base URL from an explicit argument, the environment,
/// or the hard-coded default.
pub fn resolve_base_url(explicit: Option<&str>) -> Result<Url> {
    let raw = match explicit {
        Some(url) if !url.is_empty() => url.to_owned(),
        _ => match env::var(BASE_URL_ENV_VAR) {
            Ok(url) if !url.is_empty() => url,
            _ => DEFAULT_BASE_URL.to_owned(),
        },
    };
    Ok(Url::parse(&raw)?)
}
