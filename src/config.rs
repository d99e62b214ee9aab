//! Relay configuration
//!
//! Everything the binary needs, read from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `RELAY_BIND_ADDR` | `127.0.0.1:3000` |
//! | `RELAY_SESSION_TIMEOUT_SECS` | `300` (`0` disables the bound) |
//! | `RELAY_MASK_ERRORS` | `true` |
//! | `GEMINI_API_KEY` | unset |
//! | `GEMINI_MODEL` | `gemini-1.5-flash` |
//! | `GEMINI_BASE_URL` | `https://generativelanguage.googleapis.com/v1beta` |
//! | `GEMINI_TIMEOUT_SECS` | `30` |
//!
//! A missing API key is not an error here; the Gemini source reports it when a
//! session starts.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::RelayError;
use crate::provider::GeminiConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Default upper bound on one session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub session_timeout: Option<Duration>,
    pub mask_errors: bool,
    pub provider: GeminiConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            session_timeout: Some(DEFAULT_SESSION_TIMEOUT),
            mask_errors: true,
            provider: GeminiConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`; unset and empty variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("RELAY_BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|e| {
                RelayError::configuration(format!("RELAY_BIND_ADDR `{addr}` is not a socket address: {e}"))
            })?;
        }
        if let Some(secs) = get("RELAY_SESSION_TIMEOUT_SECS") {
            config.session_timeout = match parse_u64("RELAY_SESSION_TIMEOUT_SECS", &secs)? {
                0 => None,
                n => Some(Duration::from_secs(n)),
            };
        }
        if let Some(flag) = get("RELAY_MASK_ERRORS") {
            config.mask_errors = parse_bool("RELAY_MASK_ERRORS", &flag)?;
        }

        if let Some(key) = get("GEMINI_API_KEY") {
            config.provider.api_key = Some(SecretString::from(key));
        }
        if let Some(model) = get("GEMINI_MODEL") {
            config.provider.model = model;
        }
        if let Some(base_url) = get("GEMINI_BASE_URL") {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(RelayError::configuration(format!(
                    "GEMINI_BASE_URL `{base_url}` must start with http:// or https://"
                )));
            }
            config.provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = get("GEMINI_TIMEOUT_SECS") {
            config.provider.timeout = Some(parse_u64("GEMINI_TIMEOUT_SECS", &secs)?);
        }

        Ok(config)
    }

    /// Server options derived from this configuration.
    #[cfg(feature = "server")]
    pub fn relay_options(&self) -> crate::server::RelayOptions {
        crate::server::RelayOptions {
            session_timeout: self.session_timeout,
            mask_errors: self.mask_errors,
            masked_error_message: None,
        }
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, RelayError> {
    value.parse().map_err(|_| {
        RelayError::configuration(format!("{key} must be a non-negative integer, got `{value}`"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, RelayError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RelayError::configuration(format!(
            "{key} must be a boolean, got `{value}`"
        ))),
    }
}
