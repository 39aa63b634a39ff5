//! Client configuration for the hosted backend.
//!
//! # Invariants
//! - `api_url` is an absolute `http`/`https` URL without query or fragment.
//! - `anon_key` is non-empty and never printed by `Debug`.
//! - `request_timeout` is non-zero; it is the only timeout applied to
//!   remote calls.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
use url::Url;

/// Transport timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidUrl { value: String, reason: String },
    UnsupportedScheme(String),
    MissingAnonKey,
    ZeroTimeout,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl { value, reason } => write!(f, "invalid api url `{value}`: {reason}"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "api url scheme `{scheme}` is not http or https")
            }
            Self::MissingAnonKey => write!(f, "anon key cannot be empty"),
            Self::ZeroTimeout => write!(f, "request timeout must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

/// Connection settings for [`crate::HttpBackend`].
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    api_url: Url,
    anon_key: String,
    request_timeout: Duration,
}

impl ClientConfig {
    /// Validates and builds a config with the default timeout.
    pub fn new(api_url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        let trimmed = api_url.trim();
        let mut parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidUrl {
            value: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(ConfigError::InvalidUrl {
                value: trimmed.to_string(),
                reason: "query and fragment are not allowed".to_string(),
            });
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let anon_key = anon_key.trim();
        if anon_key.is_empty() {
            return Err(ConfigError::MissingAnonKey);
        }

        Ok(Self {
            api_url: parsed,
            anon_key: anon_key.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Replaces the transport timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    /// Base URL, always ending in `/`.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Resolves `path` (no leading slash) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.api_url
            .join(path)
            .map_err(|err| ConfigError::InvalidUrl {
                value: format!("{}{path}", self.api_url),
                reason: err.to_string(),
            })
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url.as_str())
            .field("anon_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
