//! Client configuration.
//!
//! A [`ClientConfig`] is an immutable value. The client holds it behind an
//! `Arc` and replaces the whole value on update, so a request in flight keeps
//! the snapshot it started with.

use crate::{Error, Result, RetryPolicy};
use std::fmt;
use std::time::Duration;
use url::Url;

/// The production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.nfe.io/v1";

/// The default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_API_KEY: &str = "NFE_API_KEY";
const ENV_BASE_URL: &str = "NFE_BASE_URL";
const ENV_TIMEOUT_MS: &str = "NFE_TIMEOUT_MS";

/// Settings shared by every request a client makes.
#[derive(Clone)]
pub struct ClientConfig {
    /// Sent as the Basic auth user name with an empty password.
    pub api_key: String,
    /// Prefix for every request path.
    pub base_url: Url,
    /// Hard deadline for a single HTTP exchange.
    pub timeout: Duration,
    /// Retry behaviour for failed requests.
    pub retry: RetryPolicy,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration with default settings for the given API key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = Self {
            api_key: api_key.into(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: default_user_agent(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from the environment.
    ///
    /// Reads:
    /// - `NFE_API_KEY` (required)
    /// - `NFE_BASE_URL` (optional, defaults to the production API)
    /// - `NFE_TIMEOUT_MS` (optional)
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is missing or a value is
    /// malformed.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY).map_err(|_| {
            Error::configuration(format!("missing {ENV_API_KEY} environment variable"))
        })?;
        let mut config = Self::new(api_key)?;

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            if !base_url.trim().is_empty() {
                config.base_url = Url::parse(base_url.trim())?;
            }
        }
        if let Ok(timeout) = std::env::var(ENV_TIMEOUT_MS) {
            let ms = timeout.trim().parse::<u64>().map_err(|e| {
                Error::configuration(format!(
                    "{ENV_TIMEOUT_MS} must be a number of milliseconds: {e}"
                ))
            })?;
            config.timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every configuration must hold.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::configuration("API key is required"));
        }
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "Base URL must use http or https, got {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::configuration("Timeout must be greater than zero"));
        }
        self.retry.validate()
    }
}

/// `nfeio-rust/{version} ({os}; {arch})`
pub fn default_user_agent() -> String {
    format!(
        "nfeio-rust/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
