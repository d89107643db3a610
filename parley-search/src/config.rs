//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls the endpoint, deadlines, caching, and request
//! identity. The defaults target the public DuckDuckGo instant-answer API.

use crate::error::SearchError;
use std::time::Duration;

/// Default instant-answer endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com/";

/// Configuration for the instant-answer client.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Endpoint that accepts `q` and `format=json` query parameters.
    pub base_url: String,
    /// TCP/TLS connect deadline in seconds.
    pub connect_timeout_seconds: u64,
    /// Deadline in seconds for reading the response once connected.
    pub read_timeout_seconds: u64,
    /// How long to cache successful results in seconds. 0 disables caching.
    pub cache_ttl_seconds: u64,
    /// Custom User-Agent string. If `None`, the crate name and version are sent.
    pub user_agent: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            connect_timeout_seconds: 5,
            read_timeout_seconds: 5,
            cache_ttl_seconds: 0,
            user_agent: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `connect_timeout_seconds` must be greater than 0
    /// - `read_timeout_seconds` must be greater than 0
    /// - `base_url` must be an absolute http(s) URL
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.connect_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "connect_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.read_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "read_timeout_seconds must be greater than 0".into(),
            ));
        }
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| SearchError::Config(format!("invalid base_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SearchError::Config(format!(
                "base_url must be http or https, got {}",
                parsed.scheme()
            )));
        }
        Ok(())
    }

    /// Upper bound on a single request: connect plus read.
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_seconds
                .saturating_add(self.read_timeout_seconds),
        )
    }
}
