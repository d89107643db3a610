//! Shared HTTP client construction for instant-answer requests.

use crate::config::SearchConfig;
use crate::error::SearchError;
use std::time::Duration;

/// User-Agent sent when the config does not override it.
const DEFAULT_USER_AGENT: &str = concat!("parley-search/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] configured for the search API.
///
/// The client has:
/// - Connect and per-read timeouts from config
/// - Total request timeout of connect + read, so a body trickling in under
///   the read timeout is still bounded
/// - Gzip decompression
///
/// # Errors
///
/// Returns [`SearchError::Config`] if the configuration is invalid, or
/// [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    config.validate()?;

    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .read_timeout(Duration::from_secs(config.read_timeout_seconds))
        .timeout(config.request_deadline())
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}
