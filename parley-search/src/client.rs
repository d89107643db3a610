//! DuckDuckGo instant-answer client.
//!
//! Sends `GET {base_url}?q=...&format=json&no_html=1&skip_disambig=1` and
//! reduces the JSON answer to a single line of prompt text.

use async_trait::async_trait;

use crate::cache::{CacheKey, SearchCache};
use crate::config::SearchConfig;
use crate::engine::WebSearch;
use crate::error::{Result, SearchError};
use crate::http;
use crate::types::{InstantAnswer, NO_RESULTS, SEARCH_ERROR_PREFIX, SEARCH_FAILED_PREFIX};

/// Instant-answer search client.
///
/// Cheap to clone; the underlying connection pool and cache are shared.
#[derive(Debug, Clone)]
pub struct InstantAnswerClient {
    client: reqwest::Client,
    config: SearchConfig,
    cache: Option<SearchCache>,
}

impl InstantAnswerClient {
    /// Create a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an invalid configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = http::build_client(&config)?;
        let cache = SearchCache::with_ttl(config.cache_ttl_seconds);
        Ok(Self {
            client,
            config,
            cache,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Perform one instant-answer request and parse the document.
    ///
    /// # Errors
    ///
    /// - [`SearchError::Http`] / [`SearchError::Timeout`] when the request
    ///   cannot complete
    /// - [`SearchError::Status`] for a non-success status
    /// - [`SearchError::Parse`] when the body is not an instant-answer document
    pub async fn fetch(&self, query: &str) -> Result<InstantAnswer> {
        tracing::trace!(query, "instant answer search");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(SearchError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        // The API labels JSON as `application/x-javascript`, so read text and
        // parse rather than relying on the content type.
        let body = response.text().await.map_err(SearchError::from)?;
        tracing::trace!(bytes = body.len(), "instant answer response received");

        if body.trim().is_empty() {
            return Err(SearchError::Parse("empty response body".into()));
        }
        serde_json::from_str(&body).map_err(|e| SearchError::Parse(e.to_string()))
    }
}

/// Fold a fetch outcome into prompt text.
pub(crate) fn outcome_to_text(outcome: Result<InstantAnswer>) -> String {
    match outcome {
        Ok(answer) => answer.to_prompt_text(),
        Err(SearchError::Status(code)) => format!("{SEARCH_FAILED_PREFIX} {code}"),
        Err(SearchError::Parse(e)) => {
            tracing::debug!("instant answer not parseable: {e}");
            NO_RESULTS.to_owned()
        }
        Err(e @ (SearchError::Http(_) | SearchError::Timeout(_) | SearchError::Config(_))) => {
            format!("{SEARCH_ERROR_PREFIX} {e}")
        }
    }
}

#[async_trait]
impl WebSearch for InstantAnswerClient {
    async fn search_text(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return NO_RESULTS.to_owned();
        }

        let key = CacheKey::new(query);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!("instant answer cache hit");
                return hit;
            }
        }

        let outcome = self.fetch(query).await;
        if let Err(e) = &outcome {
            tracing::warn!("web search failed: {e}");
        }
        let text = outcome_to_text(outcome);

        if let Some(cache) = &self.cache {
            if !crate::types::is_sentinel(&text) {
                cache.insert(key, text.clone()).await;
            }
        }
        text
    }
}
