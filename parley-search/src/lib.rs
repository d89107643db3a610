//! # parley-search
//!
//! Web search collaborator for Parley's prompt assembly.
//!
//! The crate queries a DuckDuckGo-style instant-answer endpoint and reduces
//! the answer to one line of text. It never raises across its public
//! [`WebSearch`] boundary: failures come back as sentinel strings that the
//! prompt compositor recognises with [`is_sentinel`] and drops.
//!
//! ## Design
//!
//! - One GET per call, no retries
//! - Bounded connect and read deadlines (5 s each by default)
//! - Optional in-memory TTL cache of successful answers
//!
//! ## Security
//!
//! - No API keys or secrets
//! - Search queries are logged only at trace level

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod types;

pub use client::InstantAnswerClient;
pub use config::SearchConfig;
pub use engine::WebSearch;
pub use error::{Result, SearchError};
pub use types::{
    is_sentinel, InstantAnswer, RelatedTopic, NO_RESULTS, RESULT_PREFIX, SEARCH_ERROR_PREFIX,
    SEARCH_FAILED_PREFIX,
};

/// Search with the default configuration and return prompt-ready text.
///
/// Convenience wrapper that builds an [`InstantAnswerClient`] for a single
/// call. Long-lived callers should build the client once and reuse it.
///
/// # Examples
///
/// ```no_run
/// # async fn example() {
/// let text = parley_search::search_default("rust programming language").await;
/// if !parley_search::is_sentinel(&text) {
///     println!("{text}");
/// }
/// # }
/// ```
pub async fn search_default(query: &str) -> String {
    match InstantAnswerClient::new(SearchConfig::default()) {
        Ok(client) => client.search_text(query).await,
        Err(e) => format!("{SEARCH_ERROR_PREFIX} {e}"),
    }
}
