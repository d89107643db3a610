//! Trait definition for the search collaborator seen by prompt assembly.
//!
//! Implementations must never fail at this boundary: transport errors,
//! error statuses, and empty answers all come back as sentinel text (see
//! [`crate::types::is_sentinel`]). This keeps failure handling in one place
//! and lets the prompt compositor filter by prefix.

use async_trait::async_trait;

/// A web search backend that returns prompt-ready text.
///
/// All implementations must be `Send + Sync` so a single instance can be
/// shared by the session controller and its generation tasks.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search for `query` and return either `"Web search result: ..."` or one
    /// of the sentinel strings.
    ///
    /// Exactly one request attempt is made per call.
    async fn search_text(&self, query: &str) -> String;
}
