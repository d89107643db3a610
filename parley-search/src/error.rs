//! Error types for the parley-search crate.
//!
//! These errors only exist below the [`crate::WebSearch`] boundary. Callers
//! that go through [`crate::WebSearch::search_text`] never see them; they are
//! folded into sentinel text first.

/// Errors that can occur during a web search request.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The connect or read deadline elapsed.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// The search API answered with a non-success status code.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// The response body was not a usable instant-answer document.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Convenience type alias for parley-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
