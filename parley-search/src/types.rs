//! Instant-answer response document and its reduction to prompt text.

use serde::{Deserialize, Serialize};

/// Prefix for a search that reached the API but got a non-success status.
pub const SEARCH_FAILED_PREFIX: &str = "Web search failed with code:";
/// Prefix for a search that could not complete (transport error or timeout).
pub const SEARCH_ERROR_PREFIX: &str = "Error during web search:";
/// Text returned when the API answered but had nothing usable.
pub const NO_RESULTS: &str = "No web results found.";
/// Prefix for a usable result.
pub const RESULT_PREFIX: &str = "Web search result:";

/// Subset of the DuckDuckGo instant-answer JSON document that Parley uses.
///
/// Every field is optional on the wire; missing fields deserialize to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstantAnswer {
    /// Summary paragraph for the query topic, often empty.
    #[serde(rename = "AbstractText", default)]
    pub abstract_text: String,
    /// Topic heading, informational only.
    #[serde(rename = "Heading", default)]
    pub heading: String,
    /// Related topics. Entries may be grouped under a named category.
    #[serde(rename = "RelatedTopics", default)]
    pub related_topics: Vec<RelatedTopic>,
}

/// One related topic, or a named group of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedTopic {
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
    #[serde(rename = "FirstURL", default)]
    pub first_url: Option<String>,
    /// Category name when this entry is a group.
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Topics", default)]
    pub topics: Vec<RelatedTopic>,
}

impl InstantAnswer {
    /// First non-empty related-topic text, walking groups depth-first.
    pub fn first_related_text(&self) -> Option<&str> {
        fn walk(topics: &[RelatedTopic]) -> Option<&str> {
            for topic in topics {
                match topic.text.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => return Some(text),
                    _ => {}
                }
                if let Some(text) = walk(&topic.topics) {
                    return Some(text);
                }
            }
            None
        }
        walk(&self.related_topics)
    }

    /// Reduce the document to the text handed to the prompt compositor.
    ///
    /// A non-empty abstract wins; otherwise the first related topic; otherwise
    /// [`NO_RESULTS`].
    pub fn to_prompt_text(&self) -> String {
        let abstract_text = self.abstract_text.trim();
        if !abstract_text.is_empty() {
            return format!("{RESULT_PREFIX} {abstract_text}");
        }
        match self.first_related_text() {
            Some(text) => format!("{RESULT_PREFIX} {text}"),
            None => NO_RESULTS.to_owned(),
        }
    }
}

/// Returns `true` when `text` is one of the failure or empty sentinels.
///
/// Leading whitespace is ignored so a padded sentinel is still recognised.
pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with(SEARCH_FAILED_PREFIX)
        || text.starts_with(SEARCH_ERROR_PREFIX)
        || text.starts_with(NO_RESULTS)
}
