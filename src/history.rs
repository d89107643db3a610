//! Conversation log and the rolling context view fed into prompts.

use crate::error::{ChatError, Result};
use crate::store::{self, KeyValueStore, keys};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One completed exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub user_message: String,
    pub ai_response: String,
    pub personality_name: String,
}

impl ConversationTurn {
    /// Stamp a new turn with the current time.
    pub fn new(
        user_message: impl Into<String>,
        ai_response: impl Into<String>,
        personality_name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            user_message: user_message.into(),
            ai_response: ai_response.into(),
            personality_name: personality_name.into(),
        }
    }
}

/// Ordered turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the last `max_turns` turns as `Human:`/`AI:` lines, oldest first.
    ///
    /// Returns an empty string when `max_turns` is zero or there is no history.
    pub fn recent_context(&self, max_turns: usize) -> String {
        let start = self.turns.len().saturating_sub(max_turns);
        self.turns[start..]
            .iter()
            .map(|t| format!("Human: {}\nAI: {}", t.user_message, t.ai_response))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChatError::Storage(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if `json` is not a list of turns.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChatError::Storage(e.to_string()))
    }
}

impl From<Vec<ConversationTurn>> for ConversationHistory {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}

/// History with write-through persistence.
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    history: ConversationHistory,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("turns", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Restore the persisted history. A corrupt entry starts empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let history =
            store::load_json::<ConversationHistory>(store.as_ref(), keys::CONVERSATION_HISTORY)
                .unwrap_or_default();
        debug!("loaded {} conversation turns", history.len());
        Self { store, history }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
        self.persist();
    }

    /// Add `turn` in memory only. Write it out with [`Self::pending_write`].
    pub fn push(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    /// Copy of the current history bound to the backing store, so the write
    /// can happen after the caller drops its lock.
    pub fn pending_write(&self) -> HistoryWrite {
        HistoryWrite {
            store: Arc::clone(&self.store),
            history: self.history.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.persist();
    }

    /// Copy of the current history.
    pub fn snapshot(&self) -> ConversationHistory {
        self.history.clone()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn recent_context(&self, max_turns: usize) -> String {
        self.history.recent_context(max_turns)
    }

    fn persist(&self) {
        save_history(self.store.as_ref(), &self.history);
    }
}

/// History snapshot waiting to be written. See [`HistoryStore::pending_write`].
#[must_use = "the snapshot is only written by `save`"]
pub struct HistoryWrite {
    store: Arc<dyn KeyValueStore>,
    history: ConversationHistory,
}

impl HistoryWrite {
    pub fn save(self) {
        save_history(self.store.as_ref(), &self.history);
    }
}

fn save_history(store: &dyn KeyValueStore, history: &ConversationHistory) {
    if let Err(e) = store::save_json(store, keys::CONVERSATION_HISTORY, history) {
        warn!("failed to persist conversation history: {e}");
    }
}
