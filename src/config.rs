//! Configuration types for the chat core.

use crate::app_dirs;
use crate::error::{ChatError, Result};
use crate::settings::ModelParameters;
use parley_search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Smallest context window the local engine is allowed to run with.
pub const MIN_CONTEXT_SIZE_TOKENS: usize = 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// On-device inference engine settings.
    pub engine: EngineConfig,
    /// Sampling parameters used when nothing has been persisted yet.
    pub defaults: ModelParameters,
    /// Web search collaborator settings.
    pub search: SearchSection,
    /// Prompt context settings.
    pub conversation: ConversationConfig,
    /// Persisted state location.
    pub storage: StorageConfig,
}

/// Local inference engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the GGUF model file.
    ///
    /// A missing file surfaces as an initialization failure, not a config error.
    pub model_path: PathBuf,
    /// HuggingFace repo ID for the tokenizer.
    /// Leave empty to use the tokenizer embedded in the GGUF file.
    pub tokenizer_id: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: usize,
    /// Context window for local GGUF inference (tokens).
    ///
    /// Controls KV cache sizing. Values below [`MIN_CONTEXT_SIZE_TOKENS`] are
    /// raised to it.
    pub context_size_tokens: usize,
    /// Seconds to wait for the first streamed token before giving up.
    pub first_token_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: app_dirs::default_model_path(),
            tokenizer_id: String::new(),
            max_tokens: 512,
            context_size_tokens: 4096,
            first_token_timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    /// Context size with the lower bound applied.
    pub fn effective_context_size_tokens(&self) -> usize {
        self.context_size_tokens.max(MIN_CONTEXT_SIZE_TOKENS)
    }
}

/// Web search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Instant-answer API endpoint.
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Seconds to cache successful results (0 = no cache).
    pub cache_ttl_seconds: u64,
    /// User-Agent header (None = crate default).
    pub user_agent: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: parley_search::config::DEFAULT_BASE_URL.to_owned(),
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
            cache_ttl_seconds: 0,
            user_agent: None,
        }
    }
}

impl SearchSection {
    /// Convert into the search crate's own config type.
    pub fn to_search_config(&self) -> SearchConfig {
        SearchConfig {
            base_url: self.base_url.clone(),
            connect_timeout_seconds: self.connect_timeout_secs,
            read_timeout_seconds: self.read_timeout_secs,
            cache_ttl_seconds: self.cache_ttl_seconds,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Prompt context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of recent turns included in each prompt.
    pub context_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { context_turns: 3 }
    }
}

/// Persisted state configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding settings, personalities, and history.
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: app_dirs::state_file(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Load configuration, falling back to defaults if the file is absent or
    /// invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring config at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        app_dirs::config_file()
    }
}
