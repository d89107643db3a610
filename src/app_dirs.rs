//! Centralized application directory paths for Parley.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution,
//! which maps to the app-private container on sandboxed platforms.
//!
//! # Directory Layout
//!
//! | Purpose | macOS / iOS (sandbox) | Linux / Android |
//! |---------|----------------------|-----------------|
//! | App data | `~/Library/Application Support/parley/` | `~/.local/share/parley/` |
//! | Config | `~/Library/Application Support/parley/` | `~/.config/parley/` |
//!
//! # Environment Overrides
//!
//! - `PARLEY_DATA_DIR` overrides [`data_dir`]
//! - `PARLEY_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// File name of the bundled on-device model inside [`models_dir`].
pub const DEFAULT_MODEL_FILE: &str = "model.gguf";

/// Application data root directory.
///
/// Holds the model file, persisted state, and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PARLEY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("parley"))
        .unwrap_or_else(|| PathBuf::from("/tmp/parley-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PARLEY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("parley"))
        .unwrap_or_else(|| PathBuf::from("/tmp/parley-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Model directory (`data_dir()/models/`).
#[must_use]
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// The documented on-device model path (`models_dir()/model.gguf`).
#[must_use]
pub fn default_model_path() -> PathBuf {
    models_dir().join(DEFAULT_MODEL_FILE)
}

/// Config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted key-value state (`data_dir()/state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        assert!(!data_dir().as_os_str().is_empty());
    }

    #[test]
    fn config_file_ends_with_config_toml() {
        assert!(config_file().to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn state_file_ends_with_state_json() {
        assert!(state_file().to_string_lossy().ends_with("state.json"));
    }

    #[test]
    fn logs_dir_is_subpath_of_data_dir() {
        assert!(logs_dir().starts_with(data_dir()));
    }

    #[test]
    fn model_path_lives_in_models_dir() {
        let path = default_model_path();
        assert!(path.starts_with(models_dir()));
        assert!(path.to_string_lossy().ends_with(DEFAULT_MODEL_FILE));
    }
}
