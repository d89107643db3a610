//! Parley: on-device LLM chat core.
//!
//! This crate holds everything behind a mobile chat screen except the UI:
//! UI event → session controller → optional web search → prompt compositor →
//! local engine → history.
//!
//! # Architecture
//!
//! - **Settings & personalities**: sampling bounds, persona presets, and the
//!   active selection, persisted through a [`store::KeyValueStore`]
//! - **History**: append-only turn log with a rolling context view
//! - **Web search**: [`parley_search`] collaborator that never fails, only
//!   returns sentinel text
//! - **Prompt compositor**: pure assembly of persona, context, search result,
//!   and user turn
//! - **Session controller**: engine lifecycle state machine serializing
//!   (re)initialization and generation

// Fail early with a clear message when the metal feature is enabled but the
// Metal Toolchain is not installed.
#[cfg(missing_metal_toolchain)]
compile_error!(
    "The `metal` feature requires Apple's Metal Toolchain. Install it with:\n\n    \
     xcodebuild -downloadComponent MetalToolchain\n\n\
     This is a one-time ~700 MB download."
);

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod logging;
pub mod personality;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use config::AppConfig;
pub use error::{ChatError, Result};
pub use history::{ConversationHistory, ConversationTurn};
pub use llm::{EngineFactory, EngineHandle};
pub use personality::Personality;
pub use session::{SessionController, SessionEvent, SessionState};
pub use settings::{ModelParameters, Settings};
