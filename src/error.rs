//! Error types for the parley core.

/// Top-level error type for the chat core.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Inference engine construction or generation failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persistence read/write error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A request rejected by the session state machine.
    #[error("session error: {0}")]
    Session(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
