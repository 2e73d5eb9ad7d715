//! Error types for the chat orchestrator.

/// Top-level error type for the chat system.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Host capability probe failure (machine cannot run the model).
    #[error("capability error: {0}")]
    Capability(String),

    /// Model download or construction error.
    #[error("model error: {0}")]
    Model(String),

    /// Text generation error.
    #[error("generation error: {0}")]
    Generation(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
