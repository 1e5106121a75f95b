//! Error types for the reminder engine.

/// Top-level error type for the reminder engine.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Task / notification / group storage error.
    #[error("store error: {0}")]
    Store(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Scheduler lifecycle error (start while running, stop while stopped).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Reminder delivery error.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NudgeError>;
