use std::fmt;
use thiserror::Error;

/// Result type for pipeline setup and strategy operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while configuring or starting a pipeline, or by a strategy
#[derive(Error, Debug)]
pub enum PipelineError {
    /// `start()` was called before any strategy was assigned
    #[error("No strategy assigned; call set_strategy() before start()")]
    NoStrategy,

    /// The input queue has been shut down by a previous `stop()`
    #[error("Pipeline has been shut down and cannot be restarted")]
    ShutDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A strategy kind that the registry does not know about
    #[error("Unknown strategy kind: {0}")]
    UnknownStrategy(String),

    /// A strategy parameter that cannot be used
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Strategy execution error
    #[error("Strategy failed: {0}")]
    Strategy(String),

    /// Worker thread error
    #[error("Thread error: {0}")]
    Thread(String),
}

/// Why an item was not accepted by a queue or pipeline.
///
/// The rejected item is handed back so the caller can retry.
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum PushError<T> {
    /// No room became available before the timeout elapsed
    Timeout(T),
    /// The queue was shut down
    ShutDown(T),
    /// The pipeline is not running
    NotRunning(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            PushError::Timeout(item) | PushError::ShutDown(item) | PushError::NotRunning(item) => {
                item
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PushError::Timeout(_))
    }

    pub fn is_shut_down(&self) -> bool {
        matches!(self, PushError::ShutDown(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Timeout(_) => f.write_str("Timeout(..)"),
            PushError::ShutDown(_) => f.write_str("ShutDown(..)"),
            PushError::NotRunning(_) => f.write_str("NotRunning(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Timeout(_) => f.write_str("timed out waiting for queue capacity"),
            PushError::ShutDown(_) => f.write_str("queue has been shut down"),
            PushError::NotRunning(_) => f.write_str("pipeline is not running"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}
