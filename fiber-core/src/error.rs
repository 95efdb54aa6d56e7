//! Error types for fiber operations.

use thiserror::Error;

/// Result type for fiber operations.
pub type FiberResult<T> = Result<T, FiberError>;

/// Errors that can occur while queueing, creating or reconciling objects.
#[derive(Debug, Error)]
pub enum FiberError {
    /// Invalid operation for the object kind or context state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Model or document serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was superseded or aborted through a cancel token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Resource loading or decoding failed.
    #[error("Failed to load resource: {0}")]
    ResourceLoad(String),

    /// SVG path data could not be parsed.
    #[error("Invalid path data: {0}")]
    InvalidPath(String),

    /// A queued task panicked while running.
    #[error("Task panicked")]
    TaskPanicked,

    /// The task was dropped before it ran (queue closed or context torn down).
    #[error("Task discarded before it ran")]
    Discarded,

    /// No tokio runtime was available to run the task.
    #[error("No async runtime available")]
    NoRuntime,

    /// Filesystem error while reading a resource.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FiberError {
    /// Whether this error is a deliberate cancellation, which is never surfaced.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
