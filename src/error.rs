//! Error types for the Phalanx library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`PhalanxError`] enum. Errors raised by the index store are classified so
//! the engine can tell a retryable failure from one that requires fresh
//! writer or reader resources.
//!
//! # Examples
//!
//! ```
//! use phalanx::error::{PhalanxError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PhalanxError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// The main error type for Phalanx operations.
#[derive(Error, Debug)]
pub enum PhalanxError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors reported by the index store
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store reached an inconsistent state, typically after an
    /// out-of-memory failure in another operation.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A reader, writer or index was used after it was closed.
    #[error("Already closed: {0}")]
    AlreadyClosed(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A drained batch of queued operations failed as a whole.
    #[error("{count} index operation(s) failed: {source}")]
    BatchFailed {
        count: usize,
        source: Arc<PhalanxError>,
    },

    /// One failure reported to several waiters.
    #[error("{0}")]
    Shared(Arc<PhalanxError>),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Error raised by a custom index store implementation
    #[error("Store backend error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PhalanxError.
pub type Result<T> = std::result::Result<T, PhalanxError>;

impl PhalanxError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Storage(msg.into())
    }

    /// Create a new illegal state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        PhalanxError::IllegalState(msg.into())
    }

    /// Create a new resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        PhalanxError::ResourceExhausted(msg.into())
    }

    /// Create a new already closed error.
    pub fn already_closed<S: Into<String>>(msg: S) -> Self {
        PhalanxError::AlreadyClosed(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        PhalanxError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Wrap a failure that is reported to every operation of a batch.
    pub fn batch_failed(count: usize, source: Arc<PhalanxError>) -> Self {
        PhalanxError::BatchFailed { count, source }
    }

    /// The innermost error, looking through shared and batch wrappers.
    pub fn root_cause(&self) -> &PhalanxError {
        match self {
            PhalanxError::Shared(inner) => inner.root_cause(),
            PhalanxError::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the failure is a plain store or I/O error that the caller may
    /// retry against the same writer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root_cause(),
            PhalanxError::Io(_) | PhalanxError::Storage(_)
        )
    }

    /// Whether the failure left the writer or reader unusable. Such failures
    /// are not permanent: the next operation gets freshly built resources.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self.root_cause(),
            PhalanxError::IllegalState(_) | PhalanxError::ResourceExhausted(_)
        )
    }

    /// Whether the failure reports use of a closed resource.
    pub fn is_already_closed(&self) -> bool {
        matches!(self.root_cause(), PhalanxError::AlreadyClosed(_))
    }
}
