//! # Media Error Types
//!
//! One error enum for every public operation in the crate. Errors are `Clone`
//! because the outcome of a shared in-flight cache or extraction operation is
//! handed to every caller waiting on it.

use bridge_traits::BridgeError;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during media operations.
#[derive(Error, Debug, Clone)]
pub enum MediaError {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// An argument was rejected before any work started (empty source,
    /// unset cache directory, volume out of range, unknown stream).
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// The operation is not allowed in the current lifecycle state
    /// (item not cached, channel destroyed).
    #[error("Invalid state: {0}")]
    State(String),

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// A native engine or toolkit call failed.
    #[error("Engine error{}: {message}", code.map(|c| format!(" {c}")).unwrap_or_default())]
    Engine { code: Option<i32>, message: String },

    /// The engine must be initialized before this call can succeed.
    #[error("Engine not initialized: {0}")]
    NotInitialized(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error while reading a source or writing an artifact.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The operation observed its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error (a worker task panicked or vanished).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn engine(message: impl Into<String>) -> Self {
        MediaError::Engine {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_state_error(&self) -> bool {
        matches!(self, MediaError::State(_))
    }

    /// Returns `true` if an initialize-then-retry may resolve the error.
    pub fn is_retryable_init(&self) -> bool {
        matches!(self, MediaError::NotInitialized(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io(Arc::new(err))
    }
}

impl From<BridgeError> for MediaError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotInitialized(msg) => MediaError::NotInitialized(msg),
            BridgeError::Engine { code, message } => MediaError::Engine { code, message },
            BridgeError::NotAvailable(msg) | BridgeError::OperationFailed(msg) => {
                MediaError::Engine {
                    code: None,
                    message: msg,
                }
            }
            BridgeError::Io(e) => MediaError::Io(Arc::new(e)),
        }
    }
}

/// Result type for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;
