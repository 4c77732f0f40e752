use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    /// The engine or device has not been brought up yet. Callers may run
    /// `initialize` once and retry the operation.
    #[error("Engine not initialized: {0}")]
    NotInitialized(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Engine error {code:?}: {message}")]
    Engine { code: Option<i32>, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Shorthand for a native engine failure carrying the engine's own code.
    pub fn engine(code: i32, message: impl Into<String>) -> Self {
        Self::Engine {
            code: Some(code),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
