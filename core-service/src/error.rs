use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Media error: {0}")]
    Media(#[from] core_media::MediaError),

    #[error("Scene error: {0}")]
    Scene(String),
}

impl CoreError {
    /// True when the wrapped media error is a lifecycle state rejection.
    pub fn is_state_error(&self) -> bool {
        matches!(self, CoreError::Media(e) if e.is_state_error())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
