use thiserror::Error;

/// Errors that can occur while capturing or processing intercepted audio.
///
/// Payloads are plain strings so the error stays `Clone` and can be handed to
/// every delegate and stored in session records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("input failed: {0}")]
    InputFailed(String),

    #[error("{stage} stage failed: {reason}")]
    ProcessingFailed { stage: &'static str, reason: String },

    #[error("coordinator is not running")]
    NotRunning,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether this error ends the session it occurred in.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::InputFailed(_) | Self::StorageError(_))
    }
}
