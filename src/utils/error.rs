//! Error types and handling
//!
//! Common error types used across the crate and the bridge boundary.

use crate::capture::traits::CaptureError;
use crate::recorder::writer::WriterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session-level error taxonomy surfaced to bridge callers.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera device is unavailable")]
    DeviceUnavailable,

    #[error("Failed to configure camera session")]
    ConfigurationFailed,

    #[error("Video recording already in progress")]
    AlreadyRecording,

    #[error("No active recording")]
    NotRecording,

    #[error("Cannot switch camera while recording")]
    CannotSwitchWhileRecording,

    #[error("Recording error: {0}")]
    Writer(#[from] WriterError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error response for bridge callers.
///
/// The code is command-specific (`INIT_ERROR`, `CAPTURE_ERROR`, ...), the
/// message is the underlying error's description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    /// Build a response with an explicit code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap a session error under a command-specific code.
    pub fn from_session(code: &str, error: &SessionError) -> Self {
        Self::new(code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_stable() {
        assert_eq!(
            SessionError::DeviceUnavailable.to_string(),
            "Camera device is unavailable"
        );
        assert_eq!(SessionError::NotRecording.to_string(), "No active recording");
        assert_eq!(
            SessionError::AlreadyRecording.to_string(),
            "Video recording already in progress"
        );
    }

    #[test]
    fn test_error_response_carries_command_code() {
        let resp = ErrorResponse::from_session("STOP_ERROR", &SessionError::NotRecording);
        assert_eq!(resp.code, "STOP_ERROR");
        assert_eq!(resp.message, "No active recording");
    }
}
