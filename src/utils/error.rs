//! Error types and handling
//!
//! Common error types used across the capture core. Every failure is scoped to
//! the single operation that raised it; nothing here is fatal to the process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("No frame available: {0}")]
    NoFrameAvailable(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Invalid capture request: {0}")]
    InvalidRequest(String),

    #[error("Acquisition aborted: {0}")]
    AcquisitionAborted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Stable code handed to the presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::NoFrameAvailable(_) => "NO_FRAME_AVAILABLE",
            AppError::EncodeFailure(_) => "ENCODE_FAILURE",
            AppError::Decode(_) => "DECODE_ERROR",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::AcquisitionAborted(_) => "ACQUISITION_ABORTED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Caller contract violations: logged and ignored by the session
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, AppError::InvalidTransition(_))
    }

    /// Failures the user may simply try again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::NoFrameAvailable(_) | AppError::EncodeFailure(_)
        )
    }
}

/// Error response for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// The same command may succeed if simply tried again
    pub retryable: bool,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_transient(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response: ErrorResponse =
            AppError::DeviceUnavailable("no rear camera".to_string()).into();
        assert_eq!(response.code, "DEVICE_UNAVAILABLE");
        assert_eq!(response.message, "Device unavailable: no rear camera");
        assert!(!response.retryable);

        let response: ErrorResponse = AppError::NoFrameAvailable("0x480".to_string()).into();
        assert!(response.retryable);

        let response: ErrorResponse = AppError::PermissionDenied("camera".to_string()).into();
        assert_eq!(response.code, "PERMISSION_DENIED");
    }

    #[test]
    fn test_error_classification() {
        assert!(AppError::InvalidTransition("stop while idle".into()).is_contract_violation());
        assert!(!AppError::EncodeFailure("png".into()).is_contract_violation());
        assert!(AppError::NoFrameAvailable("0x0".into()).is_transient());
        assert!(AppError::EncodeFailure("png".into()).is_transient());
        assert!(!AppError::PermissionDenied("camera".into()).is_transient());
    }
}
