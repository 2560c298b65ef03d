//! Error types and handling
//!
//! Common error types used across the recorder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The camera/microphone stream could not be obtained
    #[error("Failed to access webcam: {0}")]
    Acquisition(String),

    /// The recording sink could not start capturing
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The segmentation model could not be loaded or run
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response for UI layers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Image(_) => "IMAGE_ERROR",
            AppError::Acquisition(_) => "ACQUISITION_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Encoding(_) => "ENCODING_ERROR",
            AppError::AlreadyRecording => "ALREADY_RECORDING",
            AppError::NotRecording => "NOT_RECORDING",
            AppError::InvalidFrame(_) => "INVALID_FRAME",
            AppError::Segmentation(_) => "SEGMENTATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
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
        let response = ErrorResponse::from(AppError::Acquisition("device busy".to_string()));
        assert_eq!(response.code, "ACQUISITION_ERROR");
        assert_eq!(response.message, "Failed to access webcam: device busy");

        let response = ErrorResponse::from(AppError::AlreadyRecording);
        assert_eq!(response.code, "ALREADY_RECORDING");
    }
}
