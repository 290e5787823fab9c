//! Errors reported for a conversion task.

use std::path::PathBuf;

use thiserror::Error;

/// A request rejected before any encoder process was spawned.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("FFmpeg executable not found at {0}. Please select the correct FFmpeg path")]
    EncoderNotFound(PathBuf),
    #[error("FFmpeg at {0} is not executable")]
    EncoderNotExecutable(PathBuf),
    #[error("Please provide a valid input file or image sequence")]
    MissingInput,
    #[error("Please provide an output file path")]
    MissingOutput,
    #[error("Output file must have a .{expected} extension: {path}")]
    InvalidOutputExtension { path: String, expected: &'static str },
    #[error("Frame rate must be greater than zero")]
    InvalidFrameRate,
    #[error("Quality factor {quality} is outside 0-{max}")]
    InvalidQuality { quality: u8, max: u8 },
    #[error("No files match {0}")]
    NoSequenceMatches(String),
    #[error("Could not determine duration or frame count of {0}")]
    MediaInfoUnavailable(String),
}

/// Why a task ended in failure.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to spawn FFmpeg process: {0}")]
    Launch(#[source] std::io::Error),
    #[error("FFmpeg failed with {exit}.\n\nDetails:\n{details}")]
    Encoder { exit: String, details: String },
    #[error("I/O error while supervising FFmpeg: {0}")]
    Io(#[from] std::io::Error),
    #[error("An error occurred during conversion: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_error_message() {
        let err = ConversionError::Encoder {
            exit: "error code 1".to_string(),
            details: "Invalid argument".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "FFmpeg failed with error code 1.\n\nDetails:\nInvalid argument"
        );
    }

    #[test]
    fn test_validation_converts() {
        let err: ConversionError = ValidationError::MissingInput.into();
        assert!(matches!(err, ConversionError::Validation(ValidationError::MissingInput)));
    }
}
