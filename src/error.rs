//! Error handling for speech-onset
//!
//! Every pipeline step returns `Result<T>`; errors carry the failing
//! step's cause and a few recovery suggestions for the CLI.

use thiserror::Error;

/// Result type alias for onset operations
pub type Result<T> = std::result::Result<T, OnsetError>;

/// Main error type for onset operations
#[derive(Error, Debug)]
pub enum OnsetError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Parameter Errors
    #[error("Invalid parameter: {param} = {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Processing Errors
    #[error("Processing error in {stage}: {reason}")]
    ProcessingError { stage: &'static str, reason: String },

    #[error("Plot rendering failed: {reason}")]
    RenderError {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OnsetError {
    /// Shorthand for an out-of-range parameter
    pub fn invalid_parameter(
        param: &str,
        value: impl ToString,
        expected: &str,
    ) -> Self {
        OnsetError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            OnsetError::FileNotFound { .. } => "FILE_NOT_FOUND",
            OnsetError::InvalidAudio { .. } => "INVALID_AUDIO",
            OnsetError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            OnsetError::EmptyAudio => "EMPTY_AUDIO",
            OnsetError::InvalidParameter { .. } => "INVALID_PARAMETER",
            OnsetError::ProcessingError { .. } => "PROCESSING_ERROR",
            OnsetError::RenderError { .. } => "RENDER_ERROR",
            OnsetError::Io(_) => "IO_ERROR",
            OnsetError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            OnsetError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            OnsetError::InvalidAudio { .. } => vec![
                "Check if the file plays in another application",
                "Re-export the recording as PCM WAV",
            ],
            OnsetError::UnsupportedFormat { .. } => vec![
                "Convert to 16-bit, 24-bit or 32-bit float WAV",
            ],
            OnsetError::EmptyAudio => vec!["The recording contains no samples"],
            OnsetError::InvalidParameter { .. } => vec![
                "Threshold must be a finite, non-negative number of milliseconds",
            ],
            OnsetError::RenderError { .. } => vec![
                "Run from an interactive terminal to see the plot",
                "Omit --plot to skip visualization",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = OnsetError::FileNotFound {
            path: "test.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert_eq!(OnsetError::EmptyAudio.error_code(), "EMPTY_AUDIO");
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = OnsetError::invalid_parameter("nothing_before_ms", -1.0, ">= 0 ms");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: nothing_before_ms = -1 (expected >= 0 ms)"
        );
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_processing_error_names_stage() {
        let err = OnsetError::ProcessingError {
            stage: "denoise",
            reason: "empty signal".to_string(),
        };
        assert!(err.to_string().contains("denoise"));
        assert!(err.recovery_suggestions().is_empty());
    }
}
