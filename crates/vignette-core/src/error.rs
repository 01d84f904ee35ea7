//! Error types for the Vignette loading pipeline.
//!
//! Errors are organized by pipeline phase so callers can tell a source
//! problem from a codec problem from a failed transformation. `LoadError`
//! is `Clone`: when several requests share one pipeline execution, every
//! waiter receives the owner's exact terminal error.

use thiserror::Error;

/// Top-level error type for Vignette operations.
#[derive(Error, Debug)]
pub enum VignetteError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline load errors
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Terminal error of a loader task, organized by phase.
///
/// Cancellation is deliberate abort, not a fault; it still travels through
/// the same channel so waiters observe exactly what the owner observed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The source could not be fetched (unreachable, missing, invalid)
    #[error("Resolve failed for '{origin}': {message}")]
    Resolve { origin: String, message: String },

    /// The fetched bytes could not be decoded (corrupt or unsupported data)
    #[error("Decode failed for '{origin}': {message}")]
    Decode { origin: String, message: String },

    /// A named transformation failed; carries that transformation's key
    #[error("Transformation '{key}' failed: {message}")]
    Transform { key: String, message: String },

    /// The request was cancelled at a checkpoint
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Whether this outcome is a deliberate cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}

/// Convenience type alias for Vignette results.
pub type Result<T> = std::result::Result<T, VignetteError>;

/// Convenience type alias for loader-task results.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display_names_transformation() {
        let err = LoadError::Transform {
            key: "grayscale".to_string(),
            message: "out of memory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Transformation 'grayscale' failed: out of memory"
        );
    }

    #[test]
    fn test_load_error_clone_is_identical() {
        let err = LoadError::Resolve {
            origin: "https://example.com/a.png".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(LoadError::Cancelled.is_cancelled());
        assert!(!LoadError::Decode {
            origin: "x".to_string(),
            message: "bad header".to_string()
        }
        .is_cancelled());
    }

    #[test]
    fn test_vignette_error_wraps_load_error() {
        let err: VignetteError = LoadError::Cancelled.into();
        assert!(matches!(err, VignetteError::Load(LoadError::Cancelled)));
    }
}
