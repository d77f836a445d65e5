//! Error types for wavemetric operations.
//!
//! Broken internal invariants (a window outside its parent, a band fed more
//! rows than it declared, mismatched lift lines) are programming errors and
//! panic. Everything a caller can get wrong at runtime ends up here.

use thiserror::Error;

/// Result type alias for wavemetric operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, decomposing or comparing images.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A configuration value or input combination is not acceptable.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The request is well formed but not supported.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Image dimensions don't match between reference and distorted images.
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Expected dimensions (width, height).
        expected: (usize, usize),
        /// Actual dimensions (width, height).
        actual: (usize, usize),
    },

    /// The two images carry a different number of planes.
    #[error("Component count mismatch: expected {expected}, got {actual}")]
    ComponentCountMismatch {
        /// Component count of the reference image.
        expected: usize,
        /// Component count of the distorted image.
        actual: usize,
    },

    /// The image stream is not a PNM file this crate understands.
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    /// The image stream ended before all samples were read.
    #[error("Unexpected end of image data")]
    UnexpectedEof,

    /// A numeric value lies outside its permitted range.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// The worker pool could not be started.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter(reason.into())
    }

    /// Shorthand for [`Error::NotImplemented`].
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::NotImplemented(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dimension_mismatch() {
        let err = Error::DimensionMismatch {
            expected: (64, 48),
            actual: (64, 47),
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: expected (64, 48), got (64, 47)"
        );
    }

    #[test]
    fn test_io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pgm");
        let err = Error::from(io);
        assert_eq!(err.to_string(), "missing.pgm");
    }

    #[test]
    fn test_shorthands() {
        assert!(matches!(
            Error::invalid("workers"),
            Error::InvalidParameter(ref s) if s == "workers"
        ));
        assert!(matches!(
            Error::unsupported("2 planes"),
            Error::NotImplemented(ref s) if s == "2 planes"
        ));
    }
}
