//! Error types for Umbra.

use thiserror::Error;

/// Result type alias for Umbra operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Umbra.
///
/// Component crates keep their own `thiserror` enums and convert into this
/// one at the boundary (CLI, session report).
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid policy file: {0}")]
    InvalidPolicy(String),

    // Scan / classification errors (20-29)
    #[error("host tree unavailable: {0}")]
    Host(String),

    #[error("node {node} could not be classified: {reason}")]
    Classification { node: String, reason: String },

    // Synthesis errors (30-39)
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("generation timed out after {seconds}s")]
    GenerationTimeout { seconds: u64 },

    // Apply errors (40-49)
    #[error("host rejected write for node {node}: {reason}")]
    Apply { node: String, reason: String },

    // Persistence errors (50-59)
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("unknown patch: {0}")]
    UnknownPatch(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidPolicy(_) => 11,
            Error::Host(_) => 20,
            Error::Classification { .. } => 21,
            Error::Generation(_) => 30,
            Error::GenerationTimeout { .. } => 31,
            Error::Apply { .. } => 40,
            Error::Persistence(_) => 50,
            Error::UnknownPatch(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_grouped_by_component() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::GenerationTimeout { seconds: 20 }.code(), 31);
        assert_eq!(
            Error::Apply {
                node: "n1".into(),
                reason: "csp".into()
            }
            .code(),
            40
        );
        assert_eq!(Error::Persistence("disk".into()).code(), 50);
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::GenerationTimeout { seconds: 15 };
        assert_eq!(err.to_string(), "generation timed out after 15s");
    }
}
