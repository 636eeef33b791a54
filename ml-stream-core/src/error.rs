//! Error types for lazy record streams

use std::io;
use thiserror::Error;

/// Result type for record stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a user-supplied function
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for record stream operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A field was read that the record does not hold
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A user-supplied function failed while computing a field
    #[error("Transformation error in field '{field}': {source}")]
    Transform {
        /// Field the failing computation was bound to
        field: String,
        /// The error returned by the function
        #[source]
        source: BoxError,
    },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Data type mismatch
    #[error("Data type mismatch: {0}")]
    TypeMismatch(String),

    /// Tensor shape mismatch
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape that was required
        expected: Vec<usize>,
        /// Shape that was found
        actual: Vec<usize>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap the failure of a user function bound to `field`
    pub fn transform(field: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transform {
            field: field.into(),
            source: source.into(),
        }
    }

    /// Field name carried by this error, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::MissingField(field) | Error::Transform { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_reports_field() {
        let err = Error::transform("features", anyhow::anyhow!("decoder failed"));
        assert_eq!(err.field(), Some("features"));
        let message = err.to_string();
        assert!(message.contains("features"));
        assert!(message.contains("decoder failed"));
    }

    #[test]
    fn missing_field_reports_field() {
        let err = Error::MissingField("label".into());
        assert_eq!(err.field(), Some("label"));
        assert_eq!(err.to_string(), "Missing field: label");
    }

    #[test]
    fn shape_mismatch_message() {
        let err = Error::ShapeMismatch {
            expected: vec![3, 2],
            actual: vec![2, 2],
        };
        assert!(err.to_string().contains("[3, 2]"));
    }
}
