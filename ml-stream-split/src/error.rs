//! Error types for splitting and sampling

use thiserror::Error;

/// Error type for splitting and sampling
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_stream_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed split manifest
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Split fractions out of range
    #[error("Invalid split fractions: {0}")]
    InvalidFractions(String),

    /// Manifest and stream disagree on the identifiers they hold
    #[error(
        "Split integrity error: {} identifiers missing from manifest, {} missing from stream",
        missing_from_manifest.len(),
        missing_from_stream.len()
    )]
    SplitIntegrity {
        /// Stream identifiers the manifest does not assign
        missing_from_manifest: Vec<String>,
        /// Manifest identifiers the stream never produced
        missing_from_stream: Vec<String>,
    },

    /// Records whose identifiers reduce to the same manifest entry
    #[error("Duplicate identifier '{id}': {first} and {second} share a manifest entry")]
    DuplicateIdentifier {
        /// Manifest entry both records map to
        id: String,
        /// Identifier of the first record
        first: String,
        /// Identifier of the later record
        second: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for splitting and sampling
pub type Result<T> = std::result::Result<T, Error>;
