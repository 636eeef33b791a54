//! Error types for record producers

use std::path::PathBuf;

use thiserror::Error;

/// Error type for record producers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_stream_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path expected to be a directory is not one
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Result type for record producers
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_stream_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            Error::Io(inner) => ml_stream_core::Error::Io(inner),
            Error::NotADirectory(path) => ml_stream_core::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", path.display()),
            )),
        }
    }
}
