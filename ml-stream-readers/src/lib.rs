//! Record producers for ML data pipelines
//!
//! Producers turn data on disk into streams of [`LazyRecord`]s that the
//! operators of `ml-stream-core` consume.

#![warn(missing_docs)]

mod directory;
mod error;
mod files;

pub use directory::ClassDirectorySource;
pub use error::{Error, Result};
pub use files::list_files;

pub use ml_stream_core::LazyRecord;
