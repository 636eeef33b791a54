//! Lazy records and streaming operators for ML data pipelines
//!
//! A dataset is modelled as a lazy stream of labeled records. Fields may be
//! computed eagerly, on first read, or on every read. Streams are composed
//! from stages that apply, filter and reshape fields, carry running state,
//! cut sliding windows, and finally assemble fixed-shape training batches.

#![warn(missing_docs)]

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod flow;
pub mod group;
pub mod ops;
pub mod record;
pub mod stream;
pub mod tensor;
pub mod transform;
pub mod value;
pub mod window;

// Re-export key types for convenience
pub use batch::{Batch, BatchOptions, Batches};
pub use config::{BatchConfig, PipelineConfig, WindowConfig};
pub use error::{BoxError, Error, Result};
pub use group::Groups;
pub use record::{EvalStrategy, LazyRecord, Thunk};
pub use stream::RecordStream;
pub use tensor::{DType, Element, Tensor};
pub use transform::{Control, Transform, TransformChain, Transformed};
pub use value::{Fields, Key, Value};
pub use window::SlidingWindow;
