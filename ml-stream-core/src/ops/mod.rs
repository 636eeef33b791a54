//! Streaming stages over lazy records
//!
//! Every stage implements [`Transform`](crate::transform::Transform), so it
//! can be driven through [`RecordStream`](crate::stream::RecordStream) or
//! combined explicitly in a [`TransformChain`](crate::transform::TransformChain).

mod apply;
mod fields;
mod state;

pub use apply::{Apply, ApplyOrSkip, ApplyWhole, RecordFn, SelfApply, ValueFn};
pub use fields::{DropFields, EnsureField, Filter, PredicateFn, ProjectFields, Tap};
pub use state::{
    ApplyBatched, Counts, Delay, InspectFirst, Progress, Scan, Shard, Summarize, Unfold, Unroll,
};
