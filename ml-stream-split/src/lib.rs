//! Stratified splits, split manifests and class-balanced sampling
//!
//! Splits are computed per class and can be persisted as a manifest, so a
//! dataset keeps the same train, validation and test assignment across runs.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod manifest;
pub mod persist;
pub mod sample;
pub mod split_type;
pub mod stratify;

pub use config::SplitConfig;
pub use error::{Error, Result};
pub use manifest::{FileManifestStore, ManifestStore, MemoryManifestStore, SplitManifest};
pub use persist::{persisted_split, split, SplitStream, SplitTagger};
pub use sample::{
    count_classes, filter_split, sample_classes, stratified_sample, stratified_sample_by_split,
    verify_manifest, Partition, SampleClasses, SampleOptions,
};
pub use split_type::{SplitFractions, SplitType};
pub use stratify::{basename, stratified_split, SplitMap};
