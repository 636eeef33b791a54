//! Pipeline configuration
//!
//! Settings load from JSON, with environment variable overrides and
//! validation of the loaded values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::error::{Error, Result};
use crate::tensor::DType;
use crate::value::Fields;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Batch assembly settings
    pub batch: BatchConfig,
    /// Sliding window settings
    pub window: WindowConfig,
}

/// Batch assembly settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Feature fields; one tensor per field
    pub feature_fields: Vec<String>,
    /// Label field
    pub label_field: String,
    /// Records per batch
    pub batch_size: usize,
    /// Element type of feature tensors; inferred when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            feature_fields: vec!["features".to_string()],
            label_field: "label".to_string(),
            batch_size: 16,
            dtype: None,
        }
    }
}

impl BatchConfig {
    /// Validate batch settings
    pub fn validate(&self) -> Result<()> {
        if self.feature_fields.is_empty() {
            return Err(Error::InvalidArgument(
                "batch.feature_fields must not be empty".into(),
            ));
        }
        if self.label_field.is_empty() {
            return Err(Error::InvalidArgument("batch.label_field must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Batch options for these settings
    pub fn to_options(&self) -> BatchOptions {
        let features = match self.feature_fields.as_slice() {
            [single] => Fields::One(single.clone()),
            many => Fields::Many(many.to_vec()),
        };
        BatchOptions {
            dtype: self.dtype,
            ..BatchOptions::new(features, self.label_field.clone(), self.batch_size)
        }
    }
}

/// Sliding window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Fields to window
    pub fields: Vec<String>,
    /// Samples per window
    pub size: usize,
    /// Buffer length, in windows
    pub cache_depth: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            size: 16,
            cache_depth: 10,
        }
    }
}

impl WindowConfig {
    /// Validate window settings
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidArgument("window.size must be at least 1".into()));
        }
        if self.cache_depth < 2 {
            return Err(Error::InvalidArgument("window.cache_depth must be at least 2".into()));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Parse configuration from a JSON string
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Apply environment variable overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ML_STREAM_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.batch.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("ML_STREAM_WINDOW_SIZE") {
            if let Ok(v) = val.parse() {
                self.window.size = v;
            }
        }
        if let Ok(val) = std::env::var("ML_STREAM_WINDOW_CACHE_DEPTH") {
            if let Ok(v) = val.parse() {
                self.window.cache_depth = v;
            }
        }
        self
    }

    /// Validate all settings
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        self.window.validate()
    }
}
