//! Split configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::split_type::SplitFractions;

/// Settings for stratified and persisted splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Per-class split fractions
    pub fractions: SplitFractions,
    /// Field holding the class of a record
    pub key_field: String,
    /// Field holding the record identifier; its basename goes in the manifest
    pub id_field: String,
    /// Field the split name is written to
    pub split_field: String,
    /// Shuffle seed; drawn from entropy when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Fail instead of tagging `Unknown` when the manifest misses an identifier
    pub strict: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            fractions: SplitFractions::default(),
            key_field: "class_id".to_string(),
            id_field: "filename".to_string(),
            split_field: "split".to_string(),
            seed: None,
            strict: false,
        }
    }
}

impl SplitConfig {
    /// Default settings with the given fractions
    pub fn new(fractions: SplitFractions) -> Self {
        Self {
            fractions,
            ..Self::default()
        }
    }

    /// Use a fixed shuffle seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fail on identifiers the manifest does not assign
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

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
        if let Ok(val) = std::env::var("ML_STREAM_SPLIT_SEED") {
            if let Ok(v) = val.parse() {
                self.seed = Some(v);
            }
        }
        self
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        self.fractions.validate()?;
        for (name, value) in [
            ("key_field", &self.key_field),
            ("id_field", &self.id_field),
            ("split_field", &self.split_field),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}
