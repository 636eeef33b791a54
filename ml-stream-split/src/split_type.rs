//! Split names and split fractions

use std::fmt;
use std::str::FromStr;

use ml_stream_core::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Named subset of a dataset
///
/// Declaration order is the order sections are written in a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SplitType {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
    /// Not assigned by the manifest
    Unknown,
}

impl SplitType {
    /// Every split, in manifest order
    pub const ALL: [SplitType; 4] = [
        SplitType::Train,
        SplitType::Validation,
        SplitType::Test,
        SplitType::Unknown,
    ];

    /// Name used in manifests and record fields
    pub fn as_str(self) -> &'static str {
        match self {
            SplitType::Train => "Train",
            SplitType::Validation => "Validation",
            SplitType::Test => "Test",
            SplitType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SplitType::ALL
            .into_iter()
            .find(|split| split.as_str() == s)
            .ok_or_else(|| Error::InvalidManifest(format!("unknown split '{s}'")))
    }
}

impl From<SplitType> for Value {
    fn from(split: SplitType) -> Self {
        Value::Str(split.as_str().to_string())
    }
}

impl TryFrom<&Value> for SplitType {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        value.as_str()?.parse()
    }
}

/// Fractions of each class assigned to Test and, optionally, Validation
///
/// Whatever remains goes to Train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    /// Fraction of each class assigned to Test
    pub test: f64,

    /// Fraction of each class assigned to Validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<f64>,
}

impl SplitFractions {
    /// Train/test split
    pub fn test(test: f64) -> Result<Self> {
        let fractions = Self {
            test,
            validation: None,
        };
        fractions.validate()?;
        Ok(fractions)
    }

    /// Train/validation/test split
    pub fn with_validation(test: f64, validation: f64) -> Result<Self> {
        let fractions = Self {
            test,
            validation: Some(validation),
        };
        fractions.validate()?;
        Ok(fractions)
    }

    /// Check that each fraction lies in `[0, 1]` and that they sum to at most 1
    pub fn validate(&self) -> Result<()> {
        let validation = self.validation.unwrap_or(0.0);
        for (name, value) in [("test", self.test), ("validation", validation)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidFractions(format!(
                    "{name} fraction {value} is outside [0, 1]"
                )));
            }
        }
        if self.test + validation > 1.0 {
            return Err(Error::InvalidFractions(format!(
                "test and validation fractions sum to {}",
                self.test + validation
            )));
        }
        Ok(())
    }

    /// Number of members of a class of size `len` taken by `fraction`
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub(crate) fn count(fraction: f64, len: usize) -> usize {
        (fraction * len as f64) as usize
    }
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            test: 0.2,
            validation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn names_round_trip_through_values() {
        for split in SplitType::ALL {
            let value = Value::from(split);
            assert_eq!(SplitType::try_from(&value).unwrap(), split);
        }
        assert!("Valiadation".parse::<SplitType>().is_err());
    }

    #[test_case(0.2, None, true ; "plain test split")]
    #[test_case(0.2, Some(0.1), true ; "with validation")]
    #[test_case(1.2, None, false ; "test above one")]
    #[test_case(-0.1, None, false ; "negative")]
    #[test_case(0.6, Some(0.5), false ; "sum above one")]
    fn fraction_validation(test: f64, validation: Option<f64>, ok: bool) {
        let fractions = SplitFractions { test, validation };
        assert_eq!(fractions.validate().is_ok(), ok);
    }

    #[test]
    fn counts_truncate() {
        assert_eq!(SplitFractions::count(0.2, 50), 10);
        assert_eq!(SplitFractions::count(0.2, 4), 0);
        assert_eq!(SplitFractions::count(0.25, 7), 1);
    }
}
