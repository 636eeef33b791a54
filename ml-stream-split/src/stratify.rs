//! Stratified assignment of records to splits

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use ml_stream_core::{Key, LazyRecord};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::manifest::SplitManifest;
use crate::split_type::{SplitFractions, SplitType};

/// Final path component of `id`, or `id` itself when it has none
pub fn basename(id: &str) -> String {
    Path::new(id)
        .file_name()
        .map_or_else(|| id.to_string(), |name| name.to_string_lossy().into_owned())
}

/// Split assignment aligned with the records it was computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMap {
    splits: Vec<SplitType>,
    declared: Vec<SplitType>,
}

impl SplitMap {
    /// Split of the record at `index`
    pub fn get(&self, index: usize) -> Option<SplitType> {
        self.splits.get(index).copied()
    }

    /// Splits in record order
    pub fn as_slice(&self) -> &[SplitType] {
        &self.splits
    }

    /// Number of records assigned
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Check if nothing was assigned
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Number of records assigned to `split`
    pub fn count(&self, split: SplitType) -> usize {
        self.splits.iter().filter(|s| **s == split).count()
    }

    /// Manifest keyed by the basename of each record's `id_field`
    ///
    /// Every split the fractions asked for is declared, even when no record
    /// landed in it. Two records with the same basename, such as
    /// `cats/001.jpg` and `dogs/001.jpg`, could not be told apart on a later
    /// run and fail with [`Error::DuplicateIdentifier`].
    pub fn to_manifest(&self, records: &[LazyRecord], id_field: &str) -> Result<SplitManifest> {
        let mut manifest = SplitManifest::new();
        for split in &self.declared {
            manifest.add_section(*split);
        }
        let mut seen: HashMap<String, String> = HashMap::with_capacity(records.len());
        for (record, split) in records.iter().zip(&self.splits) {
            let full = record.get(id_field)?.as_str()?.to_string();
            let id = basename(&full);
            if let Some(first) = seen.get(&id) {
                return Err(Error::DuplicateIdentifier {
                    id,
                    first: first.clone(),
                    second: full,
                });
            }
            manifest.insert(*split, id.clone())?;
            seen.insert(id, full);
        }
        Ok(manifest)
    }

    /// Whole records per split, in record order
    pub fn partition(&self, records: &[LazyRecord]) -> BTreeMap<SplitType, Vec<LazyRecord>> {
        let mut parts: BTreeMap<SplitType, Vec<LazyRecord>> = BTreeMap::new();
        for (record, split) in records.iter().zip(&self.splits) {
            parts.entry(*split).or_default().push(record.clone());
        }
        parts
    }
}

/// Assign every record to a split, class by class
///
/// Records are grouped by `key_field` and each class is shuffled with `rng`.
/// The leading `floor(test * len)` members of a class go to Test, the next
/// `floor(validation * len)` to Validation and the rest to Train.
pub fn stratified_split<R: Rng + ?Sized>(
    records: &[LazyRecord],
    fractions: &SplitFractions,
    key_field: &str,
    rng: &mut R,
) -> Result<SplitMap> {
    fractions.validate()?;

    let mut classes: BTreeMap<Key, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let key = Key::try_from(record.get(key_field)?)?;
        classes.entry(key).or_default().push(index);
    }

    let mut declared = vec![SplitType::Train, SplitType::Test];
    if fractions.validation.is_some() {
        declared.push(SplitType::Validation);
    }

    let mut splits = vec![SplitType::Train; records.len()];
    for members in classes.values_mut() {
        members.shuffle(rng);
        let test = SplitFractions::count(fractions.test, members.len());
        let validation = fractions
            .validation
            .map_or(0, |fraction| SplitFractions::count(fraction, members.len()));

        for &index in &members[..test] {
            splits[index] = SplitType::Test;
        }
        for &index in &members[test..test + validation] {
            splits[index] = SplitType::Validation;
        }
    }

    Ok(SplitMap { splits, declared })
}
