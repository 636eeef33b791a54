//! Class-balanced sampling and helpers over split-tagged streams

use std::collections::{HashMap, HashSet, VecDeque};

use ml_stream_core::flow::{from_records, rng_from_seed};
use ml_stream_core::ops::{Counts, Filter};
use ml_stream_core::{Control, Groups, Key, LazyRecord, Transform, Transformed};
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::manifest::SplitManifest;
use crate::split_type::SplitType;
use crate::stratify::basename;

/// Passes at most `n` records of each class
///
/// Known classes start with a quota of `n`. Without a known list, a class
/// seen for the first time passes and is left with `n - 1`. The stage stops
/// pulling input as soon as every tracked quota is used up, so without
/// known classes the stream can end before every class has been seen.
pub struct SampleClasses {
    field: String,
    n: usize,
    initial: HashMap<Key, usize>,
    quotas: HashMap<Key, usize>,
}

impl SampleClasses {
    /// Sample `n` records per class of `field`
    pub fn new(field: impl Into<String>, n: usize, known_classes: Option<Vec<Key>>) -> Self {
        let initial: HashMap<Key, usize> = known_classes
            .unwrap_or_default()
            .into_iter()
            .map(|key| (key, n))
            .collect();
        Self {
            field: field.into(),
            n,
            quotas: initial.clone(),
            initial,
        }
    }

    fn exhausted(&self) -> bool {
        !self.quotas.is_empty() && self.quotas.values().all(|quota| *quota == 0)
    }
}

impl Transform for SampleClasses {
    fn process(
        &mut self,
        record: LazyRecord,
        out: &mut VecDeque<LazyRecord>,
    ) -> ml_stream_core::Result<Control> {
        if self.exhausted() {
            return Ok(Control::Stop);
        }

        let key = Key::try_from(record.get(&self.field)?)?;
        match self.quotas.get_mut(&key) {
            Some(0) => {}
            Some(quota) => {
                *quota -= 1;
                out.push_back(record);
            }
            None => {
                if self.n > 0 {
                    out.push_back(record);
                }
                self.quotas.insert(key, self.n.saturating_sub(1));
            }
        }

        if self.exhausted() {
            tracing::debug!(
                "Class quotas of '{}' used up after {} classes, ending stream",
                self.field,
                self.quotas.len()
            );
            return Ok(Control::Stop);
        }
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.quotas = self.initial.clone();
    }

    fn name(&self) -> &'static str {
        "sample_classes"
    }
}

/// At most `n` records per class of `class_field`, in stream order
pub fn sample_classes<I>(
    stream: I,
    class_field: &str,
    n: usize,
    known_classes: Option<Vec<Key>>,
) -> Transformed<I::IntoIter, SampleClasses>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    Transformed::new(
        stream.into_iter(),
        SampleClasses::new(class_field, n, known_classes),
    )
}

/// Settings for [`stratified_sample`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOptions {
    /// Records per group; the smallest group size when absent
    pub n: Option<usize>,
    /// Field to group by
    pub by: String,
    /// Shuffle each group before taking from it
    pub shuffle: bool,
    /// Shuffle seed; drawn from entropy when absent
    pub seed: Option<u64>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            n: None,
            by: "class_id".to_string(),
            shuffle: false,
            seed: None,
        }
    }
}

impl SampleOptions {
    /// Take `n` records per group
    #[must_use]
    pub fn n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    /// Group by `field`
    #[must_use]
    pub fn by(mut self, field: impl Into<String>) -> Self {
        self.by = field.into();
        self
    }

    /// Shuffle groups with `seed`
    #[must_use]
    pub fn shuffled(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }
}

fn round_robin(groups: Groups, options: &SampleOptions, out: &mut Vec<LazyRecord>) {
    let n = options.n.unwrap_or_else(|| groups.min_len());
    let mut members: Vec<Vec<LazyRecord>> = groups.into_iter().map(|(_, records)| records).collect();
    if options.shuffle {
        let mut rng = rng_from_seed(options.seed);
        for records in &mut members {
            records.shuffle(&mut rng);
        }
    }
    for i in 0..n {
        out.extend(members.iter().filter_map(|records| records.get(i).cloned()));
    }
}

/// Balanced sample of a materialized stream
///
/// Groups by `options.by` and yields up to `n` records per group,
/// alternating between groups in first-seen order.
pub fn stratified_sample<I>(
    stream: I,
    options: &SampleOptions,
) -> Result<impl Iterator<Item = ml_stream_core::Result<LazyRecord>>>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    let groups = Groups::from_records(stream, &options.by)?;
    let mut out = Vec::new();
    round_robin(groups, options, &mut out);
    Ok(from_records(out))
}

/// [`stratified_sample`] run separately inside each split
///
/// Splits are emitted one after the other in first-seen order.
pub fn stratified_sample_by_split<I>(
    stream: I,
    split_field: &str,
    options: &SampleOptions,
) -> Result<impl Iterator<Item = ml_stream_core::Result<LazyRecord>>>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    let splits = Groups::from_records(stream, split_field)?;
    let mut out = Vec::new();
    for (_, records) in splits {
        let groups = Groups::from_records(from_records(records), &options.by)?;
        round_robin(groups, options, &mut out);
    }
    Ok(from_records(out))
}

/// Number of records per value of `field`
pub fn count_classes<I>(stream: I, field: &str) -> Result<Counts>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    let mut counts = Counts::new();
    for record in stream {
        let key = Key::try_from(record?.get(field)?)?;
        *counts.entry(key).or_default() += 1;
    }
    Ok(counts)
}

/// Records whose `split_field` names `split`
pub fn filter_split<I>(stream: I, split_field: &str, split: SplitType) -> Transformed<I::IntoIter, Filter>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    let filter = Filter::new(split_field, move |value| Ok(value.as_str()? == split.as_str()));
    Transformed::new(stream.into_iter(), filter)
}

/// Records of a split-tagged stream, by split
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Train records
    pub train: Vec<LazyRecord>,
    /// Validation records
    pub validation: Vec<LazyRecord>,
    /// Test records
    pub test: Vec<LazyRecord>,
    /// Records the manifest did not assign
    pub unknown: Vec<LazyRecord>,
}

impl Partition {
    /// Collect a tagged stream into its splits, keeping stream order
    pub fn from_tagged<I>(stream: I, split_field: &str) -> Result<Self>
    where
        I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
    {
        let mut partition = Self::default();
        for record in stream {
            let record = record?;
            let split = SplitType::try_from(&record.get(split_field)?)?;
            partition.part_mut(split).push(record);
        }
        Ok(partition)
    }

    /// Records in `split`
    pub fn part(&self, split: SplitType) -> &[LazyRecord] {
        match split {
            SplitType::Train => &self.train,
            SplitType::Validation => &self.validation,
            SplitType::Test => &self.test,
            SplitType::Unknown => &self.unknown,
        }
    }

    fn part_mut(&mut self, split: SplitType) -> &mut Vec<LazyRecord> {
        match split {
            SplitType::Train => &mut self.train,
            SplitType::Validation => &mut self.validation,
            SplitType::Test => &mut self.test,
            SplitType::Unknown => &mut self.unknown,
        }
    }
}

/// Check that `manifest` and `records` hold the same identifiers
///
/// Identifiers are compared by basename of `id_field`.
pub fn verify_manifest(records: &[LazyRecord], manifest: &SplitManifest, id_field: &str) -> Result<()> {
    let mut stream_ids = HashSet::new();
    for record in records {
        stream_ids.insert(basename(record.get(id_field)?.as_str()?));
    }
    let lookup = manifest.lookup();

    let mut missing_from_manifest: Vec<String> = stream_ids
        .iter()
        .filter(|id| !lookup.contains_key(*id))
        .cloned()
        .collect();
    let mut missing_from_stream: Vec<String> = lookup
        .into_keys()
        .filter(|id| !stream_ids.contains(id))
        .collect();

    if missing_from_manifest.is_empty() && missing_from_stream.is_empty() {
        return Ok(());
    }
    missing_from_manifest.sort();
    missing_from_stream.sort();
    Err(Error::SplitIntegrity {
        missing_from_manifest,
        missing_from_stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_stream_core::flow::as_field;
    use ml_stream_core::RecordStream;
    use test_case::test_case;

    fn classes(input: &str) -> impl Iterator<Item = ml_stream_core::Result<LazyRecord>> + '_ {
        input
            .chars()
            .enumerate()
            .map(|(i, c)| Ok(LazyRecord::new().with("i", i).with("class", c.to_string())))
    }

    fn labels(stream: impl Iterator<Item = ml_stream_core::Result<LazyRecord>>) -> String {
        stream
            .values("class")
            .map(|v| v.unwrap().as_str().unwrap().to_string())
            .collect()
    }

    fn known(names: &[&str]) -> Option<Vec<Key>> {
        Some(names.iter().map(|name| Key::from(*name)).collect())
    }

    #[test]
    fn known_classes_cap_each_class() {
        assert_eq!(labels(sample_classes(classes("aaaaab"), "class", 2, known(&["a", "b"]))), "aab");
    }

    #[test]
    fn stops_once_quotas_are_used_up() {
        let pulled = std::cell::Cell::new(0);
        let source = classes("abababab").inspect(|_| pulled.set(pulled.get() + 1));
        assert_eq!(labels(sample_classes(source, "class", 2, known(&["a", "b"]))), "abab");
        assert_eq!(pulled.get(), 4);
    }

    #[test_case("abcabc", 2, "abcabc" ; "unknown classes pass first record")]
    #[test_case("aab", 1, "a" ; "first class exhausts before others are seen")]
    #[test_case("abc", 0, "" ; "zero quota")]
    fn unknown_classes(input: &str, n: usize, expected: &str) {
        assert_eq!(labels(sample_classes(classes(input), "class", n, None)), expected);
    }

    #[test]
    fn zero_quota_with_known_classes_stops_immediately() {
        let out: Vec<_> = sample_classes(classes("ab"), "class", 0, known(&["a"])).collect();
        assert!(out.is_empty());
    }

    #[test]
    fn stratified_sample_round_robin() {
        let out = stratified_sample(classes("aaabbc"), &SampleOptions::default().by("class")).unwrap();
        assert_eq!(labels(out), "abc");

        let out = stratified_sample(classes("aaabbc"), &SampleOptions::default().by("class").n(2)).unwrap();
        assert_eq!(labels(out), "abcab");
    }

    #[test]
    fn shuffled_sample_is_seeded() {
        let options = SampleOptions::default().by("class").n(3).shuffled(Some(11));
        let ids = |options: &SampleOptions| -> Vec<i64> {
            stratified_sample(classes("aaaaaabbbbbb"), options)
                .unwrap()
                .values("i")
                .map(|v| v.unwrap().as_int().unwrap())
                .collect()
        };
        assert_eq!(ids(&options), ids(&options));
        assert_eq!(ids(&options).len(), 6);
    }

    #[test]
    fn sample_by_split_balances_each_split() {
        let input = "aaabbbab".chars().enumerate().map(|(i, c)| {
            Ok(LazyRecord::new()
                .with("class", c.to_string())
                .with("split", if i < 6 { "Train" } else { "Test" }))
        });
        let options = SampleOptions::default().by("class");
        let out = stratified_sample_by_split(input, "split", &options).unwrap();
        assert_eq!(labels(out), "abababab");
    }

    #[test]
    fn counts_and_filters() {
        let counts = count_classes(classes("abca"), "class").unwrap();
        assert_eq!(counts[&Key::from("a")], 2);
        assert_eq!(counts.len(), 3);

        let tagged = as_field(["Train", "Test", "Train", "Unknown"], "split");
        assert_eq!(filter_split(tagged, "split", SplitType::Train).count(), 2);
    }

    #[test]
    fn partition_from_tagged() {
        let tagged = as_field(["Train", "Test", "Validation", "Train", "Unknown"], "split");
        let partition = Partition::from_tagged(tagged, "split").unwrap();
        assert_eq!(partition.train.len(), 2);
        assert_eq!(partition.part(SplitType::Validation).len(), 1);
        assert_eq!(partition.test.len(), 1);
        assert_eq!(partition.unknown.len(), 1);

        let bad = as_field(["Holdout"], "split");
        assert!(Partition::from_tagged(bad, "split").is_err());
    }

    #[test]
    fn manifest_verification() {
        let records: Vec<_> = ["/x/a.jpg", "/y/b.jpg"]
            .iter()
            .map(|f| LazyRecord::new().with("filename", *f))
            .collect();
        let mut manifest = SplitManifest::new();
        manifest.insert(SplitType::Train, "a.jpg").unwrap();
        manifest.insert(SplitType::Test, "b.jpg").unwrap();
        verify_manifest(&records, &manifest, "filename").unwrap();

        manifest.insert(SplitType::Test, "c.jpg").unwrap();
        match verify_manifest(&records[..1], &manifest, "filename") {
            Err(Error::SplitIntegrity {
                missing_from_manifest,
                missing_from_stream,
            }) => {
                assert!(missing_from_manifest.is_empty());
                assert_eq!(missing_from_stream, vec!["b.jpg".to_string(), "c.jpg".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
