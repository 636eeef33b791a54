//! Splits that survive across runs
//!
//! The first run stratifies the stream and saves the assignment as a
//! manifest. Later runs only look identifiers up in the manifest, so the
//! assignment stays fixed whatever the input order or seed.

use std::collections::{HashMap, VecDeque};

use ml_stream_core::flow::{from_records, rng_from_seed};
use ml_stream_core::{Control, LazyRecord, Transform, Transformed};

use crate::config::SplitConfig;
use crate::error::{Error, Result};
use crate::manifest::{ManifestStore, SplitManifest};
use crate::split_type::SplitType;
use crate::stratify::{basename, stratified_split};

/// Stream of records produced by a split
pub type SplitStream<'a> = Box<dyn Iterator<Item = ml_stream_core::Result<LazyRecord>> + 'a>;

/// Tags each record with the split its identifier is assigned to
pub struct SplitTagger {
    lookup: HashMap<String, SplitType>,
    id_field: String,
    split_field: String,
    strict: bool,
    unknown: usize,
}

impl SplitTagger {
    /// Tagger for `manifest`, reading and writing the fields named in `config`
    pub fn new(manifest: &SplitManifest, config: &SplitConfig) -> Self {
        Self {
            lookup: manifest.lookup(),
            id_field: config.id_field.clone(),
            split_field: config.split_field.clone(),
            strict: config.strict,
            unknown: 0,
        }
    }

    /// Number of records tagged `Unknown` so far
    pub fn unknown(&self) -> usize {
        self.unknown
    }
}

impl Transform for SplitTagger {
    fn process(
        &mut self,
        mut record: LazyRecord,
        out: &mut VecDeque<LazyRecord>,
    ) -> ml_stream_core::Result<Control> {
        let id = basename(record.get(&self.id_field)?.as_str()?);
        let split = match self.lookup.get(&id) {
            Some(split) => *split,
            None if self.strict => {
                return Err(ml_stream_core::Error::transform(
                    self.split_field.clone(),
                    Error::SplitIntegrity {
                        missing_from_manifest: vec![id],
                        missing_from_stream: Vec::new(),
                    },
                ));
            }
            None => {
                tracing::warn!("Identifier {} is not in the split manifest, tagging it Unknown", id);
                self.unknown += 1;
                SplitType::Unknown
            }
        };
        record.set(self.split_field.clone(), split);
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.unknown = 0;
    }

    fn name(&self) -> &'static str {
        "split_tagger"
    }
}

/// Tag every record with its split, creating the manifest on first use
///
/// With a stored manifest the stream is tagged as it is pulled. Otherwise
/// the stream is materialized and stratified by `config.key_field`, the
/// manifest is saved to `store`, and the records are tagged in their
/// original order.
pub fn persisted_split<'a, I>(
    stream: I,
    store: &dyn ManifestStore,
    config: &SplitConfig,
) -> Result<SplitStream<'a>>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
    I::IntoIter: 'a,
{
    config.validate()?;

    if let Some(manifest) = store.load()? {
        tracing::info!("Loaded split manifest with {} identifiers", manifest.len());
        let tagger = SplitTagger::new(&manifest, config);
        return Ok(Box::new(Transformed::new(stream.into_iter(), tagger)));
    }

    let records = stream
        .into_iter()
        .collect::<ml_stream_core::Result<Vec<_>>>()?;
    let mut rng = rng_from_seed(config.seed);
    let map = stratified_split(&records, &config.fractions, &config.key_field, &mut rng)?;
    let manifest = map.to_manifest(&records, &config.id_field)?;
    store.save(&manifest)?;
    tracing::info!(
        "Created split manifest: {} train, {} validation, {} test",
        manifest.ids(SplitType::Train).len(),
        manifest.ids(SplitType::Validation).len(),
        manifest.ids(SplitType::Test).len()
    );

    let tagger = SplitTagger::new(&manifest, config);
    Ok(Box::new(Transformed::new(from_records(records), tagger)))
}

/// Stratified split that is not saved anywhere
///
/// Records need no identifier field; the split is written straight from
/// the assignment, in the original order.
pub fn split<I>(
    stream: I,
    config: &SplitConfig,
) -> Result<impl Iterator<Item = ml_stream_core::Result<LazyRecord>>>
where
    I: IntoIterator<Item = ml_stream_core::Result<LazyRecord>>,
{
    config.validate()?;
    let mut records = stream
        .into_iter()
        .collect::<ml_stream_core::Result<Vec<_>>>()?;
    let mut rng = rng_from_seed(config.seed);
    let map = stratified_split(&records, &config.fractions, &config.key_field, &mut rng)?;

    for (record, split) in records.iter_mut().zip(map.as_slice()) {
        record.set(config.split_field.clone(), *split);
    }
    Ok(from_records(records))
}
