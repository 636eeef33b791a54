//! Write-once disk cache for computed fields
//!
//! The artifact path of a record is given by a path function. If a file
//! exists there, the value is decoded from it. Otherwise the value is
//! computed, written and returned. There is no expiry and no checksum, and
//! at most one writer may target a path.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::Result;
use crate::ops::ValueFn;
use crate::record::{tag_failure, EvalStrategy, LazyRecord};
use crate::transform::{Control, Transform};
use crate::value::{Fields, Value};

/// Maps a record to the path of its cached artifact
pub type PathFn = Rc<dyn Fn(&LazyRecord) -> Result<PathBuf>>;

/// Path function appending `extension` to the string in `id_field`
pub fn suffix_path(id_field: impl Into<String>, extension: impl Into<String>) -> PathFn {
    let id_field = id_field.into();
    let extension = extension.into();
    Rc::new(move |record| {
        let id = record.get(&id_field)?;
        Ok(PathBuf::from(format!("{}{extension}", id.as_str()?)))
    })
}

/// Default cache file extension for `dst`
pub fn default_extension(dst: &str) -> String {
    format!("{dst}.bin")
}

/// Decode the value at `path`, or compute and store it
pub fn load_or_compute(path: &Path, compute: impl FnOnce() -> Result<Value>) -> Result<Value> {
    if path.is_file() {
        tracing::debug!("Cache hit: {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        return Ok(bincode::deserialize_from(reader)?);
    }

    tracing::debug!("Cache miss: {}", path.display());
    let value = compute()?;
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &value)?;
    writer.flush()?;
    Ok(value)
}

/// Apply stage whose results are cached on disk
///
/// Defaults to `LazyMemoized`, so neither the file nor the function is
/// touched until the field is read.
pub struct ApplyCached {
    src: Fields,
    dst: String,
    strategy: EvalStrategy,
    f: ValueFn,
    path_fn: PathFn,
}

impl ApplyCached {
    /// Create a cached apply stage with an explicit path function
    pub fn new<F>(src: impl Into<Fields>, dst: impl Into<String>, f: F, path_fn: PathFn) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        Self {
            src: src.into(),
            dst: dst.into(),
            strategy: EvalStrategy::LazyMemoized,
            f: Rc::new(f),
            path_fn,
        }
    }

    /// Set the evaluation strategy of `dst`
    #[must_use]
    pub fn with_strategy(mut self, strategy: EvalStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Transform for ApplyCached {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let path = (self.path_fn)(&record)?;
        let source = record.source(&self.src);
        let f = Rc::clone(&self.f);
        let dst = self.dst.clone();
        let compute = move || {
            load_or_compute(&path, || {
                let value = source.read()?;
                f(value).map_err(|e| tag_failure(&dst, e))
            })
        };

        if self.strategy.is_lazy() {
            record.set_deferred(&self.dst, self.strategy, move || Ok(compute()?));
        } else {
            let value = compute()?;
            record.set(&self.dst, value);
        }
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "apply_cached"
    }
}
