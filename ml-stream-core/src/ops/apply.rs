//! Field computations: apply, apply over the whole record, in-place apply
//! and the skipping variant

use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Result;
use crate::record::{tag_failure, EvalStrategy, LazyRecord};
use crate::transform::{Control, Transform};
use crate::value::{Fields, Value};

/// User function over an extracted value
pub type ValueFn = Rc<dyn Fn(Value) -> anyhow::Result<Value>>;

/// User function over a whole record
pub type RecordFn = Rc<dyn Fn(&LazyRecord) -> anyhow::Result<Value>>;

/// Computes `dst` from the `src` fields of every record
pub struct Apply {
    src: Fields,
    dst: String,
    strategy: EvalStrategy,
    f: ValueFn,
}

impl Apply {
    /// Create an eager apply stage
    pub fn new<F>(src: impl Into<Fields>, dst: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        Self {
            src: src.into(),
            dst: dst.into(),
            strategy: EvalStrategy::Value,
            f: Rc::new(f),
        }
    }

    /// Set the evaluation strategy of `dst`
    #[must_use]
    pub fn with_strategy(mut self, strategy: EvalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn label(&self) -> String {
        if self.dst.is_empty() {
            self.src.label()
        } else {
            self.dst.clone()
        }
    }

    /// Bind the computation to `record`
    ///
    /// Lazy strategies install a deferred slot over the source cells. An
    /// empty `dst` runs the function for its effects and writes nothing.
    fn bind(&self, record: &mut LazyRecord) -> Result<()> {
        if self.strategy.is_lazy() && !self.dst.is_empty() {
            let source = record.source(&self.src);
            let f = Rc::clone(&self.f);
            record.set_deferred(&self.dst, self.strategy, move || f(source.read()?));
            return Ok(());
        }

        let value = record.extract(&self.src)?;
        let result = (self.f)(value).map_err(|e| tag_failure(&self.label(), e))?;
        if !self.dst.is_empty() {
            record.set(&self.dst, result);
        }
        Ok(())
    }
}

impl Transform for Apply {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        self.bind(&mut record)?;
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "apply"
    }
}

/// Like [`Apply`], but drops records whose computation fails
///
/// Under a lazy strategy the function does not run at apply time, so
/// nothing is skipped and later read failures propagate.
pub struct ApplyOrSkip {
    inner: Apply,
    skipped: usize,
}

impl ApplyOrSkip {
    /// Create a skipping apply stage
    pub fn new<F>(src: impl Into<Fields>, dst: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        Self {
            inner: Apply::new(src, dst, f),
            skipped: 0,
        }
    }

    /// Set the evaluation strategy of `dst`
    #[must_use]
    pub fn with_strategy(mut self, strategy: EvalStrategy) -> Self {
        self.inner.strategy = strategy;
        self
    }

    /// Number of records dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Transform for ApplyOrSkip {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        match self.inner.bind(&mut record) {
            Ok(()) => out.push_back(record),
            Err(e) => {
                self.skipped += 1;
                tracing::debug!("Skipping record in {}: {}", self.inner.label(), e);
            }
        }
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.skipped = 0;
    }

    fn name(&self) -> &'static str {
        "apply_or_skip"
    }
}

/// Computes `dst` from the whole record
///
/// A lazy computation sees a snapshot of the record as it was when the
/// stage ran.
pub struct ApplyWhole {
    dst: String,
    strategy: EvalStrategy,
    f: RecordFn,
}

impl ApplyWhole {
    /// Create an eager whole-record apply stage
    pub fn new<F>(dst: impl Into<String>, f: F) -> Self
    where
        F: Fn(&LazyRecord) -> anyhow::Result<Value> + 'static,
    {
        Self {
            dst: dst.into(),
            strategy: EvalStrategy::Value,
            f: Rc::new(f),
        }
    }

    /// Set the evaluation strategy of `dst`
    #[must_use]
    pub fn with_strategy(mut self, strategy: EvalStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Transform for ApplyWhole {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        if self.strategy.is_lazy() && !self.dst.is_empty() {
            let snapshot = record.clone();
            let f = Rc::clone(&self.f);
            record.set_deferred(&self.dst, self.strategy, move || f(&snapshot));
        } else {
            let result = (self.f)(&record).map_err(|e| tag_failure(&self.dst, e))?;
            if !self.dst.is_empty() {
                record.set(&self.dst, result);
            }
        }
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "apply_whole"
    }
}

/// Replaces a field with a function of its own value
pub struct SelfApply {
    field: String,
    f: ValueFn,
}

impl SelfApply {
    /// Create an in-place apply stage
    pub fn new<F>(field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        Self {
            field: field.into(),
            f: Rc::new(f),
        }
    }
}

impl Transform for SelfApply {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let value = record.get(&self.field)?;
        let result = (self.f)(value).map_err(|e| tag_failure(&self.field, e))?;
        record.set(&self.field, result);
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "self_apply"
    }
}
