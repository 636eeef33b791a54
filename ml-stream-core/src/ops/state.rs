//! Stages that carry state across records
//!
//! Each keeps only its minimal running state and makes a single pass.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{Error, Result};
use crate::record::{tag_failure, LazyRecord};
use crate::transform::{Control, Transform};
use crate::value::{Fields, Key, Value};

/// Prefix scan writing the running state into `dst` on every record
pub struct Scan<F> {
    src: Fields,
    dst: String,
    state: Value,
    init: Value,
    f: F,
}

impl<F> Scan<F>
where
    F: FnMut(Value, Value) -> anyhow::Result<Value>,
{
    /// Create a scan; `f` receives the state and the extracted value
    pub fn new(src: impl Into<Fields>, dst: impl Into<String>, init: impl Into<Value>, f: F) -> Self {
        let init = init.into();
        Self {
            src: src.into(),
            dst: dst.into(),
            state: init.clone(),
            init,
            f,
        }
    }
}

impl<F> Transform for Scan<F>
where
    F: FnMut(Value, Value) -> anyhow::Result<Value>,
{
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let value = record.extract(&self.src)?;
        // A failed step leaves the previous state in place
        self.state = (self.f)(self.state.clone(), value).map_err(|e| tag_failure(&self.dst, e))?;
        record.set(&self.dst, self.state.clone());
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.state = self.init.clone();
    }

    fn name(&self) -> &'static str {
        "scan"
    }
}

/// Adds a field holding an internally advanced state
pub struct Unfold<S, F> {
    dst: String,
    state: S,
    f: F,
}

impl<S, F> Unfold<S, F>
where
    S: Clone + Into<Value>,
    F: FnMut(&S) -> S,
{
    /// Create an unfold starting at `init`
    pub fn new(dst: impl Into<String>, init: S, f: F) -> Self {
        Self {
            dst: dst.into(),
            state: init,
            f,
        }
    }
}

impl<S, F> Transform for Unfold<S, F>
where
    S: Clone + Into<Value>,
    F: FnMut(&S) -> S,
{
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let next = (self.f)(&self.state);
        let current = std::mem::replace(&mut self.state, next);
        record.set(&self.dst, current);
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "unfold"
    }
}

/// One-step lag: `dst` of each record is `field` of the previous one
///
/// The first record is dropped. The lagged field shares its cell with the
/// previous record, so lazy fields stay lazy.
pub struct Delay {
    field: String,
    dst: String,
    previous: Option<LazyRecord>,
}

impl Delay {
    /// Create a lag stage
    pub fn new(field: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dst: dst.into(),
            previous: None,
        }
    }
}

impl Transform for Delay {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let current = record.clone();
        if let Some(previous) = self.previous.replace(current) {
            record.link(&self.dst, &previous, &self.field)?;
            out.push_back(record);
        }
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.previous = None;
    }

    fn name(&self) -> &'static str {
        "delay"
    }
}

/// Expands sequence fields into one record per position
///
/// The named fields must hold lists or tensors of equal length; tensors are
/// split along their leading axis. Other fields are shared by every output.
pub struct Unroll {
    fields: Vec<String>,
}

impl Unroll {
    /// Create an unroll over `fields`
    pub fn new(fields: impl Into<Fields>) -> Self {
        Self {
            fields: fields.into().names().into_iter().map(str::to_string).collect(),
        }
    }
}

impl Transform for Unroll {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let columns = self
            .fields
            .iter()
            .map(|name| record.get(name)?.into_items())
            .collect::<Result<Vec<_>>>()?;

        let len = columns.first().map_or(0, Vec::len);
        if let Some((name, column)) = self.fields.iter().zip(&columns).find(|(_, c)| c.len() != len) {
            return Err(Error::InvalidArgument(format!(
                "Cannot unroll field '{name}' of length {} alongside length {len}",
                column.len()
            )));
        }

        let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
        for _ in 0..len {
            let mut expanded = record.clone();
            for (name, column) in self.fields.iter().zip(columns.iter_mut()) {
                if let Some(value) = column.next() {
                    expanded.set(name.as_str(), value);
                }
            }
            out.push_back(expanded);
        }
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "unroll"
    }
}

/// Keeps the `k`-th of every `n` records
pub struct Shard {
    k: usize,
    n: usize,
    index: usize,
}

impl Shard {
    /// Create a shard stage; requires `k < n`
    pub fn new(k: usize, n: usize) -> Result<Self> {
        if k >= n {
            return Err(Error::InvalidArgument(format!(
                "Shard index {k} must be below shard count {n}"
            )));
        }
        Ok(Self { k, n, index: 0 })
    }
}

impl Transform for Shard {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        if self.index % self.n == self.k {
            out.push_back(record);
        }
        self.index += 1;
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.index = 0;
    }

    fn name(&self) -> &'static str {
        "shard"
    }
}

/// Calls a function once per batch of extracted values
///
/// Result `i` of each call is written into record `i` of the batch. A
/// trailing partial batch is processed at end of input.
pub struct ApplyBatched<F> {
    src: Fields,
    dst: String,
    batch_size: usize,
    f: F,
    records: Vec<LazyRecord>,
    args: Vec<Value>,
}

impl<F> ApplyBatched<F>
where
    F: FnMut(Vec<Value>) -> anyhow::Result<Vec<Value>>,
{
    /// Create a batched apply; requires `batch_size >= 1`
    pub fn new(src: impl Into<Fields>, dst: impl Into<String>, batch_size: usize, f: F) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("Batch size must be at least 1".into()));
        }
        Ok(Self {
            src: src.into(),
            dst: dst.into(),
            batch_size,
            f,
            records: Vec::with_capacity(batch_size),
            args: Vec::with_capacity(batch_size),
        })
    }

    /// Call `f` on the pending batch; a failed batch is dropped whole
    fn run(&mut self, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        let records = std::mem::take(&mut self.records);
        let args = std::mem::take(&mut self.args);
        let expected = args.len();
        let results = (self.f)(args).map_err(|e| tag_failure(&self.dst, e))?;
        if results.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "Batched function returned {} results for {expected} inputs",
                results.len()
            )));
        }
        for (mut record, value) in records.into_iter().zip(results) {
            record.set(&self.dst, value);
            out.push_back(record);
        }
        Ok(())
    }
}

impl<F> Transform for ApplyBatched<F>
where
    F: FnMut(Vec<Value>) -> anyhow::Result<Vec<Value>>,
{
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        self.args.push(record.extract(&self.src)?);
        self.records.push(record);
        if self.records.len() == self.batch_size {
            self.run(out)?;
        }
        Ok(Control::Continue)
    }

    fn flush(&mut self, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        self.run(out)
    }

    fn reset(&mut self) {
        self.records.clear();
        self.args.clear();
    }

    fn name(&self) -> &'static str {
        "apply_batched"
    }
}

/// Logs how many records went through, every `every` records and at end of input
pub struct Progress {
    every: usize,
    seen: usize,
}

impl Progress {
    /// Create a progress stage; requires `every >= 1`
    pub fn new(every: usize) -> Result<Self> {
        if every == 0 {
            return Err(Error::InvalidArgument("Progress interval must be at least 1".into()));
        }
        Ok(Self { every, seen: 0 })
    }

    /// Records passed through so far
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl Transform for Progress {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        self.seen += 1;
        if self.seen % self.every == 0 {
            tracing::info!("Processed {} records", self.seen);
        }
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn flush(&mut self, _out: &mut VecDeque<LazyRecord>) -> Result<()> {
        tracing::info!("Finished after {} records", self.seen);
        Ok(())
    }

    fn reset(&mut self) {
        self.seen = 0;
    }

    fn name(&self) -> &'static str {
        "progress"
    }
}

/// Logs the summary of the first record and passes everything through
pub struct InspectFirst {
    message: String,
    seen: bool,
}

impl InspectFirst {
    /// Create an inspection stage
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            seen: false,
        }
    }
}

impl Transform for InspectFirst {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        if !self.seen {
            self.seen = true;
            tracing::info!("{}\n{}", self.message, record.inspect());
        }
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn reset(&mut self) {
        self.seen = false;
    }

    fn name(&self) -> &'static str {
        "inspect_first"
    }
}

/// Value counts of one field
pub type Counts = BTreeMap<Key, usize>;

/// Counts the values of a field while passing records through
///
/// Records lacking the field are not counted. At end of input the counts
/// are logged and handed to the callback, if any.
pub struct Summarize {
    field: String,
    counts: Counts,
    callback: Option<Box<dyn FnMut(&Counts)>>,
}

impl Summarize {
    /// Create a summary stage
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            counts: Counts::new(),
            callback: None,
        }
    }

    /// Receive the counts at end of input
    #[must_use]
    pub fn with_callback(mut self, callback: impl FnMut(&Counts) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl Transform for Summarize {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        if record.contains(&self.field) {
            let key = Key::try_from(record.get(&self.field)?)?;
            *self.counts.entry(key).or_insert(0) += 1;
        }
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn flush(&mut self, _out: &mut VecDeque<LazyRecord>) -> Result<()> {
        for (key, count) in &self.counts {
            tracing::info!("{} = {}: {}", self.field, key, count);
        }
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.counts);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.counts.clear();
    }

    fn name(&self) -> &'static str {
        "summarize"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EvalStrategy;
    use crate::tensor::Tensor;
    use crate::transform::Transformed;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn numbers(n: i64) -> impl Iterator<Item = Result<LazyRecord>> {
        (1..=n).map(|i| Ok(LazyRecord::new().with("x", i)))
    }

    fn ints(records: &[LazyRecord], field: &str) -> Vec<i64> {
        records.iter().map(|r| r.get(field).unwrap().as_int().unwrap()).collect()
    }

    fn run(n: i64, stage: impl Transform) -> Vec<LazyRecord> {
        Transformed::new(numbers(n), stage).collect::<Result<_>>().unwrap()
    }

    #[test]
    fn scan_writes_running_sum() {
        let out = run(
            4,
            Scan::new("x", "sum", 0i64, |s, x| Ok(Value::Int(s.as_int()? + x.as_int()?))),
        );
        assert_eq!(ints(&out, "sum"), vec![1, 3, 6, 10]);
    }

    #[test]
    fn scan_keeps_state_after_a_failed_step() {
        let stage = Scan::new("x", "sum", 0i64, |s, x| {
            let x = x.as_int()?;
            anyhow::ensure!(x != 2, "bad input {x}");
            Ok(Value::Int(s.as_int()? + x))
        });
        let results: Vec<_> = Transformed::new(numbers(4), stage).collect();
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].as_ref().unwrap_err().field(), Some("sum"));

        let kept: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(ints(&kept, "x"), vec![1, 3, 4]);
        assert_eq!(ints(&kept, "sum"), vec![1, 4, 8]);
    }

    #[test]
    fn unfold_counts_up() {
        let out = run(3, Unfold::new("i", 10i64, |s| s + 1));
        assert_eq!(ints(&out, "i"), vec![10, 11, 12]);
    }

    #[test]
    fn delay_drops_first_record() {
        let out = run(4, Delay::new("x", "prev"));
        assert_eq!(ints(&out, "x"), vec![2, 3, 4]);
        assert_eq!(ints(&out, "prev"), vec![1, 2, 3]);
    }

    #[test]
    fn delay_shares_lazy_cells() {
        let calls = Rc::new(Cell::new(0));
        let input: Vec<Result<LazyRecord>> = (0..2)
            .map(|_| {
                let counter = Rc::clone(&calls);
                let mut record = LazyRecord::new();
                record.set_deferred("x", EvalStrategy::LazyMemoized, move || {
                    counter.set(counter.get() + 1);
                    Ok(Value::Int(7))
                });
                Ok(record)
            })
            .collect();
        let out: Vec<_> = Transformed::new(input.into_iter(), Delay::new("x", "prev"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(calls.get(), 0);
        out[0].get("prev").unwrap();
        out[0].get("prev").unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unroll_zips_sequences() {
        let record = LazyRecord::new()
            .with("id", "clip")
            .with("frame", vec![1i64, 2, 3])
            .with("label", Tensor::from_vec(vec![0u8, 1, 0], vec![3]).unwrap());
        let out: Vec<_> = Transformed::new(std::iter::once(Ok::<_, Error>(record)), Unroll::new(["frame", "label"]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(ints(&out, "frame"), vec![1, 2, 3]);
        assert_eq!(out[1].get("label").unwrap().as_tensor().unwrap().get(&[]).unwrap(), 1.0);
        assert_eq!(out[2].get("id").unwrap(), Value::Str("clip".into()));
    }

    #[test]
    fn unroll_rejects_unequal_lengths() {
        let record = LazyRecord::new()
            .with("a", vec![1i64, 2, 3])
            .with("b", vec![1i64, 2]);
        let result: Result<Vec<_>> =
            Transformed::new(std::iter::once(Ok::<_, Error>(record)), Unroll::new(["a", "b"])).collect();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn shard_takes_every_nth() {
        let out = run(10, Shard::new(1, 3).unwrap());
        assert_eq!(ints(&out, "x"), vec![2, 5, 8]);
        assert!(Shard::new(3, 3).is_err());
    }

    #[test]
    fn batched_apply_flushes_remainder() {
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&sizes);
        let stage = ApplyBatched::new("x", "y", 4, move |args: Vec<Value>| {
            seen.borrow_mut().push(args.len());
            args.into_iter()
                .map(|v| -> anyhow::Result<Value> { Ok(Value::Int(v.as_int()? * 10)) })
                .collect()
        })
        .unwrap();
        let out = run(10, stage);
        assert_eq!(ints(&out, "y"), (1..=10).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(*sizes.borrow(), vec![4, 4, 2]);
    }

    #[test]
    fn failed_batch_does_not_shift_later_results() {
        let mut calls = 0;
        let stage = ApplyBatched::new("x", "y", 2, move |args: Vec<Value>| {
            calls += 1;
            anyhow::ensure!(calls > 1, "first batch fails");
            args.into_iter()
                .map(|v| -> anyhow::Result<Value> { Ok(Value::Int(v.as_int()? * 10)) })
                .collect()
        })
        .unwrap();
        let results: Vec<_> = Transformed::new(numbers(4), stage).collect();
        assert!(results[0].is_err());

        let kept: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(ints(&kept, "x"), vec![3, 4]);
        assert_eq!(ints(&kept, "y"), vec![30, 40]);
    }

    #[test]
    fn progress_counts_every_record() {
        let mut stream = Transformed::new(numbers(7), Progress::new(3).unwrap());
        assert_eq!(stream.by_ref().count(), 7);
        assert_eq!(stream.stage().seen(), 7);
        assert!(Progress::new(0).is_err());
    }

    #[test]
    fn batched_apply_checks_result_count() {
        let stage = ApplyBatched::new("x", "y", 2, |_args| Ok(vec![Value::Null])).unwrap();
        let result: Result<Vec<_>> = Transformed::new(numbers(2), stage).collect();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn summarize_reports_counts() {
        let counts = Rc::new(RefCell::new(Counts::new()));
        let sink = Rc::clone(&counts);
        let input = ["a", "b", "a", "a"]
            .into_iter()
            .map(|c| Ok::<_, Error>(LazyRecord::new().with("class", c)))
            .chain(std::iter::once(Ok::<_, Error>(LazyRecord::new())));
        let stage = Summarize::new("class").with_callback(move |c| *sink.borrow_mut() = c.clone());
        let out: Vec<_> = Transformed::new(input, stage).collect::<Result<_>>().unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(counts.borrow().get(&Key::from("a")), Some(&3));
        assert_eq!(counts.borrow().get(&Key::from("b")), Some(&1));
    }
}
