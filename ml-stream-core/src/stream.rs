//! Chainable operators on record streams
//!
//! A record stream is any `Iterator<Item = Result<LazyRecord>>`. It is pulled
//! one record at a time and may be infinite. Errors travel as `Err` items;
//! consumers stop at the first one.

use crate::batch::{BatchOptions, Batches};
use crate::cache::{default_extension, suffix_path, ApplyCached, PathFn};
use crate::error::Result;
use crate::group::Groups;
use crate::ops::{
    Apply, ApplyBatched, ApplyOrSkip, ApplyWhole, Counts, Delay, DropFields, EnsureField, Filter,
    InspectFirst, Progress, ProjectFields, Scan, SelfApply, Shard, Summarize, Tap, Unfold, Unroll,
};
use crate::record::{tag_failure, EvalStrategy, LazyRecord};
use crate::transform::{Transform, Transformed};
use crate::value::{Fields, Value};
use crate::window::SlidingWindow;

/// Stream of extracted field values
pub struct Values<I> {
    source: I,
    fields: Fields,
}

impl<I> Iterator for Values<I>
where
    I: Iterator<Item = Result<LazyRecord>>,
{
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.source.next()?;
        Some(record.and_then(|r| r.extract(&self.fields)))
    }
}

/// Operators available on every record stream
pub trait RecordStream: Iterator<Item = Result<LazyRecord>> + Sized {
    /// Run the stream through a stage or a chain of stages
    fn transform<T: Transform>(self, stage: T) -> Transformed<Self, T> {
        Transformed::new(self, stage)
    }

    /// Compute `dst` eagerly from `src`
    fn apply<F>(self, src: impl Into<Fields>, dst: impl Into<String>, f: F) -> Transformed<Self, Apply>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(Apply::new(src, dst, f))
    }

    /// Compute `dst` from `src` under `strategy`
    fn apply_with<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        strategy: EvalStrategy,
        f: F,
    ) -> Transformed<Self, Apply>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(Apply::new(src, dst, f).with_strategy(strategy))
    }

    /// Compute `dst` eagerly from the whole record
    fn apply_whole<F>(self, dst: impl Into<String>, f: F) -> Transformed<Self, ApplyWhole>
    where
        F: Fn(&LazyRecord) -> anyhow::Result<Value> + 'static,
    {
        self.transform(ApplyWhole::new(dst, f))
    }

    /// Compute `dst` from the whole record under `strategy`
    fn apply_whole_with<F>(
        self,
        dst: impl Into<String>,
        strategy: EvalStrategy,
        f: F,
    ) -> Transformed<Self, ApplyWhole>
    where
        F: Fn(&LazyRecord) -> anyhow::Result<Value> + 'static,
    {
        self.transform(ApplyWhole::new(dst, f).with_strategy(strategy))
    }

    /// Replace `field` with a function of its value
    fn self_apply<F>(self, field: impl Into<String>, f: F) -> Transformed<Self, SelfApply>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(SelfApply::new(field, f))
    }

    /// Compute `dst` eagerly, dropping records whose computation fails
    fn apply_or_skip<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        f: F,
    ) -> Transformed<Self, ApplyOrSkip>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(ApplyOrSkip::new(src, dst, f))
    }

    /// Skipping apply under `strategy`
    fn apply_or_skip_with<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        strategy: EvalStrategy,
        f: F,
    ) -> Transformed<Self, ApplyOrSkip>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(ApplyOrSkip::new(src, dst, f).with_strategy(strategy))
    }

    /// Compute `dst` through a disk cache located by `path_fn`
    fn apply_cached_to_disk<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        f: F,
        path_fn: PathFn,
    ) -> Transformed<Self, ApplyCached>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.transform(ApplyCached::new(src, dst, f, path_fn))
    }

    /// Disk-cached apply stored next to the file named by `filename`
    fn apply_cached<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        f: F,
    ) -> Transformed<Self, ApplyCached>
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        let dst = dst.into();
        let path_fn = suffix_path("filename", default_extension(&dst));
        self.apply_cached_to_disk(src, dst, f, path_fn)
    }

    /// Keep records whose predicate holds
    fn filter_records<P>(self, src: impl Into<Fields>, predicate: P) -> Transformed<Self, Filter>
    where
        P: Fn(&Value) -> anyhow::Result<bool> + 'static,
    {
        self.transform(Filter::new(src, predicate))
    }

    /// Keep only the named fields
    fn project_fields(self, names: impl Into<Fields>) -> Transformed<Self, ProjectFields> {
        self.transform(ProjectFields::new(names))
    }

    /// Remove the named fields
    fn drop_fields(self, names: impl Into<Fields>) -> Transformed<Self, DropFields> {
        self.transform(DropFields::new(names))
    }

    /// Drop records lacking `name`
    fn ensure_field(self, name: impl Into<String>) -> Transformed<Self, EnsureField> {
        self.transform(EnsureField::new(name))
    }

    /// Run a side effect on `src` of every record
    fn tap<F>(self, src: impl Into<Fields>, f: F) -> Transformed<Self, Tap>
    where
        F: Fn(&Value) -> anyhow::Result<()> + 'static,
    {
        self.transform(Tap::new(src, f))
    }

    /// Prefix scan of `src` into `dst`
    fn scan_field<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        init: impl Into<Value>,
        f: F,
    ) -> Transformed<Self, Scan<F>>
    where
        F: FnMut(Value, Value) -> anyhow::Result<Value>,
    {
        self.transform(Scan::new(src, dst, init, f))
    }

    /// Add `dst` from an internally advanced state
    fn unfold<S, F>(self, dst: impl Into<String>, init: S, f: F) -> Transformed<Self, Unfold<S, F>>
    where
        S: Clone + Into<Value>,
        F: FnMut(&S) -> S,
    {
        self.transform(Unfold::new(dst, init, f))
    }

    /// Number records into `dst`, counting from `start`
    fn enumerate_field(
        self,
        dst: impl Into<String>,
        start: i64,
    ) -> Transformed<Self, Unfold<i64, fn(&i64) -> i64>> {
        fn next(i: &i64) -> i64 {
            i + 1
        }
        self.transform(Unfold::new(dst, start, next as fn(&i64) -> i64))
    }

    /// Lag `field` by one record into `dst`
    fn delay(self, field: impl Into<String>, dst: impl Into<String>) -> Transformed<Self, Delay> {
        self.transform(Delay::new(field, dst))
    }

    /// Expand equal-length sequence fields into one record per position
    fn unroll(self, fields: impl Into<Fields>) -> Transformed<Self, Unroll> {
        self.transform(Unroll::new(fields))
    }

    /// Keep the `k`-th of every `n` records
    fn shard(self, k: usize, n: usize) -> Result<Transformed<Self, Shard>> {
        Ok(self.transform(Shard::new(k, n)?))
    }

    /// Call `f` once per `batch_size` values of `src`, writing results into `dst`
    fn apply_batched<F>(
        self,
        src: impl Into<Fields>,
        dst: impl Into<String>,
        batch_size: usize,
        f: F,
    ) -> Result<Transformed<Self, ApplyBatched<F>>>
    where
        F: FnMut(Vec<Value>) -> anyhow::Result<Vec<Value>>,
    {
        Ok(self.transform(ApplyBatched::new(src, dst, batch_size, f)?))
    }

    /// Log the fields of the first record
    fn inspect_first(self, message: impl Into<String>) -> Transformed<Self, InspectFirst> {
        self.transform(InspectFirst::new(message))
    }

    /// Log the number of records seen every `every` records
    fn progress(self, every: usize) -> Result<Transformed<Self, Progress>> {
        Ok(self.transform(Progress::new(every)?))
    }

    /// Count values of `field`, logging the counts at end of input
    fn summarize(self, field: impl Into<String>) -> Transformed<Self, Summarize> {
        self.transform(Summarize::new(field))
    }

    /// Count values of `field`, handing the counts to `callback` at end of input
    fn summarize_with(
        self,
        field: impl Into<String>,
        callback: impl FnMut(&Counts) + 'static,
    ) -> Transformed<Self, Summarize> {
        self.transform(Summarize::new(field).with_callback(callback))
    }

    /// Sliding windows of `size` samples over `fields`
    fn sliding_window(
        self,
        fields: impl Into<Fields>,
        size: usize,
        cache_depth: usize,
    ) -> Result<Transformed<Self, SlidingWindow>> {
        Ok(self.transform(SlidingWindow::new(fields, size, cache_depth)?))
    }

    /// Training batches with inferred shapes and element types
    fn as_batch(
        self,
        features: impl Into<Fields>,
        label: impl Into<String>,
        batch_size: usize,
    ) -> Result<Batches<Self>> {
        Batches::new(self, BatchOptions::new(features, label, batch_size))
    }

    /// Training batches with explicit options
    fn as_batch_with(self, options: BatchOptions) -> Result<Batches<Self>> {
        Batches::new(self, options)
    }

    /// Stream of the extracted values of `src`
    fn values(self, src: impl Into<Fields>) -> Values<Self> {
        Values {
            source: self,
            fields: src.into(),
        }
    }

    /// Strict left fold of `src`
    fn fold_field<S, F>(self, src: impl Into<Fields>, init: S, mut f: F) -> Result<S>
    where
        F: FnMut(S, Value) -> anyhow::Result<S>,
    {
        let src = src.into();
        let mut state = init;
        for record in self {
            let value = record?.extract(&src)?;
            state = f(state, value).map_err(|e| tag_failure(&src.label(), e))?;
        }
        Ok(state)
    }

    /// Partition the stream by the value of `field`
    fn group_by(self, field: &str) -> Result<Groups> {
        Groups::from_records(self, field)
    }
}

impl<I> RecordStream for I where I: Iterator<Item = Result<LazyRecord>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::flow::from_records;
    use crate::transform::TransformChain;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn numbers(n: i64) -> impl Iterator<Item = Result<LazyRecord>> {
        from_records((1..=n).map(|i| LazyRecord::new().with("x", i)))
    }

    fn sum(s: i64, v: Value) -> anyhow::Result<i64> {
        Ok(s + v.as_int()?)
    }

    #[test]
    fn fold_sums_to_5050() {
        assert_eq!(numbers(100).fold_field("x", 0, sum).unwrap(), 5050);
    }

    proptest! {
        #[test]
        fn fold_matches_closed_form(n in 0i64..500) {
            prop_assert_eq!(numbers(n).fold_field("x", 0, sum).unwrap(), n * (n + 1) / 2);
        }
    }

    #[test]
    fn chained_operators() {
        let out: Vec<_> = numbers(10)
            .apply("x", "sq", |v| Ok(Value::Int(v.as_int()?.pow(2))))
            .filter_records("sq", |v| Ok(v.as_int()? % 2 == 0))
            .enumerate_field("n", 0)
            .project_fields(["n", "sq"])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[4].get("n").unwrap(), Value::Int(4));
        assert_eq!(out[4].get("sq").unwrap(), Value::Int(100));
        assert_eq!(out[0].names().collect::<Vec<_>>(), vec!["n", "sq"]);
    }

    #[test]
    fn lazy_pipeline_evaluates_only_what_is_read() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let values: Vec<_> = numbers(5)
            .apply_with("x", "heavy", EvalStrategy::LazyMemoized, move |v| {
                counter.set(counter.get() + 1);
                Ok(v)
            })
            .shard(0, 2)
            .unwrap()
            .values("heavy")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::Int(3), Value::Int(5)]);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn errors_fail_fast() {
        let result: Result<Vec<_>> = numbers(3)
            .apply("x", "y", |v| {
                anyhow::ensure!(v.as_int()? < 2, "too big");
                Ok(v)
            })
            .collect();
        assert!(matches!(result, Err(Error::Transform { field, .. }) if field == "y"));
    }

    #[test]
    fn explicit_chain_matches_methods() {
        let chain = TransformChain::default()
            .then(Apply::new("x", "y", |v| Ok(Value::Int(v.as_int()? + 1))))
            .then(Delay::new("y", "prev_y"));
        let out: Vec<_> = numbers(3).transform(chain).collect::<Result<_>>().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get("prev_y").unwrap(), Value::Int(3));
    }

    #[test]
    fn group_by_partitions() {
        let groups = numbers(6)
            .apply("x", "parity", |v| Ok(Value::Int(v.as_int()? % 2)))
            .group_by("parity")
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.keys()[0], crate::value::Key::Int(1));
    }

    #[test]
    fn as_batch_over_stream() {
        let batches: Vec<_> = numbers(8)
            .apply("x", "label", |v| Ok(Value::Int(v.as_int()? % 2)))
            .as_batch("x", "label", 4)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].labels.shape(), &[4, 1]);
    }
}
