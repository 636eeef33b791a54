//! Transform trait and the iterator adapter that drives it

use std::collections::{BTreeSet, VecDeque};

use crate::error::Result;
use crate::record::LazyRecord;

/// Whether a stage accepts further input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep pulling records
    Continue,
    /// Stop pulling; the stage is flushed and the stream ends
    Stop,
}

/// A streaming stage over lazy records
///
/// A stage receives records one at a time and pushes zero or more records
/// to `out` for each. When its input ends, or after it returns
/// [`Control::Stop`], it is flushed once.
pub trait Transform {
    /// Process one record
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control>;

    /// Emit whatever the stage still holds at end of input
    fn flush(&mut self, _out: &mut VecDeque<LazyRecord>) -> Result<()> {
        Ok(())
    }

    /// Reset internal state (if applicable)
    fn reset(&mut self) {}

    /// Name of the stage, used in log events
    fn name(&self) -> &'static str;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        (**self).process(record, out)
    }

    fn flush(&mut self, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        (**self).flush(out)
    }

    fn reset(&mut self) {
        (**self).reset();
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A chain of transforms that can be executed as a single transform
pub struct TransformChain<T = Box<dyn Transform>> {
    /// The transforms in this chain
    transforms: Vec<T>,

    /// Indices of the stages that asked to stop
    stopped: BTreeSet<usize>,
}

impl<T> TransformChain<T> {
    /// Create a new transform chain
    pub fn new(transforms: Vec<T>) -> Self {
        Self {
            transforms,
            stopped: BTreeSet::new(),
        }
    }

    /// Get a reference to the transforms in this chain
    pub fn transforms(&self) -> &[T] {
        &self.transforms
    }
}

impl TransformChain<Box<dyn Transform>> {
    /// Append a stage to the chain
    #[must_use]
    pub fn then(mut self, stage: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(stage));
        self
    }
}

impl<T> Default for TransformChain<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Transform> TransformChain<T> {
    /// Feed `pending` through the stages from `from` onwards
    ///
    /// Records reaching a stage that has stopped are dropped.
    fn run_from(
        &mut self,
        from: usize,
        mut pending: VecDeque<LazyRecord>,
    ) -> Result<VecDeque<LazyRecord>> {
        for (i, stage) in self.transforms.iter_mut().enumerate().skip(from) {
            if self.stopped.contains(&i) {
                return Ok(VecDeque::new());
            }
            let mut next = VecDeque::new();
            for record in pending.drain(..) {
                if stage.process(record, &mut next)? == Control::Stop {
                    self.stopped.insert(i);
                    break;
                }
            }
            pending = next;
        }
        Ok(pending)
    }
}

impl<T: Transform> Transform for TransformChain<T> {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let produced = self.run_from(0, VecDeque::from([record]))?;
        out.extend(produced);
        Ok(if self.stopped.is_empty() {
            Control::Continue
        } else {
            Control::Stop
        })
    }

    fn flush(&mut self, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        // Stages ahead of a stopped stage are never pulled again
        let first = self.stopped.first().copied().unwrap_or(0);
        for i in first..self.transforms.len() {
            let mut flushed = VecDeque::new();
            self.transforms[i].flush(&mut flushed)?;
            let produced = self.run_from(i + 1, flushed)?;
            out.extend(produced);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.stopped.clear();
        for transform in &mut self.transforms {
            transform.reset();
        }
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Done,
}

/// Iterator adapter running a [`Transform`] over a record stream
///
/// Errors from the source are passed through unchanged. The stage is
/// flushed once, when the source is exhausted or the stage stops.
pub struct Transformed<I, T> {
    source: I,
    stage: T,
    pending: VecDeque<LazyRecord>,
    state: State,
}

impl<I, T> Transformed<I, T> {
    /// Wrap `source` with `stage`
    pub fn new(source: I, stage: T) -> Self {
        Self {
            source,
            stage,
            pending: VecDeque::new(),
            state: State::Running,
        }
    }

    /// Borrow the stage
    pub fn stage(&self) -> &T {
        &self.stage
    }
}

impl<I, T> Iterator for Transformed<I, T>
where
    I: Iterator<Item = Result<LazyRecord>>,
    T: Transform,
{
    type Item = Result<LazyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.state == State::Done {
                return None;
            }

            let finished = match self.source.next() {
                Some(Ok(record)) => match self.stage.process(record, &mut self.pending) {
                    Ok(control) => control == Control::Stop,
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e)),
                None => true,
            };

            if finished {
                self.state = State::Done;
                if let Err(e) = self.stage.flush(&mut self.pending) {
                    return Some(Err(e));
                }
            }
        }
    }
}
