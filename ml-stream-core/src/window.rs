//! Sliding windows over tensor fields

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::record::LazyRecord;
use crate::tensor::Tensor;
use crate::transform::{Control, Transform};
use crate::value::{Fields, Value};

/// Emits every contiguous window of `size` samples, once and in order
///
/// Samples are buffered per field, `size * cache_depth` at a time. When the
/// buffer fills, every window that does not reach its last sample is
/// emitted and the buffer is cut down to its last `size` samples. Output
/// records hold one tensor per field shaped `(size, *sample_shape)`.
pub struct SlidingWindow {
    fields: Vec<String>,
    size: usize,
    capacity: usize,
    buffers: Vec<VecDeque<Tensor>>,
}

impl SlidingWindow {
    /// Create a window stage; requires `size >= 1` and `cache_depth >= 2`
    pub fn new(fields: impl Into<Fields>, size: usize, cache_depth: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidArgument("Window size must be at least 1".into()));
        }
        if cache_depth < 2 {
            return Err(Error::InvalidArgument(format!(
                "Cache depth must be at least 2, got {cache_depth}"
            )));
        }

        let fields: Vec<String> = fields.into().names().into_iter().map(str::to_string).collect();
        let capacity = size * cache_depth;
        Ok(Self {
            buffers: fields.iter().map(|_| VecDeque::with_capacity(capacity)).collect(),
            fields,
            size,
            capacity,
        })
    }

    fn window(&self, start: usize) -> Result<LazyRecord> {
        let mut record = LazyRecord::new();
        for (name, buffer) in self.fields.iter().zip(&self.buffers) {
            let samples: Vec<Tensor> = buffer.range(start..start + self.size).cloned().collect();
            record.set(name.as_str(), Value::Tensor(Tensor::stack(&samples)?));
        }
        Ok(record)
    }

    fn emit(&self, windows: usize, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        for start in 0..windows {
            out.push_back(self.window(start)?);
        }
        Ok(())
    }

    fn buffered(&self) -> usize {
        self.buffers.first().map_or(0, VecDeque::len)
    }
}

impl Transform for SlidingWindow {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        for (name, buffer) in self.fields.iter().zip(self.buffers.iter_mut()) {
            buffer.push_back(record.get(name)?.to_tensor()?);
        }

        if self.buffered() == self.capacity {
            let windows = self.capacity - self.size;
            self.emit(windows, out)?;
            for buffer in &mut self.buffers {
                buffer.drain(..windows);
            }
        }
        Ok(Control::Continue)
    }

    fn flush(&mut self, out: &mut VecDeque<LazyRecord>) -> Result<()> {
        let n = self.buffered();
        if n >= self.size {
            self.emit(n - self.size + 1, out)?;
        }
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    fn name(&self) -> &'static str {
        "sliding_window"
    }
}
