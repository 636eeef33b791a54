//! Fixed-shape training batches

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::LazyRecord;
use crate::tensor::{DType, Tensor};
use crate::value::Fields;

/// Options for assembling training batches
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Feature field or fields; each yields one feature tensor
    pub features: Fields,

    /// Label field
    pub label: String,

    /// Number of records per batch
    pub batch_size: usize,

    /// Element type of the feature tensors; inferred when `None`
    pub dtype: Option<DType>,

    /// Element type of the label tensor; inferred when `None`
    pub label_dtype: Option<DType>,
}

impl BatchOptions {
    /// Options with inferred element types
    pub fn new(features: impl Into<Fields>, label: impl Into<String>, batch_size: usize) -> Self {
        Self {
            features: features.into(),
            label: label.into(),
            batch_size,
            dtype: None,
            label_dtype: None,
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("Batch size must be at least 1".into()));
        }
        let names = self.features.names();
        if names.is_empty() {
            return Err(Error::InvalidArgument("At least one feature field is required".into()));
        }
        if names.iter().any(|name| name.is_empty()) || self.label.is_empty() {
            return Err(Error::InvalidArgument("Batch field names must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new("features", "label", 16)
    }
}

/// One training batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// One tensor per feature field, shaped `(batch_size, *sample_shape)`
    pub features: Vec<Tensor>,

    /// Labels, shaped `(batch_size, *label_shape)`
    pub labels: Tensor,
}

impl Batch {
    /// The first feature tensor
    pub fn feature(&self) -> &Tensor {
        &self.features[0]
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.labels.shape().first().copied().unwrap_or(0)
    }

    /// Check if the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scalars are treated as one-element vectors
fn as_sample(tensor: Tensor) -> Result<Tensor> {
    if tensor.ndim() == 0 {
        tensor.reshape(vec![1])
    } else {
        Ok(tensor)
    }
}

fn allocate(sample: &Tensor, batch_size: usize, dtype: Option<DType>) -> Tensor {
    let mut shape = Vec::with_capacity(sample.ndim() + 1);
    shape.push(batch_size);
    shape.extend_from_slice(sample.shape());
    Tensor::zeros(dtype.unwrap_or(sample.dtype()), shape)
}

/// Iterator assembling batches from a record stream
///
/// Each batch pulls exactly `batch_size` records and reads every required
/// field once per record. Shapes and element types are inferred from the
/// first record of each batch; later samples of another shape fail with
/// `ShapeMismatch`. A trailing partial batch is discarded.
pub struct Batches<I> {
    source: I,
    options: BatchOptions,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Result<LazyRecord>>,
{
    /// Wrap `source`, validating the options
    pub fn new(source: I, options: BatchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            source,
            options,
            done: false,
        })
    }

    fn read(&self, record: &LazyRecord, name: &str) -> Result<Tensor> {
        as_sample(record.get(name)?.to_tensor()?)
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let size = self.options.batch_size;
        let names = self.options.features.names();
        let mut features: Vec<Tensor> = Vec::with_capacity(names.len());
        let mut labels: Option<Tensor> = None;

        for i in 0..size {
            let record = match self.source.next() {
                Some(record) => record?,
                None => {
                    if i > 0 {
                        tracing::debug!("Discarding partial batch of {} records", i);
                    }
                    self.done = true;
                    return Ok(None);
                }
            };

            let samples = names
                .iter()
                .map(|name| self.read(&record, name))
                .collect::<Result<Vec<_>>>()?;
            let label = self.read(&record, &self.options.label)?;

            if i == 0 {
                features = samples
                    .iter()
                    .map(|sample| allocate(sample, size, self.options.dtype))
                    .collect();
                let allocated = allocate(&label, size, self.options.label_dtype);
                let feature_shapes: Vec<_> =
                    features.iter().map(|t| (t.shape(), t.dtype())).collect();
                tracing::debug!(
                    "Inferred batch shapes: features {:?}, labels {:?} {:?}",
                    feature_shapes,
                    allocated.shape(),
                    allocated.dtype()
                );
                labels = Some(allocated);
            }

            for (batch, sample) in features.iter_mut().zip(&samples) {
                batch.set_row(i, sample)?;
            }
            if let Some(labels) = labels.as_mut() {
                labels.set_row(i, &label)?;
            }
        }

        Ok(labels.map(|labels| Batch { features, labels }))
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<LazyRecord>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.next_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::cell::Cell;
    use std::rc::Rc;
    use test_case::test_case;

    fn scalars(n: i64) -> impl Iterator<Item = Result<LazyRecord>> {
        (0..n).map(|i| Ok(LazyRecord::new().with("features", i).with("label", i % 2)))
    }

    #[test]
    fn eight_scalars_make_two_batches() {
        let batches: Vec<_> = Batches::new(scalars(8), BatchOptions::new("features", "label", 4))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].feature().shape(), &[4, 1]);
        assert_eq!(batches[0].labels.shape(), &[4, 1]);
        assert_eq!(batches[1].feature().as_slice::<i64>().unwrap(), &[4, 5, 6, 7]);
    }

    #[test_case(9, 2 ; "partial tail is discarded")]
    #[test_case(3, 0 ; "short stream yields nothing")]
    #[test_case(12, 3 ; "exact multiple")]
    fn batch_count(records: i64, expected: usize) {
        let count = Batches::new(scalars(records), BatchOptions::new("features", "label", 4))
            .unwrap()
            .count();
        assert_eq!(count, expected);
    }

    #[test]
    fn several_feature_fields() {
        let input = (0..2).map(|i| {
            Ok::<_, Error>(LazyRecord::new()
                .with("a", Tensor::vector(vec![i as f32; 3]))
                .with("b", 1.5f64)
                .with("label", i))
        });
        let mut options = BatchOptions::new(["a", "b"], "label", 2);
        options.dtype = Some(DType::Float32);
        let batch = Batches::new(input, options).unwrap().next().unwrap().unwrap();
        assert_eq!(batch.features.len(), 2);
        assert_eq!(batch.features[0].shape(), &[2, 3]);
        assert_eq!(batch.features[1].dtype(), DType::Float32);
        assert_eq!(batch.features[1].shape(), &[2, 1]);
    }

    #[test]
    fn reads_each_field_once() {
        let calls = Rc::new(Cell::new(0));
        let input: Vec<Result<LazyRecord>> = (0..2)
            .map(|_| {
                let counter = Rc::clone(&calls);
                let mut record = LazyRecord::new().with("label", 0i64);
                record.set_deferred("features", crate::record::EvalStrategy::OnDemand, move || {
                    counter.set(counter.get() + 1);
                    Ok(Value::Float(1.0))
                });
                Ok(record)
            })
            .collect();
        let batch = Batches::new(input.into_iter(), BatchOptions::new("features", "label", 2))
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn shape_change_inside_batch_fails() {
        let input: Vec<Result<LazyRecord>> = vec![
            Ok(LazyRecord::new().with("features", vec![1i64, 2]).with("label", 0i64)),
            Ok(LazyRecord::new().with("features", vec![1i64, 2, 3]).with("label", 1i64)),
        ];
        let result = Batches::new(input.into_iter(), BatchOptions::new("features", "label", 2))
            .unwrap()
            .next()
            .unwrap();
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(Batches::new(scalars(1), BatchOptions::new("features", "label", 0)).is_err());
    }

    #[test]
    fn empty_feature_list_is_rejected() {
        let options = BatchOptions::new(Fields::Many(Vec::new()), "label", 2);
        assert!(matches!(options.validate(), Err(Error::InvalidArgument(_))));
        assert!(Batches::new(scalars(2), options).is_err());
    }
}
