//! Dense tensors for sample fields, windows and training batches

use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 8-bit unsigned integer
    UInt8,
}

impl DType {
    /// Get the size of this type in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            DType::UInt8 => 1,
            DType::Float32 | DType::Int32 => 4,
            DType::Float64 | DType::Int64 => 8,
        }
    }

    /// Whether values of this type are floating point
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Float32 => "Float32",
            DType::Float64 => "Float64",
            DType::Int32 => "Int32",
            DType::Int64 => "Int64",
            DType::UInt8 => "UInt8",
        };
        f.write_str(name)
    }
}

/// Typed storage behind a tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    /// `f32` elements
    Float32(Vec<f32>),
    /// `f64` elements
    Float64(Vec<f64>),
    /// `i32` elements
    Int32(Vec<i32>),
    /// `i64` elements
    Int64(Vec<i64>),
    /// `u8` elements
    UInt8(Vec<u8>),
}

/// Trait for types that can be stored in tensors
pub trait Element: Pod + Send + Sync + 'static {
    /// The tensor element type this Rust type maps to
    const DTYPE: DType;

    /// Wrap a vector of elements into tensor storage
    fn wrap(data: Vec<Self>) -> TensorData;

    /// Borrow the storage as a slice of this type, if the types agree
    fn slice(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn wrap(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, Float32);
impl_element!(f64, Float64);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(u8, UInt8);

macro_rules! convert {
    ($data:expr, $t:ty) => {
        match $data {
            TensorData::Float32(v) => v.iter().map(|&x| x as $t).collect::<Vec<$t>>(),
            TensorData::Float64(v) => v.iter().map(|&x| x as $t).collect::<Vec<$t>>(),
            TensorData::Int32(v) => v.iter().map(|&x| x as $t).collect::<Vec<$t>>(),
            TensorData::Int64(v) => v.iter().map(|&x| x as $t).collect::<Vec<$t>>(),
            TensorData::UInt8(v) => v.iter().map(|&x| x as $t).collect::<Vec<$t>>(),
        }
    };
}

impl TensorData {
    fn dtype(&self) -> DType {
        match self {
            TensorData::Float32(_) => DType::Float32,
            TensorData::Float64(_) => DType::Float64,
            TensorData::Int32(_) => DType::Int32,
            TensorData::Int64(_) => DType::Int64,
            TensorData::UInt8(_) => DType::UInt8,
        }
    }

    fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::UInt8(v) => v.len(),
        }
    }

    fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Float32 => TensorData::Float32(vec![0.0; len]),
            DType::Float64 => TensorData::Float64(vec![0.0; len]),
            DType::Int32 => TensorData::Int32(vec![0; len]),
            DType::Int64 => TensorData::Int64(vec![0; len]),
            DType::UInt8 => TensorData::UInt8(vec![0; len]),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss, clippy::cast_lossless)]
    fn convert(&self, dtype: DType) -> Self {
        match dtype {
            DType::Float32 => TensorData::Float32(convert!(self, f32)),
            DType::Float64 => TensorData::Float64(convert!(self, f64)),
            DType::Int32 => TensorData::Int32(convert!(self, i32)),
            DType::Int64 => TensorData::Int64(convert!(self, i64)),
            DType::UInt8 => TensorData::UInt8(convert!(self, u8)),
        }
    }

    /// Copy `src` into `self[start..start + src.len()]`; both must share a type
    fn copy_range(&mut self, start: usize, src: &TensorData) -> Result<()> {
        let end = start + src.len();
        match (self, src) {
            (TensorData::Float32(d), TensorData::Float32(s)) => d[start..end].copy_from_slice(s),
            (TensorData::Float64(d), TensorData::Float64(s)) => d[start..end].copy_from_slice(s),
            (TensorData::Int32(d), TensorData::Int32(s)) => d[start..end].copy_from_slice(s),
            (TensorData::Int64(d), TensorData::Int64(s)) => d[start..end].copy_from_slice(s),
            (TensorData::UInt8(d), TensorData::UInt8(s)) => d[start..end].copy_from_slice(s),
            (d, s) => {
                return Err(Error::TypeMismatch(format!(
                    "cannot copy {} elements into a {} tensor",
                    s.dtype(),
                    d.dtype()
                )))
            }
        }
        Ok(())
    }

    fn sub_range(&self, start: usize, end: usize) -> Self {
        match self {
            TensorData::Float32(v) => TensorData::Float32(v[start..end].to_vec()),
            TensorData::Float64(v) => TensorData::Float64(v[start..end].to_vec()),
            TensorData::Int32(v) => TensorData::Int32(v[start..end].to_vec()),
            TensorData::Int64(v) => TensorData::Int64(v[start..end].to_vec()),
            TensorData::UInt8(v) => TensorData::UInt8(v[start..end].to_vec()),
        }
    }
}

/// A dense, row-major multidimensional tensor that owns its elements
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Shape of the tensor (dimensions)
    shape: Vec<usize>,

    /// Elements in row-major order
    data: TensorData,
}

impl Tensor {
    /// Create a zero-filled tensor with the given shape
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let size = shape.iter().product();
        Self {
            data: TensorData::zeros(dtype, size),
            shape,
        }
    }

    /// Create a tensor from a vector
    pub fn from_vec<T: Element>(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(Error::InvalidArgument(format!(
                "Vector length {} does not match shape product {}",
                data.len(),
                expected_size
            )));
        }

        Ok(Self {
            shape,
            data: T::wrap(data),
        })
    }

    /// Create a tensor from a slice
    pub fn from_slice<T: Element>(data: &[T], shape: Vec<usize>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a one-dimensional tensor holding `data`
    pub fn vector<T: Element>(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            data: T::wrap(data),
        }
    }

    /// Create a zero-dimensional tensor holding a single value
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: T::wrap(vec![value]),
        }
    }

    /// Get the shape of this tensor
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the element type of this tensor
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Get the total number of elements in this tensor
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this tensor is empty
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Get the number of dimensions in this tensor
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Calculate the size in bytes of this tensor
    pub fn size_bytes(&self) -> usize {
        self.len() * self.dtype().size_bytes()
    }

    /// Strides of this tensor, in elements, for each dimension
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0; self.shape.len()];
        let mut stride = 1;
        for i in (0..self.shape.len()).rev() {
            strides[i] = stride;
            stride *= self.shape[i];
        }
        strides
    }

    /// Borrow the elements as a typed slice, if `T` matches the element type
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// View the elements as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            TensorData::Float32(v) => bytemuck::cast_slice(v),
            TensorData::Float64(v) => bytemuck::cast_slice(v),
            TensorData::Int32(v) => bytemuck::cast_slice(v),
            TensorData::Int64(v) => bytemuck::cast_slice(v),
            TensorData::UInt8(v) => v,
        }
    }

    /// Copy the elements out as `f64` values
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.data.value_at(i)).collect()
    }

    /// Get the value at the specified indices, widened to `f64`
    pub fn get(&self, indices: &[usize]) -> Result<f64> {
        if indices.len() != self.shape.len() {
            return Err(Error::InvalidArgument(
                "Number of indices must match number of dimensions".into(),
            ));
        }

        let mut offset = 0;
        for ((&idx, &dim), stride) in indices.iter().zip(&self.shape).zip(self.strides()) {
            if idx >= dim {
                return Err(Error::InvalidArgument(format!(
                    "Index {idx} out of bounds for dimension of size {dim}"
                )));
            }
            offset += idx * stride;
        }

        Ok(self.data.value_at(offset))
    }

    /// Reshape this tensor to a new shape
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Self> {
        let new_size: usize = new_shape.iter().product();
        if new_size != self.len() {
            return Err(Error::InvalidArgument(format!(
                "Cannot reshape tensor of size {} to size {}",
                self.len(),
                new_size
            )));
        }

        Ok(Self {
            shape: new_shape,
            data: self.data.clone(),
        })
    }

    /// Convert this tensor to another element type
    pub fn cast(&self, dtype: DType) -> Self {
        if dtype == self.dtype() {
            return self.clone();
        }
        Self {
            shape: self.shape.clone(),
            data: self.data.convert(dtype),
        }
    }

    /// Number of elements in one slice along the leading axis
    fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Copy the `index`-th slice along the leading axis into a new tensor
    pub fn row(&self, index: usize) -> Result<Self> {
        let rows = self.shape.first().copied().ok_or_else(|| {
            Error::InvalidArgument("Cannot take a row of a zero-dimensional tensor".into())
        })?;
        if index >= rows {
            return Err(Error::InvalidArgument(format!(
                "Row {index} out of bounds for leading dimension of size {rows}"
            )));
        }

        let row_len = self.row_len();
        let start = index * row_len;
        Ok(Self {
            shape: self.shape[1..].to_vec(),
            data: self.data.sub_range(start, start + row_len),
        })
    }

    /// Split this tensor into its slices along the leading axis
    pub fn unstack(&self) -> Result<Vec<Self>> {
        let rows = self.shape.first().copied().ok_or_else(|| {
            Error::InvalidArgument("Cannot unstack a zero-dimensional tensor".into())
        })?;
        (0..rows).map(|i| self.row(i)).collect()
    }

    /// Copy `sample` into the `index`-th slice along the leading axis,
    /// casting it to this tensor's element type
    pub fn set_row(&mut self, index: usize, sample: &Tensor) -> Result<()> {
        if self.shape.is_empty() || sample.shape() != &self.shape[1..] {
            return Err(Error::ShapeMismatch {
                expected: self.shape.get(1..).map(<[usize]>::to_vec).unwrap_or_default(),
                actual: sample.shape.clone(),
            });
        }
        if index >= self.shape[0] {
            return Err(Error::InvalidArgument(format!(
                "Row {index} out of bounds for leading dimension of size {}",
                self.shape[0]
            )));
        }

        let sample = sample.cast(self.dtype());
        let start = index * self.row_len();
        self.data.copy_range(start, &sample.data)
    }

    /// Stack tensors of identical shape and type along a new leading axis
    pub fn stack(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors.first().ok_or_else(|| {
            Error::InvalidArgument("Cannot stack an empty list of tensors".into())
        })?;

        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(first.shape());

        let mut stacked = Tensor::zeros(first.dtype(), shape);
        for (i, tensor) in tensors.iter().enumerate() {
            if tensor.dtype() != first.dtype() {
                return Err(Error::TypeMismatch(format!(
                    "cannot stack {} tensor with {} tensors",
                    tensor.dtype(),
                    first.dtype()
                )));
            }
            stacked.set_row(i, tensor)?;
        }
        Ok(stacked)
    }
}

impl TensorData {
    #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
    fn value_at(&self, offset: usize) -> f64 {
        match self {
            TensorData::Float32(v) => f64::from(v[offset]),
            TensorData::Float64(v) => v[offset],
            TensorData::Int32(v) => f64::from(v[offset]),
            TensorData::Int64(v) => v[offset] as f64,
            TensorData::UInt8(v) => f64::from(v[offset]),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor<{}>{:?}", self.dtype(), self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_checks_length() {
        assert!(Tensor::from_vec(vec![1.0f32, 2.0, 3.0], vec![2, 2]).is_err());
        let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.dtype(), DType::Float32);
        assert_eq!(t.size_bytes(), 16);
    }

    #[test]
    fn strides_are_row_major() {
        let t = Tensor::zeros(DType::Int64, vec![2, 3, 4]);
        assert_eq!(t.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn get_respects_bounds() {
        let t = Tensor::from_vec(vec![1i64, 2, 3, 4, 5, 6], vec![2, 3]).unwrap();
        assert_eq!(t.get(&[1, 2]).unwrap(), 6.0);
        assert!(t.get(&[2, 0]).is_err());
        assert!(t.get(&[0]).is_err());
    }

    #[test]
    fn stack_and_unstack() {
        let rows = vec![
            Tensor::vector(vec![1i64, 2]),
            Tensor::vector(vec![3i64, 4]),
            Tensor::vector(vec![5i64, 6]),
        ];
        let stacked = Tensor::stack(&rows).unwrap();
        assert_eq!(stacked.shape(), &[3, 2]);
        assert_eq!(stacked.as_slice::<i64>().unwrap(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(stacked.unstack().unwrap(), rows);
    }

    #[test]
    fn stack_rejects_mixed_shapes() {
        let rows = vec![Tensor::vector(vec![1i64, 2]), Tensor::vector(vec![3i64])];
        assert!(matches!(Tensor::stack(&rows), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn set_row_casts_to_target_type() {
        let mut batch = Tensor::zeros(DType::Float32, vec![2, 2]);
        batch.set_row(1, &Tensor::vector(vec![7i64, 8])).unwrap();
        assert_eq!(batch.as_slice::<f32>().unwrap(), &[0.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn reshape_keeps_elements() {
        let t = Tensor::vector(vec![1u8, 2, 3, 4, 5, 6]);
        let r = t.reshape(vec![3, 2]).unwrap();
        assert_eq!(r.shape(), &[3, 2]);
        assert_eq!(r.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert!(t.reshape(vec![4, 2]).is_err());
    }

    #[test]
    fn scalar_has_no_dimensions() {
        let s = Tensor::scalar(2.5f64);
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(&[]).unwrap(), 2.5);
        assert!(s.row(0).is_err());
    }
}
