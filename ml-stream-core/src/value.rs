//! Dynamically typed field values
//!
//! Record fields hold a [`Value`]. Type correctness is left to the caller;
//! the checked accessors only report a mismatch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::{DType, Tensor};

/// A single field value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
    /// Ordered list of values
    List(Vec<Value>),
    /// Dense tensor
    Tensor(Tensor),
}

impl Value {
    /// Short name of the runtime type, with dtype and shape for tensors
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "Null".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Str(_) => "Str".to_string(),
            Value::List(items) => format!("List[{}]", items.len()),
            Value::Tensor(t) => format!("Tensor<{}>{:?}", t.dtype(), t.shape()),
        }
    }

    fn mismatch(&self, wanted: &str) -> Error {
        Error::TypeMismatch(format!("expected {wanted}, found {}", self.describe()))
    }

    /// Get the value as an integer
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch("Int")),
        }
    }

    /// Get the value as a float; integers are widened
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(other.mismatch("Float")),
        }
    }

    /// Get the value as a boolean
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(other.mismatch("Bool")),
        }
    }

    /// Borrow the value as a string
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(other.mismatch("Str")),
        }
    }

    /// Borrow the value as a tensor
    pub fn as_tensor(&self) -> Result<&Tensor> {
        match self {
            Value::Tensor(t) => Ok(t),
            other => Err(other.mismatch("Tensor")),
        }
    }

    /// Borrow the value as a list
    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.mismatch("List")),
        }
    }

    /// Take the value as a list
    pub fn into_list(self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.mismatch("List")),
        }
    }

    /// Check if the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Number of elements along the leading axis, for lists and tensors
    pub fn seq_len(&self) -> Result<usize> {
        match self {
            Value::List(items) => Ok(items.len()),
            Value::Tensor(t) if t.ndim() > 0 => Ok(t.shape()[0]),
            other => Err(other.mismatch("List or Tensor")),
        }
    }

    /// Split a list or tensor into its elements along the leading axis
    pub fn into_items(self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items),
            Value::Tensor(t) if t.ndim() > 0 => {
                Ok(t.unstack()?.into_iter().map(Value::Tensor).collect())
            }
            other => Err(other.mismatch("List or Tensor")),
        }
    }

    /// Convert the value into a tensor
    ///
    /// Integers and booleans become `Int64` scalars, floats `Float64`
    /// scalars. A list of numbers becomes a vector, `Float64` if any element
    /// is a float.
    pub fn to_tensor(&self) -> Result<Tensor> {
        match self {
            Value::Tensor(t) => Ok(t.clone()),
            Value::Int(v) => Ok(Tensor::scalar(*v)),
            Value::Bool(v) => Ok(Tensor::scalar(i64::from(*v))),
            Value::Float(v) => Ok(Tensor::scalar(*v)),
            Value::List(items) => {
                if items.iter().any(|v| matches!(v, Value::Float(_))) {
                    let values = items.iter().map(Value::as_float).collect::<Result<Vec<_>>>()?;
                    Ok(Tensor::vector(values))
                } else {
                    let values = items
                        .iter()
                        .map(|v| match v {
                            Value::Bool(b) => Ok(i64::from(*b)),
                            other => other.as_int(),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let tensor = Tensor::vector(values);
                    Ok(if items.is_empty() { tensor.cast(DType::Float64) } else { tensor })
                }
            }
            other => Err(other.mismatch("numeric value")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Tensor> for Value {
    fn from(v: Tensor) -> Self {
        Value::Tensor(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Hashable projection of a [`Value`], used for grouping and class counts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Null key
    Null,
    /// Boolean key
    Bool(bool),
    /// Integer key
    Int(i64),
    /// String key
    Str(String),
}

impl TryFrom<&Value> for Key {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Key::Null),
            Value::Bool(v) => Ok(Key::Bool(*v)),
            Value::Int(v) => Ok(Key::Int(*v)),
            Value::Str(v) => Ok(Key::Str(v.clone())),
            other => Err(Error::TypeMismatch(format!(
                "{} cannot be used as a grouping key",
                other.describe()
            ))),
        }
    }
}

impl TryFrom<Value> for Key {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Str(v) => Ok(Key::Str(v)),
            other => Key::try_from(&other),
        }
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Null => Value::Null,
            Key::Bool(v) => Value::Bool(v),
            Key::Int(v) => Value::Int(v),
            Key::Str(v) => Value::Str(v),
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => f.write_str("null"),
            Key::Bool(v) => write!(f, "{v}"),
            Key::Int(v) => write!(f, "{v}"),
            Key::Str(v) => f.write_str(v),
        }
    }
}

/// Source field specification: a single name or an ordered list of names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fields {
    /// A single field; extraction yields its value
    One(String),
    /// Several fields; extraction yields a [`Value::List`] in this order
    Many(Vec<String>),
}

impl Fields {
    /// Field names in order
    pub fn names(&self) -> Vec<&str> {
        match self {
            Fields::One(name) => vec![name.as_str()],
            Fields::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Label used when reporting errors against these fields
    pub fn label(&self) -> String {
        self.names().join(",")
    }
}

impl From<&str> for Fields {
    fn from(name: &str) -> Self {
        Fields::One(name.to_string())
    }
}

impl From<String> for Fields {
    fn from(name: String) -> Self {
        Fields::One(name)
    }
}

impl From<&String> for Fields {
    fn from(name: &String) -> Self {
        Fields::One(name.clone())
    }
}

impl From<Vec<&str>> for Fields {
    fn from(names: Vec<&str>) -> Self {
        Fields::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Fields {
    fn from(names: Vec<String>) -> Self {
        Fields::Many(names)
    }
}

impl From<&[&str]> for Fields {
    fn from(names: &[&str]) -> Self {
        Fields::Many(names.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Fields {
    fn from(names: [&str; N]) -> Self {
        Fields::Many(names.iter().map(|s| (*s).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn accessors_report_mismatch() {
        assert_eq!(Value::Int(3).as_int().unwrap(), 3);
        assert_eq!(Value::Int(3).as_float().unwrap(), 3.0);
        assert!(matches!(Value::Str("x".into()).as_int(), Err(Error::TypeMismatch(_))));
        assert!(Value::Null.as_tensor().is_err());
    }

    #[test_case(Value::Int(1), "Int")]
    #[test_case(Value::Str("a".into()), "Str")]
    #[test_case(Value::from(vec![1i64, 2]), "List[2]")]
    #[test_case(Value::Tensor(Tensor::zeros(DType::Float32, vec![3, 32, 32])), "Tensor<Float32>[3, 32, 32]")]
    fn describe_names_runtime_type(value: Value, expected: &str) {
        assert_eq!(value.describe(), expected);
    }

    #[test]
    fn numeric_list_becomes_vector() {
        let t = Value::from(vec![1i64, 2, 3]).to_tensor().unwrap();
        assert_eq!(t.dtype(), DType::Int64);
        assert_eq!(t.shape(), &[3]);

        let t = Value::List(vec![Value::Int(1), Value::Float(0.5)]).to_tensor().unwrap();
        assert_eq!(t.dtype(), DType::Float64);
        assert_eq!(t.as_slice::<f64>().unwrap(), &[1.0, 0.5]);

        assert!(Value::List(vec![Value::Str("a".into())]).to_tensor().is_err());
    }

    #[test]
    fn tensor_items_split_leading_axis() {
        let t = Tensor::from_vec(vec![1i32, 2, 3, 4], vec![2, 2]).unwrap();
        let value = Value::Tensor(t);
        assert_eq!(value.seq_len().unwrap(), 2);
        let items = value.into_items().unwrap();
        assert_eq!(items[1].as_tensor().unwrap().as_slice::<i32>().unwrap(), &[3, 4]);
    }

    #[test]
    fn keys_reject_floats() {
        assert_eq!(Key::try_from(&Value::Int(4)).unwrap(), Key::Int(4));
        assert!(Key::try_from(&Value::Float(1.5)).is_err());
        assert_eq!(Value::from(Key::from("cat")), Value::Str("cat".into()));
        assert_eq!(Key::from("cat").to_string(), "cat");
    }

    #[test]
    fn field_specs() {
        assert_eq!(Fields::from("x"), Fields::One("x".into()));
        assert_eq!(Fields::from(["a", "b"]).names(), vec!["a", "b"]);
        assert_eq!(Fields::from(vec!["a", "b"]).label(), "a,b");
    }
}
