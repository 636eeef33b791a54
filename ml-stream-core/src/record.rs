//! Lazy records
//!
//! A [`LazyRecord`] is an ordered mapping from field names to slots. A slot
//! either holds a concrete [`Value`] or a deferred computation whose
//! evaluation is governed by an [`EvalStrategy`]:
//!
//! - `Value`: the slot is concrete and reads return it.
//! - `LazyMemoized`: the first read runs the computation once and stores
//!   the result back into the slot. A failed computation is not stored.
//! - `OnDemand`: every read runs the computation again.
//!
//! Field cells are reference counted. Cloning or projecting a record shares
//! its cells, so a value memoized through one handle is visible through
//! every other. Writes install a new cell and never touch a shared one.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Fields, Value};

/// Evaluation strategy of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvalStrategy {
    /// Computed immediately and stored
    #[default]
    Value,
    /// Computed on first read, then stored
    LazyMemoized,
    /// Computed on every read, never stored
    OnDemand,
}

impl EvalStrategy {
    /// Whether fields with this strategy are computed at read time
    pub fn is_lazy(self) -> bool {
        !matches!(self, EvalStrategy::Value)
    }
}

/// Deferred computation of a field value
pub type Thunk = Rc<dyn Fn() -> anyhow::Result<Value>>;

enum Slot {
    Eager(Value),
    Deferred(Thunk),
}

/// Storage cell of one field
pub(crate) struct FieldCell {
    strategy: EvalStrategy,
    slot: RefCell<Slot>,
}

impl FieldCell {
    fn eager(value: Value) -> Self {
        Self {
            strategy: EvalStrategy::Value,
            slot: RefCell::new(Slot::Eager(value)),
        }
    }

    fn deferred(strategy: EvalStrategy, thunk: Thunk) -> Self {
        // A deferred slot cannot be concrete
        let strategy = match strategy {
            EvalStrategy::Value => EvalStrategy::LazyMemoized,
            other => other,
        };
        Self {
            strategy,
            slot: RefCell::new(Slot::Deferred(thunk)),
        }
    }

    /// Resolve the cell; no borrow is held while the thunk runs
    pub(crate) fn read(&self, name: &str) -> Result<Value> {
        let thunk = match &*self.slot.borrow() {
            Slot::Eager(value) => return Ok(value.clone()),
            Slot::Deferred(thunk) => Rc::clone(thunk),
        };

        let value = thunk().map_err(|e| tag_failure(name, e))?;
        if self.strategy == EvalStrategy::LazyMemoized {
            *self.slot.borrow_mut() = Slot::Eager(value.clone());
        }
        Ok(value)
    }

    fn evaluated(&self) -> Option<String> {
        match &*self.slot.borrow() {
            Slot::Eager(value) => Some(value.describe()),
            Slot::Deferred(_) => None,
        }
    }
}

/// Convert the failure of a user function bound to `field` into a stream error
///
/// Missing fields and failures already tagged by an upstream field keep
/// their original form.
pub(crate) fn tag_failure(field: &str, err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(inner @ (Error::MissingField(_) | Error::Transform { .. })) => inner,
        Ok(inner) => Error::transform(field, inner),
        Err(err) => Error::transform(field, err),
    }
}

/// Handle on the source fields of a deferred computation
///
/// Holds the cells of the named fields as they were when the computation
/// was declared. A field that was absent fails with `MissingField` when the
/// computation runs.
pub(crate) struct FieldSource {
    fields: Fields,
    cells: Vec<(String, Option<Rc<FieldCell>>)>,
}

impl FieldSource {
    pub(crate) fn read(&self) -> Result<Value> {
        let mut values = self
            .cells
            .iter()
            .map(|(name, cell)| match cell {
                Some(cell) => cell.read(name),
                None => Err(Error::MissingField(name.clone())),
            })
            .collect::<Result<Vec<_>>>()?;

        match self.fields {
            Fields::One(_) => Ok(values.pop().unwrap_or_default()),
            Fields::Many(_) => Ok(Value::List(values)),
        }
    }
}

/// Keyed, ordered record whose fields may be computed lazily
#[derive(Clone, Default)]
pub struct LazyRecord {
    fields: Vec<(String, Rc<FieldCell>)>,
}

impl LazyRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record of eager fields
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut record = Self::new();
        for (name, value) in pairs {
            record.set(name, value);
        }
        record
    }

    /// Builder form of [`LazyRecord::set`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub(crate) fn cell(&self, name: &str) -> Option<&Rc<FieldCell>> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    fn install(&mut self, name: String, cell: FieldCell) {
        let cell = Rc::new(cell);
        match self.position(&name) {
            Some(i) => self.fields[i].1 = cell,
            None => self.fields.push((name, cell)),
        }
    }

    /// Read a field, evaluating it according to its strategy
    pub fn get(&self, name: &str) -> Result<Value> {
        self.cell(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?
            .read(name)
    }

    /// Read the named fields: one value, or a list for several names
    pub fn extract(&self, fields: &Fields) -> Result<Value> {
        match fields {
            Fields::One(name) => self.get(name),
            Fields::Many(names) => names
                .iter()
                .map(|name| self.get(name))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
        }
    }

    pub(crate) fn source(&self, fields: &Fields) -> FieldSource {
        FieldSource {
            fields: fields.clone(),
            cells: fields
                .names()
                .into_iter()
                .map(|name| (name.to_string(), self.cell(name).cloned()))
                .collect(),
        }
    }

    /// Write a concrete value, replacing any previous slot and strategy
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.install(name.into(), FieldCell::eager(value.into()));
    }

    /// Write a deferred computation, replacing any previous slot and strategy
    ///
    /// A `Value` strategy is stored as `LazyMemoized`.
    pub fn set_deferred<F>(&mut self, name: impl Into<String>, strategy: EvalStrategy, f: F)
    where
        F: Fn() -> anyhow::Result<Value> + 'static,
    {
        self.set_thunk(name, strategy, Rc::new(f));
    }

    /// Make `name` share the cell of `other`'s `from` field
    pub(crate) fn link(&mut self, name: &str, other: &LazyRecord, from: &str) -> Result<()> {
        let cell = other
            .cell(from)
            .ok_or_else(|| Error::MissingField(from.to_string()))?;
        let cell = Rc::clone(cell);
        match self.position(name) {
            Some(i) => self.fields[i].1 = cell,
            None => self.fields.push((name.to_string(), cell)),
        }
        Ok(())
    }

    /// Write a shared deferred computation
    pub fn set_thunk(&mut self, name: impl Into<String>, strategy: EvalStrategy, thunk: Thunk) {
        self.install(name.into(), FieldCell::deferred(strategy, thunk));
    }

    /// New record holding only `names`, in that order, sharing their cells
    ///
    /// Nothing is evaluated.
    pub fn project(&self, names: impl Into<Fields>) -> Result<LazyRecord> {
        let names = names.into();
        let fields = names
            .names()
            .into_iter()
            .map(|name| {
                self.cell(name)
                    .map(|cell| (name.to_string(), Rc::clone(cell)))
                    .ok_or_else(|| Error::MissingField(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LazyRecord { fields })
    }

    /// Remove a field; returns whether it was present
    pub fn delete(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.fields.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove several fields, ignoring absent ones
    pub fn delete_many(&mut self, names: impl Into<Fields>) {
        for name in names.into().names() {
            self.delete(name);
        }
    }

    /// Check if the record holds `name`
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Field names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Strategy of a field
    pub fn strategy(&self, name: &str) -> Option<EvalStrategy> {
        self.cell(name).map(|c| c.strategy)
    }

    /// Whether a field currently holds a concrete value
    pub fn is_evaluated(&self, name: &str) -> bool {
        self.cell(name).is_some_and(|c| c.evaluated().is_some())
    }

    /// Describe each field's strategy and, if already computed, its type
    ///
    /// Never runs a deferred computation.
    pub fn inspect(&self) -> String {
        self.fields
            .iter()
            .map(|(name, cell)| {
                let state = cell.evaluated().unwrap_or_else(|| "<deferred>".to_string());
                format!("{name}: {:?} {state}", cell.strategy)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for LazyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(n, c)| (n, c.strategy)))
            .finish()
    }
}
