//! Record selection and field-level reshaping

use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Result;
use crate::record::{tag_failure, LazyRecord};
use crate::transform::{Control, Transform};
use crate::value::{Fields, Value};

/// Predicate over an extracted value
pub type PredicateFn = Rc<dyn Fn(&Value) -> anyhow::Result<bool>>;

/// Keeps records whose predicate holds
pub struct Filter {
    src: Fields,
    predicate: PredicateFn,
}

impl Filter {
    /// Create a filter over `src`; several fields reach the predicate as a list
    pub fn new<P>(src: impl Into<Fields>, predicate: P) -> Self
    where
        P: Fn(&Value) -> anyhow::Result<bool> + 'static,
    {
        Self {
            src: src.into(),
            predicate: Rc::new(predicate),
        }
    }
}

impl Transform for Filter {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let value = record.extract(&self.src)?;
        if (self.predicate)(&value).map_err(|e| tag_failure(&self.src.label(), e))? {
            out.push_back(record);
        }
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}

/// Keeps only the named fields, in order
pub struct ProjectFields {
    names: Fields,
}

impl ProjectFields {
    /// Create a projection stage
    pub fn new(names: impl Into<Fields>) -> Self {
        Self {
            names: names.into(),
        }
    }
}

impl Transform for ProjectFields {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        out.push_back(record.project(self.names.clone())?);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "project"
    }
}

/// Removes the named fields
pub struct DropFields {
    names: Fields,
}

impl DropFields {
    /// Create a deletion stage
    pub fn new(names: impl Into<Fields>) -> Self {
        Self {
            names: names.into(),
        }
    }
}

impl Transform for DropFields {
    fn process(&mut self, mut record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        record.delete_many(self.names.clone());
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "drop_fields"
    }
}

/// Drops records that lack a field
pub struct EnsureField {
    name: String,
}

impl EnsureField {
    /// Create a stage requiring `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transform for EnsureField {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        if record.contains(&self.name) {
            out.push_back(record);
        }
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "ensure_field"
    }
}

/// Runs a side effect on an extracted value and passes the record on
pub struct Tap {
    src: Fields,
    f: Rc<dyn Fn(&Value) -> anyhow::Result<()>>,
}

impl Tap {
    /// Create a tap over `src`
    pub fn new<F>(src: impl Into<Fields>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + 'static,
    {
        Self {
            src: src.into(),
            f: Rc::new(f),
        }
    }
}

impl Transform for Tap {
    fn process(&mut self, record: LazyRecord, out: &mut VecDeque<LazyRecord>) -> Result<Control> {
        let value = record.extract(&self.src)?;
        (self.f)(&value).map_err(|e| tag_failure(&self.src.label(), e))?;
        out.push_back(record);
        Ok(Control::Continue)
    }

    fn name(&self) -> &'static str {
        "tap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record::EvalStrategy;
    use crate::transform::Transformed;
    use std::cell::RefCell;

    fn records() -> Vec<Result<LazyRecord>> {
        (0..6i64)
            .map(|i| {
                Ok(LazyRecord::new()
                    .with("id", i)
                    .with("class", if i % 3 == 0 { "a" } else { "b" }))
            })
            .collect()
    }

    fn run(stage: impl Transform) -> Result<Vec<LazyRecord>> {
        Transformed::new(records().into_iter(), stage).collect()
    }

    #[test]
    fn filter_keeps_matching() {
        let out = run(Filter::new("class", |v| Ok(v.as_str()? == "a"))).unwrap();
        let ids: Vec<_> = out.iter().map(|r| r.get("id").unwrap()).collect();
        assert_eq!(ids, vec![Value::Int(0), Value::Int(3)]);
    }

    #[test]
    fn filter_over_several_fields() {
        let out = run(Filter::new(["id", "class"], |v| {
            let items = v.as_list()?;
            Ok(items[0].as_int()? > 2 && items[1].as_str()? == "b")
        }))
        .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn filter_missing_field_fails() {
        assert!(matches!(
            run(Filter::new("nope", |_| Ok(true))),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn project_and_drop() {
        let out = run(ProjectFields::new(["class", "id"])).unwrap();
        assert_eq!(out[0].names().collect::<Vec<_>>(), vec!["class", "id"]);

        let out = run(DropFields::new("class")).unwrap();
        assert_eq!(out[0].names().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn project_keeps_deferred_fields_deferred() {
        let mut record = LazyRecord::new().with("a", 1i64);
        record.set_deferred("b", EvalStrategy::OnDemand, || Ok(Value::Int(2)));
        let out: Vec<_> = Transformed::new(std::iter::once(Ok::<_, Error>(record)), ProjectFields::new("b"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out[0].strategy("b"), Some(EvalStrategy::OnDemand));
        assert!(!out[0].is_evaluated("b"));
    }

    #[test]
    fn ensure_field_drops_incomplete() {
        let input: Vec<Result<LazyRecord>> = vec![
            Ok(LazyRecord::new().with("x", 1i64)),
            Ok(LazyRecord::new().with("y", 1i64)),
        ];
        let out: Vec<_> = Transformed::new(input.into_iter(), EnsureField::new("x"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn tap_sees_every_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let out = run(Tap::new("id", move |v| {
            sink.borrow_mut().push(v.as_int()?);
            Ok(())
        }))
        .unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4, 5]);
    }
}
