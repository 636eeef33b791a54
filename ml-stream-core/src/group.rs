//! Materialized partitions of a stream by field value

use std::collections::HashMap;

use crate::error::Result;
use crate::record::LazyRecord;
use crate::value::Key;

/// Records partitioned by key
///
/// Keys iterate in first-seen order; records keep their stream order within
/// each partition. Grouping materializes the whole stream, so large eager
/// payloads should be made lazy beforehand.
#[derive(Debug, Default, Clone)]
pub struct Groups {
    order: Vec<Key>,
    groups: HashMap<Key, Vec<LazyRecord>>,
}

impl Groups {
    /// Create an empty grouping
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition `records` by the value of `field`
    pub fn from_records<I>(records: I, field: &str) -> Result<Self>
    where
        I: IntoIterator<Item = Result<LazyRecord>>,
    {
        let mut groups = Self::new();
        for record in records {
            let record = record?;
            let key = Key::try_from(record.get(field)?)?;
            groups.push(key, record);
        }
        Ok(groups)
    }

    /// Add a record under `key`
    pub fn push(&mut self, key: Key, record: LazyRecord) {
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.groups.entry(key).or_default().push(record);
    }

    /// Records under `key`
    pub fn get(&self, key: &Key) -> Option<&[LazyRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Keys in first-seen order
    pub fn keys(&self) -> &[Key] {
        &self.order
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if there are no groups
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over groups in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &[LazyRecord])> {
        self.order
            .iter()
            .filter_map(|key| self.groups.get(key).map(|records| (key, records.as_slice())))
    }

    /// Size of the smallest group
    pub fn min_len(&self) -> usize {
        self.groups.values().map(Vec::len).min().unwrap_or(0)
    }
}

impl IntoIterator for Groups {
    type Item = (Key, Vec<LazyRecord>);
    type IntoIter = std::vec::IntoIter<(Key, Vec<LazyRecord>)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.order
            .into_iter()
            .filter_map(|key| self.groups.remove(&key).map(|records| (key, records)))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn keys_in_first_seen_order() {
        let input = ["b", "a", "b", "c", "a"]
            .into_iter()
            .enumerate()
            .map(|(i, c)| Ok::<_, Error>(LazyRecord::new().with("class", c).with("i", i)));
        let groups = Groups::from_records(input, "class").unwrap();
        assert_eq!(groups.keys(), &[Key::from("b"), Key::from("a"), Key::from("c")]);
        assert_eq!(groups.min_len(), 1);

        let b: Vec<_> = groups
            .get(&Key::from("b"))
            .unwrap()
            .iter()
            .map(|r| r.get("i").unwrap().as_int().unwrap())
            .collect();
        assert_eq!(b, vec![0, 2]);

        let owned: Vec<_> = groups.into_iter().map(|(k, v)| (k.to_string(), v.len())).collect();
        assert_eq!(owned, vec![("b".to_string(), 2), ("a".to_string(), 2), ("c".to_string(), 1)]);
    }

    #[test]
    fn float_keys_are_rejected() {
        let input = std::iter::once(Ok(LazyRecord::new().with("x", 0.5f64)));
        assert!(matches!(Groups::from_records(input, "x"), Err(Error::TypeMismatch(_))));
    }
}
