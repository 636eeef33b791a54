//! Stream sources and flow helpers: wrapping, repetition and shuffling

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::record::LazyRecord;
use crate::value::Value;

/// Seeded generator, or one seeded from entropy when `seed` is `None`
pub fn rng_from_seed(seed: Option<u64>) -> ChaCha8Rng {
    seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64)
}

/// Stream over already built records
pub fn from_records<I>(records: I) -> impl Iterator<Item = Result<LazyRecord>>
where
    I: IntoIterator<Item = LazyRecord>,
{
    records.into_iter().map(Ok)
}

/// Stream of records holding each value in field `name`
pub fn as_field<I, V>(values: I, name: impl Into<String>) -> impl Iterator<Item = Result<LazyRecord>>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let name = name.into();
    values
        .into_iter()
        .map(move |value| Ok(LazyRecord::new().with(name.clone(), value)))
}

/// Endless stream of empty records
pub fn infinite() -> impl Iterator<Item = Result<LazyRecord>> {
    std::iter::repeat_with(|| Ok(LazyRecord::new()))
}

/// Materialize a stream and yield it in random order
pub fn shuffle<I>(stream: I, seed: Option<u64>) -> Result<impl Iterator<Item = Result<LazyRecord>>>
where
    I: IntoIterator<Item = Result<LazyRecord>>,
{
    let mut records = stream.into_iter().collect::<Result<Vec<_>>>()?;
    records.shuffle(&mut rng_from_seed(seed));
    Ok(from_records(records))
}

/// Endless repetition of `records`
///
/// Repetitions share field cells, so values memoized in one pass are reused
/// in the next. An empty input yields an empty stream.
pub fn cycle(records: Vec<LazyRecord>) -> impl Iterator<Item = Result<LazyRecord>> {
    records.into_iter().cycle().map(Ok)
}

/// Endless repetition of `records`, reshuffled before every pass
pub struct InfiniteShuffle {
    records: Vec<LazyRecord>,
    rng: ChaCha8Rng,
    position: usize,
}

impl Iterator for InfiniteShuffle {
    type Item = Result<LazyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.records.is_empty() {
            return None;
        }
        if self.position == 0 {
            self.records.shuffle(&mut self.rng);
        }
        let record = self.records[self.position].clone();
        self.position = (self.position + 1) % self.records.len();
        Some(Ok(record))
    }
}

/// Endless repetition of `records` in a fresh random order each pass
pub fn infinite_shuffle(records: Vec<LazyRecord>, seed: Option<u64>) -> InfiniteShuffle {
    InfiniteShuffle {
        records,
        rng: rng_from_seed(seed),
        position: 0,
    }
}

/// First record of a stream
pub fn first<I>(stream: I) -> Result<Option<LazyRecord>>
where
    I: IntoIterator<Item = Result<LazyRecord>>,
{
    stream.into_iter().next().transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::RecordStream;

    fn ids(records: impl Iterator<Item = Result<LazyRecord>>) -> Vec<i64> {
        records
            .values("i")
            .map(|v| v.unwrap().as_int().unwrap())
            .collect()
    }

    #[test]
    fn as_field_wraps_values() {
        assert_eq!(ids(as_field(vec![3i64, 1, 2], "i")), vec![3, 1, 2]);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let a = ids(shuffle(as_field(0..20i64, "i"), Some(7)).unwrap());
        let b = ids(shuffle(as_field(0..20i64, "i"), Some(7)).unwrap());
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn cycle_repeats() {
        let records: Vec<_> = (0..3i64).map(|i| LazyRecord::new().with("i", i)).collect();
        assert_eq!(ids(cycle(records).take(7)), vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(cycle(Vec::new()).count(), 0);
    }

    #[test]
    fn infinite_shuffle_covers_each_pass() {
        let records: Vec<_> = (0..5i64).map(|i| LazyRecord::new().with("i", i)).collect();
        let seen = ids(infinite_shuffle(records, Some(1)).take(15));
        for pass in seen.chunks(5) {
            let mut pass = pass.to_vec();
            pass.sort_unstable();
            assert_eq!(pass, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn infinite_feeds_unfold() {
        let values = ids(infinite().enumerate_field("i", 1).take(3));
        assert_eq!(values, vec![1, 2, 3]);
        assert!(first(infinite()).unwrap().unwrap().is_empty());
    }
}
