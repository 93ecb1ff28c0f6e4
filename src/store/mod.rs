//! Sharded sorted key/value store.
//!
//! Keys are split by [`crate::encoding::calc_upper_key`] into a shard selector
//! and a `u32` lower key. Each shard is a [`Chunk`]: parallel arrays of lower
//! keys and values that are appended to, sorted once, then binary searched.
//!
//! Sharding keeps every array well inside fixed-size limits and gives each
//! rayon worker exclusive ownership of whole shards during a sweep.

mod chunk;
mod value_type;

pub use chunk::Chunk;
pub use value_type::{ValueBuffer, ValueType};

use rayon::prelude::*;

use crate::encoding::{calc_lower_key, calc_upper_key};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct ShardedStore {
    value_type: ValueType,
    chunks: Vec<Chunk>,
}

impl ShardedStore {
    /// An empty store with `shard_count` shards, one per upper key.
    pub fn new(shard_count: u32, value_type: ValueType) -> Self {
        Self {
            value_type,
            chunks: (0..shard_count)
                .map(|upper| Chunk::new(upper, value_type))
                .collect(),
        }
    }

    pub(crate) fn from_chunks(value_type: ValueType, chunks: Vec<Chunk>) -> Self {
        debug_assert!(chunks.iter().enumerate().all(|(i, c)| c.upper() == i as u32));
        Self { value_type, chunks }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn shard_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, upper: u32) -> &Chunk {
        &self.chunks[upper as usize]
    }

    pub fn chunk_mut(&mut self, upper: u32) -> &mut Chunk {
        &mut self.chunks[upper as usize]
    }

    /// Replace a whole shard, e.g. one built by a worker thread.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> Result<()> {
        if chunk.value_type() != self.value_type {
            return Err(Error::WrongValueType {
                expected: self.value_type,
                found: chunk.value_type(),
            });
        }
        let upper = chunk.upper();
        if upper >= self.shard_count() {
            return Err(Error::NotEncodable {
                key: (upper as u64) << 32,
                message: format!("shard {upper} is outside 0..{}", self.shard_count()),
            });
        }
        self.chunks[upper as usize] = chunk;
        Ok(())
    }

    /// Total number of entries across all shards.
    pub fn entry_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// Append an entry to the shard selected by `key`, returning its shard and
    /// pre-sort index.
    pub fn add_entry(&mut self, key: u64, percent: f64) -> Result<(u32, usize)> {
        let upper = calc_upper_key(key);
        let chunk = self
            .chunks
            .get_mut(upper as usize)
            .ok_or(Error::MissingState { key, upper })?;
        Ok((upper, chunk.add_entry(calc_lower_key(key), percent)))
    }

    /// Sort every shard in parallel.
    pub fn sort(&mut self) -> Result<()> {
        self.chunks.par_iter_mut().try_for_each(|chunk| chunk.sort())
    }

    /// `(shard, index)` of `key`, or `None` if absent.
    #[inline]
    pub fn index_of(&self, key: u64) -> Option<(u32, usize)> {
        let upper = calc_upper_key(key);
        let chunk = self.chunks.get(upper as usize)?;
        chunk.index_of(calc_lower_key(key)).map(|index| (upper, index))
    }

    /// Win percentage stored under `key`.
    #[inline]
    pub fn get(&self, key: u64) -> Result<f64> {
        let (upper, index) = self.index_of(key).ok_or(Error::MissingState {
            key,
            upper: calc_upper_key(key),
        })?;
        Ok(self.chunks[upper as usize].get(index))
    }

    #[inline(always)]
    pub fn get_at(&self, upper: u32, index: usize) -> f64 {
        self.chunks[upper as usize].get(index)
    }

    #[inline(always)]
    pub fn set_at(&mut self, upper: u32, index: usize, percent: f64) {
        self.chunks[upper as usize].set(index, percent);
    }

    /// Same keys, values re-encoded as `value_type`.
    pub fn convert(&self, value_type: ValueType) -> ShardedStore {
        ShardedStore {
            value_type,
            chunks: self
                .chunks
                .par_iter()
                .map(|chunk| chunk.convert(value_type))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::join_key;

    #[test]
    fn test_add_sort_lookup_across_shards() {
        let mut store = ShardedStore::new(4, ValueType::F32);
        let keys = [join_key(2, 40), join_key(0, 7), join_key(2, 3), join_key(3, 1)];
        for (i, &key) in keys.iter().enumerate() {
            store.add_entry(key, 10.0 * i as f64).unwrap();
        }
        store.sort().unwrap();
        assert_eq!(store.entry_count(), 4);
        for (i, &key) in keys.iter().enumerate() {
            assert_eq!(store.get(key).unwrap(), 10.0 * i as f64);
        }
        assert_eq!(store.index_of(join_key(2, 3)), Some((2, 0)));
        assert!(matches!(
            store.get(join_key(1, 3)),
            Err(Error::MissingState { upper: 1, .. })
        ));
    }

    #[test]
    fn test_key_outside_shards_is_rejected() {
        let mut store = ShardedStore::new(2, ValueType::U8);
        assert!(store.add_entry(join_key(5, 0), 1.0).is_err());
        assert_eq!(store.index_of(join_key(5, 0)), None);
    }

    #[test]
    fn test_insert_chunk_checks_value_type() {
        let mut store = ShardedStore::new(2, ValueType::U8);
        assert!(store.insert_chunk(Chunk::new(1, ValueType::F32)).is_err());
        assert!(store.insert_chunk(Chunk::new(1, ValueType::U8)).is_ok());
    }
}
