//! One shard's sorted key/value arrays.
//!
//! A chunk is built append-only with [`Chunk::add_entry`], then sorted exactly
//! once with [`Chunk::sort`]. Indices returned while appending stay valid until
//! the sort, which reorders entries by lower key.
//!
//! Lookup policy: after `sort`, [`Chunk::index_of`] is a binary search. Before
//! `sort` it falls back to a linear scan, which is correct but O(n).

use rayon::prelude::*;

use super::value_type::{ValueBuffer, ValueType};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Chunk {
    upper: u32,
    keys: Vec<u32>,
    values: ValueBuffer,
    sorted: bool,
}

impl Chunk {
    pub fn new(upper: u32, value_type: ValueType) -> Self {
        Self::with_capacity(upper, value_type, 0)
    }

    pub fn with_capacity(upper: u32, value_type: ValueType, capacity: usize) -> Self {
        Self {
            upper,
            keys: Vec::with_capacity(capacity),
            values: ValueBuffer::with_capacity(value_type, capacity),
            sorted: true,
        }
    }

    /// Rebuild a chunk from arrays already known to be strictly ascending.
    pub(crate) fn from_sorted_parts(upper: u32, keys: Vec<u32>, values: ValueBuffer) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        Self {
            upper,
            keys,
            values,
            sorted: true,
        }
    }

    pub fn upper(&self) -> u32 {
        self.upper
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn value_type(&self) -> ValueType {
        self.values.value_type()
    }

    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    pub fn values(&self) -> &ValueBuffer {
        &self.values
    }

    #[inline(always)]
    pub fn key_at(&self, index: usize) -> Option<u32> {
        self.keys.get(index).copied()
    }

    fn mark_appended(&mut self, lower: u32) {
        if let Some(&last) = self.keys.last() {
            if last >= lower {
                self.sorted = false;
            }
        }
    }

    /// Append a win percentage under `lower`, returning its pre-sort index.
    pub fn add_entry(&mut self, lower: u32, percent: f64) -> usize {
        self.mark_appended(lower);
        self.keys.push(lower);
        self.values.push(percent);
        self.keys.len() - 1
    }

    /// Append a raw integer value under `lower`, returning its pre-sort index.
    pub fn add_raw(&mut self, lower: u32, raw: u64) -> Result<usize> {
        self.values.push_raw(raw)?;
        self.mark_appended(lower);
        self.keys.push(lower);
        Ok(self.keys.len() - 1)
    }

    /// Sort entries by lower key. Fails if two entries share a key.
    pub fn sort(&mut self) -> Result<()> {
        if !self.sorted {
            let mut order: Vec<u32> = (0..self.keys.len() as u32).collect();
            order.par_sort_unstable_by_key(|&i| self.keys[i as usize]);
            self.keys = order.iter().map(|&i| self.keys[i as usize]).collect();
            self.values.permute(&order);
            self.sorted = true;
        }
        if let Some(w) = self.keys.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::DuplicateKey {
                upper: self.upper,
                lower: w[0],
            });
        }
        Ok(())
    }

    /// Index of `lower`, or `None` if absent.
    #[inline]
    pub fn index_of(&self, lower: u32) -> Option<usize> {
        if self.sorted {
            self.keys.binary_search(&lower).ok()
        } else {
            self.keys.iter().position(|&k| k == lower)
        }
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index)
    }

    #[inline(always)]
    pub fn set(&mut self, index: usize, percent: f64) {
        self.values.set(index, percent);
    }

    pub fn get_raw(&self, index: usize) -> Result<u64> {
        self.values.get_raw(index)
    }

    /// Same keys, values re-encoded as `value_type`.
    pub fn convert(&self, value_type: ValueType) -> Chunk {
        Chunk {
            upper: self.upper,
            keys: self.keys.clone(),
            values: self.values.convert(value_type),
            sorted: self.sorted,
        }
    }
}
