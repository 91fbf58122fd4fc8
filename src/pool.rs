//! Dictionaries used while encoding a single message.

use std::collections::HashMap;

use crate::value::Value;

/// The result of putting a value into a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolEntry {
    pub index: usize,
    /// The value wasn't in the pool before, so its payload still has to be written.
    pub inserted: bool,
}

/// A dictionary of distinct values, each given a stable index in first-seen order.
///
/// Values are bucketed by their structural hash, and collisions inside a bucket are resolved by
/// structural comparison. Pools only ever grow, so index `n` is always the `n`-th distinct value
/// put in.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    values: Vec<Value>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a value's index without inserting it.
    pub fn get(&self, value: &Value) -> Option<usize> {
        self.find(value.structural_hash(), value)
    }

    /// Find a value's index, inserting it at the end if it isn't present yet.
    pub fn put(&mut self, value: &Value) -> PoolEntry {
        let hash = value.structural_hash();
        if let Some(index) = self.find(hash, value) {
            return PoolEntry {
                index,
                inserted: false,
            };
        }
        let index = self.values.len();
        self.values.push(value.clone());
        self.buckets.entry(hash).or_default().push(index);
        PoolEntry {
            index,
            inserted: true,
        }
    }

    fn find(&self, hash: u64, value: &Value) -> Option<usize> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&i| self.values[i] == *value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Interns strings into a table, indexed in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct StringInterner {
    strings: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(index) = self.lookup.get(s) {
            return *index;
        }
        let index = self.strings.len();
        self.strings.push(s.to_string());
        self.lookup.insert(s.to_string(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// The interned strings, in index order.
    pub fn strings(&self) -> &[String] {
        &self.strings
    }
}
