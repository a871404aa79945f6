//! Entry Store Module
//!
//! Authoritative key → entry map. Keeps `bytes_stored` equal to the summed
//! `memory_usage` of resident entries across every mutation.

use std::collections::hash_map::Iter;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::cache::CacheEntry;

/// Entry count and bytes held by one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub entries: usize,
    pub bytes: usize,
}

// == Entry Store ==
#[derive(Debug)]
pub struct EntryStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
    bytes_stored: usize,
    next_sequence: u64,
}

impl<V> Default for EntryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> EntryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            bytes_stored: 0,
            next_sequence: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` is resident and unexpired at `now`.
    pub fn is_live(&self, key: &str, now: u64) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    // == Insert ==
    /// Inserts or replaces an entry, returning the replaced one.
    pub fn insert(&mut self, key: String, mut entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        entry.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.bytes_stored += entry.memory_usage;

        let previous = self.entries.insert(key, entry);
        if let Some(old) = &previous {
            self.bytes_stored = self.bytes_stored.saturating_sub(old.memory_usage);
        }
        previous
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let removed = self.entries.remove(key)?;
        self.bytes_stored = self.bytes_stored.saturating_sub(removed.memory_usage);
        Some(removed)
    }

    /// Removes `key` only if it is still expired at `now`. A concurrent
    /// overwrite between detection and removal keeps the fresh entry.
    pub fn remove_if_expired(&mut self, key: &str, now: u64) -> Option<CacheEntry<V>> {
        if self.entries.get(key)?.is_expired(now) {
            self.remove(key)
        } else {
            None
        }
    }

    /// Keys whose TTL has elapsed at `now`.
    pub fn expired_keys(&self, now: u64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Removes everything, returning the entry count and bytes freed.
    pub fn clear(&mut self) -> (usize, usize) {
        let cleared = (self.entries.len(), self.bytes_stored);
        self.entries.clear();
        self.bytes_stored = 0;
        cleared
    }

    pub fn iter(&self) -> Iter<'_, String, CacheEntry<V>> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn category_usage(&self) -> BTreeMap<String, CategoryUsage> {
        let mut usage: BTreeMap<String, CategoryUsage> = BTreeMap::new();
        for entry in self.entries.values() {
            let slot = usage.entry(entry.category.clone()).or_default();
            slot.entries += 1;
            slot.bytes += entry.memory_usage;
        }
        usage
    }

    pub fn bytes_stored(&self) -> usize {
        self.bytes_stored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
