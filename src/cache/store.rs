//! Concurrent latest-value store for BBO snapshots

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::BboSnapshot;

/// Latest BBO snapshot per symbol
///
/// Entries are stored behind an `Arc` and swapped wholesale, so a reader
/// holds the shard lock only long enough to clone a pointer and always
/// observes a fully-formed snapshot.
#[derive(Debug, Default)]
pub struct BboCache {
    entries: DashMap<String, Arc<BboSnapshot>>,
}

impl BboCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Replace the entry for the snapshot's symbol
    pub fn update(&self, snapshot: BboSnapshot) {
        self.entries
            .insert(snapshot.symbol.clone(), Arc::new(snapshot));
    }

    /// Get the current snapshot for a symbol, if one was ever received
    pub fn get(&self, symbol: &str) -> Option<Arc<BboSnapshot>> {
        self.entries.get(symbol).map(|entry| Arc::clone(entry.value()))
    }

    /// Point-in-time copy of all cached snapshots, ordered by symbol
    pub fn get_all(&self) -> BTreeMap<String, Arc<BboSnapshot>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Symbols with a cached snapshot
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
