//! # Transaction Pool
//!
//! ## Data Structures
//!
//! - `by_hash`: O(1) lookup from hash to insertion sequence
//! - `by_seq`: entries ordered by insertion sequence
//!
//! ## Invariants Enforced
//!
//! - No duplicate hashes (checked in `add()`)
//! - `entries()` yields insertion order
//! - Entries are never exposed mutably

use std::collections::{BTreeMap, HashMap};

use super::entities::{MempoolConfig, MempoolEntry, TxHash};
use super::errors::MempoolError;

/// Insertion-ordered pool of pending entries.
#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    by_hash: HashMap<TxHash, u64>,
    by_seq: BTreeMap<u64, MempoolEntry>,
    next_seq: u64,
}

impl TransactionPool {
    /// Creates a new empty transaction pool.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_hash: HashMap::new(),
            by_seq: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Creates a pool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&MempoolEntry> {
        self.by_hash.get(hash).and_then(|seq| self.by_seq.get(seq))
    }

    /// Adds an entry at the tail.
    ///
    /// # Errors
    /// - `DuplicateTransaction` if the hash already exists
    /// - `PoolFull` if at capacity
    pub fn add(&mut self, entry: MempoolEntry) -> Result<(), MempoolError> {
        if self.by_hash.contains_key(&entry.hash) {
            return Err(MempoolError::DuplicateTransaction(entry.hash));
        }
        if self.by_seq.len() >= self.config.max_entries {
            return Err(MempoolError::PoolFull {
                capacity: self.config.max_entries,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_hash.insert(entry.hash.clone(), seq);
        self.by_seq.insert(seq, entry);
        Ok(())
    }

    /// Removes one entry by hash.
    pub fn remove(&mut self, hash: &str) -> Option<MempoolEntry> {
        let seq = self.by_hash.remove(hash)?;
        self.by_seq.remove(&seq)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.by_seq.values()
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.by_seq.len();
        self.by_hash.clear();
        self.by_seq.clear();
        removed
    }
}
