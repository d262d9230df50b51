//! # Inbound Port - MempoolApi
//!
//! Driving port used by commands, the block producer and the broadcast
//! service.
//!
//! | Method | Caller |
//! |--------|--------|
//! | `add` | Write commands |
//! | `remove`, `remove_many` | Block finalization |
//! | `find_all`, `find_by_target` | Read commands, mempool broadcast, game replay |
//! | `purge` | Control command (credentialed) |
//! | `clear` | Ledger reset (credential checked by the caller) |

use crate::domain::{MempoolEntry, MempoolError, TxHash};

/// Primary API for the Mempool.
pub trait MempoolApi: Send + Sync {
    /// Adds an entry at the tail of the pool.
    ///
    /// # Errors
    /// - `DuplicateTransaction`: an entry with the same hash is pending
    /// - `PoolFull`: capacity reached
    fn add(&self, entry: MempoolEntry) -> Result<TxHash, MempoolError>;

    /// Removes an entry; unknown hashes return `None`.
    fn remove(&self, hash: &str) -> Option<MempoolEntry>;

    /// Removes every listed hash, returning how many were present.
    fn remove_many(&self, hashes: &[TxHash]) -> usize;

    /// Copy of one entry.
    fn get(&self, hash: &str) -> Option<MempoolEntry>;

    /// Copies of every entry, in insertion order.
    fn find_all(&self) -> Vec<MempoolEntry>;

    /// Copies of the entries addressed to `to`, in insertion order.
    fn find_by_target(&self, to: &str) -> Vec<MempoolEntry>;

    /// Clears the pool if the credential pair matches the operator secret.
    ///
    /// A wrong pair returns `false` and leaves the pool unchanged.
    fn purge(&self, username: &str, password: &str) -> bool;

    /// Clears the pool unconditionally.
    fn clear(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
