//! Mempool error types.

use thiserror::Error;

/// Mempool error type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MempoolError {
    /// An entry with the same hash is already pending.
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Pool has reached maximum capacity.
    #[error("Mempool full: capacity {capacity}")]
    PoolFull { capacity: usize },

    /// Transaction not found in the pool.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}
