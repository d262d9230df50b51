//! Outbound (Driven) ports for validator selection.
//!
//! The validator set lives outside the node (an on-chain registry in
//! production). It is read through [`RosterSource`] and treated as opaque.

use async_trait::async_trait;
use shared_types::Node;

use crate::domain::ValidatorError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// External roster read.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Every known node; validators are flagged with `is_validator`.
    async fn fetch_nodes(&self) -> Result<Vec<Node>, ValidatorError>;

    /// Number of validators registered with the source.
    async fn validator_count(&self) -> Result<usize, ValidatorError>;
}

/// Ledger read used to find the next block index.
#[async_trait]
pub trait ChainHead: Send + Sync {
    /// Index of the last finalized block.
    async fn last_block_index(&self) -> Result<u64, ValidatorError>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}
