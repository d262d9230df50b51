//! # Error Types
//!
//! Parse errors for the wire types defined in this crate.

use thiserror::Error;

/// Errors produced while decoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Method name is not part of the supported set.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Amount is not a non-negative decimal integer that fits in 256 bits.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Timestamp is not a decimal millisecond count.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Address is not a `0x`-prefixed 20-byte hex string.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
