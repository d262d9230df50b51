//! # Ledger DTOs
//!
//! Canonical projections of ledger objects as they appear in signed results
//! and real-time events. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// `0x`-prefixed, 20-byte hex address.
pub type Address = String;

/// Serialized game state as produced by the rules engine. Opaque to the node.
pub type GameStateDto = serde_json::Value;

/// Sentinel returned when no proposer can be chosen.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Validate and lowercase an address.
pub fn normalize_address(address: &str) -> Result<Address, TypeError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| TypeError::InvalidAddress(address.to_string()))?;
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TypeError::InvalidAddress(address.to_string()));
    }
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// Case-insensitive address comparison.
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Roster entry describing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub client: String,
    pub public_key: String,
    pub url: String,
    pub version: String,
    pub is_validator: bool,
    pub name: String,
    /// Chain height last reported by the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

/// A transaction, pending or finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub from: Address,
    pub to: Address,
    /// Decimal string, smallest unit.
    pub value: String,
    pub hash: String,
    pub signature: String,
    /// Milliseconds since the epoch, decimal string.
    pub timestamp: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A finalized block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDto {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub merkle_root: String,
    pub timestamp: u64,
    pub validator: Address,
    pub signature: String,
    pub transactions: Vec<TransactionDto>,
}

impl BlockDto {
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Account balance view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub address: Address,
    /// Decimal string, smallest unit.
    pub balance: String,
    pub nonce: u64,
}

/// Registered contract schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSchemaDto {
    pub address: Address,
    pub category: String,
    pub name: String,
    pub schema: String,
    pub hash: String,
}
