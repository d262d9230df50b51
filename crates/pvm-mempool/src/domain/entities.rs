//! Core domain entities for the Mempool.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_crypto::Sha256Hasher;
use shared_types::{amount::decimal, parse_amount, Address, TransactionDto, TypeError};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// `0x`-prefixed SHA-256 hex of an entry's content.
pub type TxHash = String;

/// Mempool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of pending entries.
    pub max_entries: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

/// Unsigned entry content. Sealing it with a signature yields a
/// [`MempoolEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub from: Address,
    pub to: Address,
    pub action: String,
    pub value: U256,
    pub timestamp: Timestamp,
    pub index: Option<u64>,
    pub data: Option<String>,
}

impl EntryDraft {
    /// Content hash: `sha256(to ‖ from ‖ value ‖ timestamp ‖ action ‖ index)`.
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256Hasher::new();
        hasher
            .update(&self.to)
            .update(&self.from)
            .update(self.value.to_string())
            .update(self.timestamp.to_string())
            .update(&self.action);
        if let Some(index) = self.index {
            hasher.update(index.to_string());
        }
        hasher.finalize_hex()
    }

    /// Attach the signature over [`EntryDraft::hash`].
    pub fn seal(self, signature: String) -> MempoolEntry {
        let hash = self.hash();
        MempoolEntry {
            from: self.from,
            to: self.to,
            action: self.action,
            value: self.value,
            signature,
            timestamp: self.timestamp,
            hash,
            index: self.index,
            data: self.data,
        }
    }
}

/// A pending transaction. Created on successful Write execution and never
/// mutated afterwards; the pool only hands out copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolEntry {
    pub from: Address,
    pub to: Address,
    pub action: String,
    #[serde(with = "decimal")]
    pub value: U256,
    pub signature: String,
    pub timestamp: Timestamp,
    pub hash: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl MempoolEntry {
    /// Canonical projection.
    pub fn to_dto(&self) -> TransactionDto {
        TransactionDto {
            from: self.from.clone(),
            to: self.to.clone(),
            value: self.value.to_string(),
            hash: self.hash.clone(),
            signature: self.signature.clone(),
            timestamp: self.timestamp.to_string(),
            action: self.action.clone(),
            index: self.index,
            data: self.data.clone(),
        }
    }

    /// Whether this entry targets `address` (case-insensitive).
    pub fn targets(&self, address: &str) -> bool {
        self.to.eq_ignore_ascii_case(address)
    }
}

impl TryFrom<&TransactionDto> for EntryDraft {
    type Error = TypeError;

    fn try_from(dto: &TransactionDto) -> Result<Self, Self::Error> {
        Ok(Self {
            from: dto.from.clone(),
            to: dto.to.clone(),
            action: dto.action.clone(),
            value: parse_amount(&dto.value)?,
            timestamp: dto
                .timestamp
                .parse()
                .map_err(|_| TypeError::InvalidTimestamp(dto.timestamp.clone()))?,
            index: dto.index,
            data: dto.data.clone(),
        })
    }
}
