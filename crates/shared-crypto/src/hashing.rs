//! # Hashing
//!
//! SHA-256 for content hashes (transactions, blocks, schemas) and Keccak-256
//! for address derivation.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// 256-bit hash output.
pub type Hash = [u8; 32];

/// Stateful SHA-256 hasher with a chaining `update`.
#[derive(Clone, Default)]
pub struct Sha256Hasher {
    inner: Sha256,
}

impl Sha256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with data.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.inner.update(data.as_ref());
        self
    }

    /// Finalize and return hash.
    pub fn finalize(&self) -> Hash {
        self.inner.clone().finalize().into()
    }

    /// Finalize as a `0x`-prefixed hex string.
    pub fn finalize_hex(&self) -> String {
        to_prefixed_hex(&self.finalize())
    }
}

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// One-shot SHA-256 as `0x`-prefixed hex.
pub fn sha256_hex(data: &[u8]) -> String {
    to_prefixed_hex(&sha256(data))
}

/// One-shot Keccak-256.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Hex encode with a `0x` prefix.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
