//! # Result Signer
//!
//! The node signs every Read and Write result with its key. A sentinel
//! signer exists for unauthenticated contexts (local tooling, tests) and
//! stamps results with [`NO_SIGNATURE`] instead.

use shared_types::{Address, NO_SIGNATURE, ZERO_ADDRESS};

use crate::ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey};
use crate::CryptoError;

/// Signing seam used by commands.
pub trait Signer: Send + Sync {
    /// Sign `payload`, returning a `0x`-prefixed hex signature.
    fn sign(&self, payload: &[u8]) -> Result<String, CryptoError>;

    /// Address of the signing key.
    fn address(&self) -> Address;

    /// Compressed public key as hex, if there is a key.
    fn public_key(&self) -> Option<String>;

    /// SHA-256 of the ECDH secret shared with `peer_public_key` (hex).
    fn shared_secret(&self, peer_public_key: &str) -> Result<[u8; 32], CryptoError>;
}

/// Signs with a secp256k1 key held in memory.
pub struct Secp256k1Signer {
    key_pair: Secp256k1KeyPair,
    address: Address,
}

impl Secp256k1Signer {
    /// Wrap a key pair.
    pub fn new(key_pair: Secp256k1KeyPair) -> Result<Self, CryptoError> {
        let address = key_pair.address()?;
        Ok(Self { key_pair, address })
    }

    /// Load from a hex private key.
    pub fn from_hex(private_key: &str) -> Result<Self, CryptoError> {
        Self::new(Secp256k1KeyPair::from_hex(private_key)?)
    }

    /// Fresh random key.
    pub fn ephemeral() -> Result<Self, CryptoError> {
        Self::new(Secp256k1KeyPair::generate())
    }
}

impl Signer for Secp256k1Signer {
    fn sign(&self, payload: &[u8]) -> Result<String, CryptoError> {
        Ok(self.key_pair.sign(payload)?.to_hex())
    }

    fn address(&self) -> Address {
        self.address.clone()
    }

    fn public_key(&self) -> Option<String> {
        Some(self.key_pair.public_key().to_hex())
    }

    fn shared_secret(&self, peer_public_key: &str) -> Result<[u8; 32], CryptoError> {
        let peer = Secp256k1PublicKey::from_hex(peer_public_key)?;
        self.key_pair.shared_secret(&peer)
    }
}

/// Unauthenticated mode: every signature is the sentinel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignatureSigner;

impl Signer for NoSignatureSigner {
    fn sign(&self, _payload: &[u8]) -> Result<String, CryptoError> {
        Ok(NO_SIGNATURE.to_string())
    }

    fn address(&self) -> Address {
        ZERO_ADDRESS.to_string()
    }

    fn public_key(&self) -> Option<String> {
        None
    }

    fn shared_secret(&self, _peer_public_key: &str) -> Result<[u8; 32], CryptoError> {
        Err(CryptoError::NoKey)
    }
}
