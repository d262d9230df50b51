//! # Shared Crypto
//!
//! Cryptographic leaf of the node: everything the gateway needs to sign
//! results and check who signed a request.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 (recoverable) | Result signing, subscription auth, ECDH |
//! | `hashing` | SHA-256, Keccak-256 | Content hashes, address derivation |
//! | `signer` | - | `Signer` seam, sentinel unauthenticated mode |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2)
//! - **Addresses**: Ethereum-compatible (keccak256 of the uncompressed key)
//! - **Key material**: zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod signer;

// Re-exports
pub use ecdsa::{recover_address, verify, Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::CryptoError;
pub use hashing::{keccak256, sha256, sha256_hex, to_prefixed_hex, Sha256Hasher};
pub use signer::{NoSignatureSigner, Secp256k1Signer, Signer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
