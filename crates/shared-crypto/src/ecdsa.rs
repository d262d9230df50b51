//! # ECDSA Signatures (secp256k1)
//!
//! Recoverable secp256k1 signatures over SHA-256 message digests.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - 65-byte `r || s || v` encoding so the signer address can be recovered
//!
//! ## Use Cases
//!
//! - Signing RPC results
//! - Subscription authorization (recover the player address)
//! - Block proposer signatures
//! - ECDH shared secrets between nodes and clients

use k256::ecdsa::{signature::Verifier, RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroize;

use crate::hashing::{keccak256, sha256, to_prefixed_hex};
use crate::CryptoError;

/// secp256k1 public key, stored compressed (33 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secp256k1PublicKey([u8; 33]);

impl Secp256k1PublicKey {
    /// Parse a SEC1 key, compressed (33 bytes) or uncompressed (65 bytes).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self::from_verifying_key(&key))
    }

    /// Parse a hex key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Self::from_sec1_bytes(&decode_hex(s)?)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Get raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Compressed key as `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }

    /// Verify a signature. Accepts 64-byte or 65-byte encodings.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let rs = match signature.len() {
            64 | 65 => &signature[..64],
            _ => return Err(CryptoError::InvalidSignatureFormat),
        };
        let sig = Signature::from_slice(rs).map_err(|_| CryptoError::InvalidSignatureFormat)?;
        self.verifying_key()?
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }

    /// Ethereum-style address: last 20 bytes of keccak256 over the
    /// uncompressed point without its prefix byte.
    pub fn to_address(&self) -> Result<String, CryptoError> {
        let uncompressed = self.verifying_key()?.to_encoded_point(false);
        let digest = keccak256(&uncompressed.as_bytes()[1..]);
        Ok(to_prefixed_hex(&digest[12..]))
    }
}

/// Recoverable ECDSA signature (65 bytes, `r || s || v`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secp256k1Signature([u8; 65]);

impl Secp256k1Signature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Parse hex, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(s)?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }

    /// Recover the public key that produced this signature over `message`.
    pub fn recover(&self, message: &[u8]) -> Result<Secp256k1PublicKey, CryptoError> {
        let sig = Signature::from_slice(&self.0[..64])
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        // Accept both raw (0/1) and Ethereum-offset (27/28) recovery bytes.
        let v = match self.0[64] {
            v @ 0..=3 => v,
            v @ 27..=30 => v - 27,
            _ => return Err(CryptoError::InvalidSignatureFormat),
        };
        let recovery_id = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidSignatureFormat)?;
        let key = VerifyingKey::recover_from_msg(message, &sig, recovery_id)
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        Ok(Secp256k1PublicKey::from_verifying_key(&key))
    }
}

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Create from a hex secret key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut bytes = decode_hex(s)?;
        let result = match <[u8; 32]>::try_from(bytes.as_slice()) {
            Ok(array) => Self::from_bytes(array),
            Err(_) => Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            }),
        };
        bytes.zeroize();
        result
    }

    /// Get public key.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Address derived from the public key.
    pub fn address(&self) -> Result<String, CryptoError> {
        self.public_key().to_address()
    }

    /// Sign a message (deterministic RFC 6979), returning a recoverable signature.
    pub fn sign(&self, message: &[u8]) -> Result<Secp256k1Signature, CryptoError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_recoverable(message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Secp256k1Signature(bytes))
    }

    /// SHA-256 of the ECDH shared x-coordinate with `peer`.
    pub fn shared_secret(&self, peer: &Secp256k1PublicKey) -> Result<[u8; 32], CryptoError> {
        let peer_key = k256::PublicKey::from_sec1_bytes(peer.as_bytes())
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let shared =
            k256::ecdh::diffie_hellman(self.signing_key.as_nonzero_scalar(), peer_key.as_affine());
        Ok(sha256(shared.raw_secret_bytes()))
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Verify `signature` (hex) over `payload` against `public_key` (hex).
///
/// Malformed inputs verify as `false`.
pub fn verify(public_key: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(key) = Secp256k1PublicKey::from_hex(public_key) else {
        return false;
    };
    let Ok(sig) = decode_hex(signature) else {
        return false;
    };
    key.verify(payload, &sig).is_ok()
}

/// Recover the address that signed `payload`.
pub fn recover_address(payload: &[u8], signature: &str) -> Result<String, CryptoError> {
    Secp256k1Signature::from_hex(signature)?
        .recover(payload)?
        .to_address()
}

pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(trimmed).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = Secp256k1KeyPair::generate();
        let message = b"Hello, secp256k1!";

        let signature = keypair.sign(message).unwrap();
        let result = keypair.public_key().verify(message, signature.as_bytes());

        assert!(result.is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = Secp256k1KeyPair::generate();

        let signature = keypair.sign(b"message1").unwrap();
        let result = keypair.public_key().verify(b"message2", signature.as_bytes());

        assert!(result.is_err());
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = Secp256k1KeyPair::from_bytes([0xABu8; 32]).unwrap();
        let message = b"deterministic test";

        let sig1 = keypair.sign(message).unwrap();
        let sig2 = keypair.sign(message).unwrap();

        assert_eq!(sig1.as_bytes(), sig2.as_bytes());
    }

    #[test]
    fn test_recover_yields_signer_address() {
        let keypair = Secp256k1KeyPair::generate();
        let signature = keypair.sign(b"subscribe:0xabc:player").unwrap();

        let recovered = recover_address(b"subscribe:0xabc:player", &signature.to_hex()).unwrap();
        assert_eq!(recovered, keypair.address().unwrap());

        let other = recover_address(b"subscribe:0xabc:someone", &signature.to_hex()).unwrap();
        assert_ne!(other, keypair.address().unwrap());
    }

    #[test]
    fn test_known_address_derivation() {
        // Private key 1 maps to a well-known Ethereum address.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let keypair = Secp256k1KeyPair::from_bytes(secret).unwrap();
        assert_eq!(
            keypair.address().unwrap(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_hex_verify_helper() {
        let keypair = Secp256k1KeyPair::generate();
        let signature = keypair.sign(b"payload").unwrap();
        let public_key = keypair.public_key().to_hex();

        assert!(verify(&public_key, b"payload", &signature.to_hex()));
        assert!(!verify(&public_key, b"tampered", &signature.to_hex()));
        assert!(!verify("0xnothex", b"payload", &signature.to_hex()));
        assert!(!verify(&public_key, b"payload", "0x00"));
    }

    #[test]
    fn test_shared_secret_is_symmetric() {
        let alice = Secp256k1KeyPair::generate();
        let bob = Secp256k1KeyPair::generate();

        let ab = alice.shared_secret(&bob.public_key()).unwrap();
        let ba = bob.shared_secret(&alice.public_key()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_from_hex_rejects_short_key() {
        assert_eq!(
            Secp256k1KeyPair::from_hex("0x1234").err(),
            Some(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 2
            })
        );
    }

    #[test]
    fn test_roundtrip_bytes() {
        let original = Secp256k1KeyPair::generate();
        let bytes = original.to_bytes();
        let restored = Secp256k1KeyPair::from_bytes(bytes).unwrap();

        assert_eq!(original.public_key(), restored.public_key());
    }
}
