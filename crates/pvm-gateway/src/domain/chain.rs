//! Block assembly and hashing.
//!
//! `hash = sha256(index ‖ previousHash ‖ merkleRoot ‖ timestamp ‖ validator)`,
//! signed by the proposer over the hash string. The merkle root pairs
//! SHA-256 leaves of the transaction hashes, duplicating the last node on
//! odd levels.

use shared_crypto::hashing::Hash;
use shared_crypto::{recover_address, sha256, to_prefixed_hex, Sha256Hasher};
use shared_types::{same_address, BlockDto, TransactionDto, NO_SIGNATURE, ZERO_ADDRESS};

/// Parent hash of the genesis block.
pub const GENESIS_PARENT: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

fn hash_concat(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256Hasher::new();
    hasher.update(left).update(right);
    hasher.finalize()
}

/// Merkle root over transaction hashes, `0x`-prefixed hex.
pub fn merkle_root(transactions: &[TransactionDto]) -> String {
    if transactions.is_empty() {
        return to_prefixed_hex(&[0u8; 32]);
    }

    let mut level: Vec<Hash> = transactions
        .iter()
        .map(|tx| sha256(tx.hash.as_bytes()))
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash_concat(left, right)
            })
            .collect();
    }

    to_prefixed_hex(&level[0])
}

/// Header hash of `block`; the `hash` and `signature` fields are ignored.
pub fn block_hash(block: &BlockDto) -> String {
    let mut hasher = Sha256Hasher::new();
    hasher
        .update(block.index.to_string())
        .update(&block.previous_hash)
        .update(&block.merkle_root)
        .update(block.timestamp.to_string())
        .update(&block.validator);
    hasher.finalize_hex()
}

/// Unsigned block on top of `parent`, with `hash` and `merkle_root` filled.
pub fn assemble_block(
    parent: &BlockDto,
    transactions: Vec<TransactionDto>,
    validator: &str,
    timestamp: u64,
) -> BlockDto {
    let mut block = BlockDto {
        index: parent.index + 1,
        hash: String::new(),
        previous_hash: parent.hash.clone(),
        merkle_root: merkle_root(&transactions),
        timestamp,
        validator: validator.to_string(),
        signature: String::new(),
        transactions,
    };
    block.hash = block_hash(&block);
    block
}

/// The fixed first block every ledger starts from.
pub fn genesis_block() -> BlockDto {
    let mut block = BlockDto {
        index: 0,
        hash: String::new(),
        previous_hash: GENESIS_PARENT.to_string(),
        merkle_root: merkle_root(&[]),
        timestamp: 0,
        validator: ZERO_ADDRESS.to_string(),
        signature: NO_SIGNATURE.to_string(),
        transactions: Vec::new(),
    };
    block.hash = block_hash(&block);
    block
}

/// Why a block cannot follow its claimed parent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockCheckError {
    #[error("expected index {expected}, got {actual}")]
    WrongIndex { expected: u64, actual: u64 },
    #[error("parent hash does not match the chain head")]
    WrongParent,
    #[error("merkle root does not match the transactions")]
    BadMerkleRoot,
    #[error("block hash does not match its header")]
    BadHash,
    #[error("signature does not recover to the validator")]
    BadSignature,
}

/// Structural checks of `block` against the current head.
///
/// The signature check is skipped for [`NO_SIGNATURE`] blocks only when
/// `allow_unsigned` is set.
pub fn check_block(
    block: &BlockDto,
    head: &BlockDto,
    allow_unsigned: bool,
) -> Result<(), BlockCheckError> {
    if block.index != head.index + 1 {
        return Err(BlockCheckError::WrongIndex {
            expected: head.index + 1,
            actual: block.index,
        });
    }
    if block.previous_hash != head.hash {
        return Err(BlockCheckError::WrongParent);
    }
    if block.merkle_root != merkle_root(&block.transactions) {
        return Err(BlockCheckError::BadMerkleRoot);
    }
    if block.hash != block_hash(block) {
        return Err(BlockCheckError::BadHash);
    }
    if allow_unsigned && block.signature == NO_SIGNATURE {
        return Ok(());
    }
    match recover_address(block.hash.as_bytes(), &block.signature) {
        Ok(signer) if same_address(&signer, &block.validator) => Ok(()),
        _ => Err(BlockCheckError::BadSignature),
    }
}
