//! Validator roster and cache entities.

use std::collections::HashMap;

use shared_crypto::Secp256k1PublicKey;
use shared_types::{Address, Node};
use tracing::warn;

use crate::ports::Timestamp;

/// Validator roster in rotation order.
#[derive(Clone, Debug, Default)]
pub struct ValidatorRoster {
    /// Every known node, validators or not.
    nodes: Vec<Node>,
    /// Addresses of validator nodes, in roster order.
    validators: Vec<Address>,
    /// Quick lookup by lowercased address.
    lookup: HashMap<Address, usize>,
}

impl ValidatorRoster {
    /// Build from the nodes reported by the roster source. Validator nodes
    /// whose public key does not parse are left out of the rotation.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let validators: Vec<Address> = nodes
            .iter()
            .filter(|n| n.is_validator)
            .filter_map(|n| match Secp256k1PublicKey::from_hex(&n.public_key)
                .and_then(|k| k.to_address())
            {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(node = %n.name, error = %e, "Skipping validator with unusable public key");
                    None
                }
            })
            .collect();
        Self::with_validators(nodes, validators)
    }

    /// Build from an explicit rotation order.
    pub fn with_validators(nodes: Vec<Node>, validators: Vec<Address>) -> Self {
        let validators: Vec<Address> = validators
            .into_iter()
            .map(|a| a.to_ascii_lowercase())
            .collect();
        let lookup = validators
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();
        Self {
            nodes,
            validators,
            lookup,
        }
    }

    /// Get the number of validators in rotation
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Check if an address is in the rotation (case-insensitive)
    pub fn contains(&self, address: &str) -> bool {
        self.lookup.contains_key(&address.to_ascii_lowercase())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    /// Rotation slot `index`, if present.
    pub fn validator_at(&self, index: usize) -> Option<&Address> {
        self.validators.get(index)
    }
}

/// Cached roster with its refresh bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct ValidatorCache {
    pub roster: ValidatorRoster,
    /// Count reported by the roster source.
    pub validator_count: usize,
    /// When the roster was last fetched.
    pub last_refresh: Timestamp,
    /// False until the first successful fetch.
    pub synced: bool,
}

impl ValidatorCache {
    /// Whether the cached count can be trusted at `now`.
    pub fn is_fresh(&self, now: Timestamp, interval_ms: u64) -> bool {
        self.synced && now.saturating_sub(self.last_refresh) < interval_ms
    }

    /// `roster[(last_block_index + 1) mod validator_count]`.
    ///
    /// `None` when the count is zero or points past the roster.
    pub fn proposer_for(&self, last_block_index: u64) -> Option<&Address> {
        if self.validator_count == 0 {
            return None;
        }
        let slot = (u128::from(last_block_index) + 1) % self.validator_count as u128;
        self.roster.validator_at(slot as usize)
    }
}
