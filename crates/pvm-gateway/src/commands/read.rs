//! Read commands.
//!
//! Side-effect free lookups against the ledger, mempool, roster and the
//! game projector. Every result is signed by the node key.

use std::sync::Arc;

use async_trait::async_trait;
use pvm_mempool::{MempoolApi, MempoolEntry};
use pvm_validators::ValidatorSelector;
use serde_json::Value;
use shared_crypto::{to_prefixed_hex, Signer};
use shared_types::{Address, Node, SignedResult, TransactionDto};
use tracing::{debug, instrument};

use super::{sign_result, CommandError, ReadCommand};
use crate::domain::config::NodeIdentityConfig;
use crate::ports::LedgerReader;
use crate::projection::GameProjector;

/// `get_account` and `get_balance`.
pub struct GetAccountCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) address: Address,
    /// Answer with the balance string only.
    pub(super) balance_only: bool,
}

#[async_trait]
impl ReadCommand for GetAccountCommand {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let account = self.ledger.account(&self.address).await?;
        if self.balance_only {
            sign_result(self.signer.as_ref(), &account.balance)
        } else {
            sign_result(self.signer.as_ref(), &account)
        }
    }
}

/// Which block `get_block*` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelector {
    Index(u64),
    Hash(String),
    Last,
}

/// `get_block`, `get_block_by_hash` and `get_last_block`.
pub struct GetBlockCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) selector: BlockSelector,
}

#[async_trait]
impl ReadCommand for GetBlockCommand {
    #[instrument(skip(self), fields(selector = ?self.selector))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let block = match &self.selector {
            BlockSelector::Index(index) => self
                .ledger
                .block_by_index(*index)
                .await?
                .ok_or_else(|| CommandError::NotFound(format!("block {index}")))?,
            BlockSelector::Hash(hash) => self
                .ledger
                .block_by_hash(hash)
                .await?
                .ok_or_else(|| CommandError::NotFound(format!("block {hash}")))?,
            BlockSelector::Last => self.ledger.last_block().await?,
        };
        sign_result(self.signer.as_ref(), &block)
    }
}

pub struct GetBlockHeightCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
}

#[async_trait]
impl ReadCommand for GetBlockHeightCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let head = self.ledger.last_block().await?;
        sign_result(self.signer.as_ref(), &head.index)
    }
}

/// `get_blocks [start?, count?]`.
///
/// Without `start` the newest `count` blocks are returned. `count` is capped
/// at the configured block range.
pub struct GetBlocksCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) start: Option<u64>,
    pub(super) count: Option<u64>,
    pub(super) max_range: u64,
}

impl GetBlocksCommand {
    fn window(&self, head: u64) -> (u64, u64) {
        let count = self.count.unwrap_or(self.max_range).min(self.max_range);
        let start = self
            .start
            .unwrap_or_else(|| (head + 1).saturating_sub(count));
        (start, count)
    }
}

#[async_trait]
impl ReadCommand for GetBlocksCommand {
    #[instrument(skip(self))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let head = self.ledger.last_block().await?;
        let (start, count) = self.window(head.index);
        let blocks = if count == 0 {
            Vec::new()
        } else {
            self.ledger.blocks_from(start, count).await?
        };
        debug!(start, count, returned = blocks.len(), "Block range read");
        sign_result(self.signer.as_ref(), &blocks)
    }
}

/// `get_client`: this node as a roster entry.
pub struct GetClientCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) validators: Arc<ValidatorSelector>,
    pub(super) identity: NodeIdentityConfig,
}

#[async_trait]
impl ReadCommand for GetClientCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let head = self.ledger.last_block().await?;
        let is_validator = self.validators.is_validator(&self.signer.address()).await?;
        let node = Node {
            client: self.identity.client.clone(),
            public_key: self.signer.public_key().unwrap_or_default(),
            url: self.identity.url.clone(),
            version: crate::VERSION.to_string(),
            is_validator,
            name: self.identity.name.clone(),
            height: Some(head.index),
        };
        sign_result(self.signer.as_ref(), &node)
    }
}

pub struct GetContractSchemaCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) address: Address,
}

#[async_trait]
impl ReadCommand for GetContractSchemaCommand {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let schema = self
            .ledger
            .contract_schema(&self.address)
            .await?
            .ok_or_else(|| CommandError::NotFound(format!("schema {}", self.address)))?;
        sign_result(self.signer.as_ref(), &schema)
    }
}

/// `get_game_state [tableAddress, caller?]`: the caller's projection with
/// pending actions replayed.
pub struct GetGameStateCommand {
    pub(super) projector: Arc<GameProjector>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) table: Address,
    pub(super) caller: Option<Address>,
}

#[async_trait]
impl ReadCommand for GetGameStateCommand {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let state = self
            .projector
            .project(&self.table, self.caller.as_deref())
            .await?;
        sign_result(self.signer.as_ref(), &state)
    }
}

pub struct GetMempoolCommand {
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) signer: Arc<dyn Signer>,
}

#[async_trait]
impl ReadCommand for GetMempoolCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let pending: Vec<TransactionDto> = self
            .mempool
            .find_all()
            .iter()
            .map(MempoolEntry::to_dto)
            .collect();
        sign_result(self.signer.as_ref(), &pending)
    }
}

pub struct GetNodesCommand {
    pub(super) validators: Arc<ValidatorSelector>,
    pub(super) signer: Arc<dyn Signer>,
}

#[async_trait]
impl ReadCommand for GetNodesCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let nodes = self.validators.nodes().await?;
        sign_result(self.signer.as_ref(), &nodes)
    }
}

/// `get_shared_secret [publicKey]`: sha256 of the ECDH secret between the
/// node key and `publicKey`.
pub struct GetSharedSecretCommand {
    pub(super) signer: Arc<dyn Signer>,
    pub(super) public_key: String,
}

#[async_trait]
impl ReadCommand for GetSharedSecretCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let secret = self.signer.shared_secret(&self.public_key)?;
        sign_result(self.signer.as_ref(), &to_prefixed_hex(&secret))
    }
}

/// Pending transactions shadow finalized ones with the same hash.
pub struct GetTransactionCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) hash: String,
}

#[async_trait]
impl ReadCommand for GetTransactionCommand {
    #[instrument(skip(self), fields(hash = %self.hash))]
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let tx = match self.mempool.get(&self.hash) {
            Some(entry) => entry.to_dto(),
            None => self
                .ledger
                .transaction(&self.hash)
                .await?
                .ok_or_else(|| CommandError::NotFound(format!("transaction {}", self.hash)))?,
        };
        sign_result(self.signer.as_ref(), &tx)
    }
}

/// `get_transactions [count?]`: newest finalized transactions first.
pub struct GetTransactionsCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) count: Option<u64>,
    pub(super) max_transactions: u64,
}

#[async_trait]
impl ReadCommand for GetTransactionsCommand {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError> {
        let count = self
            .count
            .unwrap_or(self.max_transactions)
            .min(self.max_transactions);
        let txs = self.ledger.recent_transactions(count).await?;
        sign_result(self.signer.as_ref(), &txs)
    }
}
