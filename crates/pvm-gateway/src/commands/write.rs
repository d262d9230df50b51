//! Write commands.
//!
//! Value moves and table actions become signed mempool entries. Account,
//! schema and table creation write straight to the ledger. `mine` and
//! `block` finalize pending entries into a block.

use std::sync::Arc;

use async_trait::async_trait;
use pvm_mempool::{EntryDraft, MempoolApi, MempoolEntry};
use pvm_validators::ValidatorSelector;
use serde_json::{json, Value};
use shared_crypto::{sha256_hex, to_prefixed_hex, Sha256Hasher, Signer};
use shared_types::{
    parse_amount, same_address, Address, BlockDto, ContractSchemaDto, GameStateDto, U256,
    ZERO_ADDRESS,
};
use tracing::{debug, error, info, instrument, warn};

use super::{sign_result, CommandError, WriteCommand, WriteOutcome};
use crate::domain::chain::{assemble_block, check_block};
use crate::ports::{
    GameEngine, LedgerReader, LedgerWriter, PlayerAction, TimeSource, BUY_IN_ACTION,
};
use crate::projection::GameProjector;

/// Signs drafts with the node key and places them in the mempool.
#[derive(Clone)]
pub struct EntryQueue {
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) time: Arc<dyn TimeSource>,
}

impl EntryQueue {
    fn now(&self) -> u64 {
        self.time.now()
    }

    fn submit(&self, draft: EntryDraft) -> Result<MempoolEntry, CommandError> {
        let signature = self.signer.sign(draft.hash().as_bytes())?;
        let entry = draft.seal(signature);
        self.mempool.add(entry.clone())?;
        debug!(hash = %entry.hash, action = %entry.action, "Entry queued");
        Ok(entry)
    }
}

/// Ledger balance of `address`, read as an integer.
async fn balance_of(ledger: &dyn LedgerReader, address: &str) -> Result<U256, CommandError> {
    let account = ledger.account(address).await?;
    parse_amount(&account.balance)
        .map_err(|e| CommandError::Rejected(format!("unreadable balance for {address}: {e}")))
}

/// First 20 bytes of `digest`, `0x`-prefixed.
fn derived_address(digest: &[u8; 32]) -> Address {
    to_prefixed_hex(&digest[..20])
}

/// Flavours of plain value movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Transfer,
    /// Credit from a bridge deposit; no sender balance.
    Mint,
    /// Destroy value on this ledger for release on a bridge.
    Burn,
    /// Move value off the ledger to an external receiver.
    Withdraw,
}

impl TransferKind {
    pub fn action(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Mint => "mint",
            Self::Burn => "burn",
            Self::Withdraw => "withdraw",
        }
    }
}

/// `transfer`, `mint`, `burn` and `withdraw`.
pub struct ValueTransferCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) queue: EntryQueue,
    pub(super) kind: TransferKind,
    pub(super) from: Address,
    pub(super) to: Address,
    pub(super) amount: U256,
    pub(super) data: Option<String>,
}

#[async_trait]
impl WriteCommand for ValueTransferCommand {
    #[instrument(skip(self), fields(kind = ?self.kind, from = %self.from, to = %self.to))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        if self.amount.is_zero() {
            return Err(CommandError::Rejected("amount must be positive".into()));
        }
        if self.kind != TransferKind::Mint {
            let balance = balance_of(self.ledger.as_ref(), &self.from).await?;
            if balance < self.amount {
                return Err(CommandError::Rejected(format!(
                    "{} holds {}, needs {}",
                    self.from, balance, self.amount
                )));
            }
        }

        let entry = self.queue.submit(EntryDraft {
            from: self.from.clone(),
            to: self.to.clone(),
            action: self.kind.action().to_string(),
            value: self.amount,
            timestamp: self.queue.now(),
            index: None,
            data: self.data.clone(),
        })?;
        let result = sign_result(self.queue.signer.as_ref(), &entry.to_dto())?;
        Ok(WriteOutcome::new(result))
    }
}

/// `create_account [publicKey]`.
pub struct CreateAccountCommand {
    pub(super) ledger_writer: Arc<dyn LedgerWriter>,
    pub(super) signer: Arc<dyn Signer>,
    /// Derived from the supplied public key at construction.
    pub(super) address: Address,
}

#[async_trait]
impl WriteCommand for CreateAccountCommand {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let account = self.ledger_writer.create_account(&self.address).await?;
        Ok(WriteOutcome::new(sign_result(self.signer.as_ref(), &account)?))
    }
}

/// `create_contract_schema [owner, category, name, schema]`.
pub struct CreateContractSchemaCommand {
    pub(super) ledger_writer: Arc<dyn LedgerWriter>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) owner: Address,
    pub(super) category: String,
    pub(super) name: String,
    /// Compact JSON text.
    pub(super) schema: String,
}

impl CreateContractSchemaCommand {
    fn address(&self) -> Address {
        let mut hasher = Sha256Hasher::new();
        hasher
            .update(&self.owner)
            .update(&self.category)
            .update(&self.name)
            .update(&self.schema);
        derived_address(&hasher.finalize())
    }
}

#[async_trait]
impl WriteCommand for CreateContractSchemaCommand {
    #[instrument(skip(self), fields(owner = %self.owner, name = %self.name))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let schema = ContractSchemaDto {
            address: self.address(),
            category: self.category.clone(),
            name: self.name.clone(),
            schema: self.schema.clone(),
            hash: sha256_hex(self.schema.as_bytes()),
        };
        self.ledger_writer.save_contract_schema(schema.clone()).await?;
        info!(address = %schema.address, category = %schema.category, "Contract schema created");
        Ok(WriteOutcome::new(sign_result(self.signer.as_ref(), &schema)?))
    }
}

/// Where a new table takes its options from.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// `deploy_contract`: options supplied with the call.
    Inline(Value),
    /// `new_table`: options stored in a contract schema.
    Schema(Address),
}

/// `deploy_contract` and `new_table`.
pub struct CreateTableCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) ledger_writer: Arc<dyn LedgerWriter>,
    pub(super) engine: Arc<dyn GameEngine>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) owner: Address,
    pub(super) nonce: u64,
    pub(super) source: TableSource,
}

impl CreateTableCommand {
    fn address(&self) -> Address {
        let source = match &self.source {
            TableSource::Inline(options) => options.to_string(),
            TableSource::Schema(address) => address.clone(),
        };
        let mut hasher = Sha256Hasher::new();
        hasher
            .update(&self.owner)
            .update(self.nonce.to_string())
            .update(source);
        derived_address(&hasher.finalize())
    }

    async fn options(&self) -> Result<Value, CommandError> {
        match &self.source {
            TableSource::Inline(options) => Ok(options.clone()),
            TableSource::Schema(address) => {
                let schema = self
                    .ledger
                    .contract_schema(address)
                    .await?
                    .ok_or_else(|| CommandError::NotFound(format!("schema {address}")))?;
                Ok(serde_json::from_str(&schema.schema)?)
            }
        }
    }
}

#[async_trait]
impl WriteCommand for CreateTableCommand {
    #[instrument(skip(self), fields(owner = %self.owner, nonce = self.nonce))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let address = self.address();
        if self.ledger.game_state(&address).await?.is_some() {
            return Err(CommandError::Rejected(format!("table {address} already exists")));
        }
        let options = self.options().await?;
        let state = self.engine.new_game(&address, &self.owner, &options)?;
        self.ledger_writer.save_game_state(&address, state).await?;
        info!(table = %address, "Table created");

        let result = sign_result(
            self.signer.as_ref(),
            &json!({ "address": address, "owner": self.owner }),
        )?;
        Ok(WriteOutcome::new(result).touching(vec![address]))
    }
}

/// `perform_action` and `new_hand`.
///
/// The action is checked against the table's projected state before it is
/// queued, so the mempool only holds actions that were legal on arrival.
pub struct PerformActionCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) projector: Arc<GameProjector>,
    pub(super) queue: EntryQueue,
    pub(super) table: Address,
    pub(super) action: PlayerAction,
}

#[async_trait]
impl WriteCommand for PerformActionCommand {
    #[instrument(
        skip(self),
        fields(table = %self.table, action = %self.action.action, index = self.action.index)
    )]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        if self.action.action == BUY_IN_ACTION && !self.action.amount.is_zero() {
            let balance = balance_of(self.ledger.as_ref(), &self.action.actor).await?;
            if balance < self.action.amount {
                return Err(CommandError::Rejected(format!(
                    "{} cannot buy in for {}",
                    self.action.actor, self.action.amount
                )));
            }
        }

        let mut game = self.projector.replay(&self.table).await?;
        game.perform_action(&self.action)?;

        let entry = self.queue.submit(EntryDraft {
            from: self.action.actor.clone(),
            to: self.table.clone(),
            action: self.action.action.clone(),
            value: self.action.amount,
            timestamp: self.queue.now(),
            index: Some(self.action.index),
            data: self.action.data.clone(),
        })?;
        let result = sign_result(self.queue.signer.as_ref(), &entry.to_dto())?;
        Ok(WriteOutcome::new(result).touching(vec![self.table.clone()]))
    }
}

/// Appends a block and folds its table actions into stored game state.
#[derive(Clone)]
pub struct BlockFinalizer {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) ledger_writer: Arc<dyn LedgerWriter>,
    pub(super) projector: Arc<GameProjector>,
    pub(super) mempool: Arc<dyn MempoolApi>,
}

impl BlockFinalizer {
    /// Tables the block's actions target, lowercased and deduplicated.
    fn tables_of(block: &BlockDto) -> Vec<Address> {
        let mut tables: Vec<Address> = block
            .transactions
            .iter()
            .filter(|tx| tx.index.is_some())
            .map(|tx| tx.to.to_ascii_lowercase())
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Returns the tables whose stored state changed.
    ///
    /// Folded states are written before the block. When any write fails the
    /// states already written are put back, so a failed block leaves both
    /// the chain and the tables where they were.
    #[instrument(skip(self, block), fields(index = block.index, hash = %block.hash))]
    pub async fn finalize(&self, block: BlockDto) -> Result<Vec<Address>, CommandError> {
        let tables = Self::tables_of(&block);
        let mut staged = Vec::with_capacity(tables.len());
        for table in &tables {
            let Some(previous) = self.ledger.game_state(table).await? else {
                warn!(table = %table, "Block carries actions for an unknown table");
                continue;
            };
            if let Some(next) = self.projector.fold(table, &block.transactions).await? {
                staged.push((table.clone(), previous, next));
            }
        }
        let hashes: Vec<String> = block.transactions.iter().map(|tx| tx.hash.clone()).collect();

        let mut saved = Vec::with_capacity(staged.len());
        for (table, previous, next) in staged {
            if let Err(e) = self.ledger_writer.save_game_state(&table, next).await {
                self.roll_back(saved).await;
                return Err(e.into());
            }
            saved.push((table, previous));
        }
        if let Err(e) = self.ledger_writer.append_block(block).await {
            self.roll_back(saved).await;
            return Err(e.into());
        }

        let removed = self.mempool.remove_many(&hashes);
        debug!(included = hashes.len(), removed, "Finalized entries left the mempool");
        Ok(tables)
    }

    async fn roll_back(&self, saved: Vec<(Address, GameStateDto)>) {
        for (table, previous) in saved {
            if let Err(e) = self.ledger_writer.save_game_state(&table, previous).await {
                error!(table = %table, error = %e, "Failed to restore game state");
            }
        }
    }
}

/// `mine`: build, sign and append the next block from the whole mempool.
pub struct MineCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) validators: Arc<ValidatorSelector>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) time: Arc<dyn TimeSource>,
    pub(super) finalizer: BlockFinalizer,
}

#[async_trait]
impl WriteCommand for MineCommand {
    #[instrument(skip(self))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let proposer = self.signer.address();
        if !self.validators.config().trust_all
            && !self.validators.is_next_proposer(&proposer).await?
        {
            return Err(CommandError::Rejected(format!(
                "{proposer} is not the next proposer"
            )));
        }
        let pending = self.mempool.find_all();
        if pending.is_empty() {
            return Err(CommandError::Rejected("mempool is empty".into()));
        }

        let head = self.ledger.last_block().await?;
        let transactions = pending.iter().map(MempoolEntry::to_dto).collect();
        let mut block = assemble_block(&head, transactions, &proposer, self.time.now());
        block.signature = self.signer.sign(block.hash.as_bytes())?;

        let tables = self.finalizer.finalize(block.clone()).await?;
        info!(
            index = block.index,
            hash = %block.hash,
            tx_count = block.tx_count(),
            "Block mined"
        );
        Ok(WriteOutcome::new(sign_result(self.signer.as_ref(), &block)?).touching(tables))
    }
}

/// `block [block]`: accept a block mined by the current proposer.
pub struct ReceiveBlockCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) validators: Arc<ValidatorSelector>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) finalizer: BlockFinalizer,
    pub(super) block: BlockDto,
}

#[async_trait]
impl WriteCommand for ReceiveBlockCommand {
    #[instrument(skip(self), fields(index = self.block.index, validator = %self.block.validator))]
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let head = self.ledger.last_block().await?;
        let trust_all = self.validators.config().trust_all;
        check_block(&self.block, &head, trust_all)?;
        if !trust_all {
            let expected = self.validators.get_next_validator_address(false).await?;
            if expected == ZERO_ADDRESS || !same_address(&expected, &self.block.validator) {
                return Err(CommandError::Rejected(format!(
                    "block proposed by {}, expected {expected}",
                    self.block.validator
                )));
            }
        }

        let tables = self.finalizer.finalize(self.block.clone()).await?;
        info!(index = self.block.index, hash = %self.block.hash, "Block accepted");
        let result = sign_result(
            self.signer.as_ref(),
            &json!({ "index": self.block.index, "hash": self.block.hash }),
        )?;
        Ok(WriteOutcome::new(result).touching(tables))
    }
}

/// `mined_block_hash [hash, nodeUrl?]`: a peer announcing a block.
pub struct MinedBlockHashCommand {
    pub(super) ledger: Arc<dyn LedgerReader>,
    pub(super) signer: Arc<dyn Signer>,
    pub(super) hash: String,
    pub(super) node_url: Option<String>,
}

#[async_trait]
impl WriteCommand for MinedBlockHashCommand {
    async fn execute(&self) -> Result<WriteOutcome, CommandError> {
        let known = self.ledger.block_by_hash(&self.hash).await?.is_some();
        info!(
            hash = %self.hash,
            node_url = self.node_url.as_deref().unwrap_or("-"),
            known,
            "Peer announced mined block"
        );
        let result = sign_result(
            self.signer.as_ref(),
            &json!({ "hash": self.hash, "known": known, "nodeUrl": self.node_url }),
        )?;
        Ok(WriteOutcome::new(result))
    }
}

/// Seed for `new_hand` when the caller gives none.
pub fn default_seed(table: &str, index: u64, timestamp: u64) -> String {
    let mut hasher = Sha256Hasher::new();
    hasher
        .update(table)
        .update(index.to_string())
        .update(timestamp.to_string());
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DevGameEngine, InMemoryLedger, StaticRoster};
    use crate::ports::PortError;
    use pvm_mempool::{Mempool, MempoolConfig, OperatorCredentials};
    use pvm_validators::{SystemTimeSource, ValidatorConfig};
    use shared_crypto::{NoSignatureSigner, Secp256k1Signer};

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        mempool: Arc<dyn MempoolApi>,
        projector: Arc<GameProjector>,
        signer: Arc<dyn Signer>,
    }

    impl Fixture {
        fn new() -> Self {
            let ledger = Arc::new(InMemoryLedger::new());
            let mempool: Arc<dyn MempoolApi> = Arc::new(Mempool::new(
                MempoolConfig::default(),
                OperatorCredentials::default(),
            ));
            let projector = Arc::new(GameProjector::new(
                ledger.clone(),
                Arc::new(DevGameEngine),
                mempool.clone(),
            ));
            Self {
                ledger,
                mempool,
                projector,
                signer: Arc::new(NoSignatureSigner),
            }
        }

        fn queue(&self) -> EntryQueue {
            EntryQueue {
                mempool: self.mempool.clone(),
                signer: self.signer.clone(),
                time: Arc::new(SystemTimeSource),
            }
        }

        fn finalizer(&self) -> BlockFinalizer {
            BlockFinalizer {
                ledger: self.ledger.clone(),
                ledger_writer: self.ledger.clone(),
                projector: self.projector.clone(),
                mempool: self.mempool.clone(),
            }
        }

        fn transfer(&self, kind: TransferKind, from: &str, to: &str, amount: u64) -> ValueTransferCommand {
            ValueTransferCommand {
                ledger: self.ledger.clone(),
                queue: self.queue(),
                kind,
                from: from.into(),
                to: to.into(),
                amount: U256::from(amount),
                data: None,
            }
        }

        fn trust_all_validators(&self) -> Arc<ValidatorSelector> {
            Arc::new(ValidatorSelector::new(
                ValidatorConfig {
                    trust_all: true,
                    ..ValidatorConfig::default()
                },
                Arc::new(StaticRoster::default()),
                self.ledger.clone(),
            ))
        }

        async fn table(&self) -> Address {
            let cmd = CreateTableCommand {
                ledger: self.ledger.clone(),
                ledger_writer: self.ledger.clone(),
                engine: Arc::new(DevGameEngine),
                signer: self.signer.clone(),
                owner: ALICE.into(),
                nonce: 1,
                source: TableSource::Inline(json!({ "maxPlayers": 6 })),
            };
            cmd.execute().await.unwrap().touched_tables[0].clone()
        }

        fn action(&self, table: &str, actor: &str, action: &str, index: u64, amount: u64) -> PerformActionCommand {
            PerformActionCommand {
                ledger: self.ledger.clone(),
                projector: self.projector.clone(),
                queue: self.queue(),
                table: table.into(),
                action: PlayerAction {
                    actor: actor.into(),
                    action: action.into(),
                    index,
                    amount: U256::from(amount),
                    data: None,
                },
            }
        }
    }

    #[tokio::test]
    async fn test_transfer_needs_funds() {
        let fx = Fixture::new();
        let cmd = fx.transfer(TransferKind::Transfer, ALICE, BOB, 10);
        assert!(matches!(cmd.execute().await, Err(CommandError::Rejected(_))));
        assert!(fx.mempool.is_empty());

        fx.ledger.credit(ALICE, U256::from(10u64));
        let outcome = cmd.execute().await.unwrap();
        assert_eq!(outcome.result.data["value"], json!("10"));
        assert_eq!(fx.mempool.len(), 1);
        assert!(outcome.touched_tables.is_empty());
    }

    #[tokio::test]
    async fn test_mint_needs_no_balance_and_zero_is_rejected() {
        let fx = Fixture::new();
        let mint = ValueTransferCommand {
            from: ZERO_ADDRESS.into(),
            data: Some("7".into()),
            ..fx.transfer(TransferKind::Mint, ZERO_ADDRESS, BOB, 5)
        };
        let outcome = mint.execute().await.unwrap();
        assert_eq!(outcome.result.data["action"], json!("mint"));
        assert_eq!(outcome.result.data["data"], json!("7"));

        let zero = fx.transfer(TransferKind::Mint, ZERO_ADDRESS, BOB, 0);
        assert!(matches!(zero.execute().await, Err(CommandError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_entry_signature_covers_hash() {
        let fx = Fixture {
            signer: Arc::new(Secp256k1Signer::ephemeral().unwrap()),
            ..Fixture::new()
        };
        fx.ledger.credit(ALICE, U256::from(1u64));
        let outcome = fx.transfer(TransferKind::Transfer, ALICE, BOB, 1).execute().await.unwrap();
        let entry = fx.mempool.find_all().remove(0);
        assert_eq!(outcome.result.data["hash"], json!(entry.hash));
        let signer = shared_crypto::recover_address(entry.hash.as_bytes(), &entry.signature).unwrap();
        assert_eq!(signer, fx.signer.address());
    }

    #[tokio::test]
    async fn test_schema_and_table_from_schema() {
        let fx = Fixture::new();
        let create = CreateContractSchemaCommand {
            ledger_writer: fx.ledger.clone(),
            signer: fx.signer.clone(),
            owner: ALICE.into(),
            category: "cash".into(),
            name: "six-max".into(),
            schema: r#"{"maxPlayers":6}"#.into(),
        };
        let schema_address = create.address();
        create.execute().await.unwrap();
        assert!(create.execute().await.is_err(), "duplicate schema is rejected");

        let table = CreateTableCommand {
            ledger: fx.ledger.clone(),
            ledger_writer: fx.ledger.clone(),
            engine: Arc::new(DevGameEngine),
            signer: fx.signer.clone(),
            owner: ALICE.into(),
            nonce: 1,
            source: TableSource::Schema(schema_address),
        };
        let outcome = table.execute().await.unwrap();
        let address = outcome.touched_tables[0].clone();
        let state = fx.ledger.game_state(&address).await.unwrap().unwrap();
        assert_eq!(state["options"]["maxPlayers"], json!(6));
        assert!(matches!(table.execute().await, Err(CommandError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_action_is_validated_against_projection() {
        let fx = Fixture::new();
        let table = fx.table().await;
        fx.ledger.credit(ALICE, U256::from(100u64));

        fx.action(&table, ALICE, "join", 0, 100).execute().await.unwrap();
        // Same index again no longer fits the projected state.
        let replay = fx.action(&table, BOB, "join", 0, 0);
        assert!(matches!(replay.execute().await, Err(CommandError::Engine(_))));
        // Bob is not seated.
        let bet = fx.action(&table, BOB, "bet", 1, 5);
        assert!(bet.execute().await.is_err());
        assert_eq!(fx.mempool.len(), 1);
    }

    #[tokio::test]
    async fn test_buy_in_needs_funds() {
        let fx = Fixture::new();
        let table = fx.table().await;
        let join = fx.action(&table, BOB, "join", 0, 50);
        assert!(matches!(join.execute().await, Err(CommandError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_mine_folds_actions_and_drains_mempool() {
        let fx = Fixture::new();
        let table = fx.table().await;
        fx.ledger.credit(ALICE, U256::from(100u64));
        fx.ledger.credit(BOB, U256::from(100u64));
        fx.action(&table, ALICE, "join", 0, 100).execute().await.unwrap();
        fx.action(&table, BOB, "join", 1, 80).execute().await.unwrap();

        let mine = MineCommand {
            ledger: fx.ledger.clone(),
            validators: fx.trust_all_validators(),
            signer: fx.signer.clone(),
            mempool: fx.mempool.clone(),
            time: Arc::new(SystemTimeSource),
            finalizer: fx.finalizer(),
        };
        let outcome = mine.execute().await.unwrap();
        assert_eq!(outcome.touched_tables, vec![table.clone()]);
        assert_eq!(outcome.result.data["transactions"].as_array().unwrap().len(), 2);
        assert!(fx.mempool.is_empty());
        assert_eq!(fx.ledger.height(), 1);

        let stored = fx.ledger.game_state(&table).await.unwrap().unwrap();
        assert_eq!(stored["players"].as_array().unwrap().len(), 2);
        assert_eq!(stored["nextIndex"], json!(2));
        assert_eq!(fx.ledger.account(BOB).await.unwrap().balance, "20");

        assert!(matches!(mine.execute().await, Err(CommandError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_mine_refused_when_not_proposer() {
        let fx = Fixture::new();
        fx.ledger.credit(ALICE, U256::from(1u64));
        fx.transfer(TransferKind::Transfer, ALICE, BOB, 1).execute().await.unwrap();
        let validators = Arc::new(ValidatorSelector::new(
            ValidatorConfig::default(),
            Arc::new(StaticRoster::default()),
            fx.ledger.clone(),
        ));
        let mine = MineCommand {
            ledger: fx.ledger.clone(),
            validators,
            signer: fx.signer.clone(),
            mempool: fx.mempool.clone(),
            time: Arc::new(SystemTimeSource),
            finalizer: fx.finalizer(),
        };
        assert!(matches!(mine.execute().await, Err(CommandError::Rejected(_))));
        assert_eq!(fx.mempool.len(), 1);
    }

    /// Writer that can refuse blocks or game states, delegating the rest.
    struct FaultyWriter {
        inner: Arc<InMemoryLedger>,
        refuse_blocks: bool,
        refuse_states: bool,
    }

    #[async_trait]
    impl LedgerWriter for FaultyWriter {
        async fn append_block(&self, block: BlockDto) -> Result<(), PortError> {
            if self.refuse_blocks {
                return Err(PortError::Unavailable("block store down".into()));
            }
            self.inner.append_block(block).await
        }

        async fn create_account(&self, address: &str) -> Result<shared_types::AccountDto, PortError> {
            self.inner.create_account(address).await
        }

        async fn save_contract_schema(&self, schema: ContractSchemaDto) -> Result<(), PortError> {
            self.inner.save_contract_schema(schema).await
        }

        async fn save_game_state(&self, table: &str, state: GameStateDto) -> Result<(), PortError> {
            if self.refuse_states {
                return Err(PortError::Unavailable("state store down".into()));
            }
            self.inner.save_game_state(table, state).await
        }

        async fn reset(&self) -> Result<(), PortError> {
            self.inner.reset().await
        }
    }

    async fn pending_block(fx: &Fixture) -> (Address, BlockDto) {
        let table = fx.table().await;
        fx.ledger.credit(ALICE, U256::from(100u64));
        fx.action(&table, ALICE, "join", 0, 100).execute().await.unwrap();
        let head = fx.ledger.last_block().await.unwrap();
        let transactions = fx.mempool.find_all().iter().map(MempoolEntry::to_dto).collect();
        (table, assemble_block(&head, transactions, ZERO_ADDRESS, 1))
    }

    fn faulty_finalizer(fx: &Fixture, refuse_blocks: bool, refuse_states: bool) -> BlockFinalizer {
        BlockFinalizer {
            ledger_writer: Arc::new(FaultyWriter {
                inner: fx.ledger.clone(),
                refuse_blocks,
                refuse_states,
            }),
            ..fx.finalizer()
        }
    }

    #[tokio::test]
    async fn test_refused_block_restores_table_state() {
        let fx = Fixture::new();
        let (table, block) = pending_block(&fx).await;
        let before = fx.ledger.game_state(&table).await.unwrap();

        let result = faulty_finalizer(&fx, true, false).finalize(block).await;
        assert!(matches!(result, Err(CommandError::Port(_))));
        assert_eq!(fx.ledger.height(), 0);
        assert_eq!(fx.ledger.game_state(&table).await.unwrap(), before);
        assert_eq!(fx.mempool.len(), 1, "entries stay pending for the next block");
    }

    #[tokio::test]
    async fn test_refused_state_keeps_block_out() {
        let fx = Fixture::new();
        let (table, block) = pending_block(&fx).await;
        let before = fx.ledger.game_state(&table).await.unwrap();

        let result = faulty_finalizer(&fx, false, true).finalize(block.clone()).await;
        assert!(matches!(result, Err(CommandError::Port(_))));
        assert_eq!(fx.ledger.height(), 0);
        assert!(fx.ledger.block_by_hash(&block.hash).await.unwrap().is_none());
        assert_eq!(fx.ledger.game_state(&table).await.unwrap(), before);
        assert_eq!(fx.mempool.len(), 1);

        // The same block goes through once the store recovers.
        assert_eq!(fx.finalizer().finalize(block).await.unwrap(), vec![table.clone()]);
        assert_eq!(fx.ledger.height(), 1);
        assert!(fx.mempool.is_empty());
        let stored = fx.ledger.game_state(&table).await.unwrap().unwrap();
        assert_eq!(stored["nextIndex"], json!(1));
    }

    #[tokio::test]
    async fn test_receive_block_checks_parent() {
        let fx = Fixture::new();
        let genesis = fx.ledger.last_block().await.unwrap();
        let good = assemble_block(&genesis, vec![], ZERO_ADDRESS, 1);
        let mut orphan = good.clone();
        orphan.index = 5;

        let receive = |block: BlockDto| ReceiveBlockCommand {
            ledger: fx.ledger.clone(),
            validators: fx.trust_all_validators(),
            signer: fx.signer.clone(),
            finalizer: fx.finalizer(),
            block,
        };
        assert!(matches!(
            receive(orphan).execute().await,
            Err(CommandError::Block(_))
        ));
        let mut unsigned = good;
        unsigned.signature = shared_types::NO_SIGNATURE.into();
        receive(unsigned).execute().await.unwrap();
        assert_eq!(fx.ledger.height(), 1);
    }

    #[tokio::test]
    async fn test_mined_block_hash_reports_knowledge() {
        let fx = Fixture::new();
        let genesis = fx.ledger.last_block().await.unwrap();
        let cmd = MinedBlockHashCommand {
            ledger: fx.ledger.clone(),
            signer: fx.signer.clone(),
            hash: genesis.hash.clone(),
            node_url: Some("http://peer".into()),
        };
        let data = cmd.execute().await.unwrap().result.data;
        assert_eq!(data["known"], json!(true));
        assert_eq!(data["nodeUrl"], json!("http://peer"));
    }

    #[test]
    fn test_default_seed_varies_by_index() {
        assert_ne!(default_seed("0xabc", 1, 5), default_seed("0xabc", 2, 5));
        assert_eq!(default_seed("0xabc", 1, 5), default_seed("0xabc", 1, 5));
    }
}
