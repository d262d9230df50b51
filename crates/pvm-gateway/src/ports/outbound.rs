//! Outbound (Driven) ports for the gateway.
//!
//! The ledger and the game rules engine are external collaborators. The
//! gateway reads and appends through these traits and never inspects
//! persisted layout.

use async_trait::async_trait;
use primitive_types::U256;
use serde_json::Value;
use shared_types::{AccountDto, Address, BlockDto, ContractSchemaDto, GameStateDto, TransactionDto};

pub use pvm_validators::{ChainHead, RosterSource, SystemTimeSource, TimeSource, Timestamp};

/// Ledger or storage fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Finalized ledger reads.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Chain head. A ledger always holds at least its genesis block.
    async fn last_block(&self) -> Result<BlockDto, PortError>;

    async fn block_by_index(&self, index: u64) -> Result<Option<BlockDto>, PortError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Option<BlockDto>, PortError>;

    /// Up to `count` blocks starting at `start`, ascending.
    async fn blocks_from(&self, start: u64, count: u64) -> Result<Vec<BlockDto>, PortError>;

    async fn transaction(&self, hash: &str) -> Result<Option<TransactionDto>, PortError>;

    /// Up to `count` most recent finalized transactions, newest first.
    async fn recent_transactions(&self, count: u64) -> Result<Vec<TransactionDto>, PortError>;

    /// Unknown addresses read as a zero-balance account.
    async fn account(&self, address: &str) -> Result<AccountDto, PortError>;

    async fn contract_schema(&self, address: &str) -> Result<Option<ContractSchemaDto>, PortError>;

    /// Stored (finalized) state of a table.
    async fn game_state(&self, table: &str) -> Result<Option<GameStateDto>, PortError>;
}

/// Ledger mutations. Blocks are append-only.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Append a block and apply its value movements.
    async fn append_block(&self, block: BlockDto) -> Result<(), PortError>;

    async fn create_account(&self, address: &str) -> Result<AccountDto, PortError>;

    async fn save_contract_schema(&self, schema: ContractSchemaDto) -> Result<(), PortError>;

    async fn save_game_state(&self, table: &str, state: GameStateDto) -> Result<(), PortError>;

    /// Drop everything back to genesis.
    async fn reset(&self) -> Result<(), PortError>;
}

/// Rules-engine fault. Engine rejections are execution faults to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("malformed game state: {0}")]
    MalformedState(String),
    #[error("illegal action: {0}")]
    IllegalAction(String),
}

/// Table action whose `value` moves from the player's ledger balance to
/// the table. Every other table action only moves chips inside game state.
pub const BUY_IN_ACTION: &str = "join";

/// One player action against a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAction {
    pub actor: Address,
    /// Action name: `join`, `leave`, `fold`, `bet`, `new-hand`, ...
    pub action: String,
    /// Sequence index of the action within the table's history.
    pub index: u64,
    pub amount: U256,
    pub data: Option<String>,
}

/// A live game reconstructed from its serialized state.
pub trait GameInstance: Send {
    fn perform_action(&mut self, action: &PlayerAction) -> Result<(), EngineError>;

    /// Full state, private information included. This is what the ledger
    /// stores; it is never sent to viewers.
    fn snapshot(&self) -> GameStateDto;

    /// Projection owed to `viewer`: other players' private information is
    /// withheld, and `None` withholds all of it.
    fn serialize(&self, viewer: Option<&str>) -> GameStateDto;
}

/// Poker rules engine.
pub trait GameEngine: Send + Sync {
    /// Fresh table state at `address`.
    fn new_game(&self, address: &str, owner: &str, options: &Value) -> Result<GameStateDto, EngineError>;

    /// Rebuild a live game from canonical state.
    fn restore(&self, state: &GameStateDto) -> Result<Box<dyn GameInstance>, EngineError>;
}
