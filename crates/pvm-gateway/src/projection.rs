//! Game-state projection.
//!
//! A table's visible state is its stored (finalized) state with every
//! pending action from the mempool replayed on top, in `index` order, then
//! serialized for one viewer. The same path answers `get_game_state`, feeds
//! table broadcasts and validates new actions before they are queued.

use std::sync::Arc;

use async_trait::async_trait;
use pvm_mempool::{MempoolApi, MempoolEntry};
use shared_types::{parse_amount, GameStateDto, TransactionDto};
use tracing::{debug, instrument, warn};

use crate::ports::{EngineError, GameEngine, GameInstance, LedgerReader, PlayerAction, PortError};

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("no game state for table {0}")]
    UnknownTable(String),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Source of the payloads the broadcast service fans out.
#[async_trait]
pub trait ProjectionSource: Send + Sync {
    /// State of `table` as owed to `viewer`.
    async fn game_projection(
        &self,
        table: &str,
        viewer: Option<&str>,
    ) -> Result<GameStateDto, ProjectionError>;

    /// Pending transactions in insertion order.
    fn mempool_snapshot(&self) -> Vec<TransactionDto>;
}

/// Player action carried by a pending entry. Entries without an `index`
/// (transfers, mints) are not game actions.
pub fn entry_action(entry: &MempoolEntry) -> Option<PlayerAction> {
    Some(PlayerAction {
        actor: entry.from.clone(),
        action: entry.action.clone(),
        index: entry.index?,
        amount: entry.value,
        data: entry.data.clone(),
    })
}

/// Player action carried by a finalized transaction.
pub fn transaction_action(tx: &TransactionDto) -> Option<PlayerAction> {
    Some(PlayerAction {
        actor: tx.from.clone(),
        action: tx.action.clone(),
        index: tx.index?,
        amount: parse_amount(&tx.value).ok()?,
        data: tx.data.clone(),
    })
}

/// Apply `actions` in index order. An action the engine rejects is skipped:
/// it was valid when queued, so a rejection here means an earlier action
/// for the same table already consumed its slot.
fn apply_in_order(table: &str, game: &mut dyn GameInstance, mut actions: Vec<PlayerAction>) {
    actions.sort_by_key(|a| a.index);
    for action in &actions {
        if let Err(e) = game.perform_action(action) {
            warn!(
                table = %table,
                index = action.index,
                action = %action.action,
                error = %e,
                "Skipping action rejected on replay"
            );
        }
    }
}

pub struct GameProjector {
    ledger: Arc<dyn LedgerReader>,
    engine: Arc<dyn GameEngine>,
    mempool: Arc<dyn MempoolApi>,
}

impl GameProjector {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        engine: Arc<dyn GameEngine>,
        mempool: Arc<dyn MempoolApi>,
    ) -> Self {
        Self {
            ledger,
            engine,
            mempool,
        }
    }

    /// Live game for `table` with pending actions applied.
    #[instrument(skip(self))]
    pub async fn replay(&self, table: &str) -> Result<Box<dyn GameInstance>, ProjectionError> {
        let state = self
            .ledger
            .game_state(table)
            .await?
            .ok_or_else(|| ProjectionError::UnknownTable(table.to_string()))?;
        let mut game = self.engine.restore(&state)?;

        let pending: Vec<PlayerAction> = self
            .mempool
            .find_by_target(table)
            .iter()
            .filter_map(entry_action)
            .collect();
        debug!(table = %table, pending = pending.len(), "Replaying pending actions");
        apply_in_order(table, game.as_mut(), pending);

        Ok(game)
    }

    /// Projection of `table` for `viewer` (public view when `None`).
    pub async fn project(
        &self,
        table: &str,
        viewer: Option<&str>,
    ) -> Result<GameStateDto, ProjectionError> {
        Ok(self.replay(table).await?.serialize(viewer))
    }

    /// Stored state of `table` with `transactions` applied, or `None` when
    /// the address holds no game.
    pub async fn fold(
        &self,
        table: &str,
        transactions: &[TransactionDto],
    ) -> Result<Option<GameStateDto>, ProjectionError> {
        let Some(state) = self.ledger.game_state(table).await? else {
            return Ok(None);
        };
        let mut game = self.engine.restore(&state)?;
        let actions = transactions
            .iter()
            .filter(|tx| tx.to.eq_ignore_ascii_case(table))
            .filter_map(transaction_action)
            .collect();
        apply_in_order(table, game.as_mut(), actions);
        Ok(Some(game.snapshot()))
    }
}

#[async_trait]
impl ProjectionSource for GameProjector {
    async fn game_projection(
        &self,
        table: &str,
        viewer: Option<&str>,
    ) -> Result<GameStateDto, ProjectionError> {
        self.project(table, viewer).await
    }

    fn mempool_snapshot(&self) -> Vec<TransactionDto> {
        self.mempool.find_all().iter().map(MempoolEntry::to_dto).collect()
    }
}
