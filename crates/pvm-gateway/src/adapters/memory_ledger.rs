//! In-memory ledger.
//!
//! Holds blocks, finalized transactions, balances, contract schemas and
//! table states behind one lock. Used by the node in development mode and
//! by every test that needs a ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use primitive_types::U256;
use pvm_validators::{ChainHead, ValidatorError};
use shared_types::{
    parse_amount, AccountDto, Address, BlockDto, ContractSchemaDto, GameStateDto, TransactionDto,
    ZERO_ADDRESS,
};
use tracing::{debug, info, warn};

use crate::domain::chain::genesis_block;
use crate::ports::{LedgerReader, LedgerWriter, PortError, BUY_IN_ACTION};

#[derive(Debug, Clone, Default)]
struct AccountState {
    balance: U256,
    nonce: u64,
}

#[derive(Debug)]
struct LedgerState {
    blocks: Vec<BlockDto>,
    block_by_hash: HashMap<String, u64>,
    transactions: HashMap<String, TransactionDto>,
    /// Finalized transaction hashes, oldest first.
    tx_order: Vec<String>,
    accounts: HashMap<Address, AccountState>,
    schemas: HashMap<Address, ContractSchemaDto>,
    games: HashMap<Address, GameStateDto>,
}

impl LedgerState {
    fn genesis() -> Self {
        let genesis = genesis_block();
        let mut block_by_hash = HashMap::new();
        block_by_hash.insert(genesis.hash.clone(), 0);
        Self {
            blocks: vec![genesis],
            block_by_hash,
            transactions: HashMap::new(),
            tx_order: Vec::new(),
            accounts: HashMap::new(),
            schemas: HashMap::new(),
            games: HashMap::new(),
        }
    }

    fn head(&self) -> &BlockDto {
        // Never empty: starts at genesis and only grows.
        &self.blocks[self.blocks.len() - 1]
    }

    fn apply(&mut self, tx: &TransactionDto) {
        if tx.index.is_some() && tx.action != BUY_IN_ACTION {
            // Wagers are chips inside the table state, not ledger value.
            return;
        }
        let value = match parse_amount(&tx.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(hash = %tx.hash, error = %e, "Finalized transaction has unparsable value");
                U256::zero()
            }
        };
        if !tx.from.eq_ignore_ascii_case(ZERO_ADDRESS) {
            let sender = self.accounts.entry(key(&tx.from)).or_default();
            sender.balance = sender.balance.saturating_sub(value);
            sender.nonce += 1;
        }
        if !tx.to.eq_ignore_ascii_case(ZERO_ADDRESS) {
            let receiver = self.accounts.entry(key(&tx.to)).or_default();
            receiver.balance = receiver.balance.saturating_add(value);
        }
    }
}

fn key(address: &str) -> Address {
    address.to_ascii_lowercase()
}

pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::genesis()),
        }
    }

    /// Credit `address` directly, outside any block. Test and genesis use.
    pub fn credit(&self, address: &str, amount: U256) {
        let mut state = self.state.write();
        let account = state.accounts.entry(key(address)).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    pub fn height(&self) -> u64 {
        self.state.read().head().index
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn last_block(&self) -> Result<BlockDto, PortError> {
        Ok(self.state.read().head().clone())
    }

    async fn block_by_index(&self, index: u64) -> Result<Option<BlockDto>, PortError> {
        let state = self.state.read();
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| state.blocks.get(i))
            .cloned())
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<BlockDto>, PortError> {
        let state = self.state.read();
        Ok(state
            .block_by_hash
            .get(hash)
            .and_then(|&i| state.blocks.get(i as usize))
            .cloned())
    }

    async fn blocks_from(&self, start: u64, count: u64) -> Result<Vec<BlockDto>, PortError> {
        let state = self.state.read();
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(state.blocks.iter().skip(start).take(count).cloned().collect())
    }

    async fn transaction(&self, hash: &str) -> Result<Option<TransactionDto>, PortError> {
        Ok(self.state.read().transactions.get(hash).cloned())
    }

    async fn recent_transactions(&self, count: u64) -> Result<Vec<TransactionDto>, PortError> {
        let state = self.state.read();
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(state
            .tx_order
            .iter()
            .rev()
            .take(count)
            .filter_map(|h| state.transactions.get(h))
            .cloned()
            .collect())
    }

    async fn account(&self, address: &str) -> Result<AccountDto, PortError> {
        let state = self.state.read();
        let account = state.accounts.get(&key(address)).cloned().unwrap_or_default();
        Ok(AccountDto {
            address: address.to_string(),
            balance: account.balance.to_string(),
            nonce: account.nonce,
        })
    }

    async fn contract_schema(&self, address: &str) -> Result<Option<ContractSchemaDto>, PortError> {
        Ok(self.state.read().schemas.get(&key(address)).cloned())
    }

    async fn game_state(&self, table: &str) -> Result<Option<GameStateDto>, PortError> {
        Ok(self.state.read().games.get(&key(table)).cloned())
    }
}

#[async_trait]
impl LedgerWriter for InMemoryLedger {
    async fn append_block(&self, block: BlockDto) -> Result<(), PortError> {
        let mut state = self.state.write();
        let head = state.head();
        if block.index != head.index + 1 || block.previous_hash != head.hash {
            return Err(PortError::Rejected(format!(
                "block {} does not extend head {}",
                block.index, head.index
            )));
        }

        for tx in &block.transactions {
            state.apply(tx);
            if state.transactions.insert(tx.hash.clone(), tx.clone()).is_none() {
                state.tx_order.push(tx.hash.clone());
            }
        }
        state.block_by_hash.insert(block.hash.clone(), block.index);
        info!(
            index = block.index,
            hash = %block.hash,
            tx_count = block.tx_count(),
            "Block appended"
        );
        state.blocks.push(block);
        Ok(())
    }

    async fn create_account(&self, address: &str) -> Result<AccountDto, PortError> {
        let mut state = self.state.write();
        let account = state.accounts.entry(key(address)).or_default().clone();
        debug!(address = %address, "Account created");
        Ok(AccountDto {
            address: address.to_string(),
            balance: account.balance.to_string(),
            nonce: account.nonce,
        })
    }

    async fn save_contract_schema(&self, schema: ContractSchemaDto) -> Result<(), PortError> {
        let mut state = self.state.write();
        let address = key(&schema.address);
        if state.schemas.contains_key(&address) {
            return Err(PortError::Rejected(format!(
                "schema {} already exists",
                schema.address
            )));
        }
        state.schemas.insert(address, schema);
        Ok(())
    }

    async fn save_game_state(&self, table: &str, game: GameStateDto) -> Result<(), PortError> {
        self.state.write().games.insert(key(table), game);
        Ok(())
    }

    async fn reset(&self) -> Result<(), PortError> {
        *self.state.write() = LedgerState::genesis();
        warn!("Ledger reset to genesis");
        Ok(())
    }
}

#[async_trait]
impl ChainHead for InMemoryLedger {
    async fn last_block_index(&self) -> Result<u64, ValidatorError> {
        Ok(self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::assemble_block;
    use shared_types::NO_SIGNATURE;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn tx(hash: &str, from: &str, to: &str, value: &str) -> TransactionDto {
        TransactionDto {
            from: from.into(),
            to: to.into(),
            value: value.into(),
            hash: hash.into(),
            signature: NO_SIGNATURE.into(),
            timestamp: "1".into(),
            action: "transfer".into(),
            index: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn test_starts_at_genesis() {
        let ledger = InMemoryLedger::new();
        let head = ledger.last_block().await.unwrap();
        assert_eq!(head.index, 0);
        assert_eq!(ledger.block_by_hash(&head.hash).await.unwrap(), Some(head));
        assert_eq!(ledger.last_block_index().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_applies_balances() {
        let ledger = InMemoryLedger::new();
        let genesis = ledger.last_block().await.unwrap();
        let block = assemble_block(
            &genesis,
            vec![
                tx("0x01", ZERO_ADDRESS, ALICE, "100"),
                tx("0x02", ALICE, BOB, "30"),
            ],
            ZERO_ADDRESS,
            5,
        );
        ledger.append_block(block).await.unwrap();

        let alice = ledger.account(ALICE).await.unwrap();
        assert_eq!(alice.balance, "70");
        assert_eq!(alice.nonce, 1);
        assert_eq!(ledger.account(BOB).await.unwrap().balance, "30");

        let recent = ledger.recent_transactions(10).await.unwrap();
        assert_eq!(recent[0].hash, "0x02");
        assert_eq!(recent.len(), 2);
        assert!(ledger.transaction("0x01").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_only_buy_ins_move_value_for_table_actions() {
        let ledger = InMemoryLedger::new();
        ledger.credit(ALICE, U256::from(500u64));
        let genesis = ledger.last_block().await.unwrap();
        let mut join = tx("0x0a", ALICE, BOB, "200");
        join.action = "join".into();
        join.index = Some(0);
        let mut bet = tx("0x0b", ALICE, BOB, "50");
        bet.action = "bet".into();
        bet.index = Some(1);
        ledger
            .append_block(assemble_block(&genesis, vec![join, bet], ZERO_ADDRESS, 1))
            .await
            .unwrap();
        assert_eq!(ledger.account(ALICE).await.unwrap().balance, "300");
        assert_eq!(ledger.account(BOB).await.unwrap().balance, "200");
    }

    #[tokio::test]
    async fn test_rejects_block_that_does_not_extend_head() {
        let ledger = InMemoryLedger::new();
        let genesis = ledger.last_block().await.unwrap();
        let first = assemble_block(&genesis, vec![], ZERO_ADDRESS, 1);
        ledger.append_block(first.clone()).await.unwrap();

        let fork = assemble_block(&genesis, vec![], ZERO_ADDRESS, 2);
        assert!(matches!(
            ledger.append_block(fork).await,
            Err(PortError::Rejected(_))
        ));
        assert_eq!(ledger.height(), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_reads_as_zero() {
        let ledger = InMemoryLedger::new();
        let account = ledger.account(BOB).await.unwrap();
        assert_eq!(account.balance, "0");
        assert_eq!(account.nonce, 0);
    }

    #[tokio::test]
    async fn test_reset_returns_to_genesis() {
        let ledger = InMemoryLedger::new();
        ledger.credit(ALICE, U256::from(5u64));
        ledger
            .save_game_state("0xTABLE", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        ledger.reset().await.unwrap();
        assert_eq!(ledger.account(ALICE).await.unwrap().balance, "0");
        assert!(ledger.game_state("0xtable").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blocks_from_range() {
        let ledger = InMemoryLedger::new();
        for ts in 1..=3 {
            let head = ledger.last_block().await.unwrap();
            ledger
                .append_block(assemble_block(&head, vec![], ZERO_ADDRESS, ts))
                .await
                .unwrap();
        }
        let blocks = ledger.blocks_from(1, 2).await.unwrap();
        assert_eq!(blocks.iter().map(|b| b.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(ledger.blocks_from(10, 5).await.unwrap().is_empty());
    }
}
