//! Command construction.
//!
//! [`CommandFactory::build`] checks the parameter count against the method
//! table, parses every parameter and hands the command its dependencies.
//! Nothing executes here, so a construction failure is always
//! `Invalid params`.

use std::sync::Arc;

use pvm_mempool::{MempoolApi, OperatorCredentials};
use pvm_validators::ValidatorSelector;
use serde_json::json;
use shared_crypto::{Secp256k1PublicKey, Signer};
use shared_types::{BlockDto, RpcMethod, RpcRequest, U256, ZERO_ADDRESS};
use tracing::debug;

use super::control::{
    ProductionCommand, PurgeCommand, ResetBlockchainCommand, ShutdownCommand,
};
use super::params::Params;
use super::read::{
    BlockSelector, GetAccountCommand, GetBlockCommand, GetBlockHeightCommand, GetBlocksCommand,
    GetClientCommand, GetContractSchemaCommand, GetGameStateCommand, GetMempoolCommand,
    GetNodesCommand, GetSharedSecretCommand, GetTransactionCommand, GetTransactionsCommand,
};
use super::write::{
    default_seed, BlockFinalizer, CreateAccountCommand, CreateContractSchemaCommand,
    CreateTableCommand, EntryQueue, MineCommand, MinedBlockHashCommand, PerformActionCommand,
    ReceiveBlockCommand, TableSource, TransferKind, ValueTransferCommand,
};
use super::{Command, CommandError};
use crate::domain::config::{LimitsConfig, NodeIdentityConfig};
use crate::domain::{method_info, NodeLifecycle};
use crate::ports::{GameEngine, LedgerReader, LedgerWriter, PlayerAction, TimeSource};
use crate::projection::GameProjector;

/// Everything a command may depend on. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct CommandContext {
    pub ledger: Arc<dyn LedgerReader>,
    pub ledger_writer: Arc<dyn LedgerWriter>,
    pub engine: Arc<dyn GameEngine>,
    pub mempool: Arc<dyn MempoolApi>,
    pub validators: Arc<ValidatorSelector>,
    pub signer: Arc<dyn Signer>,
    pub projector: Arc<GameProjector>,
    pub lifecycle: Arc<NodeLifecycle>,
    pub time: Arc<dyn TimeSource>,
    pub identity: NodeIdentityConfig,
    pub limits: LimitsConfig,
    pub operator: OperatorCredentials,
}

impl CommandContext {
    fn queue(&self) -> EntryQueue {
        EntryQueue {
            mempool: self.mempool.clone(),
            signer: self.signer.clone(),
            time: self.time.clone(),
        }
    }

    fn finalizer(&self) -> BlockFinalizer {
        BlockFinalizer {
            ledger: self.ledger.clone(),
            ledger_writer: self.ledger_writer.clone(),
            projector: self.projector.clone(),
            mempool: self.mempool.clone(),
        }
    }
}

pub struct CommandFactory {
    ctx: CommandContext,
}

impl CommandFactory {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    /// Build the command for `method` from `request.params`.
    pub fn build(&self, method: RpcMethod, request: &RpcRequest) -> Result<Command, CommandError> {
        method_info(method)
            .check_arity(&request.params)
            .map_err(CommandError::InvalidParams)?;
        let p = Params::new(&request.params);
        debug!(method = %method, id = %request.id, "Building command");

        let ctx = &self.ctx;
        let command = match method {
            // Read
            RpcMethod::GetAccount | RpcMethod::GetBalance => Command::Read(Box::new(GetAccountCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                address: p.address(0, "address")?,
                balance_only: method == RpcMethod::GetBalance,
            })),
            RpcMethod::GetBlock => self.block(BlockSelector::Index(p.index(0, "index")?)),
            RpcMethod::GetBlockByHash => self.block(BlockSelector::Hash(p.string(0, "hash")?)),
            RpcMethod::GetLastBlock => self.block(BlockSelector::Last),
            RpcMethod::GetBlockHeight => Command::Read(Box::new(GetBlockHeightCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
            })),
            RpcMethod::GetBlocks => Command::Read(Box::new(GetBlocksCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                start: p.opt_index(0, "start")?,
                count: p.opt_index(1, "count")?,
                max_range: ctx.limits.max_block_range,
            })),
            RpcMethod::GetClient => Command::Read(Box::new(GetClientCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                validators: ctx.validators.clone(),
                identity: ctx.identity.clone(),
            })),
            RpcMethod::GetContractSchema => Command::Read(Box::new(GetContractSchemaCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                address: p.address(0, "address")?,
            })),
            RpcMethod::GetGameState => Command::Read(Box::new(GetGameStateCommand {
                projector: ctx.projector.clone(),
                signer: ctx.signer.clone(),
                table: p.table(0, "tableAddress")?,
                caller: p.opt_string(1, "caller")?,
            })),
            RpcMethod::GetMempool => Command::Read(Box::new(GetMempoolCommand {
                mempool: ctx.mempool.clone(),
                signer: ctx.signer.clone(),
            })),
            RpcMethod::GetNodes => Command::Read(Box::new(GetNodesCommand {
                validators: ctx.validators.clone(),
                signer: ctx.signer.clone(),
            })),
            RpcMethod::GetSharedSecret => Command::Read(Box::new(GetSharedSecretCommand {
                signer: ctx.signer.clone(),
                public_key: p.string(0, "publicKey")?,
            })),
            RpcMethod::GetTransaction => Command::Read(Box::new(GetTransactionCommand {
                ledger: ctx.ledger.clone(),
                mempool: ctx.mempool.clone(),
                signer: ctx.signer.clone(),
                hash: p.string(0, "hash")?,
            })),
            RpcMethod::GetTransactions => Command::Read(Box::new(GetTransactionsCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                count: p.opt_index(0, "count")?,
                max_transactions: ctx.limits.max_transactions,
            })),

            // Write
            RpcMethod::Transfer => self.transfer(
                TransferKind::Transfer,
                p.address(0, "from")?,
                p.address(1, "to")?,
                p.amount(2, "amount")?,
                p.opt_string(3, "data")?,
            ),
            RpcMethod::Mint => {
                let deposit_index = p.index(0, "depositIndex")?;
                self.transfer(
                    TransferKind::Mint,
                    ZERO_ADDRESS.to_string(),
                    p.address(1, "receiver")?,
                    p.amount(2, "amount")?,
                    Some(deposit_index.to_string()),
                )
            }
            RpcMethod::Burn => self.transfer(
                TransferKind::Burn,
                p.address(0, "from")?,
                ZERO_ADDRESS.to_string(),
                p.amount(1, "amount")?,
                Some(p.address(2, "bridgeAddress")?),
            ),
            RpcMethod::Withdraw => self.transfer(
                TransferKind::Withdraw,
                p.address(0, "from")?,
                ZERO_ADDRESS.to_string(),
                p.amount(2, "amount")?,
                Some(p.address(1, "receiver")?),
            ),
            RpcMethod::CreateAccount => {
                let public_key = p.string(0, "publicKey")?;
                let address = Secp256k1PublicKey::from_hex(&public_key)
                    .and_then(|key| key.to_address())
                    .map_err(|e| CommandError::InvalidParams(format!("publicKey: {e}")))?;
                Command::Write(Box::new(CreateAccountCommand {
                    ledger_writer: ctx.ledger_writer.clone(),
                    signer: ctx.signer.clone(),
                    address,
                }))
            }
            RpcMethod::CreateContractSchema => {
                let schema = p.json(3, "schema")?;
                Command::Write(Box::new(CreateContractSchemaCommand {
                    ledger_writer: ctx.ledger_writer.clone(),
                    signer: ctx.signer.clone(),
                    owner: p.address(0, "owner")?,
                    category: p.string(1, "category")?,
                    name: p.string(2, "name")?,
                    schema: schema.to_string(),
                }))
            }
            RpcMethod::DeployContract => self.table(
                p.address(0, "owner")?,
                p.index(1, "nonce")?,
                TableSource::Inline(p.opt_json(2, "options")?.unwrap_or_else(|| json!({}))),
            ),
            RpcMethod::NewTable => self.table(
                p.address(0, "owner")?,
                p.index(2, "nonce")?,
                TableSource::Schema(p.address(1, "schemaAddress")?),
            ),
            RpcMethod::PerformAction => {
                let action = p.string(2, "action")?.trim().to_ascii_lowercase();
                self.action(
                    p.table(1, "to")?,
                    PlayerAction {
                        actor: p.address(0, "from")?,
                        action,
                        index: p.index(4, "index")?,
                        amount: p.amount(3, "value")?,
                        data: p.opt_string(5, "data")?,
                    },
                )
            }
            RpcMethod::NewHand => {
                let table = p.table(1, "tableAddress")?;
                let index = p.index(2, "index")?;
                let seed = match p.opt_string(3, "seed")? {
                    Some(seed) => seed,
                    None => default_seed(&table, index, ctx.time.now()),
                };
                self.action(
                    table,
                    PlayerAction {
                        actor: p.address(0, "from")?,
                        action: "new-hand".to_string(),
                        index,
                        amount: U256::zero(),
                        data: Some(seed),
                    },
                )
            }
            RpcMethod::Mine => Command::Write(Box::new(MineCommand {
                ledger: ctx.ledger.clone(),
                validators: ctx.validators.clone(),
                signer: ctx.signer.clone(),
                mempool: ctx.mempool.clone(),
                time: ctx.time.clone(),
                finalizer: ctx.finalizer(),
            })),
            RpcMethod::Block => {
                let block: BlockDto = serde_json::from_value(p.json(0, "block")?)
                    .map_err(|e| CommandError::InvalidParams(format!("block: {e}")))?;
                Command::Write(Box::new(ReceiveBlockCommand {
                    ledger: ctx.ledger.clone(),
                    validators: ctx.validators.clone(),
                    signer: ctx.signer.clone(),
                    finalizer: ctx.finalizer(),
                    block,
                }))
            }
            RpcMethod::MinedBlockHash => Command::Write(Box::new(MinedBlockHashCommand {
                ledger: ctx.ledger.clone(),
                signer: ctx.signer.clone(),
                hash: p.string(0, "hash")?,
                node_url: p.opt_string(1, "nodeUrl")?,
            })),

            // Control
            RpcMethod::Purge => Command::Control(Box::new(PurgeCommand {
                mempool: ctx.mempool.clone(),
                username: p.string(0, "username")?,
                password: p.string(1, "password")?,
            })),
            RpcMethod::ResetBlockchain => Command::Control(Box::new(ResetBlockchainCommand {
                operator: ctx.operator.clone(),
                ledger_writer: ctx.ledger_writer.clone(),
                mempool: ctx.mempool.clone(),
                username: p.string(0, "username")?,
                password: p.string(1, "password")?,
            })),
            RpcMethod::Shutdown => Command::Control(Box::new(ShutdownCommand {
                operator: ctx.operator.clone(),
                lifecycle: ctx.lifecycle.clone(),
                username: p.string(0, "username")?,
                password: p.string(1, "password")?,
            })),
            RpcMethod::Start | RpcMethod::Stop => Command::Control(Box::new(ProductionCommand {
                lifecycle: ctx.lifecycle.clone(),
                producing: method == RpcMethod::Start,
            })),
        };
        Ok(command)
    }

    fn block(&self, selector: BlockSelector) -> Command {
        Command::Read(Box::new(GetBlockCommand {
            ledger: self.ctx.ledger.clone(),
            signer: self.ctx.signer.clone(),
            selector,
        }))
    }

    fn transfer(
        &self,
        kind: TransferKind,
        from: String,
        to: String,
        amount: U256,
        data: Option<String>,
    ) -> Command {
        Command::Write(Box::new(ValueTransferCommand {
            ledger: self.ctx.ledger.clone(),
            queue: self.ctx.queue(),
            kind,
            from,
            to,
            amount,
            data,
        }))
    }

    fn table(&self, owner: String, nonce: u64, source: TableSource) -> Command {
        Command::Write(Box::new(CreateTableCommand {
            ledger: self.ctx.ledger.clone(),
            ledger_writer: self.ctx.ledger_writer.clone(),
            engine: self.ctx.engine.clone(),
            signer: self.ctx.signer.clone(),
            owner,
            nonce,
            source,
        }))
    }

    fn action(&self, table: String, action: PlayerAction) -> Command {
        Command::Write(Box::new(PerformActionCommand {
            ledger: self.ctx.ledger.clone(),
            projector: self.ctx.projector.clone(),
            queue: self.ctx.queue(),
            table,
            action,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::{DevGameEngine, InMemoryLedger, StaticRoster};
    use pvm_mempool::{Mempool, MempoolConfig};
    use pvm_validators::{SystemTimeSource, ValidatorConfig};
    use serde_json::Value;
    use shared_crypto::{NoSignatureSigner, Secp256k1Signer};

    /// Context over fresh in-memory collaborators, trust-all validators.
    pub(crate) fn context(signer: Arc<dyn Signer>) -> CommandContext {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine: Arc<dyn GameEngine> = Arc::new(DevGameEngine);
        let operator = OperatorCredentials::new("admin", "s3cret");
        let mempool: Arc<dyn MempoolApi> =
            Arc::new(Mempool::new(MempoolConfig::default(), operator.clone()));
        let validators = Arc::new(ValidatorSelector::new(
            ValidatorConfig {
                trust_all: true,
                local_address: signer.address(),
                ..ValidatorConfig::default()
            },
            Arc::new(StaticRoster::default()),
            ledger.clone(),
        ));
        let projector = Arc::new(GameProjector::new(
            ledger.clone(),
            engine.clone(),
            mempool.clone(),
        ));
        CommandContext {
            ledger: ledger.clone(),
            ledger_writer: ledger,
            engine,
            mempool,
            validators,
            signer,
            projector,
            lifecycle: Arc::new(NodeLifecycle::default()),
            time: Arc::new(SystemTimeSource),
            identity: NodeIdentityConfig::default(),
            limits: LimitsConfig::default(),
            operator,
        }
    }

    fn build(method: RpcMethod, params: Vec<Value>) -> Result<Command, CommandError> {
        let factory = CommandFactory::new(context(Arc::new(NoSignatureSigner)));
        factory.build(method, &RpcRequest::new("1", method.as_str(), params))
    }

    const ALICE: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_category_matches_method() {
        assert!(matches!(build(RpcMethod::GetMempool, vec![]), Ok(Command::Read(_))));
        assert!(matches!(build(RpcMethod::Mine, vec![]), Ok(Command::Write(_))));
        assert!(matches!(build(RpcMethod::Stop, vec![]), Ok(Command::Control(_))));
    }

    #[test]
    fn test_arity_is_checked_first() {
        assert!(matches!(
            build(RpcMethod::Transfer, vec![json!(ALICE)]),
            Err(CommandError::InvalidParams(_))
        ));
        assert!(matches!(
            build(RpcMethod::GetMempool, vec![json!(1)]),
            Err(CommandError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_write_params_are_shape_checked() {
        let bad_index = build(
            RpcMethod::PerformAction,
            vec![json!(ALICE), json!("0xabc"), json!("bet"), json!("5"), json!("1.5")],
        );
        assert!(matches!(bad_index, Err(CommandError::InvalidParams(_))));

        let float_amount = build(
            RpcMethod::Transfer,
            vec![json!(ALICE), json!(ALICE), json!(2.5)],
        );
        assert!(matches!(float_amount, Err(CommandError::InvalidParams(_))));

        let ok = build(
            RpcMethod::PerformAction,
            vec![json!(ALICE), json!("0xabc"), json!("bet"), json!("5"), json!("1")],
        );
        assert!(matches!(ok, Ok(Command::Write(_))));
    }

    #[test]
    fn test_create_account_needs_a_public_key() {
        assert!(matches!(
            build(RpcMethod::CreateAccount, vec![json!("0x1234")]),
            Err(CommandError::InvalidParams(_))
        ));
        let key = Secp256k1Signer::ephemeral().unwrap().public_key().unwrap();
        assert!(build(RpcMethod::CreateAccount, vec![json!(key)]).is_ok());
    }

    #[test]
    fn test_block_param_must_be_a_block() {
        assert!(matches!(
            build(RpcMethod::Block, vec![json!({"index": 1})]),
            Err(CommandError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_every_method_with_no_params_is_rejected_or_built() {
        for method in RpcMethod::ALL {
            let info = method_info(*method);
            let result = build(*method, vec![]);
            if info.required_params() == 0 {
                assert!(result.is_ok(), "{method} should build without params");
            } else {
                assert!(
                    matches!(result, Err(CommandError::InvalidParams(_))),
                    "{method} should need params"
                );
            }
        }
    }
}
