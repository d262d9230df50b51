//! Control commands.
//!
//! Operational switches. Results are unsigned primitives; credentialed
//! commands answer `Unauthorized` on a wrong pair and change nothing.

use std::sync::Arc;

use async_trait::async_trait;
use pvm_mempool::{MempoolApi, OperatorCredentials};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{CommandError, ControlCommand};
use crate::domain::NodeLifecycle;
use crate::ports::LedgerWriter;

/// `purge [username, password]`.
pub struct PurgeCommand {
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) username: String,
    pub(super) password: String,
}

#[async_trait]
impl ControlCommand for PurgeCommand {
    #[instrument(skip(self))]
    async fn execute(&self) -> Result<Value, CommandError> {
        if self.mempool.purge(&self.username, &self.password) {
            Ok(Value::Bool(true))
        } else {
            Err(CommandError::Unauthorized)
        }
    }
}

/// `reset_blockchain [username, password]`: ledger back to genesis and an
/// empty mempool.
pub struct ResetBlockchainCommand {
    pub(super) operator: OperatorCredentials,
    pub(super) ledger_writer: Arc<dyn LedgerWriter>,
    pub(super) mempool: Arc<dyn MempoolApi>,
    pub(super) username: String,
    pub(super) password: String,
}

#[async_trait]
impl ControlCommand for ResetBlockchainCommand {
    #[instrument(skip(self))]
    async fn execute(&self) -> Result<Value, CommandError> {
        if !self.operator.matches(&self.username, &self.password) {
            warn!("Rejected reset_blockchain with bad credentials");
            return Err(CommandError::Unauthorized);
        }
        self.ledger_writer.reset().await?;
        let dropped = self.mempool.clear();
        warn!(dropped, "Blockchain reset by operator");
        Ok(Value::Bool(true))
    }
}

/// `shutdown [username, password]`.
pub struct ShutdownCommand {
    pub(super) operator: OperatorCredentials,
    pub(super) lifecycle: Arc<NodeLifecycle>,
    pub(super) username: String,
    pub(super) password: String,
}

#[async_trait]
impl ControlCommand for ShutdownCommand {
    #[instrument(skip(self))]
    async fn execute(&self) -> Result<Value, CommandError> {
        if !self.operator.matches(&self.username, &self.password) {
            warn!("Rejected shutdown with bad credentials");
            return Err(CommandError::Unauthorized);
        }
        self.lifecycle.request_shutdown();
        Ok(Value::Bool(true))
    }
}

/// `start` and `stop`: toggle block production.
pub struct ProductionCommand {
    pub(super) lifecycle: Arc<NodeLifecycle>,
    pub(super) producing: bool,
}

#[async_trait]
impl ControlCommand for ProductionCommand {
    async fn execute(&self) -> Result<Value, CommandError> {
        let was = if self.producing {
            self.lifecycle.start()
        } else {
            self.lifecycle.stop()
        };
        info!(producing = self.producing, was, "Block production toggled");
        Ok(Value::Bool(true))
    }
}
