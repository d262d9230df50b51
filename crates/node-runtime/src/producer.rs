//! Block-production loop.
//!
//! On every tick the producer mines the mempool when production is on,
//! something is pending and this node is the next proposer. Mining goes
//! through the gateway's `mine` command so the block is fanned out to
//! subscribers the same way an RPC-triggered block is.

use std::sync::Arc;
use std::time::Duration;

use pvm_gateway::GatewayService;
use pvm_mempool::MempoolApi;
use pvm_validators::ValidatorSelector;
use shared_types::RpcRequest;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Paused,
    Idle,
    NotProposer,
    Mined,
    Failed(String),
}

pub struct BlockProducer {
    service: GatewayService,
    mempool: Arc<dyn MempoolApi>,
    validators: Arc<ValidatorSelector>,
    local_address: String,
    interval: Duration,
}

impl BlockProducer {
    pub fn new(
        service: GatewayService,
        mempool: Arc<dyn MempoolApi>,
        validators: Arc<ValidatorSelector>,
        local_address: String,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            mempool,
            validators,
            local_address,
            interval,
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        if !self.service.lifecycle().is_producing() {
            return TickOutcome::Paused;
        }
        if self.mempool.is_empty() {
            return TickOutcome::Idle;
        }
        if !self.validators.config().trust_all {
            match self.validators.is_next_proposer(&self.local_address).await {
                Ok(true) => {}
                Ok(false) => return TickOutcome::NotProposer,
                Err(e) => {
                    warn!(error = %e, "Proposer lookup failed");
                    return TickOutcome::Failed(e.to_string());
                }
            }
        }

        let request = RpcRequest::new("block-producer", "mine", Vec::new());
        match self.service.handle_rpc(Some(request)).await {
            Ok(response) => match response.error() {
                None => TickOutcome::Mined,
                Some(message) => {
                    warn!(error = %message, "Mining failed");
                    TickOutcome::Failed(message.to_string())
                }
            },
            Err(e) => TickOutcome::Failed(e.to_string()),
        }
    }

    /// Run until the lifecycle requests shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut shutdown = self.service.lifecycle().subscribe_shutdown();
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "Block producer started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = self.tick().await;
                        debug!(?outcome, "Producer tick");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Block producer stopped");
        })
    }
}
