//! # PVM Node Runtime
//!
//! Wires a PVM node together:
//!
//! ```text
//!   NodeConfig (PVM_* env)
//!        │
//!        ▼
//!   Signer ── Ledger ── Game engine ── Mempool ── ValidatorSelector
//!        │
//!        ▼
//!   GatewayService (POST / · /health · /stats · /ws)
//!        ▲
//!        │ mine
//!   BlockProducer (ticks while producing and proposer)
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialise logging
//! 3. Build the signer and the in-memory collaborators
//! 4. Start the roster refresh task and the block producer
//! 5. Serve until `shutdown` or Ctrl+C

pub mod config;
pub mod producer;

use std::sync::Arc;

use anyhow::{Context, Result};
use pvm_gateway::adapters::{DevGameEngine, InMemoryLedger, StaticRoster};
use pvm_gateway::{Collaborators, GatewayService, NodeLifecycle};
use pvm_mempool::{Mempool, MempoolApi};
use pvm_validators::{SystemTimeSource, ValidatorConfig, ValidatorSelector};
use shared_crypto::{NoSignatureSigner, Secp256k1Signer, Signer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use config::{ConfigError, NodeConfig};
pub use producer::{BlockProducer, TickOutcome};

/// Install the global subscriber. `RUST_LOG` filters, default `info`.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn build_signer(config: &NodeConfig) -> Result<Arc<dyn Signer>> {
    if config.no_signature {
        warn!("Signing disabled; results carry the sentinel signature");
        return Ok(Arc::new(NoSignatureSigner));
    }
    let signer = match &config.signer_key {
        Some(key) => Secp256k1Signer::from_hex(key).context("invalid PVM_SIGNER_KEY")?,
        None => {
            warn!("No PVM_SIGNER_KEY set; using an ephemeral key");
            Secp256k1Signer::ephemeral().context("failed to generate a key")?
        }
    };
    Ok(Arc::new(signer))
}

/// A fully wired node.
pub struct NodeRuntime {
    config: NodeConfig,
    service: GatewayService,
    mempool: Arc<dyn MempoolApi>,
    validators: Arc<ValidatorSelector>,
    local_address: String,
}

impl NodeRuntime {
    pub fn build(config: NodeConfig) -> Result<Self> {
        let signer = build_signer(&config)?;
        let local_address = signer.address();

        let ledger = Arc::new(InMemoryLedger::new());
        let mempool: Arc<dyn MempoolApi> = Arc::new(Mempool::new(
            config.mempool.clone(),
            config.gateway.operator.clone(),
        ));
        let validators = Arc::new(ValidatorSelector::new(
            ValidatorConfig {
                local_address: local_address.clone(),
                ..config.validators.clone()
            },
            Arc::new(StaticRoster::new(config.roster.clone())),
            ledger.clone(),
        ));
        let lifecycle = Arc::new(NodeLifecycle::new(config.produce_on_start));

        let service = GatewayService::new(
            config.gateway.clone(),
            Collaborators {
                ledger: ledger.clone(),
                ledger_writer: ledger,
                engine: Arc::new(DevGameEngine),
                mempool: mempool.clone(),
                validators: validators.clone(),
                signer,
                lifecycle,
                time: Arc::new(SystemTimeSource),
            },
        )
        .context("failed to build gateway")?;

        Ok(Self {
            config,
            service,
            mempool,
            validators,
            local_address,
        })
    }

    pub fn service(&self) -> &GatewayService {
        &self.service
    }

    pub fn mempool(&self) -> &Arc<dyn MempoolApi> {
        &self.mempool
    }

    pub fn producer(&self) -> BlockProducer {
        BlockProducer::new(
            self.service.clone(),
            self.mempool.clone(),
            self.validators.clone(),
            self.local_address.clone(),
            self.config.block_interval,
        )
    }

    /// Serve until shutdown is requested, then stop background tasks.
    pub async fn run(self) -> Result<()> {
        info!(
            address = %self.local_address,
            http = %self.config.gateway.http_addr(),
            trust_all = self.config.validators.trust_all,
            roster = self.config.roster.len(),
            "Starting PVM node"
        );

        let lifecycle = self.service.lifecycle().clone();
        let refresh = self
            .validators
            .clone()
            .spawn_refresh_task(lifecycle.subscribe_shutdown());
        let producer = self.producer().spawn();

        let served = self.service.clone().serve().await;
        lifecycle.request_shutdown();
        let _ = tokio::join!(refresh, producer);

        served.context("gateway server failed")?;
        info!("Node stopped");
        Ok(())
    }
}
