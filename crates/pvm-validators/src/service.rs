//! # Validator Selector
//!
//! Caches the validator roster, refreshes it at most once per interval and
//! picks the proposer of the next block by deterministic rotation.

use std::sync::Arc;

use shared_types::{same_address, Address, Node, ZERO_ADDRESS};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ValidatorCache, ValidatorConfig, ValidatorError, ValidatorRoster};
use crate::ports::{ChainHead, RosterSource, SystemTimeSource, TimeSource};

pub struct ValidatorSelector {
    config: ValidatorConfig,
    roster_source: Arc<dyn RosterSource>,
    chain_head: Arc<dyn ChainHead>,
    time: Arc<dyn TimeSource>,
    cache: RwLock<ValidatorCache>,
    /// Serializes refreshes so concurrent callers fetch once.
    refresh_lock: Mutex<()>,
}

impl ValidatorSelector {
    pub fn new(
        config: ValidatorConfig,
        roster_source: Arc<dyn RosterSource>,
        chain_head: Arc<dyn ChainHead>,
    ) -> Self {
        Self::with_time_source(config, roster_source, chain_head, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        config: ValidatorConfig,
        roster_source: Arc<dyn RosterSource>,
        chain_head: Arc<dyn ChainHead>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        if config.trust_all {
            warn!(
                local_address = %config.local_address,
                "Trust-all validator mode enabled; every address is treated as a validator"
            );
        }
        Self {
            config,
            roster_source,
            chain_head,
            time,
            cache: RwLock::new(ValidatorCache::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn interval_ms(&self) -> u64 {
        self.config.refresh_interval_secs.saturating_mul(1_000)
    }

    /// Whether `address` is a validator.
    pub async fn is_validator(&self, address: &str) -> Result<bool, ValidatorError> {
        if self.config.trust_all {
            return Ok(true);
        }
        self.ensure_fresh(false).await?;
        Ok(self.cache.read().await.roster.contains(address))
    }

    /// Cached validator count, re-fetched when older than the interval.
    pub async fn get_validator_count(&self) -> Result<usize, ValidatorError> {
        self.ensure_fresh(false).await?;
        Ok(self.cache.read().await.validator_count)
    }

    /// Address of the proposer for block `last_block_index + 1`.
    ///
    /// Returns [`ZERO_ADDRESS`] when there are no validators.
    #[instrument(skip(self))]
    pub async fn get_next_validator_address(
        &self,
        force_sync: bool,
    ) -> Result<Address, ValidatorError> {
        if self.config.trust_all {
            return Ok(self.config.local_address.clone());
        }
        self.ensure_fresh(force_sync).await?;
        let last_block_index = self.chain_head.last_block_index().await?;

        let cache = self.cache.read().await;
        match cache.proposer_for(last_block_index) {
            Some(address) => {
                debug!(last_block_index, proposer = %address, "Selected next proposer");
                Ok(address.clone())
            }
            None => {
                warn!(
                    validator_count = cache.validator_count,
                    roster_len = cache.roster.len(),
                    "No proposer available, returning zero address"
                );
                Ok(ZERO_ADDRESS.to_string())
            }
        }
    }

    /// Whether `address` proposes the next block.
    pub async fn is_next_proposer(&self, address: &str) -> Result<bool, ValidatorError> {
        let next = self.get_next_validator_address(false).await?;
        Ok(next != ZERO_ADDRESS && same_address(&next, address))
    }

    /// Cached node list.
    pub async fn nodes(&self) -> Result<Vec<Node>, ValidatorError> {
        self.ensure_fresh(false).await?;
        Ok(self.cache.read().await.roster.nodes().to_vec())
    }

    async fn ensure_fresh(&self, force: bool) -> Result<(), ValidatorError> {
        let interval = self.interval_ms();
        if !force && self.cache.read().await.is_fresh(self.time.now(), interval) {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if !force && self.cache.read().await.is_fresh(self.time.now(), interval) {
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Re-fetch roster and count unconditionally.
    pub async fn refresh(&self) -> Result<(), ValidatorError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<(), ValidatorError> {
        let fetched = async {
            let nodes = self.roster_source.fetch_nodes().await?;
            let count = self.roster_source.validator_count().await?;
            Ok::<_, ValidatorError>((nodes, count))
        }
        .await;

        let mut cache = self.cache.write().await;
        match fetched {
            Ok((nodes, count)) => {
                let roster = ValidatorRoster::from_nodes(nodes);
                if roster.len() != count {
                    warn!(
                        validator_count = count,
                        roster_len = roster.len(),
                        "Validator count disagrees with roster"
                    );
                }
                info!(validator_count = count, nodes = roster.nodes().len(), "Validator roster refreshed");
                *cache = ValidatorCache {
                    roster,
                    validator_count: count,
                    last_refresh: self.time.now(),
                    synced: true,
                };
                Ok(())
            }
            Err(e) if cache.synced => {
                warn!(error = %e, "Roster refresh failed, keeping previous roster");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh on a timer until `shutdown` flips to true.
    pub fn spawn_refresh_task(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.refresh_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            warn!(error = %e, "Scheduled roster refresh failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Validator refresh task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
