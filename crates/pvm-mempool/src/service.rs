//! Thread-safe mempool service.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    MempoolConfig, MempoolEntry, MempoolError, OperatorCredentials, TransactionPool, TxHash,
};
use crate::ports::MempoolApi;

/// Mempool shared by the gateway and the block producer.
///
/// One instance per process root, handed around as `Arc<dyn MempoolApi>`.
pub struct Mempool {
    pool: RwLock<TransactionPool>,
    credentials: OperatorCredentials,
}

impl Mempool {
    pub fn new(config: MempoolConfig, credentials: OperatorCredentials) -> Self {
        if !credentials.is_configured() {
            warn!("Operator credentials not configured; purge is disabled");
        }
        Self {
            pool: RwLock::new(TransactionPool::new(config)),
            credentials,
        }
    }
}

impl MempoolApi for Mempool {
    fn add(&self, entry: MempoolEntry) -> Result<TxHash, MempoolError> {
        let hash = entry.hash.clone();
        let action = entry.action.clone();
        self.pool.write().add(entry)?;
        debug!(hash = %hash, action = %action, "Entry added to mempool");
        Ok(hash)
    }

    fn remove(&self, hash: &str) -> Option<MempoolEntry> {
        self.pool.write().remove(hash)
    }

    fn remove_many(&self, hashes: &[TxHash]) -> usize {
        let mut pool = self.pool.write();
        let removed = hashes.iter().filter(|h| pool.remove(h).is_some()).count();
        debug!(requested = hashes.len(), removed, "Entries removed from mempool");
        removed
    }

    fn get(&self, hash: &str) -> Option<MempoolEntry> {
        self.pool.read().get(hash).cloned()
    }

    fn find_all(&self) -> Vec<MempoolEntry> {
        self.pool.read().entries().cloned().collect()
    }

    fn find_by_target(&self, to: &str) -> Vec<MempoolEntry> {
        self.pool
            .read()
            .entries()
            .filter(|e| e.targets(to))
            .cloned()
            .collect()
    }

    fn purge(&self, username: &str, password: &str) -> bool {
        if !self.credentials.matches(username, password) {
            warn!(username = %username, "Rejected mempool purge: bad credentials");
            return false;
        }
        let removed = self.pool.write().clear();
        info!(removed, "Mempool purged");
        true
    }

    fn clear(&self) -> usize {
        self.pool.write().clear()
    }

    fn len(&self) -> usize {
        self.pool.read().len()
    }
}
