//! Validator selector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{Address, ZERO_ADDRESS};

/// Default refresh interval: 60 minutes.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum age of the cached roster before it is re-fetched.
    pub refresh_interval_secs: u64,
    /// Local/dev escape hatch: every address is a validator and this node
    /// is always the proposer. Read once at startup.
    pub trust_all: bool,
    /// Address reported as proposer in trust-all mode.
    pub local_address: Address,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            trust_all: false,
            local_address: ZERO_ADDRESS.to_string(),
        }
    }
}

impl ValidatorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
