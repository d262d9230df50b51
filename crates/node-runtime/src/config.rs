//! # Node Configuration
//!
//! Aggregates the gateway, mempool and validator settings with the
//! runtime's own: signing key, block interval, logging and the static
//! validator roster.
//!
//! Values start from defaults and are overridden by `PVM_*` environment
//! variables:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PVM_HTTP_HOST`, `PVM_HTTP_PORT` | Listener address |
//! | `PVM_NODE_NAME`, `PVM_NODE_URL` | Identity reported by `get_client` |
//! | `PVM_SIGNER_KEY` | Hex secp256k1 private key |
//! | `PVM_NO_SIGNATURE` | `1`/`true`: sign nothing, stamp the sentinel |
//! | `PVM_TRUST_ALL_VALIDATORS` | `1`/`true`: every address validates |
//! | `PVM_BLOCK_INTERVAL_MS` | Block production tick |
//! | `PVM_PRODUCE_ON_START` | `0`/`false`: start with production paused |
//! | `PVM_OPERATOR_USERNAME`, `PVM_OPERATOR_PASSWORD` | Control credentials |
//! | `PVM_MEMPOOL_MAX_ENTRIES` | Mempool capacity |
//! | `PVM_WS_MAX_CONNECTIONS` | Real-time connection cap |
//! | `PVM_ROSTER` | JSON array of roster nodes |
//! | `PVM_ROSTER_REFRESH_SECS` | Roster cache lifetime |
//! | `PVM_LOG_JSON` | `1`/`true`: JSON log lines |

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use pvm_gateway::GatewayConfig;
use pvm_mempool::{MempoolConfig, OperatorCredentials};
use pvm_validators::ValidatorConfig;
use shared_types::Node;

const DEFAULT_BLOCK_INTERVAL_MS: u64 = 5_000;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub gateway: GatewayConfig,
    pub mempool: MempoolConfig,
    pub validators: ValidatorConfig,
    /// Hex private key. `None` means an ephemeral key unless `no_signature`.
    pub signer_key: Option<String>,
    pub no_signature: bool,
    /// Tick of the block-production loop.
    pub block_interval: Duration,
    pub produce_on_start: bool,
    pub roster: Vec<Node>,
    pub log_json: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            mempool: MempoolConfig::default(),
            validators: ValidatorConfig::default(),
            signer_key: None,
            no_signature: false,
            block_interval: Duration::from_millis(DEFAULT_BLOCK_INTERVAL_MS),
            produce_on_start: true,
            roster: Vec::new(),
            log_json: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(host) = env.parsed("PVM_HTTP_HOST")? {
            config.gateway.http.host = host;
        }
        if let Some(port) = env.parsed("PVM_HTTP_PORT")? {
            config.gateway.http.port = port;
        }
        if let Some(name) = env.string("PVM_NODE_NAME") {
            config.gateway.node.name = name;
        }
        if let Some(url) = env.string("PVM_NODE_URL") {
            config.gateway.node.url = url;
        }
        if let Some(max) = env.parsed("PVM_WS_MAX_CONNECTIONS")? {
            config.gateway.websocket.max_connections = max;
        }

        let username = env.string("PVM_OPERATOR_USERNAME").unwrap_or_default();
        let password = env.string("PVM_OPERATOR_PASSWORD").unwrap_or_default();
        config.gateway.operator = OperatorCredentials::new(username, password);

        if let Some(max) = env.parsed("PVM_MEMPOOL_MAX_ENTRIES")? {
            config.mempool.max_entries = max;
        }

        config.validators.trust_all = env.flag("PVM_TRUST_ALL_VALIDATORS", false);
        if let Some(secs) = env.parsed("PVM_ROSTER_REFRESH_SECS")? {
            config.validators.refresh_interval_secs = secs;
        }
        if let Some(raw) = env.string("PVM_ROSTER") {
            config.roster = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                var: "PVM_ROSTER",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }

        config.signer_key = env.string("PVM_SIGNER_KEY");
        config.no_signature = env.flag("PVM_NO_SIGNATURE", false);
        if let Some(ms) = env.parsed::<u64>("PVM_BLOCK_INTERVAL_MS")? {
            config.block_interval = Duration::from_millis(ms);
        }
        config.produce_on_start = env.flag("PVM_PRODUCE_ON_START", true);
        config.log_json = env.flag("PVM_LOG_JSON", false);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.block_interval.is_zero() {
            return Err(ConfigError::Invalid("block interval cannot be 0".into()));
        }
        if self.mempool.max_entries == 0 {
            return Err(ConfigError::Invalid("mempool capacity cannot be 0".into()));
        }
        if self.no_signature && self.signer_key.is_some() {
            return Err(ConfigError::Invalid(
                "PVM_SIGNER_KEY and PVM_NO_SIGNATURE are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Debug,
    {
        self.string(var)
            .map(|value| {
                value.parse().map_err(|e| ConfigError::Parse {
                    var,
                    reason: format!("{e:?}"),
                    value,
                })
            })
            .transpose()
    }

    fn flag(&self, var: &str, default: bool) -> bool {
        match self.string(var) {
            Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
            None => default,
        }
    }
}
