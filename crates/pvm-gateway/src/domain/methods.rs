//! Method metadata: positional parameter layout and a short description.
//!
//! Category membership lives on [`RpcMethod`] itself. This table only adds
//! what the gateway needs to reject a call before constructing a command.
//! Parameter names ending in `?` are optional and may only trail.

use serde_json::Value;
use shared_types::RpcMethod;

/// Method metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodInfo {
    pub method: RpcMethod,
    /// Positional parameter names, optional ones suffixed with `?`
    pub params: &'static [&'static str],
    /// Brief description
    pub description: &'static str,
}

impl MethodInfo {
    const fn new(
        method: RpcMethod,
        params: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            method,
            params,
            description,
        }
    }

    /// Number of parameters that must be present.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.ends_with('?')).count()
    }

    /// Largest accepted parameter count.
    pub fn max_params(&self) -> usize {
        self.params.len()
    }

    /// Check the parameter count; an explicit `null` counts as absent.
    pub fn check_arity(&self, params: &[Value]) -> Result<(), String> {
        let present = params.len();
        if present > self.max_params() {
            return Err(format!(
                "{} takes at most {} params, got {}",
                self.method,
                self.max_params(),
                present
            ));
        }
        for (i, name) in self.params.iter().enumerate() {
            if name.ends_with('?') {
                break;
            }
            match params.get(i) {
                None | Some(Value::Null) => {
                    return Err(format!("{}: missing param {} ({})", self.method, i, name));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Metadata for `method`. Exhaustive, so every method has an entry.
pub const fn method_info(method: RpcMethod) -> MethodInfo {
    use RpcMethod::*;
    match method {
        // --- Read ---
        GetAccount => MethodInfo::new(method, &["address"], "Account balance and nonce"),
        GetBalance => MethodInfo::new(method, &["address"], "Account balance"),
        GetBlock => MethodInfo::new(method, &["index"], "Block by index"),
        GetBlockByHash => MethodInfo::new(method, &["hash"], "Block by hash"),
        GetBlockHeight => MethodInfo::new(method, &[], "Index of the last block"),
        GetBlocks => MethodInfo::new(method, &["start?", "count?"], "Range of blocks"),
        GetClient => MethodInfo::new(method, &[], "This node's roster entry"),
        GetContractSchema => MethodInfo::new(method, &["address"], "Contract schema by address"),
        GetGameState => MethodInfo::new(
            method,
            &["tableAddress", "caller?"],
            "Table state with pending actions replayed, projected for the caller",
        ),
        GetLastBlock => MethodInfo::new(method, &[], "Last finalized block"),
        GetMempool => MethodInfo::new(method, &[], "Pending transactions in insertion order"),
        GetNodes => MethodInfo::new(method, &[], "Cached node roster"),
        GetSharedSecret => MethodInfo::new(
            method,
            &["publicKey"],
            "SHA-256 of the ECDH secret with the node key",
        ),
        GetTransaction => MethodInfo::new(method, &["hash"], "Pending or finalized transaction"),
        GetTransactions => MethodInfo::new(method, &["count?"], "Most recent finalized transactions"),
        // --- Write ---
        Block => MethodInfo::new(method, &["block"], "Accept a block mined by a peer"),
        Burn => MethodInfo::new(method, &["from", "amount", "bridgeAddress"], "Burn to the bridge"),
        CreateAccount => MethodInfo::new(method, &["publicKey"], "Register the key's account"),
        CreateContractSchema => MethodInfo::new(
            method,
            &["owner", "category", "name", "schema"],
            "Register a game contract schema",
        ),
        DeployContract => MethodInfo::new(
            method,
            &["owner", "nonce", "options?"],
            "Deploy a table with inline options",
        ),
        Mine => MethodInfo::new(method, &[], "Produce a block from the mempool"),
        MinedBlockHash => MethodInfo::new(
            method,
            &["hash", "nodeUrl?"],
            "Acknowledge a peer's mined block",
        ),
        Mint => MethodInfo::new(method, &["depositIndex", "receiver", "amount"], "Mint a bridge deposit"),
        NewHand => MethodInfo::new(
            method,
            &["from", "tableAddress", "index", "seed?"],
            "Start the next hand",
        ),
        NewTable => MethodInfo::new(
            method,
            &["owner", "schemaAddress", "nonce"],
            "Create a table from a registered schema",
        ),
        PerformAction => MethodInfo::new(
            method,
            &["from", "to", "action", "value", "index", "data?"],
            "Submit a player action",
        ),
        Transfer => MethodInfo::new(method, &["from", "to", "amount", "data?"], "Transfer funds"),
        Withdraw => MethodInfo::new(method, &["from", "receiver", "amount"], "Withdraw to the bridge"),
        // --- Control ---
        Purge => MethodInfo::new(method, &["username", "password"], "Clear the mempool"),
        ResetBlockchain => MethodInfo::new(
            method,
            &["username", "password"],
            "Reset the ledger and clear the mempool",
        ),
        Shutdown => MethodInfo::new(method, &["username", "password"], "Stop the process"),
        Start => MethodInfo::new(method, &[], "Resume block production"),
        Stop => MethodInfo::new(method, &[], "Pause block production"),
    }
}
