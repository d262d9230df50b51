//! # RPC Method Partition
//!
//! Every supported method belongs to exactly one [`MethodCategory`]. The
//! mapping is an exhaustive `match`, so adding a method without classifying
//! it does not compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// Execution category of an RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodCategory {
    /// Side-effect free lookup, signed result.
    Read,
    /// Mutates ledger or game state, signed result.
    Write,
    /// Operational command, unsigned primitive result.
    Control,
}

impl fmt::Display for MethodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Control => write!(f, "control"),
        }
    }
}

macro_rules! rpc_methods {
    ($($variant:ident => $name:literal : $category:ident),+ $(,)?) => {
        /// Supported RPC methods.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RpcMethod {
            $($variant),+
        }

        impl RpcMethod {
            /// Every supported method, in declaration order.
            pub const ALL: &'static [RpcMethod] = &[$(RpcMethod::$variant),+];

            /// Canonical wire name.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(RpcMethod::$variant => $name),+
                }
            }

            /// Category this method is dispatched under.
            pub const fn category(&self) -> MethodCategory {
                match self {
                    $(RpcMethod::$variant => MethodCategory::$category),+
                }
            }
        }
    };
}

rpc_methods! {
    // Read
    GetAccount => "get_account": Read,
    GetBalance => "get_balance": Read,
    GetBlock => "get_block": Read,
    GetBlockByHash => "get_block_by_hash": Read,
    GetBlockHeight => "get_block_height": Read,
    GetBlocks => "get_blocks": Read,
    GetClient => "get_client": Read,
    GetContractSchema => "get_contract_schema": Read,
    GetGameState => "get_game_state": Read,
    GetLastBlock => "get_last_block": Read,
    GetMempool => "get_mempool": Read,
    GetNodes => "get_nodes": Read,
    GetSharedSecret => "get_shared_secret": Read,
    GetTransaction => "get_transaction": Read,
    GetTransactions => "get_transactions": Read,
    // Write
    Block => "block": Write,
    Burn => "burn": Write,
    CreateAccount => "create_account": Write,
    CreateContractSchema => "create_contract_schema": Write,
    DeployContract => "deploy_contract": Write,
    Mine => "mine": Write,
    MinedBlockHash => "mined_block_hash": Write,
    Mint => "mint": Write,
    NewHand => "new_hand": Write,
    NewTable => "new_table": Write,
    PerformAction => "perform_action": Write,
    Transfer => "transfer": Write,
    Withdraw => "withdraw": Write,
    // Control
    Purge => "purge": Control,
    ResetBlockchain => "reset_blockchain": Control,
    Shutdown => "shutdown": Control,
    Start => "start": Control,
    Stop => "stop": Control,
}

impl RpcMethod {
    /// Methods of one category.
    pub fn in_category(category: MethodCategory) -> impl Iterator<Item = RpcMethod> {
        Self::ALL.iter().copied().filter(move |m| m.category() == category)
    }
}

impl FromStr for RpcMethod {
    type Err = TypeError;

    /// Case-insensitive: `GET_MEMPOOL` and `get_mempool` name the same method.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
