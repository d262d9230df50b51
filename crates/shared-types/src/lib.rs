//! # Shared Types Crate
//!
//! Wire-level data model of the PVM node gateway: the RPC envelope, the
//! signed-result wrapper, the fixed method partition and the ledger DTOs that
//! cross the RPC and real-time boundaries.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that is serialized to a client is
//!   defined here, so the gateway and the runtime agree on field names.
//! - **Exactly One Outcome**: an `RpcResponse` carries either a result or an
//!   error, never both, by construction.
//! - **No Floating Point Money**: amounts are `U256` and travel as decimal
//!   strings.

pub mod amount;
pub mod entities;
pub mod errors;
pub mod methods;
pub mod rpc;

pub use amount::parse_amount;
pub use entities::*;
pub use errors::*;
pub use methods::{MethodCategory, RpcMethod};
pub use rpc::{RpcOutcome, RpcRequest, RpcResponse, SignedResult, NO_SIGNATURE};

pub use primitive_types::U256;
