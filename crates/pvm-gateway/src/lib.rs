//! PVM Gateway - RPC command dispatch, subscriptions and real-time fan-out
//! for a poker ledger node.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            PVM GATEWAY                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   POST /  (JSON-RPC)                    GET /ws  (real-time)         │
//! │        │                                     │                       │
//! │  ┌─────┴──────────────┐          ┌───────────┴───────────┐           │
//! │  │ CommandDispatcher  │          │      WsSession        │           │
//! │  │ Read│Write│Control │          │ subscribe / mempool   │           │
//! │  └─────┬──────────────┘          └───────────┬───────────┘           │
//! │        │ touched tables, mempool             │                       │
//! │        ▼                                     ▼                       │
//! │  ┌────────────────────┐          ┌───────────────────────┐           │
//! │  │  BroadcastService  │─────────▶│ SubscriptionRegistry  │           │
//! │  └─────┬──────────────┘          └───────────────────────┘           │
//! │        │ per-viewer projections                                      │
//! │  ┌─────┴──────────────┐                                              │
//! │  │   GameProjector    │  stored state + pending mempool actions      │
//! │  └─────┬──────────────┘                                              │
//! └────────┼─────────────────────────────────────────────────────────────┘
//!          ▼
//!   Ledger · Game engine · Mempool · Validator roster
//! ```
//!
//! # Method Categories
//!
//! - **Read**: lookups, results signed by the node key
//! - **Write**: queue transactions, create tables, mine and accept blocks
//! - **Control**: start/stop production, credentialed purge, reset and shutdown
//!
//! # Usage
//!
//! ```ignore
//! use pvm_gateway::{Collaborators, GatewayConfig, GatewayService};
//!
//! let service = GatewayService::new(GatewayConfig::default(), collaborators)?;
//! service.serve().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod commands;
pub mod dispatcher;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod projection;
pub mod service;
pub mod ws;

pub use dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use domain::config::{CorsConfig, HttpConfig, NodeIdentityConfig};
pub use domain::{ApiError, ConfigError, GatewayConfig, GatewayError, LimitsConfig, NodeLifecycle, WebSocketConfig};
pub use projection::{GameProjector, ProjectionError, ProjectionSource};
pub use service::{Collaborators, GatewayService};
pub use ws::{BroadcastReport, BroadcastService, RegistryStats, SubscriptionRegistry};

/// Crate version, reported by `get_client`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client string in `name/vX.Y.Z` form.
pub fn client_version() -> String {
    format!("pvm-gateway/v{VERSION}")
}
