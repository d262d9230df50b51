//! Real-time channel.
//!
//! Supports:
//! - Per-table game-state subscriptions, each viewer receiving its own projection
//! - Mempool subscriptions
//! - Connection cap, bounded outbound queues, size and rate limits

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod messages;
pub mod registry;

pub use broadcast::{BroadcastReport, BroadcastService};
pub use connection::{ConnectionHandle, DeliveryError, Frame, Outbox};
pub use handler::{
    refuse, serve_socket, subscription_payload, verify_subscription, ConnectParams,
    SubscribeError, WsContext, WsSession, CAPACITY_CLOSE_REASON, CLOSE_TRY_AGAIN_LATER,
};
pub use messages::{ClientMessage, ServerEvent};
pub use registry::{CapacityError, ConnectionPermit, RegistryStats, SubscriptionRegistry};
