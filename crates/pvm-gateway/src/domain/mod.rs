//! Domain types for the gateway.
//!
//! Configuration, errors, method metadata, block hashing and the node
//! lifecycle flags shared by commands and the runtime.

pub mod chain;
pub mod config;
pub mod correlation;
pub mod error;
pub mod lifecycle;
pub mod methods;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig, LimitsConfig, WebSocketConfig};
pub use correlation::ConnectionId;
pub use error::{messages, ApiError, ApiResult, GatewayError};
pub use lifecycle::NodeLifecycle;
pub use methods::{method_info, MethodInfo};
