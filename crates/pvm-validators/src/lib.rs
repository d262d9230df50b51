//! # Validator Selection
//!
//! Decides which node may produce the next block.
//!
//! ## Rotation
//!
//! ```text
//! proposer = roster[(last_block_index + 1) mod validator_count]
//! ```
//!
//! With `validator_count == 0` the selector returns the zero address and
//! logs a warning instead of failing.
//!
//! ## Cache Policy
//!
//! | State | Behaviour |
//! |-------|-----------|
//! | never synced | first call fetches roster + count |
//! | age < interval (60 min) | cached count is used |
//! | age >= interval | roster + count re-fetched, `last_refresh` reset |
//! | `force_sync` | fetch regardless of age |
//! | refresh fails after a sync | previous roster kept, warning logged |
//!
//! A background task (`spawn_refresh_task`) also refreshes on a timer.
//!
//! ## Trust-All Mode
//!
//! `ValidatorConfig::trust_all` is read once at construction. When set,
//! every address is a validator and the proposer is always the configured
//! local address. It defaults to off and nothing in a request can enable it.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::{ChainHead, RosterSource, SystemTimeSource, TimeSource, Timestamp};
pub use service::ValidatorSelector;
