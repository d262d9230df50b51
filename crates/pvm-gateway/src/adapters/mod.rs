//! In-process collaborator adapters.
//!
//! The ledger, roster and rules engine are external in production. These
//! implementations back the development node and the test suites.

pub mod dev_engine;
pub mod memory_ledger;
pub mod static_roster;

pub use dev_engine::{DevGameEngine, HIDDEN_CARD};
pub use memory_ledger::InMemoryLedger;
pub use static_roster::StaticRoster;
