//! Domain layer for validator selection.

pub mod config;
pub mod errors;
pub mod roster;

pub use config::*;
pub use errors::*;
pub use roster::*;
