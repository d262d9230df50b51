//! Ports layer for validator selection.

pub mod outbound;

pub use outbound::*;
