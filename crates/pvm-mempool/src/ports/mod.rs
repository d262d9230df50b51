//! Ports layer for the Mempool.

pub mod inbound;

pub use inbound::MempoolApi;
