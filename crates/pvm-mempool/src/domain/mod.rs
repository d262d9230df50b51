//! Domain layer for the Mempool.

pub mod credentials;
pub mod entities;
pub mod errors;
pub mod pool;

pub use credentials::*;
pub use entities::*;
pub use errors::*;
pub use pool::*;
