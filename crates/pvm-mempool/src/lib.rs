//! # Mempool
//!
//! Queue of accepted-but-not-yet-finalized write transactions.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | No duplicate hashes | `domain/pool.rs` - `add()` check |
//! | Reads in insertion order | `domain/pool.rs` - `by_seq` BTreeMap |
//! | No mutable exposure | `service.rs` - every read clones |
//! | Purge only with operator credentials | `domain/credentials.rs` - constant-time compare |
//!
//! ## Lifecycle
//!
//! ```text
//! Write command ──add──→ [PENDING] ──block finalized──→ removed
//!                            │
//!                            └── purge (credentialed) ──→ removed
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service.rs        - Mempool (RwLock around the pool)           │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - MempoolApi trait                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/entities.rs    - EntryDraft, MempoolEntry               │
//! │  domain/pool.rs        - TransactionPool                        │
//! │  domain/credentials.rs - OperatorCredentials                    │
//! │  domain/errors.rs      - MempoolError                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::MempoolApi;
pub use service::Mempool;
