//! # Commands
//!
//! Every RPC method becomes one command object that holds its own
//! dependencies and parsed parameters and exposes a single `execute`.
//!
//! | Category | Trait | Result |
//! |----------|-------|--------|
//! | Read | [`ReadCommand`] | `SignedResult<Value>` |
//! | Write | [`WriteCommand`] | `SignedResult<Value>` plus the tables it touched |
//! | Control | [`ControlCommand`] | unsigned primitive |
//!
//! [`CommandFactory`] maps `(method, params)` to a [`Command`]; parameter
//! shape is validated there, before anything executes.

pub mod control;
pub mod factory;
pub mod params;
pub mod read;
pub mod write;

use async_trait::async_trait;
use pvm_mempool::MempoolError;
use pvm_validators::ValidatorError;
use serde::Serialize;
use serde_json::Value;
use shared_crypto::{CryptoError, Signer};
use shared_types::{Address, SignedResult};

use crate::domain::chain::BlockCheckError;
use crate::ports::{EngineError, PortError};
use crate::projection::ProjectionError;

pub use factory::{CommandContext, CommandFactory};

/// Command construction or execution failure.
///
/// Only `InvalidParams` and `Unauthorized` are shown to callers as such;
/// everything else surfaces as a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Block(#[from] BlockCheckError),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Successful write: the signed result and the tables whose visible state
/// may have changed.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub result: SignedResult<Value>,
    pub touched_tables: Vec<Address>,
}

impl WriteOutcome {
    pub fn new(result: SignedResult<Value>) -> Self {
        Self {
            result,
            touched_tables: Vec::new(),
        }
    }

    pub fn touching(mut self, tables: Vec<Address>) -> Self {
        self.touched_tables = tables;
        self
    }
}

/// Side-effect free lookup.
#[async_trait]
pub trait ReadCommand: Send + Sync {
    async fn execute(&self) -> Result<SignedResult<Value>, CommandError>;
}

/// Ledger or game-state mutation.
#[async_trait]
pub trait WriteCommand: Send + Sync {
    async fn execute(&self) -> Result<WriteOutcome, CommandError>;
}

/// Operational command.
#[async_trait]
pub trait ControlCommand: Send + Sync {
    async fn execute(&self) -> Result<Value, CommandError>;
}

/// A constructed command, tagged by category.
pub enum Command {
    Read(Box<dyn ReadCommand>),
    Write(Box<dyn WriteCommand>),
    Control(Box<dyn ControlCommand>),
}

/// Project `data` to its canonical JSON value and sign the encoding.
///
/// `serde_json` objects are key-sorted, so the signed bytes do not depend
/// on struct field order.
pub fn sign_result<T: Serialize + ?Sized>(
    signer: &dyn Signer,
    data: &T,
) -> Result<SignedResult<Value>, CommandError> {
    let data = serde_json::to_value(data)?;
    let encoded = serde_json::to_vec(&data)?;
    let signature = signer.sign(&encoded)?;
    Ok(SignedResult { data, signature })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_crypto::{verify, NoSignatureSigner, Secp256k1Signer};

    #[derive(Serialize)]
    struct Unordered {
        zeta: u8,
        alpha: u8,
    }

    #[test]
    fn test_signature_covers_canonical_encoding() {
        let signer = Secp256k1Signer::ephemeral().unwrap();
        let signed = sign_result(&signer, &Unordered { zeta: 1, alpha: 2 }).unwrap();

        let canonical = br#"{"alpha":2,"zeta":1}"#;
        assert!(verify(&signer.public_key().unwrap(), canonical, &signed.signature));
        assert_eq!(signed.data, json!({"alpha": 2, "zeta": 1}));
    }

    #[test]
    fn test_sentinel_signer_marks_result_unsigned() {
        let signed = sign_result(&NoSignatureSigner, &json!([])).unwrap();
        assert!(signed.is_unsigned());
        assert_eq!(signed.data, json!([]));
    }
}
