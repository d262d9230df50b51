//! Validator selector errors.

use thiserror::Error;

/// Failure reported by an outbound collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    /// Roster source could not be read.
    #[error("Roster source unavailable: {0}")]
    RosterUnavailable(String),

    /// Chain head could not be read.
    #[error("Chain head unavailable: {0}")]
    ChainHeadUnavailable(String),
}
