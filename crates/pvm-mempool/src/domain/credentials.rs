//! Operator credential pair guarding privileged mempool operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Username/password pair configured for the node operator.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCredentials {
    pub username: String,
    pub password: String,
}

impl OperatorCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// An empty username or password never matches.
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Constant-time check of a presented pair.
    ///
    /// Both halves are always compared so the timing does not reveal which
    /// half was wrong.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_compare(username, &self.username);
        let pass_ok = constant_time_compare(password, &self.password);
        self.is_configured() && user_ok && pass_ok
    }
}

impl fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Constant-time string comparison.
///
/// Inputs are padded to a common length with different fill bytes so a
/// length mismatch cannot compare equal and does not short-circuit.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
