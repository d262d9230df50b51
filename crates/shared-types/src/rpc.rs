//! # RPC Envelope
//!
//! `RpcRequest` in, `RpcResponse` out. The request `id` is caller assigned and
//! echoed verbatim; the server never checks it for uniqueness.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Signature placed on results produced in unauthenticated mode.
///
/// 65 zero bytes, hex encoded with a `0x` prefix: the same width as a real
/// recoverable secp256k1 signature so clients can parse it uniformly.
pub const NO_SIGNATURE: &str = "0x0000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

/// Inbound RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Correlation id, echoed in the response. Numeric ids are kept as
    /// their decimal text.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    /// Method name; absent is reported as "Missing method".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Opaque auxiliary payload forwarded to commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_data: Option<String>,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: Some(method.into()),
            params,
            aux_data: None,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("invalid request id: {other}"))),
    }
}

/// Either a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome<T> {
    Result(T),
    Error(String),
}

/// Outbound RPC reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse<T = Value> {
    pub id: String,
    #[serde(flatten)]
    pub outcome: RpcOutcome<T>,
}

impl<T> RpcResponse<T> {
    pub fn success(id: impl Into<String>, result: T) -> Self {
        Self {
            id: id.into(),
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: RpcOutcome::Error(message.into()),
        }
    }

    pub fn result(&self) -> Option<&T> {
        match &self.outcome {
            RpcOutcome::Result(value) => Some(value),
            RpcOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RpcOutcome::Result(_) => None,
            RpcOutcome::Error(message) => Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }
}

/// Payload paired with a signature over its canonical JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedResult<T> {
    pub data: T,
    pub signature: String,
}

impl<T> SignedResult<T> {
    /// True when the result was produced without a key.
    pub fn is_unsigned(&self) -> bool {
        self.signature == NO_SIGNATURE
    }
}
