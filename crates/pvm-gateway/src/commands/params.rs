//! Positional parameter parsing.
//!
//! Amounts and indices arrive either as JSON integers or as decimal-digit
//! strings and are parsed without floating point. Everything else must be
//! a string unless stated.

use primitive_types::U256;
use serde_json::Value;
use shared_types::amount::is_decimal_digits;
use shared_types::{normalize_address, parse_amount, Address};

use super::CommandError;

fn invalid(name: &str, reason: impl std::fmt::Display) -> CommandError {
    CommandError::InvalidParams(format!("{name}: {reason}"))
}

/// Borrowed view over `RpcRequest.params`.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    values: &'a [Value],
}

impl<'a> Params<'a> {
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    /// Value at `i`; an explicit `null` reads as absent.
    fn get(&self, i: usize) -> Option<&'a Value> {
        self.values.get(i).filter(|v| !v.is_null())
    }

    pub fn opt_string(&self, i: usize, name: &str) -> Result<Option<String>, CommandError> {
        match self.get(i) {
            None => Ok(None),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.clone())),
            Some(Value::String(_)) => Err(invalid(name, "empty")),
            Some(other) => Err(invalid(name, format!("expected string, got {other}"))),
        }
    }

    pub fn string(&self, i: usize, name: &str) -> Result<String, CommandError> {
        self.opt_string(i, name)?.ok_or_else(|| invalid(name, "missing"))
    }

    /// `0x`-prefixed 20-byte address, lowercased.
    pub fn address(&self, i: usize, name: &str) -> Result<Address, CommandError> {
        normalize_address(&self.string(i, name)?).map_err(|e| invalid(name, e))
    }

    /// Table identifier: any non-empty string, lowercased.
    pub fn table(&self, i: usize, name: &str) -> Result<Address, CommandError> {
        Ok(self.string(i, name)?.trim().to_ascii_lowercase())
    }

    pub fn opt_amount(&self, i: usize, name: &str) -> Result<Option<U256>, CommandError> {
        match self.get(i) {
            None => Ok(None),
            Some(Value::String(s)) => parse_amount(s).map(Some).map_err(|e| invalid(name, e)),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| Some(U256::from(v)))
                .ok_or_else(|| invalid(name, format!("not a non-negative integer: {n}"))),
            Some(other) => Err(invalid(name, format!("expected amount, got {other}"))),
        }
    }

    /// Non-negative integer amount of arbitrary size.
    pub fn amount(&self, i: usize, name: &str) -> Result<U256, CommandError> {
        self.opt_amount(i, name)?.ok_or_else(|| invalid(name, "missing"))
    }

    pub fn opt_index(&self, i: usize, name: &str) -> Result<Option<u64>, CommandError> {
        match self.get(i) {
            None => Ok(None),
            Some(Value::String(s)) if is_decimal_digits(s) => s
                .parse::<u64>()
                .map(Some)
                .map_err(|_| invalid(name, "out of range")),
            Some(Value::String(s)) => Err(invalid(name, format!("not decimal digits: {s:?}"))),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid(name, format!("not a non-negative integer: {n}"))),
            Some(other) => Err(invalid(name, format!("expected index, got {other}"))),
        }
    }

    /// Integer index matching `^[0-9]+$`.
    pub fn index(&self, i: usize, name: &str) -> Result<u64, CommandError> {
        self.opt_index(i, name)?.ok_or_else(|| invalid(name, "missing"))
    }

    /// A JSON object, given inline or as a string holding JSON.
    pub fn opt_json(&self, i: usize, name: &str) -> Result<Option<Value>, CommandError> {
        match self.get(i) {
            None => Ok(None),
            Some(Value::String(s)) => serde_json::from_str::<Value>(s)
                .map_err(|e| invalid(name, e))
                .and_then(|v| {
                    if v.is_object() {
                        Ok(Some(v))
                    } else {
                        Err(invalid(name, "expected a JSON object"))
                    }
                }),
            Some(v @ Value::Object(_)) => Ok(Some(v.clone())),
            Some(other) => Err(invalid(name, format!("expected object, got {other}"))),
        }
    }

    pub fn json(&self, i: usize, name: &str) -> Result<Value, CommandError> {
        self.opt_json(i, name)?.ok_or_else(|| invalid(name, "missing"))
    }
}
