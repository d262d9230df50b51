//! Arbitrary-precision amounts.
//!
//! Values are denominated in the smallest unit and never pass through a
//! floating point type. On the wire they are decimal strings.

use primitive_types::U256;

use crate::errors::TypeError;

/// Returns true when `s` is a non-empty run of ASCII decimal digits.
pub fn is_decimal_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a decimal string into a `U256`.
///
/// Signs, fractions, exponents and whitespace are rejected.
pub fn parse_amount(s: &str) -> Result<U256, TypeError> {
    if !is_decimal_digits(s) {
        return Err(TypeError::InvalidAmount(s.to_string()));
    }
    U256::from_dec_str(s).map_err(|_| TypeError::InvalidAmount(s.to_string()))
}

/// Serde adapter that writes a `U256` as a decimal string.
pub mod decimal {
    use primitive_types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_amount(&s).map_err(de::Error::custom)
    }
}
