//! Cosmos family constants and attribute value handling.
//!
//! CosmWasm event attributes are plain strings; integers are decimal,
//! byte fields hex-encoded.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XCallError;

/// Maximum retry attempts for a failed LCD request.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between LCD retry attempts (exponential backoff).
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Prefix CosmWasm puts on contract-emitted event types.
pub const WASM_EVENT_PREFIX: &str = "wasm-";

/// Native coin attached to an execute message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

pub fn decimal_to_u128(s: &str) -> Result<u128, XCallError> {
    s.parse::<u128>()
        .map_err(|e| XCallError::MalformedEvent(format!("bad decimal int {s:?}: {e}")))
}

pub fn decimal_to_i64(s: &str) -> Result<i64, XCallError> {
    s.parse::<i64>()
        .map_err(|e| XCallError::MalformedEvent(format!("bad decimal int {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parsing() {
        assert_eq!(decimal_to_u128("42").unwrap(), 42);
        assert_eq!(decimal_to_i64("-1").unwrap(), -1);
        assert!(decimal_to_u128("0x2a").is_err());
        assert!(decimal_to_u128("-1").is_err());
    }

    #[test]
    fn coin_serializes_amount_as_string() {
        let coin = Coin::new("aarch", 30);
        let json = serde_json::to_value(&coin).unwrap();
        assert_eq!(json, serde_json::json!({ "denom": "aarch", "amount": "30" }));
    }
}
