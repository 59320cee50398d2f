//! ICON family constants and hex-string value handling.
//!
//! ICON JSON-RPC encodes every integer as a `0x`-prefixed hex string,
//! negative values with a leading minus sign.

use std::time::Duration;

use crate::error::XCallError;

/// Maximum retry attempts for a failed JSON-RPC call.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between JSON-RPC retry attempts (exponential backoff).
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default step limit attached to unsigned transactions.
pub const DEFAULT_STEP_LIMIT: &str = "0x1312d00";

pub fn to_hex(value: u128) -> String {
    format!("0x{value:x}")
}

pub fn hex_to_u128(s: &str) -> Result<u128, XCallError> {
    let digits = s.strip_prefix("0x").ok_or_else(|| {
        XCallError::MalformedEvent(format!("expected 0x-prefixed hex int, got {s:?}"))
    })?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| XCallError::MalformedEvent(format!("bad hex int {s:?}: {e}")))
}

pub fn hex_to_u64(s: &str) -> Result<u64, XCallError> {
    u64::try_from(hex_to_u128(s)?)
        .map_err(|_| XCallError::MalformedEvent(format!("hex int {s:?} exceeds 64 bits")))
}

/// Signed hex int, e.g. `"-0x1"` for -1.
pub fn hex_to_i64(s: &str) -> Result<i64, XCallError> {
    if let Some(rest) = s.strip_prefix('-') {
        let magnitude = hex_to_u128(rest)?;
        i64::try_from(magnitude)
            .map(|m| -m)
            .map_err(|_| XCallError::MalformedEvent(format!("hex int {s:?} exceeds 64 bits")))
    } else {
        i64::try_from(hex_to_u128(s)?)
            .map_err(|_| XCallError::MalformedEvent(format!("hex int {s:?} exceeds 64 bits")))
    }
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, XCallError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(digits)?)
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Network id portion of a chain id such as `"0x1.icon"`.
pub fn nid_from_chain_id(chain_id: &str) -> &str {
    chain_id.split('.').next().unwrap_or(chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_ints_round_trip() {
        assert_eq!(hex_to_u128("0x2a").unwrap(), 42);
        assert_eq!(to_hex(42), "0x2a");
        assert_eq!(hex_to_i64("-0x1").unwrap(), -1);
        assert_eq!(hex_to_i64("0x0").unwrap(), 0);
        assert!(hex_to_u128("42").is_err());
        assert!(hex_to_u128("0xzz").is_err());
    }

    #[test]
    fn bytes_round_trip() {
        assert_eq!(hex_to_bytes("0xcafe").unwrap(), vec![0xca, 0xfe]);
        assert_eq!(bytes_to_hex(&[0xca, 0xfe]), "0xcafe");
    }

    #[test]
    fn nid_is_the_prefix() {
        assert_eq!(nid_from_chain_id("0x1.icon"), "0x1");
        assert_eq!(nid_from_chain_id("archway-1"), "archway-1");
    }
}
