//! EVM family constants and address handling.

use std::time::Duration;

use ethers::types::Address;

use crate::error::XCallError;

/// Maximum retry attempts for a failed RPC call.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between RPC retry attempts (exponential backoff).
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default timeout for RPC requests.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum spacing between consecutive RPC calls.
pub const MIN_CALL_INTERVAL: Duration = Duration::from_millis(100);

pub fn parse_address(s: &str) -> Result<Address, XCallError> {
    s.parse::<Address>()
        .map_err(|e| XCallError::Configuration(format!("invalid EVM address {s}: {e}")))
}
