//! Shared data model for the xCall client layer.
//!
//! Amounts crossing the adapter boundary are minor-unit integers; decimal
//! scaling happens strictly before adapter entry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier for a blockchain network (e.g. `"0x1.icon"`,
/// `"0xa4b1.arbitrum"`, `"archway-1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Grouping of blockchains sharing RPC and event conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    Evm,
    Icon,
    Cosmos,
}

impl ChainFamily {
    /// Default destination-scan batch width for the family, reflecting
    /// block time and typical RPC rate limits.
    pub fn default_scan_block_count(&self) -> u64 {
        match self {
            ChainFamily::Evm => 30,
            ChainFamily::Icon => 10,
            ChainFamily::Cosmos => 25,
        }
    }
}

/// Configuration for connecting to and interacting with one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier.
    pub chain_id: ChainId,

    /// Chain family, used by the factory to select an adapter implementation.
    pub family: ChainFamily,

    /// RPC endpoint URL.
    pub rpc_url: String,

    /// Address of the xCall protocol contract on this chain.
    pub xcall_address: String,

    /// Additional protocol contract addresses (asset manager, loans, ...).
    pub contracts: HashMap<String, String>,

    /// Override for the family's default scan batch width.
    pub scan_block_count: Option<u64>,

    /// Detached signing service endpoint for ICON/CosmWasm wallet adapters.
    pub signing_endpoint: Option<String>,

    /// Sender address for wallet-capable adapters.
    pub wallet_address: Option<String>,

    /// Hex-encoded signing key for EVM wallet adapters.
    pub private_key: Option<String>,

    /// EVM numeric chain id, required for signing on that family.
    pub evm_chain_id: Option<u64>,

    /// Native fee denom for CosmWasm chains.
    pub fee_denom: Option<String>,
}

impl ChainConfig {
    pub fn new(
        chain_id: ChainId,
        family: ChainFamily,
        rpc_url: impl Into<String>,
        xcall_address: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            family,
            rpc_url: rpc_url.into(),
            xcall_address: xcall_address.into(),
            contracts: HashMap::new(),
            scan_block_count: None,
            signing_endpoint: None,
            wallet_address: None,
            private_key: None,
            evm_chain_id: None,
            fee_denom: None,
        }
    }

    /// Add a protocol contract address.
    pub fn with_contract(mut self, name: &str, address: &str) -> Self {
        self.contracts.insert(name.to_string(), address.to_string());
        self
    }

    pub fn with_scan_block_count(mut self, count: u64) -> Self {
        self.scan_block_count = Some(count);
        self
    }

    pub fn with_signing_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.signing_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Poll batch width; a window is always at least one block wide.
    pub fn scan_block_count(&self) -> u64 {
        self.scan_block_count
            .unwrap_or_else(|| self.family.default_scan_block_count())
            .max(1)
    }
}

/// Minor-unit fee amounts required to accompany a cross-chain send,
/// denominated in the origin chain's fee-bearing asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub rollback: u128,
    pub no_rollback: u128,
}

impl FeeQuote {
    pub fn amount_for(&self, rollback: bool) -> u128 {
        if rollback {
            self.rollback
        } else {
            self.no_rollback
        }
    }
}

/// Derived status of a submitted chain-native transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Success,
    Failure,
}

/// A chain-native event log in the family's own shape, kept unparsed for
/// diagnostics and deferred decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEventLog {
    pub chain_id: ChainId,
    pub tx_hash: String,
    pub payload: Value,
}

/// A submitted chain-native transaction once retrievable from the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub status: TxStatus,
    pub block_height: Option<u64>,
    pub event_logs: Vec<RawEventLog>,
    /// Raw receipt/result as returned by the chain client.
    pub raw: Value,
}

impl Transaction {
    /// Placeholder for a transaction the chain has not indexed yet.
    pub fn pending(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: TxStatus::Pending,
            block_height: None,
            event_logs: Vec::new(),
            raw: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub tx_hashes: Vec<String>,
}

/// Inclusive block range. `start > end` is the legal empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, height: u64) -> bool {
        height >= self.start && height <= self.end
    }
}

/// Cross-chain operation kind carried by an [`XTransactionInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpType {
    Transfer,
    Swap,
    DepositCollateral,
    WithdrawCollateral,
    Borrow,
    Repay,
}

impl OpType {
    /// Whether the operation sends a rollback-capable envelope. Withdrawals
    /// and borrows must be able to return control to the origin chain when
    /// destination execution fails.
    pub fn requires_rollback(&self) -> bool {
        matches!(self, OpType::WithdrawCollateral | OpType::Borrow)
    }

    /// Method name embedded in the cross-chain payload.
    pub fn method(&self) -> &'static str {
        match self {
            OpType::Transfer => "transfer",
            OpType::Swap => "swap",
            OpType::DepositCollateral => "depositCollateral",
            OpType::WithdrawCollateral => "withdrawCollateral",
            OpType::Borrow => "borrow",
            OpType::Repay => "repay",
        }
    }
}

/// Route constraints for a swap executed on the destination side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrade {
    /// Token addresses along the trade path.
    pub path: Vec<String>,
    /// Minimum acceptable output in minor units.
    pub minimum_receive: u128,
}

/// Operation descriptor assembled by the consumer and handed to a wallet
/// adapter for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XTransactionInput {
    pub op: OpType,
    pub source_chain: ChainId,
    pub dest_chain: ChainId,
    /// Family of the destination chain; selects the payload codec its
    /// calldata convention expects.
    pub dest_family: ChainFamily,
    /// Token contract address on the source chain, where the operation
    /// moves a token.
    pub token: Option<String>,
    /// Minor-unit amount entering the operation.
    pub input_amount: u128,
    /// Native recipient address on the destination chain.
    pub recipient: String,
    pub fee_quote: FeeQuote,
    pub execution_trade: Option<ExecutionTrade>,
    pub slippage_tolerance_bps: Option<u16>,
    /// Protocol source connection list, used to route the relay for
    /// rollback-capable operations.
    pub sources: Vec<String>,
    /// Protocol destination connection list.
    pub destinations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_when_start_exceeds_end() {
        assert!(BlockRange::new(10, 9).is_empty());
        assert!(!BlockRange::new(10, 10).is_empty());
    }

    #[test]
    fn fee_quote_selects_by_rollback() {
        let quote = FeeQuote {
            rollback: 25,
            no_rollback: 10,
        };
        assert_eq!(quote.amount_for(true), 25);
        assert_eq!(quote.amount_for(false), 10);
    }

    #[test]
    fn rollback_required_only_for_withdraw_and_borrow() {
        assert!(OpType::WithdrawCollateral.requires_rollback());
        assert!(OpType::Borrow.requires_rollback());
        assert!(!OpType::Transfer.requires_rollback());
        assert!(!OpType::Swap.requires_rollback());
        assert!(!OpType::DepositCollateral.requires_rollback());
        assert!(!OpType::Repay.requires_rollback());
    }

    #[test]
    fn scan_block_count_prefers_config_override() {
        let config = ChainConfig::new(
            ChainId::from("0x1.icon"),
            ChainFamily::Icon,
            "https://rpc.example",
            "cx0000000000000000000000000000000000000000",
        )
        .with_scan_block_count(4);
        assert_eq!(config.scan_block_count(), 4);

        let config = ChainConfig::new(
            ChainId::from("archway-1"),
            ChainFamily::Cosmos,
            "https://rpc.example",
            "archway1xcall",
        );
        assert_eq!(config.scan_block_count(), 25);
    }

    #[test]
    fn scan_block_count_never_collapses_to_zero() {
        let config = ChainConfig::new(
            ChainId::from("0x1.icon"),
            ChainFamily::Icon,
            "https://rpc.example",
            "cx0000000000000000000000000000000000000000",
        )
        .with_scan_block_count(0);
        assert_eq!(config.scan_block_count(), 1);
    }
}
