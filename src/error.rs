//! Error taxonomy for the adapter layer.
//!
//! Underlying-client errors are normalized into [`XCallError`] at the
//! adapter boundary rather than leaking chain-specific error shapes.

use ethers::providers::ProviderError;

use crate::types::ChainId;

#[derive(Debug, thiserror::Error)]
pub enum XCallError {
    /// RPC-level failure that may succeed on retry.
    #[error("transient rpc error: {0}")]
    TransientRpc(String),

    /// Indexer has not caught up yet; retried with backoff up to a bound.
    #[error("indexer lag: {0}")]
    IndexerLag(String),

    /// A native event log that matched an xCall signature but could not be
    /// decoded. Skipped and logged inside scan loops, surfaced only when a
    /// specific event was demanded.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The user cancelled signing. Aborts silently, nothing was submitted.
    #[error("user rejected the transaction")]
    UserRejected,

    /// Fee validation failed before submission.
    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    /// The wallet is connected to a different network than the input targets.
    #[error("chain mismatch: adapter is for {expected}, input targets {actual}")]
    ChainMismatch { expected: ChainId, actual: ChainId },

    /// A chain-native transaction reverted during execution. Destination
    /// reverts observed through events surface as lifecycle states, not
    /// through this variant.
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ProviderError> for XCallError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::JsonRpcClientError(e) => XCallError::TransientRpc(e.to_string()),
            ProviderError::SerdeJson(e) => XCallError::Serialization(e.to_string()),
            other => XCallError::TransientRpc(format!("provider error: {other}")),
        }
    }
}

impl From<reqwest::Error> for XCallError {
    fn from(error: reqwest::Error) -> Self {
        XCallError::TransientRpc(error.to_string())
    }
}

impl From<serde_json::Error> for XCallError {
    fn from(error: serde_json::Error) -> Self {
        XCallError::Serialization(error.to_string())
    }
}

impl From<rlp::DecoderError> for XCallError {
    fn from(error: rlp::DecoderError) -> Self {
        XCallError::Serialization(format!("rlp: {error}"))
    }
}

impl From<hex::FromHexError> for XCallError {
    fn from(error: hex::FromHexError) -> Self {
        XCallError::Serialization(format!("hex: {error}"))
    }
}
