//! Cross-chain call (xCall) client layer.
//!
//! One [`ChainAdapter`] per chain family (EVM, ICON, CosmWasm) translates
//! chain-native logs, receipts and fee queries into a canonical model;
//! [`WalletAdapter`] extends it with transaction submission. The
//! [`AdapterRegistry`] caches adapter instances per chain, and
//! [`lifecycle::MessageTracker`] follows one cross-chain message from
//! origin submission to destination execution or rollback.
//!
//! Amounts everywhere are minor-unit integers; addresses cross chain
//! boundaries as `"<chainId>/<nativeAddress>"` network addresses.

pub mod adapter_registry;
pub mod chainadapter;
pub mod cosmos;
pub mod envelope;
pub mod error;
pub mod event;
pub mod evm;
pub mod icon;
pub mod lifecycle;
pub mod retry;
pub mod signer;
pub mod types;

pub use adapter_registry::{AdapterFactory, AdapterRegistry, DefaultAdapterFactory};
pub use chainadapter::{ChainAdapter, SourceEvents, WalletAdapter};
pub use envelope::{CallPayload, NetworkAddress, PayloadCodec, PayloadParam};
pub use error::XCallError;
pub use event::{EventContext, XCallEvent, XCallEventKind};
pub use lifecycle::{MessageState, MessageTracker};
pub use retry::RetryPolicy;
pub use signer::{SignRequest, SignResponse, SigningServiceClient, TxSigner};
pub use types::{
    Block, BlockRange, ChainConfig, ChainFamily, ChainId, ExecutionTrade, FeeQuote, OpType,
    RawEventLog, Transaction, TxStatus, XTransactionInput,
};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XCallError>;
