//! Capability contracts every chain family implements.
//!
//! [`ChainAdapter`] is the read-only contract: fee queries, block and
//! transaction retrieval, event scanning and parsing. [`WalletAdapter`]
//! extends it with submission. One tagged implementation exists per chain
//! family, selected by the registry's factory.

use async_trait::async_trait;

use crate::error::XCallError;
use crate::event::{filter_events, XCallEvent, XCallEventKind};
use crate::types::{Block, BlockRange, ChainId, FeeQuote, RawEventLog, Transaction, TxStatus};
use crate::XTransactionInput;

/// Origin-side events parsed out of a submitted transaction's receipt.
#[derive(Debug, Clone, Default)]
pub struct SourceEvents {
    /// The single send event; absent when the transaction did not go
    /// through the xCall contract (or reverted).
    pub call_message_sent: Option<XCallEvent>,
}

/// Read-only capability contract for one chain.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> &ChainId;

    /// Chain-specific poll batch width for destination scanning.
    fn scan_block_count(&self) -> u64;

    /// Fee required on this chain to send to `dest`, with and without
    /// rollback data.
    async fn xcall_fee(&self, dest: &ChainId, rollback: bool) -> Result<FeeQuote, XCallError>;

    async fn block_height(&self) -> Result<u64, XCallError>;

    async fn block(&self, height: u64) -> Result<Block, XCallError>;

    /// Receipt for a submitted transaction. Returns a `Pending` placeholder
    /// while the chain has not indexed the hash yet.
    async fn tx_receipt(&self, hash: &str) -> Result<Transaction, XCallError>;

    /// Native event logs carried by a retrieved transaction.
    fn tx_event_logs(&self, tx: &Transaction) -> Vec<RawEventLog> {
        tx.event_logs.clone()
    }

    /// Re-derives the status from the raw receipt shape.
    fn derive_tx_status(&self, tx: &Transaction) -> TxStatus;

    /// Native logs emitted by the xCall contract over an inclusive block
    /// range. An empty range yields an empty set without error.
    async fn event_logs(&self, range: BlockRange) -> Result<Vec<RawEventLog>, XCallError>;

    /// Decodes native logs into canonical events. Malformed logs are
    /// skipped and logged, never propagated: one bad event must not halt
    /// a scan loop.
    fn parse_event_logs(&self, logs: &[RawEventLog]) -> Vec<XCallEvent>;

    /// Canonical events of one kind, parsed from native logs.
    fn filter_event_logs(&self, events: &[XCallEvent], kind: XCallEventKind) -> Vec<XCallEvent> {
        filter_events(events, kind)
    }

    /// Origin-side events of a submitted transaction.
    async fn source_events(&self, tx: &Transaction) -> Result<SourceEvents, XCallError> {
        let events = self.parse_event_logs(&self.tx_event_logs(tx));
        Ok(SourceEvents {
            call_message_sent: filter_events(&events, XCallEventKind::CallMessageSent)
                .into_iter()
                .next(),
        })
    }

    /// Delivery-side events (`CallMessage`/`CallExecuted` only) over an
    /// inclusive block range.
    async fn destination_events(&self, range: BlockRange) -> Result<Vec<XCallEvent>, XCallError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let logs = self.event_logs(range).await?;
        let events = self.parse_event_logs(&logs);
        Ok(events
            .into_iter()
            .filter(|e| {
                matches!(
                    e.kind(),
                    XCallEventKind::CallMessage | XCallEventKind::CallExecuted
                )
            })
            .collect())
    }
}

/// Write-capable extension of [`ChainAdapter`].
///
/// `execute_transaction` submits exactly one chain-native transaction per
/// invocation, or none when validation fails before submission — never a
/// partial or duplicate submission.
#[async_trait]
pub trait WalletAdapter: ChainAdapter {
    /// Token allowance for protocol contracts. `None` where the family's
    /// deposit path needs no approval.
    async fn approve(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<Option<String>, XCallError>;

    /// Builds and submits the chain-native transaction for an operation
    /// descriptor, returning its hash.
    async fn execute_transaction(
        &self,
        input: &XTransactionInput,
    ) -> Result<Option<String>, XCallError>;

    /// Manual destination-side execution of a delivered message.
    async fn execute_call(&self, req_id: u128, data: &[u8]) -> Result<String, XCallError>;

    /// Explicit origin-side rollback trigger for a failed message.
    async fn execute_rollback(&self, sn: u128) -> Result<String, XCallError>;
}
