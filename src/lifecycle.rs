//! Event correlation and message lifecycle tracking.
//!
//! Follows one outbound message from submission through delivery,
//! execution and optional rollback, across two independently-finalizing
//! chains. Destination scanning proceeds in non-overlapping, gap-free
//! windows; polling is idempotent, so re-observing an already-processed
//! event is a no-op. The caller awaits each poll before issuing the next;
//! a tracker in a terminal state is retired by simply not polling it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chainadapter::ChainAdapter;
use crate::error::XCallError;
use crate::event::XCallEvent;
use crate::retry::{retry_until, RetryPolicy};
use crate::types::{BlockRange, Transaction, TxStatus};

/// Lifecycle state of one tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Origin transaction mined, `CallMessageSent` parsed, `sn` captured.
    Sent,
    /// Destination block ranges are being scanned.
    AwaitingDestination,
    /// `CallMessage` observed; where the destination requires manual
    /// execution, the consumer submits an execute-call referencing the
    /// request id.
    Delivered { req_id: u128 },
    /// `CallExecuted` with success observed. Terminal.
    Executed,
    /// Destination execution failed and rollback data exists; an explicit
    /// rollback trigger on the origin chain is available.
    RollbackRequired,
    /// `RollbackExecuted` observed on the origin chain. Terminal.
    RolledBack,
    /// Destination failure without rollback data. Terminal, no recovery.
    Failed,
}

impl MessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageState::Executed | MessageState::RolledBack | MessageState::Failed
        )
    }
}

/// Tracks one outbound cross-chain message.
pub struct MessageTracker {
    id: Uuid,
    origin: Arc<dyn ChainAdapter>,
    dest: Arc<dyn ChainAdapter>,
    origin_tx_hash: String,
    sn: u128,
    has_rollback: bool,
    state: MessageState,
    /// Next destination block to scan; windows advance gap-free.
    dest_cursor: u64,
    /// Next origin block to scan while awaiting rollback confirmation.
    origin_cursor: Option<u64>,
    req_id: Option<u128>,
}

impl MessageTracker {
    /// Builds a tracker from a freshly submitted origin transaction.
    ///
    /// Waits (bounded) for the origin receipt, verifies the transaction
    /// succeeded, captures `sn` from the `CallMessageSent` event and
    /// snapshots the destination height as the initial scan cursor.
    pub async fn from_submission(
        origin: Arc<dyn ChainAdapter>,
        dest: Arc<dyn ChainAdapter>,
        tx_hash: &str,
        has_rollback: bool,
    ) -> Result<Self, XCallError> {
        Self::from_submission_with_policy(origin, dest, tx_hash, has_rollback, RetryPolicy::receipt())
            .await
    }

    pub async fn from_submission_with_policy(
        origin: Arc<dyn ChainAdapter>,
        dest: Arc<dyn ChainAdapter>,
        tx_hash: &str,
        has_rollback: bool,
        receipt_policy: RetryPolicy,
    ) -> Result<Self, XCallError> {
        let hash = tx_hash.to_string();
        let tx = retry_until(&receipt_policy, || {
            let origin = origin.clone();
            let hash = hash.clone();
            async move {
                let tx = origin.tx_receipt(&hash).await?;
                match tx.status {
                    TxStatus::Pending => Ok(None),
                    _ => Ok(Some(tx)),
                }
            }
        })
        .await?;

        if origin.derive_tx_status(&tx) == TxStatus::Failure {
            return Err(XCallError::ExecutionReverted(format!(
                "origin transaction {hash} reverted before a message was sent"
            )));
        }

        let sent = origin
            .source_events(&tx)
            .await?
            .call_message_sent
            .ok_or_else(|| {
                XCallError::MalformedEvent(format!(
                    "transaction {hash} carries no CallMessageSent event"
                ))
            })?;
        let sn = sent
            .sn()
            .ok_or_else(|| XCallError::MalformedEvent("send event without sn".to_string()))?;

        let dest_cursor = dest.block_height().await?;
        info!(%hash, sn, dest_cursor, "tracking outbound message");

        Ok(Self {
            id: Uuid::new_v4(),
            origin,
            dest,
            origin_tx_hash: hash,
            sn,
            has_rollback,
            state: MessageState::Sent,
            dest_cursor,
            origin_cursor: None,
            req_id: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sn(&self) -> u128 {
        self.sn
    }

    pub fn req_id(&self) -> Option<u128> {
        self.req_id
    }

    pub fn origin_tx_hash(&self) -> &str {
        &self.origin_tx_hash
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Scans the next destination window and applies any events found.
    ///
    /// Each call advances `start` to one past the previously scanned end,
    /// never scans beyond the current destination height, and caps the
    /// window at the destination's scan batch width.
    pub async fn poll_destination(&mut self) -> Result<MessageState, XCallError> {
        if self.state.is_terminal() || matches!(self.state, MessageState::RollbackRequired) {
            return Ok(self.state);
        }
        if self.state == MessageState::Sent {
            self.state = MessageState::AwaitingDestination;
        }

        let tip = self.dest.block_height().await?;
        if self.dest_cursor > tip {
            return Ok(self.state);
        }

        // Adapters outside this crate may report a zero batch width.
        let scan = self.dest.scan_block_count().max(1);
        let end = tip.min(self.dest_cursor + scan - 1);
        let window = BlockRange::new(self.dest_cursor, end);
        debug!(sn = self.sn, start = window.start, end = window.end, "scanning destination window");

        let events = self.dest.destination_events(window).await?;
        self.dest_cursor = end + 1;

        for event in events {
            self.apply_destination_event(&event);
        }
        Ok(self.state)
    }

    /// Scans the next origin window for rollback confirmation after the
    /// explicit rollback trigger has been submitted.
    pub async fn poll_origin_rollback(&mut self) -> Result<MessageState, XCallError> {
        if self.state != MessageState::RollbackRequired {
            return Ok(self.state);
        }

        let tip = self.origin.block_height().await?;
        let scan = self.origin.scan_block_count().max(1);
        let cursor = match self.origin_cursor {
            Some(cursor) => cursor,
            // The trigger may already be mined; start one window back.
            None => tip.saturating_sub(scan.saturating_sub(1)),
        };
        if cursor > tip {
            return Ok(self.state);
        }

        let end = tip.min(cursor + scan - 1);
        let logs = self.origin.event_logs(BlockRange::new(cursor, end)).await?;
        let events = self.origin.parse_event_logs(&logs);
        self.origin_cursor = Some(end + 1);

        for event in events {
            if let XCallEvent::RollbackExecuted { sn, .. } = event {
                if sn == self.sn {
                    info!(sn, "rollback executed on origin");
                    self.state = MessageState::RolledBack;
                    break;
                }
            }
        }
        Ok(self.state)
    }

    /// Applies the receipt of an origin-side rollback trigger directly,
    /// short-cutting the origin scan when the caller holds the receipt.
    pub fn apply_origin_transaction(&mut self, tx: &Transaction) -> MessageState {
        if self.state != MessageState::RollbackRequired {
            return self.state;
        }
        let events = self.origin.parse_event_logs(&self.origin.tx_event_logs(tx));
        for event in events {
            if let XCallEvent::RollbackExecuted { sn, .. } = event {
                if sn == self.sn {
                    self.state = MessageState::RolledBack;
                    break;
                }
            }
        }
        self.state
    }

    fn apply_destination_event(&mut self, event: &XCallEvent) {
        match event {
            XCallEvent::CallMessage { sn, req_id, .. } if *sn == self.sn => {
                match self.req_id {
                    // Re-observed delivery for a known sn: no-op.
                    Some(known) if known == *req_id => {}
                    Some(known) => {
                        warn!(
                            sn = self.sn,
                            known, conflicting = req_id,
                            "conflicting req_id for already-delivered message, ignoring"
                        );
                    }
                    None => {
                        self.req_id = Some(*req_id);
                        if self.state == MessageState::AwaitingDestination {
                            info!(sn = self.sn, req_id, "message delivered");
                            self.state = MessageState::Delivered { req_id: *req_id };
                        }
                    }
                }
            }
            XCallEvent::CallExecuted {
                req_id, success, code, ..
            } if Some(*req_id) == self.req_id => {
                if !matches!(self.state, MessageState::Delivered { .. }) {
                    return; // already settled, idempotent re-observation
                }
                if *success {
                    info!(sn = self.sn, req_id, "message executed");
                    self.state = MessageState::Executed;
                } else if self.has_rollback {
                    warn!(sn = self.sn, req_id, ?code, "destination execution failed, rollback available");
                    self.state = MessageState::RollbackRequired;
                } else {
                    warn!(sn = self.sn, req_id, ?code, "destination execution failed, no rollback data");
                    self.state = MessageState::Failed;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventContext;
    use crate::types::{Block, ChainId, FeeQuote, RawEventLog};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Scripted chain: receipts by hash, events by height. Raw log payloads
    /// hold the canonical event serialized as JSON, so the default
    /// `source_events`/`destination_events` plumbing is exercised as-is.
    struct MockChain {
        chain_id: ChainId,
        scan: u64,
        height: AtomicU64,
        receipts: Mutex<HashMap<String, Transaction>>,
        events: Mutex<Vec<(u64, XCallEvent)>>,
        scanned: Mutex<Vec<BlockRange>>,
    }

    impl MockChain {
        fn new(chain_id: &str, scan: u64, height: u64) -> Self {
            Self {
                chain_id: ChainId::from(chain_id),
                scan,
                height: AtomicU64::new(height),
                receipts: Mutex::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                scanned: Mutex::new(Vec::new()),
            }
        }

        fn set_height(&self, height: u64) {
            self.height.store(height, Ordering::SeqCst);
        }

        fn script_event(&self, height: u64, event: XCallEvent) {
            self.events.lock().unwrap().push((height, event));
        }

        fn script_receipt(&self, hash: &str, events: Vec<XCallEvent>) {
            let logs = events
                .iter()
                .map(|e| RawEventLog {
                    chain_id: self.chain_id.clone(),
                    tx_hash: hash.to_string(),
                    payload: serde_json::to_value(e).unwrap(),
                })
                .collect();
            self.receipts.lock().unwrap().insert(
                hash.to_string(),
                Transaction {
                    hash: hash.to_string(),
                    status: TxStatus::Success,
                    block_height: Some(self.height.load(Ordering::SeqCst)),
                    event_logs: logs,
                    raw: json!({}),
                },
            );
        }

        fn windows(&self) -> Vec<BlockRange> {
            self.scanned.lock().unwrap().clone()
        }
    }

    fn ctx(chain: &str) -> EventContext {
        EventContext::new(ChainId::from(chain), "0xobserved", json!({}))
    }

    fn sent(chain: &str, sn: u128) -> XCallEvent {
        XCallEvent::CallMessageSent { ctx: ctx(chain), sn }
    }

    fn delivered(chain: &str, sn: u128, req_id: u128) -> XCallEvent {
        XCallEvent::CallMessage {
            ctx: ctx(chain),
            sn,
            req_id,
            data: vec![],
        }
    }

    fn executed(chain: &str, req_id: u128, success: bool) -> XCallEvent {
        XCallEvent::CallExecuted {
            ctx: ctx(chain),
            req_id,
            success,
            code: Some(if success { 1 } else { 0 }),
        }
    }

    fn rolled_back(chain: &str, sn: u128) -> XCallEvent {
        XCallEvent::RollbackExecuted { ctx: ctx(chain), sn }
    }

    #[async_trait]
    impl ChainAdapter for MockChain {
        fn chain_id(&self) -> &ChainId {
            &self.chain_id
        }

        fn scan_block_count(&self) -> u64 {
            self.scan
        }

        async fn xcall_fee(&self, _dest: &ChainId, _rollback: bool) -> Result<FeeQuote, XCallError> {
            Ok(FeeQuote {
                rollback: 0,
                no_rollback: 0,
            })
        }

        async fn block_height(&self) -> Result<u64, XCallError> {
            Ok(self.height.load(Ordering::SeqCst))
        }

        async fn block(&self, height: u64) -> Result<Block, XCallError> {
            Ok(Block {
                height,
                hash: String::new(),
                tx_hashes: vec![],
            })
        }

        async fn tx_receipt(&self, hash: &str) -> Result<Transaction, XCallError> {
            Ok(self
                .receipts
                .lock()
                .unwrap()
                .get(hash)
                .cloned()
                .unwrap_or_else(|| Transaction::pending(hash)))
        }

        fn derive_tx_status(&self, tx: &Transaction) -> TxStatus {
            tx.status
        }

        async fn event_logs(&self, range: BlockRange) -> Result<Vec<RawEventLog>, XCallError> {
            self.scanned.lock().unwrap().push(range);
            if range.is_empty() {
                return Ok(vec![]);
            }
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|(height, _)| range.contains(*height))
                .map(|(_, event)| RawEventLog {
                    chain_id: self.chain_id.clone(),
                    tx_hash: "0xobserved".to_string(),
                    payload: serde_json::to_value(event).unwrap(),
                })
                .collect())
        }

        fn parse_event_logs(&self, logs: &[RawEventLog]) -> Vec<XCallEvent> {
            logs.iter()
                .filter_map(|log| serde_json::from_value(log.payload.clone()).ok())
                .collect()
        }
    }

    fn setup() -> (Arc<MockChain>, Arc<MockChain>) {
        let origin = Arc::new(MockChain::new("0x1.icon", 10, 50));
        let dest = Arc::new(MockChain::new("0xa4b1.arbitrum", 10, 100));
        origin.script_receipt("0xsend", vec![sent("0x1.icon", 42)]);
        (origin, dest)
    }

    async fn tracker(
        origin: &Arc<MockChain>,
        dest: &Arc<MockChain>,
        has_rollback: bool,
    ) -> MessageTracker {
        MessageTracker::from_submission(
            origin.clone() as Arc<dyn ChainAdapter>,
            dest.clone() as Arc<dyn ChainAdapter>,
            "0xsend",
            has_rollback,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn delivery_then_successful_execution() {
        let (origin, dest) = setup();
        dest.script_event(105, delivered("0xa4b1.arbitrum", 42, 7));
        dest.script_event(112, executed("0xa4b1.arbitrum", 7, true));

        let mut tracker = tracker(&origin, &dest, false).await;
        assert_eq!(tracker.sn(), 42);
        assert_eq!(tracker.state(), MessageState::Sent);

        // Nothing beyond the cursor yet.
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::AwaitingDestination
        );

        dest.set_height(107);
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::Delivered { req_id: 7 }
        );
        assert_eq!(tracker.req_id(), Some(7));

        dest.set_height(115);
        assert_eq!(tracker.poll_destination().await.unwrap(), MessageState::Executed);
        assert!(tracker.is_terminal());

        // Windows are non-overlapping and gap-free.
        let windows = dest.windows();
        for pair in windows.windows(2) {
            assert_eq!(pair[1].start, pair[0].end + 1);
        }
    }

    #[tokio::test]
    async fn failed_execution_with_rollback() {
        let (origin, dest) = setup();
        dest.script_event(103, delivered("0xa4b1.arbitrum", 42, 7));
        dest.script_event(104, executed("0xa4b1.arbitrum", 7, false));

        let mut tracker = tracker(&origin, &dest, true).await;
        dest.set_height(110);
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::RollbackRequired
        );
        assert!(!tracker.is_terminal());

        // Rollback trigger mined on the origin chain.
        origin.script_event(55, rolled_back("0x1.icon", 42));
        origin.set_height(58);
        assert_eq!(
            tracker.poll_origin_rollback().await.unwrap(),
            MessageState::RolledBack
        );
        assert!(tracker.is_terminal());
    }

    #[tokio::test]
    async fn rollback_confirmed_from_trigger_receipt() {
        let (origin, dest) = setup();
        dest.script_event(103, delivered("0xa4b1.arbitrum", 42, 7));
        dest.script_event(104, executed("0xa4b1.arbitrum", 7, false));

        let mut tracker = tracker(&origin, &dest, true).await;
        dest.set_height(110);
        tracker.poll_destination().await.unwrap();

        origin.script_receipt("0xrevert", vec![rolled_back("0x1.icon", 42)]);
        let receipt = origin.tx_receipt("0xrevert").await.unwrap();
        assert_eq!(tracker.apply_origin_transaction(&receipt), MessageState::RolledBack);
    }

    #[tokio::test]
    async fn failure_without_rollback_is_terminal() {
        let (origin, dest) = setup();
        dest.script_event(101, delivered("0xa4b1.arbitrum", 42, 7));
        dest.script_event(102, executed("0xa4b1.arbitrum", 7, false));

        let mut tracker = tracker(&origin, &dest, false).await;
        dest.set_height(109);
        assert_eq!(tracker.poll_destination().await.unwrap(), MessageState::Failed);
        assert!(tracker.is_terminal());

        // Further polls are no-ops.
        dest.set_height(200);
        assert_eq!(tracker.poll_destination().await.unwrap(), MessageState::Failed);
    }

    #[tokio::test]
    async fn repeated_polling_is_idempotent() {
        let (origin, dest) = setup();
        dest.script_event(101, delivered("0xa4b1.arbitrum", 42, 7));
        // The same delivery re-observed in a later block must be a no-op,
        // as must a conflicting req_id for the same sn.
        dest.script_event(108, delivered("0xa4b1.arbitrum", 42, 7));
        dest.script_event(109, delivered("0xa4b1.arbitrum", 42, 99));

        let mut tracker = tracker(&origin, &dest, false).await;
        dest.set_height(112);
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::Delivered { req_id: 7 }
        );
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::Delivered { req_id: 7 }
        );
        assert_eq!(tracker.req_id(), Some(7));
    }

    #[tokio::test]
    async fn events_for_other_sequence_numbers_are_ignored() {
        let (origin, dest) = setup();
        dest.script_event(101, delivered("0xa4b1.arbitrum", 41, 6));
        dest.script_event(102, executed("0xa4b1.arbitrum", 6, true));

        let mut tracker = tracker(&origin, &dest, false).await;
        dest.set_height(109);
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::AwaitingDestination
        );
        assert_eq!(tracker.req_id(), None);
    }

    #[tokio::test]
    async fn empty_range_scan_returns_no_events() {
        let (_, dest) = setup();
        let events = dest
            .destination_events(BlockRange::new(10, 9))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn submission_without_send_event_is_rejected() {
        let (origin, dest) = setup();
        origin.script_receipt("0xplain", vec![]);
        let result = MessageTracker::from_submission_with_policy(
            origin.clone() as Arc<dyn ChainAdapter>,
            dest.clone() as Arc<dyn ChainAdapter>,
            "0xplain",
            false,
            RetryPolicy::new(2, std::time::Duration::from_millis(1)),
        )
        .await;
        assert!(matches!(result, Err(XCallError::MalformedEvent(_))));
    }

    #[tokio::test]
    async fn reverted_origin_submission_is_rejected() {
        let (origin, dest) = setup();
        origin.receipts.lock().unwrap().insert(
            "0xfail".to_string(),
            Transaction {
                hash: "0xfail".to_string(),
                status: TxStatus::Failure,
                block_height: Some(50),
                event_logs: vec![],
                raw: json!({}),
            },
        );

        let result = MessageTracker::from_submission_with_policy(
            origin.clone() as Arc<dyn ChainAdapter>,
            dest.clone() as Arc<dyn ChainAdapter>,
            "0xfail",
            false,
            RetryPolicy::new(2, std::time::Duration::from_millis(1)),
        )
        .await;
        assert!(matches!(result, Err(XCallError::ExecutionReverted(_))));
    }

    #[tokio::test]
    async fn zero_scan_width_still_advances() {
        let origin = Arc::new(MockChain::new("0x1.icon", 10, 50));
        // A zero batch width must behave as width one, not panic.
        let dest = Arc::new(MockChain::new("0xa4b1.arbitrum", 0, 100));
        origin.script_receipt("0xsend", vec![sent("0x1.icon", 42)]);
        dest.script_event(101, delivered("0xa4b1.arbitrum", 42, 7));

        let mut tracker = tracker(&origin, &dest, false).await;
        dest.set_height(105);
        tracker.poll_destination().await.unwrap();
        assert_eq!(
            tracker.poll_destination().await.unwrap(),
            MessageState::Delivered { req_id: 7 }
        );
        for window in dest.windows() {
            assert_eq!(window.start, window.end);
        }
    }

    #[tokio::test]
    async fn pending_receipt_is_retried_with_bound() {
        let (origin, dest) = setup();
        // Never indexed: the bounded wait must surface IndexerLag.
        let result = MessageTracker::from_submission_with_policy(
            origin.clone() as Arc<dyn ChainAdapter>,
            dest.clone() as Arc<dyn ChainAdapter>,
            "0xmissing",
            false,
            RetryPolicy::new(3, std::time::Duration::from_millis(1)),
        )
        .await;
        assert!(matches!(result, Err(XCallError::IndexerLag(_))));
    }
}
