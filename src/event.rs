//! Canonical tagged-union event model shared by all chain families.
//!
//! Every variant carries the chain id and transaction hash it was observed
//! on, plus the unparsed native payload for diagnostics. `sn` is the sole
//! correlation key until a `CallMessage` has been observed; `req_id` is
//! only meaningful from that point on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChainId;

/// Observation context attached to every canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub chain_id: ChainId,
    pub tx_hash: String,
    /// The native event payload exactly as the chain returned it.
    pub raw: Value,
}

impl EventContext {
    pub fn new(chain_id: ChainId, tx_hash: impl Into<String>, raw: Value) -> Self {
        Self {
            chain_id,
            tx_hash: tx_hash.into(),
            raw,
        }
    }
}

/// Discriminant of an [`XCallEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XCallEventKind {
    CallMessageSent,
    CallMessage,
    CallExecuted,
    ResponseMessage,
    RollbackMessage,
    RollbackExecuted,
}

/// A protocol event parsed from a chain-native log.
// Externally tagged (the derive default): serde's internally tagged
// representation buffers fields through a format with no 128-bit support,
// so it can never deserialize the `u128` fields carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum XCallEvent {
    /// Origin chain assigned `sn` to an outbound message.
    CallMessageSent { ctx: EventContext, sn: u128 },
    /// The message was delivered on the destination chain and assigned a
    /// request id for execution.
    CallMessage {
        ctx: EventContext,
        sn: u128,
        req_id: u128,
        data: Vec<u8>,
    },
    /// Destination execution finished.
    CallExecuted {
        ctx: EventContext,
        req_id: u128,
        success: bool,
        code: Option<i64>,
    },
    /// Origin-side response for a message sent with rollback data.
    ResponseMessage { ctx: EventContext, sn: u128, code: i64 },
    /// The origin chain flagged `sn` as revertible.
    RollbackMessage { ctx: EventContext, sn: u128 },
    /// An explicit rollback-trigger transaction completed on the origin.
    RollbackExecuted { ctx: EventContext, sn: u128 },
}

impl XCallEvent {
    pub fn kind(&self) -> XCallEventKind {
        match self {
            XCallEvent::CallMessageSent { .. } => XCallEventKind::CallMessageSent,
            XCallEvent::CallMessage { .. } => XCallEventKind::CallMessage,
            XCallEvent::CallExecuted { .. } => XCallEventKind::CallExecuted,
            XCallEvent::ResponseMessage { .. } => XCallEventKind::ResponseMessage,
            XCallEvent::RollbackMessage { .. } => XCallEventKind::RollbackMessage,
            XCallEvent::RollbackExecuted { .. } => XCallEventKind::RollbackExecuted,
        }
    }

    pub fn context(&self) -> &EventContext {
        match self {
            XCallEvent::CallMessageSent { ctx, .. }
            | XCallEvent::CallMessage { ctx, .. }
            | XCallEvent::CallExecuted { ctx, .. }
            | XCallEvent::ResponseMessage { ctx, .. }
            | XCallEvent::RollbackMessage { ctx, .. }
            | XCallEvent::RollbackExecuted { ctx, .. } => ctx,
        }
    }

    /// Sequence number carried by the event, where the variant has one.
    pub fn sn(&self) -> Option<u128> {
        match self {
            XCallEvent::CallMessageSent { sn, .. }
            | XCallEvent::CallMessage { sn, .. }
            | XCallEvent::ResponseMessage { sn, .. }
            | XCallEvent::RollbackMessage { sn, .. }
            | XCallEvent::RollbackExecuted { sn, .. } => Some(*sn),
            XCallEvent::CallExecuted { .. } => None,
        }
    }

    /// Request id carried by the event, where the variant has one.
    pub fn req_id(&self) -> Option<u128> {
        match self {
            XCallEvent::CallMessage { req_id, .. } | XCallEvent::CallExecuted { req_id, .. } => {
                Some(*req_id)
            }
            _ => None,
        }
    }
}

/// Keep only events of the given kind. The single shared implementation of
/// per-kind filtering for all families.
pub fn filter_events(events: &[XCallEvent], kind: XCallEventKind) -> Vec<XCallEvent> {
    events
        .iter()
        .filter(|e| e.kind() == kind)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EventContext {
        EventContext::new(ChainId::from("0x1.icon"), "0xabc", json!({"indexed": []}))
    }

    #[test]
    fn filter_keeps_only_matching_kind() {
        let events = vec![
            XCallEvent::CallMessageSent { ctx: ctx(), sn: 1 },
            XCallEvent::CallMessage {
                ctx: ctx(),
                sn: 1,
                req_id: 9,
                data: vec![1, 2],
            },
            XCallEvent::CallMessageSent { ctx: ctx(), sn: 2 },
        ];

        let sent = filter_events(&events, XCallEventKind::CallMessageSent);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.kind() == XCallEventKind::CallMessageSent));

        let executed = filter_events(&events, XCallEventKind::CallExecuted);
        assert!(executed.is_empty());
    }

    #[test]
    fn correlation_accessors() {
        let delivered = XCallEvent::CallMessage {
            ctx: ctx(),
            sn: 42,
            req_id: 7,
            data: vec![],
        };
        assert_eq!(delivered.sn(), Some(42));
        assert_eq!(delivered.req_id(), Some(7));

        let executed = XCallEvent::CallExecuted {
            ctx: ctx(),
            req_id: 7,
            success: true,
            code: Some(1),
        };
        assert_eq!(executed.sn(), None);
        assert_eq!(executed.req_id(), Some(7));
    }
}
