//! Decoding of ICON event logs into canonical events.
//!
//! An ICON log is `{scoreAddress, indexed, data}` where `indexed[0]` is
//! the full event signature string. Integer fields are hex strings.

use serde_json::Value;

use crate::error::XCallError;
use crate::event::{EventContext, XCallEvent};
use crate::icon::types::{hex_to_bytes, hex_to_i64, hex_to_u128};
use crate::types::ChainId;

pub const CALL_MESSAGE_SENT_SIG: &str = "CallMessageSent(Address,str,int)";
pub const CALL_MESSAGE_SIG: &str = "CallMessage(str,str,int,int,bytes)";
pub const CALL_EXECUTED_SIG: &str = "CallExecuted(int,int,str)";
pub const RESPONSE_MESSAGE_SIG: &str = "ResponseMessage(int,int)";
pub const ROLLBACK_MESSAGE_SIG: &str = "RollbackMessage(int)";
pub const ROLLBACK_EXECUTED_SIG: &str = "RollbackExecuted(int)";

/// Decodes one log. `Ok(None)` means the log is not an xCall event;
/// `Err` means the signature matched but a field is missing or garbled.
pub fn parse_event_log(
    chain_id: &ChainId,
    tx_hash: &str,
    log: &Value,
) -> Result<Option<XCallEvent>, XCallError> {
    let signature = match log
        .get("indexed")
        .and_then(|i| i.get(0))
        .and_then(|s| s.as_str())
    {
        Some(sig) => sig,
        None => return Ok(None),
    };

    let ctx = EventContext::new(chain_id.clone(), tx_hash.to_string(), log.clone());

    let event = match signature {
        // indexed: [sig, from, to, sn]
        CALL_MESSAGE_SENT_SIG => XCallEvent::CallMessageSent {
            ctx,
            sn: hex_to_u128(indexed_str(log, 3)?)?,
        },
        // indexed: [sig, from, to, sn]; data: [reqId, data]
        CALL_MESSAGE_SIG => XCallEvent::CallMessage {
            ctx,
            sn: hex_to_u128(indexed_str(log, 3)?)?,
            req_id: hex_to_u128(data_str(log, 0)?)?,
            data: hex_to_bytes(data_str(log, 1)?)?,
        },
        // indexed: [sig, reqId]; data: [code, msg]
        CALL_EXECUTED_SIG => {
            let code = hex_to_i64(data_str(log, 0)?)?;
            XCallEvent::CallExecuted {
                ctx,
                req_id: hex_to_u128(indexed_str(log, 1)?)?,
                success: code == 1,
                code: Some(code),
            }
        }
        // indexed: [sig, sn]; data: [code]
        RESPONSE_MESSAGE_SIG => XCallEvent::ResponseMessage {
            ctx,
            sn: hex_to_u128(indexed_str(log, 1)?)?,
            code: hex_to_i64(data_str(log, 0)?)?,
        },
        ROLLBACK_MESSAGE_SIG => XCallEvent::RollbackMessage {
            ctx,
            sn: hex_to_u128(indexed_str(log, 1)?)?,
        },
        ROLLBACK_EXECUTED_SIG => XCallEvent::RollbackExecuted {
            ctx,
            sn: hex_to_u128(indexed_str(log, 1)?)?,
        },
        _ => return Ok(None),
    };

    Ok(Some(event))
}

fn indexed_str(log: &Value, index: usize) -> Result<&str, XCallError> {
    log.get("indexed")
        .and_then(|i| i.get(index))
        .and_then(|s| s.as_str())
        .ok_or_else(|| XCallError::MalformedEvent(format!("missing indexed field {index}")))
}

fn data_str(log: &Value, index: usize) -> Result<&str, XCallError> {
    log.get("data")
        .and_then(|d| d.get(index))
        .and_then(|s| s.as_str())
        .ok_or_else(|| XCallError::MalformedEvent(format!("missing data field {index}")))
}
