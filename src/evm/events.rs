//! Decoding of ABI-encoded xCall logs into canonical events.
//!
//! Logs are matched by event name (keccak topic of the full signature).
//! Sequence numbers and request ids are `uint256` values carried in
//! indexed topics; dynamic fields live in the ABI-encoded data section.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Log, H256, U256};
use ethers::utils::keccak256;

use crate::error::XCallError;
use crate::event::{EventContext, XCallEvent};
use crate::types::ChainId;

pub const CALL_MESSAGE_SENT_SIG: &str = "CallMessageSent(address,string,uint256)";
pub const CALL_MESSAGE_SIG: &str = "CallMessage(string,string,uint256,uint256,bytes)";
pub const CALL_EXECUTED_SIG: &str = "CallExecuted(uint256,int256,string)";
pub const RESPONSE_MESSAGE_SIG: &str = "ResponseMessage(uint256,int256)";
pub const ROLLBACK_MESSAGE_SIG: &str = "RollbackMessage(uint256)";
pub const ROLLBACK_EXECUTED_SIG: &str = "RollbackExecuted(uint256)";

pub fn sig_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Decodes one log. `Ok(None)` means the log is not an xCall event at
/// all; `Err` means it matched a signature but its shape is broken.
pub fn parse_log(chain_id: &ChainId, log: &Log) -> Result<Option<XCallEvent>, XCallError> {
    let topic0 = match log.topics.first() {
        Some(topic) => *topic,
        None => return Ok(None),
    };

    let ctx = || {
        EventContext::new(
            chain_id.clone(),
            log.transaction_hash
                .map(|h| format!("{h:?}"))
                .unwrap_or_default(),
            serde_json::to_value(log).unwrap_or_default(),
        )
    };

    let event = if topic0 == sig_topic(CALL_MESSAGE_SENT_SIG) {
        // CallMessageSent(address indexed, string indexed, uint256 indexed sn)
        XCallEvent::CallMessageSent {
            ctx: ctx(),
            sn: topic_u128(log, 3)?,
        }
    } else if topic0 == sig_topic(CALL_MESSAGE_SIG) {
        // CallMessage(string indexed, string indexed, uint256 indexed sn,
        //             uint256 reqId, bytes data)
        let tokens = abi::decode(&[ParamType::Uint(256), ParamType::Bytes], &log.data)
            .map_err(|e| XCallError::MalformedEvent(format!("CallMessage data: {e}")))?;
        XCallEvent::CallMessage {
            ctx: ctx(),
            sn: topic_u128(log, 3)?,
            req_id: token_u128(&tokens[0])?,
            data: match &tokens[1] {
                Token::Bytes(b) => b.clone(),
                other => {
                    return Err(XCallError::MalformedEvent(format!(
                        "CallMessage data field: {other:?}"
                    )))
                }
            },
        }
    } else if topic0 == sig_topic(CALL_EXECUTED_SIG) {
        // CallExecuted(uint256 indexed reqId, int256 code, string msg)
        let tokens = abi::decode(&[ParamType::Int(256), ParamType::String], &log.data)
            .map_err(|e| XCallError::MalformedEvent(format!("CallExecuted data: {e}")))?;
        let code = token_i64(&tokens[0])?;
        XCallEvent::CallExecuted {
            ctx: ctx(),
            req_id: topic_u128(log, 1)?,
            success: code == 1,
            code: Some(code),
        }
    } else if topic0 == sig_topic(RESPONSE_MESSAGE_SIG) {
        let tokens = abi::decode(&[ParamType::Int(256)], &log.data)
            .map_err(|e| XCallError::MalformedEvent(format!("ResponseMessage data: {e}")))?;
        XCallEvent::ResponseMessage {
            ctx: ctx(),
            sn: topic_u128(log, 1)?,
            code: token_i64(&tokens[0])?,
        }
    } else if topic0 == sig_topic(ROLLBACK_MESSAGE_SIG) {
        XCallEvent::RollbackMessage {
            ctx: ctx(),
            sn: topic_u128(log, 1)?,
        }
    } else if topic0 == sig_topic(ROLLBACK_EXECUTED_SIG) {
        XCallEvent::RollbackExecuted {
            ctx: ctx(),
            sn: topic_u128(log, 1)?,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(event))
}

fn topic_u128(log: &Log, index: usize) -> Result<u128, XCallError> {
    let topic = log.topics.get(index).ok_or_else(|| {
        XCallError::MalformedEvent(format!("missing indexed topic {index}"))
    })?;
    let value = U256::from_big_endian(topic.as_bytes());
    u128::try_from(value)
        .map_err(|_| XCallError::MalformedEvent(format!("topic {index} exceeds 128 bits")))
}

fn token_u128(token: &Token) -> Result<u128, XCallError> {
    match token {
        Token::Uint(value) => u128::try_from(*value)
            .map_err(|_| XCallError::MalformedEvent("uint exceeds 128 bits".to_string())),
        other => Err(XCallError::MalformedEvent(format!(
            "expected uint, got {other:?}"
        ))),
    }
}

fn token_i64(token: &Token) -> Result<i64, XCallError> {
    match token {
        Token::Int(value) => {
            // Two's complement over 256 bits.
            if value.bit(255) {
                let magnitude = (!*value).overflowing_add(U256::one()).0;
                Ok(-(magnitude.low_u64() as i64))
            } else {
                Ok(value.low_u64() as i64)
            }
        }
        other => Err(XCallError::MalformedEvent(format!(
            "expected int, got {other:?}"
        ))),
    }
}
