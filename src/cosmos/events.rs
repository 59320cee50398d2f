//! Decoding of CosmWasm tx events into canonical events.
//!
//! A contract event is `{type: "wasm-<Name>", attributes: [{key, value}]}`
//! with decimal string integers and hex-encoded byte fields.

use serde_json::Value;

use crate::cosmos::types::{decimal_to_i64, decimal_to_u128, WASM_EVENT_PREFIX};
use crate::error::XCallError;
use crate::event::{EventContext, XCallEvent};
use crate::types::ChainId;

pub const CALL_MESSAGE_SENT: &str = "CallMessageSent";
pub const CALL_MESSAGE: &str = "CallMessage";
pub const CALL_EXECUTED: &str = "CallExecuted";
pub const RESPONSE_MESSAGE: &str = "ResponseMessage";
pub const ROLLBACK_MESSAGE: &str = "RollbackMessage";
pub const ROLLBACK_EXECUTED: &str = "RollbackExecuted";

/// Decodes one tx event. `Ok(None)` for anything that is not a `wasm-`
/// xCall event; `Err` when a matched event is missing attributes.
pub fn parse_event(
    chain_id: &ChainId,
    tx_hash: &str,
    event: &Value,
) -> Result<Option<XCallEvent>, XCallError> {
    let name = match event
        .get("type")
        .and_then(|t| t.as_str())
        .and_then(|t| t.strip_prefix(WASM_EVENT_PREFIX))
    {
        Some(name) => name,
        None => return Ok(None),
    };

    let ctx = EventContext::new(chain_id.clone(), tx_hash.to_string(), event.clone());

    let parsed = match name {
        CALL_MESSAGE_SENT => XCallEvent::CallMessageSent {
            ctx,
            sn: decimal_to_u128(attr(event, "sn")?)?,
        },
        CALL_MESSAGE => XCallEvent::CallMessage {
            ctx,
            sn: decimal_to_u128(attr(event, "sn")?)?,
            req_id: decimal_to_u128(attr(event, "reqId")?)?,
            data: hex::decode(attr(event, "data")?)?,
        },
        CALL_EXECUTED => {
            let code = decimal_to_i64(attr(event, "code")?)?;
            XCallEvent::CallExecuted {
                ctx,
                req_id: decimal_to_u128(attr(event, "reqId")?)?,
                success: code == 1,
                code: Some(code),
            }
        }
        RESPONSE_MESSAGE => XCallEvent::ResponseMessage {
            ctx,
            sn: decimal_to_u128(attr(event, "sn")?)?,
            code: decimal_to_i64(attr(event, "code")?)?,
        },
        ROLLBACK_MESSAGE => XCallEvent::RollbackMessage {
            ctx,
            sn: decimal_to_u128(attr(event, "sn")?)?,
        },
        ROLLBACK_EXECUTED => XCallEvent::RollbackExecuted {
            ctx,
            sn: decimal_to_u128(attr(event, "sn")?)?,
        },
        _ => return Ok(None),
    };

    Ok(Some(parsed))
}

fn attr<'a>(event: &'a Value, key: &str) -> Result<&'a str, XCallError> {
    event
        .get("attributes")
        .and_then(|attrs| attrs.as_array())
        .and_then(|attrs| {
            attrs.iter().find_map(|a| {
                (a.get("key").and_then(|k| k.as_str()) == Some(key))
                    .then(|| a.get("value").and_then(|v| v.as_str()))
                    .flatten()
            })
        })
        .ok_or_else(|| XCallError::MalformedEvent(format!("missing attribute {key:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain() -> ChainId {
        ChainId::from("archway-1")
    }

    fn event(name: &str, attrs: &[(&str, &str)]) -> Value {
        json!({
            "type": format!("wasm-{name}"),
            "attributes": attrs
                .iter()
                .map(|(k, v)| json!({ "key": k, "value": v }))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn parses_call_message_sent() {
        let e = event(
            CALL_MESSAGE_SENT,
            &[("from", "archway1abc"), ("to", "0x1.icon"), ("sn", "42")],
        );
        match parse_event(&chain(), "A1B2", &e).unwrap().unwrap() {
            XCallEvent::CallMessageSent { sn, ctx } => {
                assert_eq!(sn, 42);
                assert_eq!(ctx.chain_id, chain());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_call_message_with_req_id_and_data() {
        let e = event(
            CALL_MESSAGE,
            &[
                ("from", "0x1.icon/cx17cb"),
                ("to", "archway1abc"),
                ("sn", "42"),
                ("reqId", "7"),
                ("data", "cafe"),
            ],
        );
        match parse_event(&chain(), "A1B2", &e).unwrap().unwrap() {
            XCallEvent::CallMessage { sn, req_id, data, .. } => {
                assert_eq!(sn, 42);
                assert_eq!(req_id, 7);
                assert_eq!(data, vec![0xca, 0xfe]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn call_executed_success_follows_code() {
        for (code, success) in [("1", true), ("0", false), ("-1", false)] {
            let e = event(CALL_EXECUTED, &[("reqId", "7"), ("code", code), ("msg", "")]);
            match parse_event(&chain(), "A1B2", &e).unwrap().unwrap() {
                XCallEvent::CallExecuted { success: s, .. } => assert_eq!(s, success),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn non_wasm_events_are_skipped() {
        let e = json!({ "type": "transfer", "attributes": [] });
        assert!(parse_event(&chain(), "A1B2", &e).unwrap().is_none());

        let e = event("UnknownThing", &[("sn", "1")]);
        assert!(parse_event(&chain(), "A1B2", &e).unwrap().is_none());
    }

    #[test]
    fn missing_attribute_is_malformed() {
        let e = event(ROLLBACK_EXECUTED, &[("somethingElse", "42")]);
        assert!(matches!(
            parse_event(&chain(), "A1B2", &e),
            Err(XCallError::MalformedEvent(_))
        ));
    }
}
