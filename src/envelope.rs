//! Uniform cross-chain envelope: network-qualified addresses and the
//! opaque method payload carried inside an xCall message.
//!
//! Payloads are encoded either as JSON-then-bytes or as an RLP tuple,
//! selected by the destination chain's calldata convention.

use std::fmt;
use std::str::FromStr;

use rlp::{Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::error::XCallError;
use crate::types::{ChainFamily, ChainId};

/// A network-qualified address, `"<chainId>/<nativeAddress>"`. Used as the
/// destination field inside payloads and as the correlation key for
/// incoming calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    pub chain_id: ChainId,
    pub address: String,
}

impl NetworkAddress {
    pub fn new(chain_id: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: address.into(),
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.address)
    }
}

impl FromStr for NetworkAddress {
    type Err = XCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chain, address) = s.split_once('/').ok_or_else(|| {
            XCallError::Serialization(format!("network address without '/': {s}"))
        })?;
        if chain.is_empty() || address.is_empty() {
            return Err(XCallError::Serialization(format!(
                "incomplete network address: {s}"
            )));
        }
        Ok(Self {
            chain_id: ChainId::from(chain),
            address: address.to_string(),
        })
    }
}

/// One positional parameter of a cross-chain method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadParam {
    Str(String),
    Uint(u128),
    Bytes(Vec<u8>),
}

/// Method name plus positional parameters, the opaque payload relayed to
/// the destination contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPayload {
    pub method: String,
    pub params: Vec<PayloadParam>,
}

impl CallPayload {
    pub fn new(method: impl Into<String>, params: Vec<PayloadParam>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

const PARAM_TAG_STR: u8 = 0;
const PARAM_TAG_UINT: u8 = 1;
const PARAM_TAG_BYTES: u8 = 2;

/// Byte encoding of a [`CallPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    /// JSON-stringified then byte-encoded.
    JsonBytes,
    /// RLP-encoded tuple `[method, [[tag, value], ...]]`.
    Rlp,
}

impl PayloadCodec {
    /// Codec the destination family's calldata convention expects.
    pub fn for_family(family: ChainFamily) -> Self {
        match family {
            ChainFamily::Evm => PayloadCodec::Rlp,
            ChainFamily::Icon | ChainFamily::Cosmos => PayloadCodec::JsonBytes,
        }
    }

    pub fn encode(&self, payload: &CallPayload) -> Result<Vec<u8>, XCallError> {
        match self {
            PayloadCodec::JsonBytes => Ok(serde_json::to_vec(payload)?),
            PayloadCodec::Rlp => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&payload.method);
                stream.begin_list(payload.params.len());
                for param in &payload.params {
                    stream.begin_list(2);
                    match param {
                        PayloadParam::Str(s) => {
                            stream.append(&PARAM_TAG_STR);
                            stream.append(&s.as_bytes().to_vec());
                        }
                        PayloadParam::Uint(n) => {
                            stream.append(&PARAM_TAG_UINT);
                            stream.append(&uint_to_minimal_be(*n));
                        }
                        PayloadParam::Bytes(b) => {
                            stream.append(&PARAM_TAG_BYTES);
                            stream.append(&b.clone());
                        }
                    }
                }
                Ok(stream.out().to_vec())
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<CallPayload, XCallError> {
        match self {
            PayloadCodec::JsonBytes => Ok(serde_json::from_slice(bytes)?),
            PayloadCodec::Rlp => {
                let rlp = Rlp::new(bytes);
                let method: String = rlp.val_at(0)?;
                let params_rlp = rlp.at(1)?;
                let mut params = Vec::with_capacity(params_rlp.item_count()?);
                for item in params_rlp.iter() {
                    let tag: u8 = item.val_at(0)?;
                    let value: Vec<u8> = item.val_at(1)?;
                    let param = match tag {
                        PARAM_TAG_STR => PayloadParam::Str(
                            String::from_utf8(value).map_err(|e| {
                                XCallError::Serialization(format!("non-utf8 str param: {e}"))
                            })?,
                        ),
                        PARAM_TAG_UINT => PayloadParam::Uint(uint_from_minimal_be(&value)?),
                        PARAM_TAG_BYTES => PayloadParam::Bytes(value),
                        other => {
                            return Err(XCallError::Serialization(format!(
                                "unknown payload param tag: {other}"
                            )))
                        }
                    };
                    params.push(param);
                }
                Ok(CallPayload { method, params })
            }
        }
    }
}

/// Builds the cross-chain payload (and the rollback payload, for
/// operations that send a rollback-capable envelope) for an operation
/// descriptor. Validation failures here abort before anything reaches a
/// signer.
pub fn build_operation_payload(
    input: &crate::types::XTransactionInput,
) -> Result<(CallPayload, Option<CallPayload>), XCallError> {
    use crate::types::OpType;

    if input.input_amount == 0 {
        return Err(XCallError::Configuration(
            "operation amount must be non-zero".to_string(),
        ));
    }

    let recipient = NetworkAddress::new(input.dest_chain.clone(), input.recipient.clone());
    let method = input.op.method();

    let payload = match input.op {
        OpType::Transfer => {
            let token = require_token(input)?;
            CallPayload::new(
                method,
                vec![
                    PayloadParam::Str(token),
                    PayloadParam::Uint(input.input_amount),
                    PayloadParam::Str(recipient.to_string()),
                ],
            )
        }
        OpType::Swap => {
            let token = require_token(input)?;
            let trade = input.execution_trade.as_ref().ok_or_else(|| {
                XCallError::Configuration("swap without an execution trade".to_string())
            })?;
            let mut params = vec![
                PayloadParam::Str(token),
                PayloadParam::Uint(input.input_amount),
                PayloadParam::Str(recipient.to_string()),
                PayloadParam::Uint(trade.minimum_receive),
            ];
            params.extend(trade.path.iter().cloned().map(PayloadParam::Str));
            CallPayload::new(method, params)
        }
        OpType::DepositCollateral
        | OpType::WithdrawCollateral
        | OpType::Borrow
        | OpType::Repay => CallPayload::new(
            method,
            vec![
                PayloadParam::Uint(input.input_amount),
                PayloadParam::Str(recipient.to_string()),
            ],
        ),
    };

    let rollback = input.op.requires_rollback().then(|| {
        CallPayload::new(
            format!("{method}Rollback"),
            vec![PayloadParam::Uint(input.input_amount)],
        )
    });

    Ok((payload, rollback))
}

fn require_token(input: &crate::types::XTransactionInput) -> Result<String, XCallError> {
    input.token.clone().ok_or_else(|| {
        XCallError::Configuration(format!(
            "{:?} operation without a token address",
            input.op
        ))
    })
}

fn uint_to_minimal_be(n: u128) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

fn uint_from_minimal_be(bytes: &[u8]) -> Result<u128, XCallError> {
    if bytes.len() > 16 {
        return Err(XCallError::Serialization(format!(
            "uint param wider than 128 bits: {} bytes",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(u128::from_be_bytes(buf))
}
