//! JSON-RPC v3 client for ICON-like nodes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::warn;

use crate::error::XCallError;
use crate::icon::types::{MAX_RETRY_ATTEMPTS, RETRY_BASE_DELAY};

// Node-side codes for a hash the chain knows about but has not finished
// indexing. Distinct from a transport failure: the receipt simply is not
// there yet.
const CODE_PENDING: i64 = -31002;
const CODE_EXECUTING: i64 = -31003;
const CODE_NOT_FOUND: i64 = -31004;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

pub struct IconClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl IconClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// One JSON-RPC call with bounded retries on transport failures.
    /// Node-reported errors are not retried; they are deterministic.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<RpcResponse, XCallError> {
        let mut body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
        });
        if let Some(params) = params {
            body["params"] = params;
        }

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self.http.post(&self.endpoint).json(&body).send().await {
                Ok(response) => return Ok(response.json().await?),
                Err(e) => {
                    warn!(attempt = attempt + 1, %method, error = %e, "JSON-RPC call failed");
                    last_error = Some(e);
                    if attempt + 1 < MAX_RETRY_ATTEMPTS {
                        sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                    }
                }
            }
        }
        Err(last_error
            .map(XCallError::from)
            .unwrap_or_else(|| XCallError::TransientRpc("rpc retries exhausted".to_string())))
    }

    async fn call_result(&self, method: &str, params: Option<Value>) -> Result<Value, XCallError> {
        let response = self.call(method, params).await?;
        if let Some(error) = response.error {
            return Err(XCallError::TransientRpc(format!(
                "{method} failed: {} ({})",
                error.message, error.code
            )));
        }
        response
            .result
            .ok_or_else(|| XCallError::TransientRpc(format!("{method} returned no result")))
    }

    pub async fn last_block(&self) -> Result<Value, XCallError> {
        self.call_result("icx_getLastBlock", None).await
    }

    pub async fn block_by_height(&self, height: u64) -> Result<Value, XCallError> {
        self.call_result(
            "icx_getBlockByHeight",
            Some(json!({ "height": format!("0x{height:x}") })),
        )
        .await
    }

    /// `None` while the node has not finalized the transaction yet.
    pub async fn transaction_result(&self, hash: &str) -> Result<Option<Value>, XCallError> {
        let response = self
            .call("icx_getTransactionResult", Some(json!({ "txHash": hash })))
            .await?;
        match response.error {
            Some(error)
                if matches!(error.code, CODE_PENDING | CODE_EXECUTING | CODE_NOT_FOUND) =>
            {
                Ok(None)
            }
            Some(error) => Err(XCallError::TransientRpc(format!(
                "icx_getTransactionResult failed: {} ({})",
                error.message, error.code
            ))),
            None => Ok(response.result),
        }
    }

    /// Read-only contract call (`icx_call`).
    pub async fn icx_call(&self, to: &str, data: Value) -> Result<Value, XCallError> {
        self.call_result(
            "icx_call",
            Some(json!({
                "to": to,
                "dataType": "call",
                "data": data,
            })),
        )
        .await
    }
}
