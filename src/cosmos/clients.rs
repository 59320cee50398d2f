//! LCD (REST) client for Cosmos SDK nodes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::sleep;
use tracing::warn;

use crate::cosmos::types::{MAX_RETRY_ATTEMPTS, RETRY_BASE_DELAY};
use crate::error::XCallError;
use crate::retry::{retry_until, RetryPolicy};

const TX_PAGE_LIMIT: usize = 100;

pub struct CosmosClient {
    http: reqwest::Client,
    endpoint: String,
}

impl CosmosClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// One GET with bounded retries on transport failures. A 404 is a
    /// valid answer (resource not indexed yet), not an error.
    async fn get(&self, path: &str) -> Result<Option<Value>, XCallError> {
        let url = format!("{}{path}", self.endpoint);

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self.http.get(&url).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(response) => {
                    let response = response.error_for_status()?;
                    return Ok(Some(response.json().await?));
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, %url, error = %e, "LCD request failed");
                    last_error = Some(e);
                    if attempt + 1 < MAX_RETRY_ATTEMPTS {
                        sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                    }
                }
            }
        }
        Err(last_error
            .map(XCallError::from)
            .unwrap_or_else(|| XCallError::TransientRpc("lcd retries exhausted".to_string())))
    }

    async fn get_required(&self, path: &str) -> Result<Value, XCallError> {
        self.get(path)
            .await?
            .ok_or_else(|| XCallError::TransientRpc(format!("unexpected 404 for {path}")))
    }

    pub async fn latest_block(&self) -> Result<Value, XCallError> {
        self.get_required("/cosmos/base/tendermint/v1beta1/blocks/latest")
            .await
    }

    pub async fn block(&self, height: u64) -> Result<Value, XCallError> {
        self.get_required(&format!("/cosmos/base/tendermint/v1beta1/blocks/{height}"))
            .await
    }

    /// `None` while the node has not indexed the hash yet; tx indexing on
    /// Cosmos lags finality by design.
    pub async fn tx_by_hash(&self, hash: &str) -> Result<Option<Value>, XCallError> {
        self.get(&format!("/cosmos/tx/v1beta1/txs/{hash}")).await
    }

    /// Smart-contract query; the message is base64 inside the path.
    pub async fn smart_query(&self, contract: &str, query: &Value) -> Result<Value, XCallError> {
        let encoded = BASE64.encode(serde_json::to_vec(query)?);
        let response = self
            .get_required(&format!(
                "/cosmwasm/wasm/v1/contract/{contract}/smart/{encoded}"
            ))
            .await?;
        response
            .get("data")
            .cloned()
            .ok_or_else(|| XCallError::TransientRpc("smart query returned no data".to_string()))
    }

    /// All tx responses at one height emitted through `contract`,
    /// following pagination to the end.
    pub async fn txs_at_height(
        &self,
        height: u64,
        contract: &str,
    ) -> Result<Vec<Value>, XCallError> {
        let mut responses = Vec::new();
        let mut offset = 0usize;
        loop {
            let path = format!(
                "/cosmos/tx/v1beta1/txs?events=tx.height%3D{height}\
                 &events=wasm._contract_address%3D%27{contract}%27\
                 &pagination.offset={offset}&pagination.limit={TX_PAGE_LIMIT}"
            );
            let page = self.get_required(&path).await?;
            let batch: Vec<Value> = page
                .get("tx_responses")
                .and_then(|t| t.as_array())
                .cloned()
                .unwrap_or_default();
            let fetched = batch.len();
            responses.extend(batch);
            if fetched < TX_PAGE_LIMIT {
                return Ok(responses);
            }
            offset += fetched;
        }
    }
}

/// Drives an eventually-consistent tx search until it returns rows or
/// the lag bound is exhausted. Cosmos tx indexing trails block
/// production, so an empty first answer for a finalized height may just
/// mean the indexer has not caught up; a bound-exhausting run of empty
/// answers means the height really has no matching transactions.
pub(crate) async fn search_until_indexed<F, Fut>(
    policy: &RetryPolicy,
    mut search: F,
) -> Result<Vec<Value>, XCallError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Value>, XCallError>>,
{
    let result = retry_until(policy, || {
        let attempt = search();
        async move {
            let txs = attempt.await?;
            Ok(if txs.is_empty() { None } else { Some(txs) })
        }
    })
    .await;

    match result {
        Ok(txs) => Ok(txs),
        Err(XCallError::IndexerLag(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn search_returns_rows_once_the_indexer_catches_up() {
        let calls = AtomicU32::new(0);
        let rows = search_until_indexed(&fast(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 10 {
                    Ok(vec![])
                } else {
                    Ok(vec![json!({ "txhash": "A1B2" })])
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn exhausted_search_means_an_empty_height_not_a_failure() {
        let calls = AtomicU32::new(0);
        let rows = search_until_indexed(&fast(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(vec![]) }
        })
        .await
        .unwrap();

        assert!(rows.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn search_propagates_transport_failures() {
        let calls = AtomicU32::new(0);
        let result = search_until_indexed(&fast(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(XCallError::TransientRpc("boom".into())) }
        })
        .await;

        assert!(matches!(result, Err(XCallError::TransientRpc(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
