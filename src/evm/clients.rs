//! RPC client wrapper with retry and rate limiting for EVM providers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::prelude::*;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::error::XCallError;
use crate::evm::types::{
    DEFAULT_RPC_TIMEOUT, MAX_RETRY_ATTEMPTS, MIN_CALL_INTERVAL, RETRY_BASE_DELAY,
};

/// Thin wrapper over an ethers HTTP provider adding bounded retries and
/// call spacing, shared by the read and write paths of [`super::EvmAdapter`].
#[derive(Debug)]
pub struct RpcClient {
    provider: Arc<Provider<Http>>,
    min_call_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RpcClient {
    pub fn new(rpc_url: &str) -> Result<Self, XCallError> {
        let url = reqwest::Url::parse(rpc_url)
            .map_err(|e| XCallError::Configuration(format!("invalid RPC URL {rpc_url}: {e}")))?;
        let http = Http::new_with_client(
            url,
            reqwest::Client::builder()
                .timeout(DEFAULT_RPC_TIMEOUT)
                .build()
                .map_err(|e| XCallError::Configuration(format!("http client: {e}")))?,
        );
        let provider = Provider::new(http).interval(Duration::from_millis(50));

        Ok(Self {
            provider: Arc::new(provider),
            min_call_interval: MIN_CALL_INTERVAL,
            last_call: Mutex::new(None),
        })
    }

    /// Executes an RPC call with bounded retries and rate limiting.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, XCallError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        self.enforce_rate_limit().await;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "RPC call failed");
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

    async fn enforce_rate_limit(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_call_interval {
                sleep(self.min_call_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }
}
