//! Detached transaction signing for chain families whose keys live
//! outside this process.
//!
//! ICON and CosmWasm wallet adapters build the complete unsigned
//! transaction, then hand it to a [`TxSigner`] exactly once. The default
//! implementation posts a sign-and-broadcast request to a signing
//! service; tests substitute a mock to observe submissions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::XCallError;
use crate::types::ChainId;

/// Request handed to the signing service: the fully built, unsigned
/// chain-native transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub chain_id: ChainId,
    pub sender: String,
    /// Family-shaped unsigned transaction body.
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Signs and broadcasts one transaction, returning its hash.
    async fn sign_and_broadcast(&self, request: SignRequest) -> Result<String, XCallError>;
}

/// [`TxSigner`] backed by an HTTP signing service.
pub struct SigningServiceClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SigningServiceClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TxSigner for SigningServiceClient {
    async fn sign_and_broadcast(&self, request: SignRequest) -> Result<String, XCallError> {
        let response: SignResponse = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.success {
            let reason = response.error.unwrap_or_else(|| "unspecified".to_string());
            // Wallet software reports an explicit cancellation distinctly;
            // it must abort silently rather than surface as a failure.
            if reason.contains("rejected") || reason.contains("cancelled") {
                return Err(XCallError::UserRejected);
            }
            return Err(XCallError::TransientRpc(format!(
                "signing service refused transaction: {reason}"
            )));
        }
        response.tx_hash.ok_or_else(|| {
            XCallError::TransientRpc("signing service returned success without a hash".to_string())
        })
    }
}
