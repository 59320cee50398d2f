//! ICON chain adapter: JSON-RPC scanning plus detached-signer submission.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::chainadapter::{ChainAdapter, WalletAdapter};
use crate::envelope::{build_operation_payload, NetworkAddress, PayloadCodec};
use crate::error::XCallError;
use crate::event::XCallEvent;
use crate::icon::clients::IconClient;
use crate::icon::events::parse_event_log;
use crate::icon::types::{
    bytes_to_hex, hex_to_u128, hex_to_u64, nid_from_chain_id, to_hex, DEFAULT_STEP_LIMIT,
};
use crate::retry::{retry_until, RetryPolicy};
use crate::signer::{SignRequest, SigningServiceClient, TxSigner};
use crate::types::{
    Block, BlockRange, ChainConfig, ChainId, FeeQuote, RawEventLog, Transaction, TxStatus,
    XTransactionInput,
};

pub struct IconAdapter {
    config: ChainConfig,
    client: IconClient,
    signer: Option<Arc<dyn TxSigner>>,
}

impl IconAdapter {
    /// Read-only adapter for an ICON chain.
    pub fn new(config: ChainConfig) -> Result<Self, XCallError> {
        let client = IconClient::new(&config.rpc_url);
        Ok(Self {
            config,
            client,
            signer: None,
        })
    }

    /// Wallet-capable adapter submitting through the configured signing
    /// service.
    pub fn with_signer(config: ChainConfig) -> Result<Self, XCallError> {
        let endpoint = config.signing_endpoint.clone().ok_or_else(|| {
            XCallError::Configuration("ICON wallet adapter without a signing endpoint".to_string())
        })?;
        Self::with_tx_signer(config, Arc::new(SigningServiceClient::new(endpoint)))
    }

    /// Wallet-capable adapter with an explicit signer implementation.
    pub fn with_tx_signer(
        config: ChainConfig,
        signer: Arc<dyn TxSigner>,
    ) -> Result<Self, XCallError> {
        if config.wallet_address.is_none() {
            return Err(XCallError::Configuration(
                "ICON wallet adapter without a wallet address".to_string(),
            ));
        }
        let mut adapter = Self::new(config)?;
        adapter.signer = Some(signer);
        info!(chain_id = %adapter.config.chain_id, "ICON wallet adapter ready");
        Ok(adapter)
    }

    async fn query_fee(&self, dest: &ChainId, rollback: bool) -> Result<u128, XCallError> {
        let result = self
            .client
            .icx_call(
                &self.config.xcall_address,
                json!({
                    "method": "getFee",
                    "params": {
                        "_net": dest.as_str(),
                        "_rollback": if rollback { "0x1" } else { "0x0" },
                    }
                }),
            )
            .await?;
        let fee = result
            .as_str()
            .ok_or_else(|| XCallError::MalformedEvent(format!("getFee returned {result}")))?;
        hex_to_u128(fee)
    }

    /// Assembles an unsigned contract-call transaction. The `value` field
    /// is present only when coin must be attached; wallets treat an
    /// explicit zero differently from absence.
    fn unsigned_call_tx(
        &self,
        method: &str,
        params: Value,
        value: Option<u128>,
    ) -> Result<Value, XCallError> {
        let from = self.config.wallet_address.as_deref().ok_or_else(|| {
            XCallError::Configuration("wallet operation without a wallet address".to_string())
        })?;
        let mut tx = json!({
            "version": "0x3",
            "from": from,
            "to": self.config.xcall_address,
            "nid": nid_from_chain_id(self.config.chain_id.as_str()),
            "stepLimit": DEFAULT_STEP_LIMIT,
            "dataType": "call",
            "data": {
                "method": method,
                "params": params,
            },
        });
        if let Some(value) = value {
            tx["value"] = Value::String(to_hex(value));
        }
        Ok(tx)
    }

    /// Hands the unsigned transaction to the signer exactly once.
    async fn submit(&self, payload: Value) -> Result<String, XCallError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            XCallError::Configuration("wallet operation on a read-only adapter".to_string())
        })?;
        let sender = self
            .config
            .wallet_address
            .clone()
            .unwrap_or_default();
        signer
            .sign_and_broadcast(SignRequest {
                chain_id: self.config.chain_id.clone(),
                sender,
                payload,
            })
            .await
    }

    fn receipt_from_result(&self, hash: &str, result: Value) -> Result<Transaction, XCallError> {
        let status = match result.get("status").and_then(|s| s.as_str()) {
            Some("0x1") => TxStatus::Success,
            Some(_) => TxStatus::Failure,
            None => TxStatus::Pending,
        };
        let block_height = result
            .get("blockHeight")
            .and_then(|h| h.as_str())
            .map(hex_to_u64)
            .transpose()?;
        let event_logs = result
            .get("eventLogs")
            .and_then(|l| l.as_array())
            .map(|logs| {
                logs.iter()
                    .map(|log| RawEventLog {
                        chain_id: self.config.chain_id.clone(),
                        tx_hash: hash.to_string(),
                        payload: log.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Transaction {
            hash: hash.to_string(),
            status,
            block_height,
            event_logs,
            raw: result,
        })
    }
}

#[async_trait]
impl ChainAdapter for IconAdapter {
    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn scan_block_count(&self) -> u64 {
        self.config.scan_block_count()
    }

    async fn xcall_fee(&self, dest: &ChainId, _rollback: bool) -> Result<FeeQuote, XCallError> {
        Ok(FeeQuote {
            rollback: self.query_fee(dest, true).await?,
            no_rollback: self.query_fee(dest, false).await?,
        })
    }

    async fn block_height(&self) -> Result<u64, XCallError> {
        let block = self.client.last_block().await?;
        block
            .get("height")
            .and_then(|h| h.as_u64())
            .ok_or_else(|| XCallError::MalformedEvent("block without a height".to_string()))
    }

    async fn block(&self, height: u64) -> Result<Block, XCallError> {
        let block = self.client.block_by_height(height).await?;
        let tx_hashes = block
            .get("confirmed_transaction_list")
            .and_then(|l| l.as_array())
            .map(|txs| {
                txs.iter()
                    .filter_map(|tx| tx.get("txHash").and_then(|h| h.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Block {
            height,
            hash: block
                .get("block_hash")
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string(),
            tx_hashes,
        })
    }

    async fn tx_receipt(&self, hash: &str) -> Result<Transaction, XCallError> {
        match self.client.transaction_result(hash).await? {
            Some(result) => self.receipt_from_result(hash, result),
            None => Ok(Transaction::pending(hash)),
        }
    }

    fn derive_tx_status(&self, tx: &Transaction) -> TxStatus {
        match tx.raw.get("status").and_then(|s| s.as_str()) {
            Some("0x1") => TxStatus::Success,
            Some(_) => TxStatus::Failure,
            None => TxStatus::Pending,
        }
    }

    /// ICON has no ranged log query; each block's transactions are
    /// resolved individually and filtered to the xCall contract.
    async fn event_logs(&self, range: BlockRange) -> Result<Vec<RawEventLog>, XCallError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        for height in range.start..=range.end {
            let block = self.block(height).await?;
            for hash in &block.tx_hashes {
                // A finalized block's transactions must eventually resolve;
                // the result endpoint can trail finality, so an unindexed
                // hash is waited out with the bounded retry. The scan
                // cursor never revisits this height.
                let result = retry_until(&RetryPolicy::indexer(), || {
                    self.client.transaction_result(hash)
                })
                .await?;
                let receipt = self.receipt_from_result(hash, result)?;
                logs.extend(receipt.event_logs.into_iter().filter(|log| {
                    log.payload.get("scoreAddress").and_then(|a| a.as_str())
                        == Some(self.config.xcall_address.as_str())
                }));
            }
        }
        Ok(logs)
    }

    fn parse_event_logs(&self, logs: &[RawEventLog]) -> Vec<XCallEvent> {
        let mut events = Vec::new();
        for raw in logs {
            match parse_event_log(&self.config.chain_id, &raw.tx_hash, &raw.payload) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    warn!(tx_hash = %raw.tx_hash, error = %e, "skipping malformed xCall log");
                }
            }
        }
        events
    }
}

#[async_trait]
impl WalletAdapter for IconAdapter {
    /// IRC-2 transfers carry calldata directly; the deposit path has no
    /// allowance step.
    async fn approve(
        &self,
        _token: &str,
        _owner: &str,
        _spender: &str,
        _amount: u128,
    ) -> Result<Option<String>, XCallError> {
        Ok(None)
    }

    async fn execute_transaction(
        &self,
        input: &XTransactionInput,
    ) -> Result<Option<String>, XCallError> {
        if input.source_chain != self.config.chain_id {
            return Err(XCallError::ChainMismatch {
                expected: self.config.chain_id.clone(),
                actual: input.source_chain.clone(),
            });
        }

        let (payload, rollback) = build_operation_payload(input)?;
        let codec = PayloadCodec::for_family(input.dest_family);
        let data = codec.encode(&payload)?;
        let rollback_data = rollback.map(|p| codec.encode(&p)).transpose()?;
        let has_rollback = rollback_data.is_some();

        let to = NetworkAddress::new(input.dest_chain.clone(), input.recipient.clone());
        let mut params = json!({
            "_to": to.to_string(),
            "_data": bytes_to_hex(&data),
        });
        if let Some(rollback_data) = rollback_data {
            params["_rollback"] = Value::String(bytes_to_hex(&rollback_data));
        }
        if !input.sources.is_empty() {
            params["_sources"] = json!(input.sources);
        }
        if !input.destinations.is_empty() {
            params["_destinations"] = json!(input.destinations);
        }

        let fee = input.fee_quote.amount_for(has_rollback);
        let tx = self.unsigned_call_tx("sendCallMessage", params, (fee > 0).then_some(fee))?;

        let hash = self.submit(tx).await?;
        info!(op = ?input.op, dest = %input.dest_chain, %hash, "submitted cross-chain call");
        Ok(Some(hash))
    }

    async fn execute_call(&self, req_id: u128, data: &[u8]) -> Result<String, XCallError> {
        let tx = self.unsigned_call_tx(
            "executeCall",
            json!({ "_reqId": to_hex(req_id), "_data": bytes_to_hex(data) }),
            None,
        )?;
        self.submit(tx).await
    }

    async fn execute_rollback(&self, sn: u128) -> Result<String, XCallError> {
        let tx = self.unsigned_call_tx("executeRollback", json!({ "_sn": to_hex(sn) }), None)?;
        self.submit(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainFamily, OpType};
    use std::sync::Mutex;

    struct MockSigner {
        requests: Mutex<Vec<SignRequest>>,
    }

    impl MockSigner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TxSigner for MockSigner {
        async fn sign_and_broadcast(&self, request: SignRequest) -> Result<String, XCallError> {
            self.requests.lock().unwrap().push(request);
            Ok("0xdeadbeef".to_string())
        }
    }

    fn config() -> ChainConfig {
        ChainConfig::new(
            ChainId::from("0x1.icon"),
            ChainFamily::Icon,
            "https://rpc.example/api/v3",
            "cx17cb94b85ddfcc29ba2445c5b1db0eb06c4eadc4",
        )
        .with_wallet_address("hx9b79391cefc9a64dfda6446312ebb7717230df5b")
    }

    fn input(op: OpType, fee_quote: FeeQuote) -> XTransactionInput {
        XTransactionInput {
            op,
            source_chain: ChainId::from("0x1.icon"),
            dest_chain: ChainId::from("0xa4b1.arbitrum"),
            dest_family: ChainFamily::Evm,
            token: None,
            input_amount: 5_000,
            recipient: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string(),
            fee_quote,
            execution_trade: None,
            slippage_tolerance_bps: None,
            sources: vec![],
            destinations: vec![],
        }
    }

    fn wallet_adapter(signer: Arc<MockSigner>) -> IconAdapter {
        IconAdapter::with_tx_signer(config(), signer).unwrap()
    }

    #[tokio::test]
    async fn zero_fee_omits_the_value_field() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let quote = FeeQuote {
            rollback: 0,
            no_rollback: 0,
        };
        adapter
            .execute_transaction(&input(OpType::DepositCollateral, quote))
            .await
            .unwrap();

        let requests = signer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].payload.get("value").is_none());
    }

    #[tokio::test]
    async fn rollback_op_attaches_the_rollback_fee() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let quote = FeeQuote {
            rollback: 30,
            no_rollback: 10,
        };
        adapter
            .execute_transaction(&input(OpType::Borrow, quote))
            .await
            .unwrap();

        let requests = signer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let payload = &requests[0].payload;
        assert_eq!(payload["value"], "0x1e");
        assert!(payload["data"]["params"]["_rollback"].is_string());
    }

    #[tokio::test]
    async fn submits_exactly_one_transaction() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let quote = FeeQuote {
            rollback: 30,
            no_rollback: 10,
        };
        let hash = adapter
            .execute_transaction(&input(OpType::Repay, quote))
            .await
            .unwrap();

        assert_eq!(hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(signer.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_input_for_another_chain() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let mut bad = input(
            OpType::DepositCollateral,
            FeeQuote {
                rollback: 0,
                no_rollback: 0,
            },
        );
        bad.source_chain = ChainId::from("0x38.bsc");

        let result = adapter.execute_transaction(&bad).await;
        assert!(matches!(result, Err(XCallError::ChainMismatch { .. })));
        assert!(signer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_adapter_cannot_submit() {
        let adapter = IconAdapter::new(config()).unwrap();
        let result = adapter.execute_call(7, &[0xca]).await;
        assert!(matches!(result, Err(XCallError::Configuration(_))));
    }

    #[tokio::test]
    async fn deposit_path_needs_no_approval() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());
        let approval = adapter
            .approve("cxtoken", "hxowner", "cxspender", 100)
            .await
            .unwrap();
        assert!(approval.is_none());
        assert!(signer.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn wallet_construction_requires_an_address() {
        let mut config = config();
        config.wallet_address = None;
        assert!(IconAdapter::with_tx_signer(config, MockSigner::new()).is_err());
    }

    #[tokio::test]
    async fn execute_call_builds_the_manual_execution_tx() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        adapter.execute_call(7, &[0xca, 0xfe]).await.unwrap();

        let requests = signer.requests.lock().unwrap();
        let data = &requests[0].payload["data"];
        assert_eq!(data["method"], "executeCall");
        assert_eq!(data["params"]["_reqId"], "0x7");
        assert_eq!(data["params"]["_data"], "0xcafe");
    }
}
