//! Cosmos chain adapter: LCD scanning plus detached-signer submission of
//! CosmWasm execute messages.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::chainadapter::{ChainAdapter, WalletAdapter};
use crate::cosmos::clients::{search_until_indexed, CosmosClient};
use crate::cosmos::events::parse_event;
use crate::cosmos::types::{decimal_to_u128, Coin};
use crate::envelope::{build_operation_payload, NetworkAddress, PayloadCodec};
use crate::error::XCallError;
use crate::event::XCallEvent;
use crate::retry::RetryPolicy;
use crate::signer::{SignRequest, SigningServiceClient, TxSigner};
use crate::types::{
    Block, BlockRange, ChainConfig, ChainId, FeeQuote, RawEventLog, Transaction, TxStatus,
    XTransactionInput,
};

pub struct CosmosAdapter {
    config: ChainConfig,
    client: CosmosClient,
    signer: Option<Arc<dyn TxSigner>>,
}

impl CosmosAdapter {
    /// Read-only adapter for a CosmWasm chain.
    pub fn new(config: ChainConfig) -> Result<Self, XCallError> {
        let client = CosmosClient::new(&config.rpc_url);
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
            XCallError::Configuration(
                "Cosmos wallet adapter without a signing endpoint".to_string(),
            )
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
                "Cosmos wallet adapter without a wallet address".to_string(),
            ));
        }
        let mut adapter = Self::new(config)?;
        adapter.signer = Some(signer);
        info!(chain_id = %adapter.config.chain_id, "Cosmos wallet adapter ready");
        Ok(adapter)
    }

    async fn query_fee(&self, dest: &ChainId, rollback: bool) -> Result<u128, XCallError> {
        let data = self
            .client
            .smart_query(
                &self.config.xcall_address,
                &json!({ "get_fee": { "nid": dest.as_str(), "rollback": rollback } }),
            )
            .await?;
        match &data {
            Value::String(s) => decimal_to_u128(s),
            Value::Number(n) => n
                .as_u64()
                .map(u128::from)
                .ok_or_else(|| XCallError::MalformedEvent(format!("get_fee returned {n}"))),
            other => Err(XCallError::MalformedEvent(format!(
                "get_fee returned {other}"
            ))),
        }
    }

    /// Wraps a contract call into an unsigned `MsgExecuteContract`.
    fn execute_msg(&self, contract: &str, msg: Value, funds: Vec<Coin>) -> Result<Value, XCallError> {
        let sender = self.config.wallet_address.as_deref().ok_or_else(|| {
            XCallError::Configuration("wallet operation without a wallet address".to_string())
        })?;
        Ok(json!({
            "type": "wasm/MsgExecuteContract",
            "value": {
                "sender": sender,
                "contract": contract,
                "msg": msg,
                "funds": funds,
            }
        }))
    }

    /// Hands the unsigned message to the signer exactly once.
    async fn submit(&self, payload: Value) -> Result<String, XCallError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            XCallError::Configuration("wallet operation on a read-only adapter".to_string())
        })?;
        signer
            .sign_and_broadcast(SignRequest {
                chain_id: self.config.chain_id.clone(),
                sender: self.config.wallet_address.clone().unwrap_or_default(),
                payload,
            })
            .await
    }

    fn receipt_from_response(&self, hash: &str, tx_response: Value) -> Transaction {
        let status = match tx_response.get("code").and_then(|c| c.as_u64()) {
            Some(0) => TxStatus::Success,
            Some(_) => TxStatus::Failure,
            None => TxStatus::Pending,
        };
        let block_height = tx_response
            .get("height")
            .and_then(|h| h.as_str())
            .and_then(|h| h.parse::<u64>().ok());
        let event_logs = tx_response
            .get("events")
            .and_then(|e| e.as_array())
            .map(|events| {
                events
                    .iter()
                    .map(|event| RawEventLog {
                        chain_id: self.config.chain_id.clone(),
                        tx_hash: hash.to_string(),
                        payload: event.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Transaction {
            hash: hash.to_string(),
            status,
            block_height,
            event_logs,
            raw: tx_response,
        }
    }

    /// Contract events from other CosmWasm contracts share the `wasm-`
    /// namespace; only the xCall contract's own events count.
    fn is_from_xcall(&self, event: &Value) -> bool {
        event
            .get("attributes")
            .and_then(|attrs| attrs.as_array())
            .map(|attrs| {
                attrs.iter().any(|a| {
                    a.get("key").and_then(|k| k.as_str()) == Some("_contract_address")
                        && a.get("value").and_then(|v| v.as_str())
                            == Some(self.config.xcall_address.as_str())
                })
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChainAdapter for CosmosAdapter {
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
        let block = self.client.latest_block().await?;
        block
            .pointer("/block/header/height")
            .and_then(|h| h.as_str())
            .and_then(|h| h.parse::<u64>().ok())
            .ok_or_else(|| XCallError::MalformedEvent("block without a height".to_string()))
    }

    async fn block(&self, height: u64) -> Result<Block, XCallError> {
        let block = self.client.block(height).await?;
        Ok(Block {
            height,
            hash: block
                .pointer("/block_id/hash")
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string(),
            // LCD block responses carry raw tx bytes, not hashes.
            tx_hashes: Vec::new(),
        })
    }

    async fn tx_receipt(&self, hash: &str) -> Result<Transaction, XCallError> {
        match self.client.tx_by_hash(hash).await? {
            Some(response) => {
                let tx_response = response
                    .get("tx_response")
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(self.receipt_from_response(hash, tx_response))
            }
            None => Ok(Transaction::pending(hash)),
        }
    }

    fn derive_tx_status(&self, tx: &Transaction) -> TxStatus {
        match tx.raw.get("code").and_then(|c| c.as_u64()) {
            Some(0) => TxStatus::Success,
            Some(_) => TxStatus::Failure,
            None => TxStatus::Pending,
        }
    }

    async fn event_logs(&self, range: BlockRange) -> Result<Vec<RawEventLog>, XCallError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        for height in range.start..=range.end {
            // The scan cursor never revisits a height, so indexer lag is
            // absorbed here with the bounded retry rather than skipped.
            let responses = search_until_indexed(&RetryPolicy::indexer(), || {
                self.client.txs_at_height(height, &self.config.xcall_address)
            })
            .await?;
            for tx_response in responses {
                let hash = tx_response
                    .get("txhash")
                    .and_then(|h| h.as_str())
                    .unwrap_or_default()
                    .to_string();
                let events = tx_response
                    .get("events")
                    .and_then(|e| e.as_array())
                    .cloned()
                    .unwrap_or_default();
                logs.extend(
                    events
                        .into_iter()
                        .filter(|event| self.is_from_xcall(event))
                        .map(|event| RawEventLog {
                            chain_id: self.config.chain_id.clone(),
                            tx_hash: hash.clone(),
                            payload: event,
                        }),
                );
            }
        }
        Ok(logs)
    }

    fn parse_event_logs(&self, logs: &[RawEventLog]) -> Vec<XCallEvent> {
        let mut events = Vec::new();
        for raw in logs {
            match parse_event(&self.config.chain_id, &raw.tx_hash, &raw.payload) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    warn!(tx_hash = %raw.tx_hash, error = %e, "skipping malformed xCall event");
                }
            }
        }
        events
    }
}

#[async_trait]
impl WalletAdapter for CosmosAdapter {
    /// CW20 deposits go through an allowance on the token contract.
    async fn approve(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<Option<String>, XCallError> {
        if Some(owner) != self.config.wallet_address.as_deref() {
            return Err(XCallError::Configuration(
                "approval owner differs from the connected wallet".to_string(),
            ));
        }
        let msg = json!({
            "increase_allowance": {
                "spender": spender,
                "amount": amount.to_string(),
            }
        });
        let payload = self.execute_msg(token, msg, Vec::new())?;
        Ok(Some(self.submit(payload).await?))
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
        let mut msg = json!({
            "send_call_message": {
                "to": to.to_string(),
                "data": BASE64.encode(&data),
            }
        });
        if let Some(rollback_data) = rollback_data {
            msg["send_call_message"]["rollback"] = Value::String(BASE64.encode(&rollback_data));
        }
        if !input.sources.is_empty() {
            msg["send_call_message"]["sources"] = json!(input.sources);
        }
        if !input.destinations.is_empty() {
            msg["send_call_message"]["destinations"] = json!(input.destinations);
        }

        // A zero fee means no coin entry at all; wallets reject explicit
        // zero-amount funds.
        let fee = input.fee_quote.amount_for(has_rollback);
        let funds = if fee > 0 {
            let denom = self.config.fee_denom.as_deref().ok_or_else(|| {
                XCallError::Configuration("fee attachment without a fee denom".to_string())
            })?;
            vec![Coin::new(denom, fee)]
        } else {
            Vec::new()
        };

        let payload = self.execute_msg(&self.config.xcall_address, msg, funds)?;
        let hash = self.submit(payload).await?;
        info!(op = ?input.op, dest = %input.dest_chain, %hash, "submitted cross-chain call");
        Ok(Some(hash))
    }

    async fn execute_call(&self, req_id: u128, data: &[u8]) -> Result<String, XCallError> {
        let msg = json!({
            "execute_call": {
                "request_id": req_id.to_string(),
                "data": BASE64.encode(data),
            }
        });
        let payload = self.execute_msg(&self.config.xcall_address, msg, Vec::new())?;
        self.submit(payload).await
    }

    async fn execute_rollback(&self, sn: u128) -> Result<String, XCallError> {
        let msg = json!({ "execute_rollback": { "sequence_no": sn.to_string() } });
        let payload = self.execute_msg(&self.config.xcall_address, msg, Vec::new())?;
        self.submit(payload).await
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
            Ok("A1B2C3".to_string())
        }
    }

    fn config() -> ChainConfig {
        let mut config = ChainConfig::new(
            ChainId::from("archway-1"),
            ChainFamily::Cosmos,
            "https://lcd.example",
            "archway1xcallxcallxcallxcallxcallxcallxcall",
        )
        .with_wallet_address("archway1senderaddress");
        config.fee_denom = Some("aarch".to_string());
        config
    }

    fn input(op: OpType, fee_quote: FeeQuote) -> XTransactionInput {
        XTransactionInput {
            op,
            source_chain: ChainId::from("archway-1"),
            dest_chain: ChainId::from("0x1.icon"),
            dest_family: ChainFamily::Icon,
            token: None,
            input_amount: 2_500,
            recipient: "hx9b79391cefc9a64dfda6446312ebb7717230df5b".to_string(),
            fee_quote,
            execution_trade: None,
            slippage_tolerance_bps: None,
            sources: vec![],
            destinations: vec![],
        }
    }

    fn wallet_adapter(signer: Arc<MockSigner>) -> CosmosAdapter {
        CosmosAdapter::with_tx_signer(config(), signer).unwrap()
    }

    #[tokio::test]
    async fn zero_fee_sends_no_funds_entry() {
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
        assert_eq!(requests[0].payload["value"]["funds"], json!([]));
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
            .execute_transaction(&input(OpType::WithdrawCollateral, quote))
            .await
            .unwrap();

        let requests = signer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let value = &requests[0].payload["value"];
        assert_eq!(
            value["funds"],
            json!([{ "denom": "aarch", "amount": "30" }])
        );
        assert!(value["msg"]["send_call_message"]["rollback"].is_string());
    }

    #[tokio::test]
    async fn submits_exactly_one_transaction() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let hash = adapter
            .execute_transaction(&input(
                OpType::Transfer,
                FeeQuote {
                    rollback: 0,
                    no_rollback: 0,
                },
            ))
            .await;

        // Transfer needs a token.
        assert!(hash.is_err());
        assert!(signer.requests.lock().unwrap().is_empty());

        let mut transfer = input(
            OpType::Transfer,
            FeeQuote {
                rollback: 0,
                no_rollback: 0,
            },
        );
        transfer.token = Some("archway1tokenaddress".to_string());
        adapter.execute_transaction(&transfer).await.unwrap();
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
        bad.source_chain = ChainId::from("osmosis-1");

        let result = adapter.execute_transaction(&bad).await;
        assert!(matches!(result, Err(XCallError::ChainMismatch { .. })));
        assert!(signer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn approve_goes_through_the_token_contract() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let hash = adapter
            .approve(
                "archway1tokenaddress",
                "archway1senderaddress",
                "archway1assetmanager",
                500,
            )
            .await
            .unwrap();

        assert_eq!(hash.as_deref(), Some("A1B2C3"));
        let requests = signer.requests.lock().unwrap();
        let value = &requests[0].payload["value"];
        assert_eq!(value["contract"], "archway1tokenaddress");
        assert_eq!(
            value["msg"]["increase_allowance"],
            json!({ "spender": "archway1assetmanager", "amount": "500" })
        );
    }

    #[tokio::test]
    async fn approve_rejects_a_foreign_owner() {
        let signer = MockSigner::new();
        let adapter = wallet_adapter(signer.clone());

        let result = adapter
            .approve("archway1token", "archway1someoneelse", "archway1am", 1)
            .await;
        assert!(matches!(result, Err(XCallError::Configuration(_))));
        assert!(signer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_adapter_cannot_submit() {
        let adapter = CosmosAdapter::new(config()).unwrap();
        let result = adapter.execute_rollback(42).await;
        assert!(matches!(result, Err(XCallError::Configuration(_))));
    }

    #[test]
    fn xcall_events_are_filtered_by_contract() {
        let adapter = CosmosAdapter::new(config()).unwrap();
        let ours = json!({
            "type": "wasm-CallMessage",
            "attributes": [
                { "key": "_contract_address", "value": "archway1xcallxcallxcallxcallxcallxcallxcall" }
            ]
        });
        let theirs = json!({
            "type": "wasm-CallMessage",
            "attributes": [
                { "key": "_contract_address", "value": "archway1someothercontract" }
            ]
        });
        assert!(adapter.is_from_xcall(&ours));
        assert!(!adapter.is_from_xcall(&theirs));
    }
}
