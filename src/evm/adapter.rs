//! EVM chain adapter: read-only scanning plus wallet submission through
//! an ethers signer.

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;
use tracing::{debug, info, warn};

use crate::chainadapter::{ChainAdapter, WalletAdapter};
use crate::envelope::{build_operation_payload, NetworkAddress, PayloadCodec};
use crate::error::XCallError;
use crate::event::XCallEvent;
use crate::evm::clients::RpcClient;
use crate::evm::events::parse_log;
use crate::evm::types::parse_address;
use crate::types::{
    Block, BlockRange, ChainConfig, ChainId, FeeQuote, RawEventLog, Transaction, TxStatus,
    XTransactionInput,
};

pub struct EvmAdapter {
    config: ChainConfig,
    client: RpcClient,
    xcall: Address,
    signer: Option<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl EvmAdapter {
    /// Read-only adapter for an EVM chain.
    pub fn new(config: ChainConfig) -> Result<Self, XCallError> {
        let client = RpcClient::new(&config.rpc_url)?;
        let xcall = parse_address(&config.xcall_address)?;
        Ok(Self {
            config,
            client,
            xcall,
            signer: None,
        })
    }

    /// Wallet-capable adapter; requires a signing key and the numeric
    /// chain id in the configuration.
    pub fn with_signer(config: ChainConfig) -> Result<Self, XCallError> {
        let mut adapter = Self::new(config)?;
        let key = adapter.config.private_key.as_deref().ok_or_else(|| {
            XCallError::Configuration("EVM wallet adapter without a signing key".to_string())
        })?;
        let numeric_id = adapter.config.evm_chain_id.ok_or_else(|| {
            XCallError::Configuration("EVM wallet adapter without a numeric chain id".to_string())
        })?;
        let wallet = key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| XCallError::Configuration(format!("invalid signing key: {e}")))?
            .with_chain_id(numeric_id);

        let provider = (*adapter.client.provider()).clone();
        adapter.signer = Some(SignerMiddleware::new(provider, wallet));
        info!(chain_id = %adapter.config.chain_id, "EVM wallet adapter ready");
        Ok(adapter)
    }

    async fn query_fee(&self, dest: &ChainId, rollback: bool) -> Result<u128, XCallError> {
        let calldata = get_fee_calldata(dest.as_str(), rollback);
        let tx: TypedTransaction =
            TransactionRequest::new().to(self.xcall).data(calldata).into();
        let provider = self.client.provider();
        let out = self
            .client
            .execute(|| {
                let provider = provider.clone();
                let tx = tx.clone();
                async move { provider.call(&tx, None).await }
            })
            .await?;
        let tokens = abi::decode(&[ParamType::Uint(256)], &out)
            .map_err(|e| XCallError::Serialization(format!("getFee return: {e}")))?;
        match &tokens[0] {
            Token::Uint(value) => u128::try_from(*value)
                .map_err(|_| XCallError::Serialization("fee exceeds 128 bits".to_string())),
            other => Err(XCallError::Serialization(format!(
                "getFee returned {other:?}"
            ))),
        }
    }

    /// Submits exactly one transaction through the signer.
    async fn submit(
        &self,
        to: Address,
        calldata: Vec<u8>,
        value: Option<U256>,
    ) -> Result<String, XCallError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            XCallError::Configuration("wallet operation on a read-only adapter".to_string())
        })?;

        let mut tx = TransactionRequest::new().to(to).data(calldata);
        if let Some(value) = value {
            tx = tx.value(value);
        }
        let pending = signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| XCallError::TransientRpc(e.to_string()))?;
        Ok(format!("{:?}", *pending))
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn scan_block_count(&self) -> u64 {
        self.config.scan_block_count()
    }

    async fn xcall_fee(&self, dest: &ChainId, _rollback: bool) -> Result<FeeQuote, XCallError> {
        // Both amounts are fetched so the quote can be attached to an
        // operation descriptor directly.
        Ok(FeeQuote {
            rollback: self.query_fee(dest, true).await?,
            no_rollback: self.query_fee(dest, false).await?,
        })
    }

    async fn block_height(&self) -> Result<u64, XCallError> {
        let provider = self.client.provider();
        let number = self
            .client
            .execute(|| {
                let provider = provider.clone();
                async move { provider.get_block_number().await }
            })
            .await?;
        Ok(number.as_u64())
    }

    async fn block(&self, height: u64) -> Result<Block, XCallError> {
        let provider = self.client.provider();
        let block = self
            .client
            .execute(|| {
                let provider = provider.clone();
                async move { provider.get_block(height).await }
            })
            .await?
            .ok_or_else(|| XCallError::IndexerLag(format!("block {height} not available")))?;

        Ok(Block {
            height,
            hash: block.hash.map(|h| format!("{h:?}")).unwrap_or_default(),
            tx_hashes: block
                .transactions
                .iter()
                .map(|h| format!("{h:?}"))
                .collect(),
        })
    }

    async fn tx_receipt(&self, hash: &str) -> Result<Transaction, XCallError> {
        let tx_hash: H256 = hash
            .parse()
            .map_err(|e| XCallError::Serialization(format!("invalid tx hash {hash}: {e}")))?;
        let provider = self.client.provider();
        let receipt = self
            .client
            .execute(|| {
                let provider = provider.clone();
                async move { provider.get_transaction_receipt(tx_hash).await }
            })
            .await?;

        let receipt = match receipt {
            Some(receipt) => receipt,
            None => return Ok(Transaction::pending(hash)),
        };

        let status = if receipt.status == Some(U64::one()) {
            TxStatus::Success
        } else {
            TxStatus::Failure
        };
        let event_logs = receipt
            .logs
            .iter()
            .map(|log| RawEventLog {
                chain_id: self.config.chain_id.clone(),
                tx_hash: hash.to_string(),
                payload: serde_json::to_value(log).unwrap_or_default(),
            })
            .collect();

        Ok(Transaction {
            hash: hash.to_string(),
            status,
            block_height: receipt.block_number.map(|n| n.as_u64()),
            event_logs,
            raw: serde_json::to_value(&receipt)?,
        })
    }

    fn derive_tx_status(&self, tx: &Transaction) -> TxStatus {
        match tx.raw.get("status").and_then(|s| s.as_str()) {
            Some("0x1") => TxStatus::Success,
            Some("0x0") => TxStatus::Failure,
            _ => TxStatus::Pending,
        }
    }

    async fn event_logs(&self, range: BlockRange) -> Result<Vec<RawEventLog>, XCallError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        debug!(start = range.start, end = range.end, "fetching xCall logs");
        let filter = Filter::new()
            .address(self.xcall)
            .from_block(range.start)
            .to_block(range.end);
        let provider = self.client.provider();
        let logs = self
            .client
            .execute(|| {
                let provider = provider.clone();
                let filter = filter.clone();
                async move { provider.get_logs(&filter).await }
            })
            .await?;

        Ok(logs
            .into_iter()
            .map(|log| RawEventLog {
                chain_id: self.config.chain_id.clone(),
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("{h:?}"))
                    .unwrap_or_default(),
                payload: serde_json::to_value(&log).unwrap_or_default(),
            })
            .collect())
    }

    fn parse_event_logs(&self, logs: &[RawEventLog]) -> Vec<XCallEvent> {
        let mut events = Vec::new();
        for raw in logs {
            let log: Log = match serde_json::from_value(raw.payload.clone()) {
                Ok(log) => log,
                Err(e) => {
                    warn!(tx_hash = %raw.tx_hash, error = %e, "skipping undecodable EVM log");
                    continue;
                }
            };
            match parse_log(&self.config.chain_id, &log) {
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
impl WalletAdapter for EvmAdapter {
    async fn approve(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<Option<String>, XCallError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            XCallError::Configuration("approve on a read-only adapter".to_string())
        })?;
        if parse_address(owner)? != signer.address() {
            return Err(XCallError::Configuration(
                "approval owner differs from the connected wallet".to_string(),
            ));
        }
        let token = parse_address(token)?;
        let spender = parse_address(spender)?;
        let hash = self
            .submit(token, approve_calldata(spender, amount), None)
            .await?;
        Ok(Some(hash))
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
        let signer = self.signer.as_ref().ok_or_else(|| {
            XCallError::Configuration("executeTransaction on a read-only adapter".to_string())
        })?;

        let (payload, rollback) = build_operation_payload(input)?;
        let codec = PayloadCodec::for_family(input.dest_family);
        let data = codec.encode(&payload)?;
        let rollback_data = rollback.map(|p| codec.encode(&p)).transpose()?;
        let has_rollback = rollback_data.is_some();

        let fee = input.fee_quote.amount_for(has_rollback);
        if fee > 0 {
            let balance = signer
                .get_balance(signer.address(), None)
                .await
                .map_err(|e| XCallError::TransientRpc(e.to_string()))?;
            if balance < U256::from(fee) {
                return Err(XCallError::InsufficientFee(format!(
                    "wallet balance {balance} below required fee {fee}"
                )));
            }
        }

        let to = NetworkAddress::new(input.dest_chain.clone(), input.recipient.clone());
        let calldata = send_call_message_calldata(
            &to.to_string(),
            data,
            rollback_data.unwrap_or_default(),
            &input.sources,
            &input.destinations,
        );
        let value = (fee > 0).then(|| U256::from(fee));

        let hash = self.submit(self.xcall, calldata, value).await?;
        info!(op = ?input.op, dest = %input.dest_chain, %hash, "submitted cross-chain call");
        Ok(Some(hash))
    }

    async fn execute_call(&self, req_id: u128, data: &[u8]) -> Result<String, XCallError> {
        self.submit(self.xcall, execute_call_calldata(req_id, data), None)
            .await
    }

    async fn execute_rollback(&self, sn: u128) -> Result<String, XCallError> {
        self.submit(self.xcall, execute_rollback_calldata(sn), None)
            .await
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut calldata = selector(signature).to_vec();
    calldata.extend(abi::encode(tokens));
    calldata
}

fn send_call_message_calldata(
    to: &str,
    data: Vec<u8>,
    rollback: Vec<u8>,
    sources: &[String],
    destinations: &[String],
) -> Vec<u8> {
    encode_call(
        "sendCallMessage(string,bytes,bytes,string[],string[])",
        &[
            Token::String(to.to_string()),
            Token::Bytes(data),
            Token::Bytes(rollback),
            Token::Array(
                sources
                    .iter()
                    .map(|s| Token::String(s.clone()))
                    .collect(),
            ),
            Token::Array(
                destinations
                    .iter()
                    .map(|s| Token::String(s.clone()))
                    .collect(),
            ),
        ],
    )
}

fn execute_call_calldata(req_id: u128, data: &[u8]) -> Vec<u8> {
    encode_call(
        "executeCall(uint256,bytes)",
        &[
            Token::Uint(U256::from(req_id)),
            Token::Bytes(data.to_vec()),
        ],
    )
}

fn execute_rollback_calldata(sn: u128) -> Vec<u8> {
    encode_call("executeRollback(uint256)", &[Token::Uint(U256::from(sn))])
}

fn approve_calldata(spender: Address, amount: u128) -> Vec<u8> {
    encode_call(
        "approve(address,uint256)",
        &[Token::Address(spender), Token::Uint(U256::from(amount))],
    )
}

fn get_fee_calldata(dest: &str, rollback: bool) -> Vec<u8> {
    encode_call(
        "getFee(string,bool)",
        &[Token::String(dest.to_string()), Token::Bool(rollback)],
    )
}
