//! EVM JSON-RPC client: a pluggable transport plus the typed calls the
//! script and the gateway need.

use crate::error::{BallotError, Result};
use crate::primitives::{
    decode_hex_prefixed, encode_hex_prefixed, parse_address, parse_quantity, parse_tx_hash, to_quantity,
    Address, TxHash,
};
use crate::tx::Eip1559Request;
use crate::wallet::LocalSigner;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_PRIORITY_FEE: u128 = 1_000_000_000;
const GAS_ESTIMATE_HEADROOM_PCT: u64 = 20;

/// Sends one JSON-RPC request and yields its `result`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `method` with positional `params`.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// HTTP transport over a shared `reqwest` client.
#[derive(Debug)]
pub struct HttpTransport {
    endpoint: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// A missing endpoint is only reported when a request is made.
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(BallotError::MissingConfig("RPC_ENDPOINT_URL"))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "rpc request");
        let resp = self.client.post(endpoint).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let parsed: JsonRpcResponse = serde_json::from_str(&text).map_err(|err| {
            BallotError::Transport(format!("{method}: http {status}, undecodable body: {err}"))
        })?;
        if let Some(err) = parsed.error {
            let message = match err.data {
                Some(data) => format!("{} ({data})", err.message),
                None => err.message,
            };
            return Err(BallotError::Rpc {
                code: err.code,
                message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

/// Parameters for `eth_call` / `eth_estimateGas`.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    /// Optional caller.
    pub from: Option<Address>,
    /// Target; `None` for creation estimates.
    pub to: Option<Address>,
    /// Calldata.
    pub data: Vec<u8>,
    /// Attached value in wei.
    pub value: u128,
}

impl CallRequest {
    fn to_json(&self) -> Value {
        let mut obj = json!({ "data": encode_hex_prefixed(&self.data) });
        if let Some(from) = &self.from {
            obj["from"] = Value::String(from.to_string());
        }
        if let Some(to) = &self.to {
            obj["to"] = Value::String(to.to_string());
        }
        if self.value > 0 {
            obj["value"] = Value::String(to_quantity(self.value));
        }
        obj
    }
}

/// Mined transaction receipt, reduced to the fields this crate reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction hash.
    pub transaction_hash: TxHash,
    /// Including block.
    pub block_number: u64,
    /// 1 on success, 0 on revert.
    pub status: u8,
    /// Address created by a deployment.
    pub contract_address: Option<Address>,
    /// Gas consumed.
    pub gas_used: u128,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
}

impl TryFrom<RawReceipt> for Receipt {
    type Error = BallotError;

    fn try_from(raw: RawReceipt) -> Result<Self> {
        Ok(Receipt {
            transaction_hash: parse_tx_hash(&raw.transaction_hash)?,
            block_number: quantity_u64(&raw.block_number)?,
            status: match raw.status.as_deref() {
                Some(s) => u8::try_from(parse_quantity(s)?)
                    .map_err(|_| BallotError::Abi(format!("bad receipt status {s}")))?,
                None => 1,
            },
            contract_address: raw
                .contract_address
                .as_deref()
                .map(parse_address)
                .transpose()?,
            gas_used: raw.gas_used.as_deref().map(parse_quantity).transpose()?.unwrap_or(0),
        })
    }
}

/// Typed JSON-RPC calls against one endpoint.
#[derive(Clone)]
pub struct ChainClient {
    transport: Arc<dyn Transport>,
    chain_id: Option<u64>,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl ChainClient {
    /// Wrap a transport with default polling (500 ms, unbounded).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            chain_id: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_polls: None,
        }
    }

    /// Client for an HTTP endpoint.
    pub fn http(endpoint: Option<String>) -> Self {
        Self::new(Arc::new(HttpTransport::new(endpoint)))
    }

    /// Pin the chain id used for signing instead of asking the node.
    pub fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Receipt polling cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up waiting for a receipt after `max_polls` attempts.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Raw request passthrough.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.transport.request(method, params).await
    }

    /// `eth_chainId`, unless pinned.
    pub async fn chain_id(&self) -> Result<u64> {
        if let Some(id) = self.chain_id {
            return Ok(id);
        }
        let value = self.request("eth_chainId", json!([])).await?;
        quantity_u64(expect_str(&value, "eth_chainId")?)
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        quantity_u64(expect_str(&value, "eth_blockNumber")?)
    }

    /// Next nonce for `address`, counting pending transactions.
    pub async fn transaction_count(&self, address: &Address) -> Result<u64> {
        let value = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        quantity_u64(expect_str(&value, "eth_getTransactionCount")?)
    }

    /// `(max_fee_per_gas, max_priority_fee_per_gas)` from the latest base fee.
    pub async fn fee_estimate(&self) -> Result<(u128, u128)> {
        let priority = match self.request("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(value) => parse_quantity(expect_str(&value, "eth_maxPriorityFeePerGas")?)?,
            Err(BallotError::Rpc { code: -32601, .. }) => DEFAULT_PRIORITY_FEE,
            Err(err) => return Err(err),
        };
        let block = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee = match block.get("baseFeePerGas").and_then(Value::as_str) {
            Some(raw) => parse_quantity(raw)?,
            None => {
                let value = self.request("eth_gasPrice", json!([])).await?;
                parse_quantity(expect_str(&value, "eth_gasPrice")?)?
            }
        };
        Ok((base_fee.saturating_mul(2).saturating_add(priority), priority))
    }

    /// `eth_estimateGas`.
    pub async fn estimate_gas(&self, call: &CallRequest) -> Result<u64> {
        let value = self.request("eth_estimateGas", json!([call.to_json()])).await?;
        quantity_u64(expect_str(&value, "eth_estimateGas")?)
    }

    /// `eth_call` at the latest block; returns raw return data.
    pub async fn call(&self, call: &CallRequest) -> Result<Vec<u8>> {
        let value = self
            .request("eth_call", json!([call.to_json(), "latest"]))
            .await?;
        decode_hex_prefixed(expect_str(&value, "eth_call")?)
    }

    /// `eth_sendRawTransaction`.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        let value = self
            .request("eth_sendRawTransaction", json!([encode_hex_prefixed(raw)]))
            .await?;
        parse_tx_hash(expect_str(&value, "eth_sendRawTransaction")?)
    }

    /// Fill nonce, gas and fees, sign, and broadcast. Does not wait.
    pub async fn send_transaction(
        &self,
        signer: &LocalSigner,
        to: Option<Address>,
        data: Vec<u8>,
    ) -> Result<TxHash> {
        let from = signer.address();
        let chain_id = self.chain_id().await?;
        let nonce = self.transaction_count(&from).await?;
        let estimate = self
            .estimate_gas(&CallRequest {
                from: Some(from),
                to,
                data: data.clone(),
                value: 0,
            })
            .await?;
        let gas_limit = estimate.saturating_add(estimate.saturating_mul(GAS_ESTIMATE_HEADROOM_PCT) / 100);
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fee_estimate().await?;
        let request = Eip1559Request {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            to,
            value: 0,
            input: data,
        };
        let raw = signer.sign_transaction(&request)?;
        let hash = self.send_raw_transaction(&raw).await?;
        debug!(%from, nonce, gas_limit, tx_hash = %hash, "transaction sent");
        Ok(hash)
    }

    /// `eth_getTransactionReceipt`; `None` while pending.
    pub async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>> {
        let value = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(value)
            .map_err(|err| BallotError::Abi(format!("malformed receipt: {err}")))?;
        Ok(Some(raw.try_into()?))
    }

    /// Block until the receipt is available. A reverted receipt is an error.
    pub async fn wait_for_receipt(&self, hash: &TxHash) -> Result<Receipt> {
        let mut polls = 0u32;
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                if receipt.status == 0 {
                    return Err(BallotError::TxFailed {
                        hash: hash.to_string(),
                    });
                }
                return Ok(receipt);
            }
            polls += 1;
            if self.max_polls.map(|max| polls >= max).unwrap_or(false) {
                return Err(BallotError::ReceiptTimeout {
                    hash: hash.to_string(),
                    polls,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn expect_str<'a>(value: &'a Value, method: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| BallotError::Abi(format!("{method} returned non-string result: {value}")))
}

fn quantity_u64(raw: &str) -> Result<u64> {
    u64::try_from(parse_quantity(raw)?)
        .map_err(|_| BallotError::Abi(format!("quantity {raw} overflows u64")))
}
