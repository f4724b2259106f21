//! Chain RPC client: JSON-RPC 2.0 over HTTPS POST.
//!
//! One request per call, short connect/read timeouts, no batching. Endpoint
//! errors are surfaced verbatim inside [`RpcError::Endpoint`].

pub mod abi;
pub mod retry;
pub mod signer;
pub mod units;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::{
    AppError, BlockSelector, CallRequest, ChainClient, RpcBlock, RpcError, RpcLog, RpcReceipt,
    RpcTransaction,
};
use units::{hex_to_number, hex_to_u256, number_to_hex};

pub use abi::{FunctionRegistry, FunctionSpec};
pub use signer::{sign_legacy_transaction, signer_address, LegacyTxParams};

/// Transport configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    /// TLS verification is off by default; the endpoint set is operator
    /// controlled.
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// HTTP JSON-RPC chain client.
pub struct HttpChainClient {
    http_client: Client,
    rpc_url: String,
}

impl HttpChainClient {
    pub fn new(rpc_url: &str, config: HttpClientConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn with_defaults(rpc_url: &str) -> Result<Self, AppError> {
        Self::new(rpc_url, HttpClientConfig::default())
    }

    async fn rpc_call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        debug!(method, "rpc request");
        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let result = extract_result(&body)?;
        serde_json::from_value(result).map_err(|e| RpcError::UnexpectedResult(e.to_string()).into())
    }
}

/// Pull the `result` member out of a JSON-RPC response body, surfacing the
/// `error` member verbatim when present.
fn extract_result(body: &str) -> Result<serde_json::Value, AppError> {
    if body.trim().is_empty() {
        return Err(RpcError::EmptyResponse.into());
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| RpcError::EmptyResponse)?;

    if let Some(error) = value.get("error") {
        return Err(RpcError::Endpoint(error.to_string()).into());
    }

    match value.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(RpcError::EmptyResponse.into()),
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    #[instrument(skip(self))]
    async fn block_number(&self) -> Result<u64, AppError> {
        let hex: String = self.rpc_call("eth_blockNumber", json!([])).await?;
        hex_to_number(&hex)
    }

    #[instrument(skip(self))]
    async fn block(
        &self,
        selector: BlockSelector,
        full: bool,
    ) -> Result<Option<RpcBlock>, AppError> {
        let (method, id) = match selector {
            BlockSelector::Number(n) => ("eth_getBlockByNumber", number_to_hex(n)),
            BlockSelector::Latest => ("eth_getBlockByNumber", "latest".to_string()),
            BlockSelector::Earliest => ("eth_getBlockByNumber", "earliest".to_string()),
            BlockSelector::Pending => ("eth_getBlockByNumber", "pending".to_string()),
            BlockSelector::Hash(hash) => ("eth_getBlockByHash", hash),
        };
        self.rpc_call(method, json!([id, full])).await
    }

    #[instrument(skip(self))]
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, AppError> {
        self.rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    #[instrument(skip(self))]
    async fn transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<RpcTransaction>, AppError> {
        self.rpc_call("eth_getTransactionByHash", json!([tx_hash]))
            .await
    }

    #[instrument(skip(self))]
    async fn gas_price(&self) -> Result<alloy::primitives::U256, AppError> {
        let hex: String = self.rpc_call("eth_gasPrice", json!([])).await?;
        hex_to_u256(&hex)
    }

    #[instrument(skip(self))]
    async fn transaction_count(&self, address: &str) -> Result<u64, AppError> {
        let hex: String = self
            .rpc_call("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        hex_to_number(&hex)
    }

    #[instrument(skip(self, call))]
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, AppError> {
        let hex: String = self.rpc_call("eth_estimateGas", json!([call])).await?;
        hex_to_number(&hex)
    }

    #[instrument(skip(self, raw))]
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, AppError> {
        let payload = format!("0x{}", alloy::hex::encode(raw));
        self.rpc_call("eth_sendRawTransaction", json!([payload]))
            .await
    }

    #[instrument(skip(self, call))]
    async fn call(&self, call: &CallRequest) -> Result<String, AppError> {
        self.rpc_call("eth_call", json!([call, "latest"])).await
    }

    #[instrument(skip(self, topics, addresses))]
    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: Vec<String>,
        addresses: Vec<String>,
    ) -> Result<Vec<RpcLog>, AppError> {
        let filter = json!([{
            "fromBlock": number_to_hex(from_block),
            "toBlock": number_to_hex(to_block),
            "topics": [topics],
            "address": addresses,
        }]);
        self.rpc_call("eth_getLogs", filter).await
    }
}
