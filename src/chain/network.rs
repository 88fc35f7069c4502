//! Ethereum JSON-RPC client

use alloy_primitives::{Bytes, B256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::chain::receipt::{quantity, Log, LogFilter, RpcTransaction, TransactionReceipt};
use crate::config::ChainConfig;

/// Errors that can occur during network operations
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network request failed: {0}")]
    Request(String),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// Revert data or other error payload, hex-encoded when present
        data: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Chain id mismatch: expected {expected}, node reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// JSON-RPC client for an Ethereum-compatible node
///
/// Read-only: the client never signs or broadcasts. Signing stays with the
/// user's wallet.
pub struct JsonRpcClient {
    client: Client,
    url: String,
    chain_id: u64,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a new client
    ///
    /// # Example
    ///
    /// ```ignore
    /// use std::time::Duration;
    ///
    /// let client = JsonRpcClient::new("http://localhost:8545", 31337, Duration::from_secs(30))?;
    /// ```
    pub fn new(url: &str, chain_id: u64, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            chain_id,
            request_id: AtomicU64::new(1),
        })
    }

    /// Create a client from chain configuration
    pub fn from_config(config: &ChainConfig) -> Result<Self, NetworkError> {
        Self::new(
            &config.rpc_url,
            config.chain_id,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Chain id this client was configured for
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, NetworkError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        log::debug!("RPC call: {} id={}", method, id);

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Request(format!("HTTP {} - {}", status, body)));
        }

        let rpc_response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            let data = error.data.map(|d| match d {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            return Err(NetworkError::Rpc {
                code: error.code,
                message: error.message,
                data,
            });
        }

        Ok(rpc_response.result)
    }

    /// `eth_chainId`
    pub async fn get_chain_id(&self) -> Result<u64, NetworkError> {
        let raw: String = self
            .call("eth_chainId", serde_json::json!([]))
            .await?
            .ok_or_else(|| NetworkError::InvalidResponse("Empty eth_chainId result".into()))?;
        quantity::parse(&raw).map_err(NetworkError::InvalidResponse)
    }

    /// Verify the node serves the configured chain
    pub async fn ensure_chain(&self) -> Result<(), NetworkError> {
        let actual = self.get_chain_id().await?;
        if actual != self.chain_id {
            return Err(NetworkError::ChainMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// `eth_blockNumber`
    pub async fn get_block_number(&self) -> Result<u64, NetworkError> {
        let raw: String = self
            .call("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| NetworkError::InvalidResponse("Empty eth_blockNumber result".into()))?;
        quantity::parse(&raw).map_err(NetworkError::InvalidResponse)
    }

    /// `eth_getTransactionReceipt`; `None` while the transaction is unmined
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, NetworkError> {
        self.call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }

    /// `eth_getTransactionByHash`
    pub async fn get_transaction(
        &self,
        tx_hash: B256,
    ) -> Result<Option<RpcTransaction>, NetworkError> {
        self.call("eth_getTransactionByHash", serde_json::json!([tx_hash]))
            .await
    }

    /// `eth_getLogs`
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, NetworkError> {
        Ok(self
            .call("eth_getLogs", serde_json::json!([filter]))
            .await?
            .unwrap_or_default())
    }

    /// Replay a mined transaction with `eth_call` at its block
    ///
    /// Returns the revert data when the replay reverts, `None` when it succeeds.
    pub async fn replay_for_revert_data(
        &self,
        tx: &RpcTransaction,
        block_number: u64,
    ) -> Result<Option<Bytes>, NetworkError> {
        let mut call = serde_json::json!({
            "from": tx.from,
            "to": tx.to,
            "data": tx.input,
        });
        if let Some(value) = tx.value {
            call["value"] = serde_json::json!(format!("0x{:x}", value));
        }
        let block = format!("0x{:x}", block_number);

        match self
            .call::<Bytes>("eth_call", serde_json::json!([call, block]))
            .await
        {
            Ok(_) => Ok(None),
            Err(NetworkError::Rpc {
                data: Some(data), ..
            }) => {
                let bytes = hex::decode(data.trim_start_matches("0x"))
                    .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;
                Ok(Some(Bytes::from(bytes)))
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
