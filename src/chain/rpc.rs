//! JSON-RPC client for an EVM node

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{format_address, ChainError};

/// Block selector for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    fn to_param(self) -> Value {
        match self {
            BlockTag::Latest => Value::String("latest".to_string()),
            BlockTag::Number(n) => Value::String(format!("0x{:x}", n)),
        }
    }
}

/// Subset of a transaction receipt we care about
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

impl TransactionReceipt {
    /// `true` unless the receipt reports status 0x0
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() != Some("0x0")
    }

    pub fn block_number(&self) -> Result<u64, ChainError> {
        let raw = self
            .block_number
            .as_deref()
            .ok_or_else(|| ChainError::Decode("receipt has no block number".to_string()))?;
        parse_hex_u64(raw)
    }
}

/// HTTP JSON-RPC client
pub struct EvmRpcClient {
    rpc_url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl EvmRpcClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `rpc_url` - Node endpoint (e.g., "https://rpc.example.org")
    /// * `timeout` - Per-request transport timeout
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.rpc_url
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(expect_str(&result, "eth_blockNumber")?)
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_chainId", json!([])).await?;
        parse_hex_u64(expect_str(&result, "eth_chainId")?)
    }

    pub async fn get_balance(&self, address: &Address) -> Result<U256, ChainError> {
        let result = self
            .call("eth_getBalance", json!([format_address(address), "latest"]))
            .await?;
        parse_hex_u256(expect_str(&result, "eth_getBalance")?)
    }

    /// Read-only contract call
    pub async fn call_contract(
        &self,
        to: &Address,
        data: &[u8],
        block: BlockTag,
    ) -> Result<Vec<u8>, ChainError> {
        let params = json!([
            {
                "to": format_address(to),
                "data": format!("0x{}", hex::encode(data)),
            },
            block.to_param()
        ]);
        let result = self.call("eth_call", params).await?;
        decode_hex_bytes(expect_str(&result, "eth_call")?)
    }

    /// Pending nonce for the sender
    pub async fn transaction_count(&self, address: &Address) -> Result<u64, ChainError> {
        let result = self
            .call(
                "eth_getTransactionCount",
                json!([format_address(address), "pending"]),
            )
            .await?;
        parse_hex_u64(expect_str(&result, "eth_getTransactionCount")?)
    }

    pub async fn gas_price(&self) -> Result<U256, ChainError> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        parse_hex_u256(expect_str(&result, "eth_gasPrice")?)
    }

    pub async fn estimate_gas(
        &self,
        from: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<U256, ChainError> {
        let params = json!([{
            "from": format_address(from),
            "to": format_address(to),
            "data": format!("0x{}", hex::encode(data)),
        }]);
        let result = self.call("eth_estimateGas", params).await?;
        parse_hex_u256(expect_str(&result, "eth_estimateGas")?)
    }

    /// Broadcast a signed transaction and return its hash
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        let result = self
            .call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        Ok(expect_str(&result, "eth_sendRawTransaction")?.to_string())
    }

    pub async fn transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let result = self.call("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ChainError::Decode(format!("receipt: {}", e)))
    }

    /// Poll for a receipt until it appears or the attempt budget runs out
    ///
    /// A reverted receipt is an error.
    pub async fn wait_for_receipt(
        &self,
        hash: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<TransactionReceipt, ChainError> {
        for attempt in 1..=max_attempts {
            match self.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.succeeded() {
                        return Err(ChainError::Reverted {
                            transaction_hash: hash.to_string(),
                        });
                    }
                    return Ok(receipt);
                }
                Ok(None) => debug!(hash = %hash, attempt, "Receipt not yet available"),
                Err(e) => warn!(hash = %hash, attempt, error = %e, "Receipt lookup failed"),
            }
            tokio::time::sleep(interval).await;
        }

        Err(ChainError::ReceiptTimeout {
            transaction_hash: hash.to_string(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        let value: Value = response.json().await?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ChainError::Rpc {
                method: method.to_string(),
                message,
            });
        }

        value.get("result").cloned().ok_or_else(|| ChainError::Rpc {
            method: method.to_string(),
            message: "response had no result".to_string(),
        })
    }
}

fn expect_str<'a>(value: &'a Value, method: &str) -> Result<&'a str, ChainError> {
    value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("{} result was not a string", method)))
}

fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

pub(crate) fn parse_hex_u64(raw: &str) -> Result<u64, ChainError> {
    let digits = strip_hex_prefix(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("invalid quantity {}: {}", raw, e)))
}

pub(crate) fn parse_hex_u256(raw: &str) -> Result<U256, ChainError> {
    let digits = strip_hex_prefix(raw);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("invalid quantity {}: {}", raw, e)))
}

fn decode_hex_bytes(raw: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(strip_hex_prefix(raw))
        .map_err(|e| ChainError::Decode(format!("invalid hex data: {}", e)))
}
