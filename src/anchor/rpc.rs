/// Ledger node access.
///
/// `LedgerNode` is the narrow set of node operations the engine needs.
/// `JsonRpcNode` implements it with raw Ethereum JSON-RPC 2.0 over HTTP,
/// which keeps it compatible with any EVM node or hosted provider.
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Failure reported by a node call. Callers map it to the error kind of
/// the step that issued the call.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Operations issued against one ledger node.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Network chain identifier used for EIP-155 replay protection.
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Next nonce for `address`, counting pending transactions.
    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcError>;

    /// Current gas price suggestion in wei.
    async fn gas_price(&self) -> Result<u128, RpcError>;

    /// Broadcast an EIP-2718 encoded signed transaction.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError>;

    /// Read-only call against the latest state.
    async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, RpcError>;

    /// Logs emitted by `address` over the whole chain whose leading topics
    /// equal `topics`.
    async fn logs(&self, address: Address, topics: &[B256]) -> Result<Vec<LogEntry>, RpcError>;
}

/// Raw event log as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    topics: Vec<String>,
    data: String,
}

impl RawLog {
    fn parse(self) -> Result<LogEntry, RpcError> {
        let topics = self
            .topics
            .iter()
            .map(|t| {
                B256::from_str(t).map_err(|e| RpcError::Malformed(format!("log topic {t}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let data = hex::decode(self.data.trim_start_matches("0x"))
            .map_err(|e| RpcError::Malformed(format!("log data {}: {e}", self.data)))?;
        Ok(LogEntry {
            topics,
            data: Bytes::from(data),
        })
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC node reached over HTTP.
pub struct JsonRpcNode {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcNode {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a JSON-RPC request to the node.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            return Err(RpcError::Transport(format!(
                "{method}: HTTP {}",
                resp.status()
            )));
        }

        let resp: JsonRpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| RpcError::Malformed(format!("{method} response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }

        resp.result
            .ok_or_else(|| RpcError::Malformed(format!("{method}: empty result")))
    }
}

#[async_trait]
impl LedgerNode for JsonRpcNode {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let hex: String = self.rpc_call("eth_chainId", serde_json::json!([])).await?;
        parse_quantity(&hex).and_then(|v| {
            u64::try_from(v).map_err(|_| RpcError::Malformed(format!("chain id {hex} overflows")))
        })
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcError> {
        let hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([address.to_string(), "pending"]),
            )
            .await?;
        parse_quantity(&hex).and_then(|v| {
            u64::try_from(v).map_err(|_| RpcError::Malformed(format!("nonce {hex} overflows")))
        })
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        let hex: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        parse_quantity(&hex)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let raw_hex = format!("0x{}", hex::encode(raw));
        let tx_hash: String = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await?;
        B256::from_str(&tx_hash)
            .map_err(|e| RpcError::Malformed(format!("transaction hash {tx_hash}: {e}")))
    }

    async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, RpcError> {
        let out: String = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;
        hex::decode(out.trim_start_matches("0x"))
            .map(Bytes::from)
            .map_err(|e| RpcError::Malformed(format!("eth_call result {out}: {e}")))
    }

    async fn logs(&self, address: Address, topics: &[B256]) -> Result<Vec<LogEntry>, RpcError> {
        let topics: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
        let raw: Vec<RawLog> = self
            .rpc_call(
                "eth_getLogs",
                serde_json::json!([{
                    "address": address.to_string(),
                    "fromBlock": "earliest",
                    "toBlock": "latest",
                    "topics": topics,
                }]),
            )
            .await?;
        raw.into_iter().map(RawLog::parse).collect()
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1a`.
pub fn parse_quantity(hex: &str) -> Result<u128, RpcError> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Malformed(format!("quantity {hex} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Err(RpcError::Malformed("empty quantity".into()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Malformed(format!("quantity {hex}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0xaa36a7").unwrap(), 11_155_111);
        assert!(parse_quantity("1a").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_response_with_error() {
        let resp: JsonRpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "nonce too low");
    }

    #[test]
    fn test_log_parsing() {
        let resp: JsonRpcResponse<Vec<RawLog>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":[{
                "address":"0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "topics":["0x0000000000000000000000000000000000000000000000000000000000000001"],
                "data":"0x0a0b",
                "blockNumber":"0x1"
            }]}"#,
        )
        .unwrap();
        let logs: Vec<LogEntry> = resp
            .result
            .unwrap()
            .into_iter()
            .map(|l| l.parse().unwrap())
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].topics, vec![B256::with_last_byte(1)]);
        assert_eq!(logs[0].data, Bytes::from(vec![0x0a, 0x0b]));

        let bad = RawLog {
            topics: vec!["0x01".into()],
            data: "0x".into(),
        };
        assert!(matches!(bad.parse(), Err(RpcError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        // Port 9 (discard) on localhost is closed on CI hosts.
        let node = JsonRpcNode::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = node.chain_id().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
