//! JSON-RPC access for one chain: an ordered endpoint list tried breadth-first.
//!
//! `RpcTransport` is the seam between request semantics and the wire. The production
//! transport is `HttpTransport` (reqwest); tests plug in `crate::testing::MockChain`.

use crate::config::chains::ChainKey;
use crate::error::RpcError;
use crate::utils::hex::{block_tag, format_address, parse_quantity};
use alloy::primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const RPC_CALL_TIMEOUT_MS: u64 = 15_000;
const RPC_ERR_MAX_LEN: usize = 260;

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue one JSON-RPC request against one endpoint and return its `result` member.
    async fn request(&self, endpoint: &str, method: &str, params: Value)
        -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    client: Client,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64) -> Self {
        let client = match Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    "[RPC] failed to construct timeout HTTP client: {}. Falling back to default client.",
                    err
                );
                Client::new()
            }
        };
        Self { client, timeout_ms }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.client.post(endpoint).json(&payload).send(),
        )
        .await
        .map_err(|_| RpcError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("request timed out after {}ms", self.timeout_ms),
        })?
        .map_err(|err| RpcError::Transport {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .json::<Value>()
            .await
            .map_err(|err| RpcError::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("unreadable response body: {err}"),
            })?;
        parse_response_envelope(endpoint, body)
    }
}

/// Split a JSON-RPC response into its `result` or a typed error.
pub fn parse_response_envelope(endpoint: &str, mut body: Value) -> Result<Value, RpcError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RpcError::JsonRpc {
            endpoint: endpoint.to_string(),
            code,
            message,
        });
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::Transport {
            endpoint: endpoint.to_string(),
            reason: "response carries neither `result` nor `error`".to_string(),
        }),
    }
}

fn compact_rpc_error_message(err: &RpcError) -> String {
    crate::utils::error::compact_error_message(&err.to_string(), RPC_ERR_MAX_LEN)
}

/// Log entry as returned by `eth_getLogs` and inside receipts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

impl RpcLog {
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    pub fn block(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }
}

/// The part of a transaction receipt the burn cross-check needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptLogs {
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

/// `eth_getLogs` filter for a single contract. `None` topics are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<Option<B256>>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn to_params(&self) -> Value {
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|topic| match topic {
                Some(t) => Value::String(format!("{t:#x}")),
                None => Value::Null,
            })
            .collect();
        serde_json::json!([{
            "address": format_address(self.address),
            "topics": topics,
            "fromBlock": block_tag(self.from_block),
            "toBlock": block_tag(self.to_block),
        }])
    }
}

/// Fallback client bound to one chain. Cheap to clone.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<RpcClientInner>,
}

struct RpcClientInner {
    chain: ChainKey,
    endpoints: Vec<String>,
    transport: Arc<dyn RpcTransport>,
}

impl RpcClient {
    pub fn new(chain: ChainKey, endpoints: Vec<String>, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            inner: Arc::new(RpcClientInner {
                chain,
                endpoints,
                transport,
            }),
        }
    }

    pub fn chain(&self) -> ChainKey {
        self.inner.chain
    }

    /// Try every endpoint once, in order; first success wins.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let endpoints = &self.inner.endpoints;
        let mut last: Option<RpcError> = None;
        for (idx, endpoint) in endpoints.iter().enumerate() {
            match self
                .inner
                .transport
                .request(endpoint, method, params.clone())
                .await
            {
                Ok(value) => {
                    if idx > 0 {
                        tracing::debug!(
                            "[RPC] chain={} method={} served by fallback endpoint #{}",
                            self.inner.chain,
                            method,
                            idx
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let remaining = endpoints.len() - idx - 1;
                    if remaining > 0 {
                        tracing::warn!(
                            "[RPC] chain={} method={} endpoint={} failed: {}; {} endpoint(s) left",
                            self.inner.chain,
                            method,
                            endpoint,
                            compact_rpc_error_message(&err),
                            remaining
                        );
                    }
                    last = Some(err);
                }
            }
        }

        match last {
            Some(last) => Err(RpcError::Unavailable {
                method: method.to_string(),
                attempted: endpoints.len(),
                last: Box::new(last),
            }),
            None => Err(RpcError::NoEndpoints {
                method: method.to_string(),
            }),
        }
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let raw = self.call("eth_blockNumber", serde_json::json!([])).await?;
        raw.as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| RpcError::Decode {
                method: "eth_blockNumber".to_string(),
                reason: format!("expected hex quantity, got {raw}"),
            })
    }

    /// `eth_call` at `latest`; returns the raw return data.
    pub async fn eth_call(&self, to: Address, data: String) -> Result<Bytes, RpcError> {
        let raw = self
            .call(
                "eth_call",
                serde_json::json!([{ "to": format_address(to), "data": data }, "latest"]),
            )
            .await?;
        serde_json::from_value::<Bytes>(raw).map_err(|err| RpcError::Decode {
            method: "eth_call".to_string(),
            reason: err.to_string(),
        })
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, RpcError> {
        let raw = self.call("eth_getLogs", filter.to_params()).await?;
        serde_json::from_value::<Vec<RpcLog>>(raw).map_err(|err| RpcError::Decode {
            method: "eth_getLogs".to_string(),
            reason: err.to_string(),
        })
    }

    /// `None` when the node does not know the transaction.
    pub async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptLogs>, RpcError> {
        let raw = self
            .call(
                "eth_getTransactionReceipt",
                serde_json::json!([format!("{tx_hash:#x}")]),
            )
            .await?;
        serde_json::from_value::<Option<ReceiptLogs>>(raw).map_err(|err| RpcError::Decode {
            method: "eth_getTransactionReceipt".to_string(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    #[test]
    fn envelope_error_field_becomes_typed_error() {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "header not found" }
        });
        match parse_response_envelope("https://node", body) {
            Err(RpcError::JsonRpc { code, message, .. }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ok = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert_eq!(
            parse_response_envelope("https://node", ok).ok(),
            Some(Value::Null)
        );
    }

    #[tokio::test]
    async fn fallback_moves_to_next_endpoint_without_retrying() {
        let chain = MockChain::new(100);
        chain.fail_endpoint("https://down.example");
        let client = chain.client(
            ChainKey::Ethereum,
            &["https://down.example", "https://up.example"],
        );

        assert_eq!(client.block_number().await.ok(), Some(100));
        assert_eq!(chain.requests_to("https://down.example"), 1);
        assert_eq!(chain.requests_to("https://up.example"), 1);
    }

    #[tokio::test]
    async fn exhausted_fallback_reports_last_error() {
        let chain = MockChain::new(100);
        chain.fail_endpoint("https://a.example");
        chain.fail_endpoint("https://b.example");
        let client = chain.client(ChainKey::Base, &["https://a.example", "https://b.example"]);

        match client.block_number().await {
            Err(RpcError::Unavailable {
                attempted, last, ..
            }) => {
                assert_eq!(attempted, 2);
                assert!(last.to_string().contains("https://b.example"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_reported() {
        let chain = MockChain::new(1);
        let client = chain.client(ChainKey::Sonic, &[]);
        assert!(matches!(
            client.block_number().await,
            Err(RpcError::NoEndpoints { .. })
        ));
    }

    #[test]
    fn log_filter_serializes_wildcard_topics_as_null() {
        let filter = LogFilter {
            address: Address::ZERO,
            topics: vec![Some(B256::ZERO), None],
            from_block: 16,
            to_block: 31,
        };
        let params = filter.to_params();
        assert_eq!(params[0]["fromBlock"], "0x10");
        assert_eq!(params[0]["toBlock"], "0x1f");
        assert!(params[0]["topics"][1].is_null());
    }
}
