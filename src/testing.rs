//! In-memory chain for exercising the indexer without a network.
//!
//! `MockChain` implements `RpcTransport`, serving `eth_blockNumber`, `eth_call`
//! (ERC-20 reads plus arbitrary scripted calls), `eth_getLogs` and
//! `eth_getTransactionReceipt` from scripted state, and records what it was asked.

use crate::config::chains::ChainKey;
use crate::error::RpcError;
use crate::utils::constants::{
    BALANCE_OF_SELECTOR, DECIMALS_SELECTOR, TOTAL_SUPPLY_SELECTOR, TRANSFER_EVENT,
};
use crate::utils::hex::{address_topic, block_tag, clean_hex, event_topic, format_address, parse_quantity};
use crate::utils::rpc::{RpcClient, RpcLog, RpcTransport};
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted log. Logs without a block are only visible through receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl MockLog {
    pub fn transfer(token: Address, from: Address, to: Address, amount: U256) -> Self {
        Self {
            address: token,
            topics: vec![
                event_topic(TRANSFER_EVENT),
                address_topic(from),
                address_topic(to),
            ],
            data: amount.to_be_bytes::<32>().to_vec(),
            block: None,
            tx_hash: None,
        }
    }

    pub fn event(address: Address, topic0: B256) -> Self {
        Self {
            address,
            topics: vec![topic0],
            data: Vec::new(),
            block: None,
            tx_hash: None,
        }
    }

    pub fn with_amount(mut self, amount: U256) -> Self {
        self.data = amount.to_be_bytes::<32>().to_vec();
        self
    }

    pub fn at(mut self, block: u64, tx_hash: B256) -> Self {
        self.block = Some(block);
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn into_rpc_log(self) -> RpcLog {
        RpcLog {
            address: self.address,
            topics: self.topics,
            data: Bytes::from(self.data),
            block_number: self.block.map(U64::from),
            transaction_hash: self.tx_hash,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "address": format_address(self.address),
            "topics": self.topics.iter().map(|t| format!("{t:#x}")).collect::<Vec<_>>(),
            "data": format!("0x{}", hex::encode(&self.data)),
            "blockNumber": self.block.map(block_tag),
            "transactionHash": self.tx_hash.map(|h| format!("{h:#x}")),
        })
    }
}

/// Scripted result for an arbitrary `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    Word(U256),
    Empty,
    Revert,
}

#[derive(Default)]
struct MockState {
    head: u64,
    total_supply: HashMap<Address, U256>,
    balances: HashMap<(Address, Address), U256>,
    decimals: HashMap<Address, u8>,
    calls: HashMap<(Address, [u8; 4]), CallResult>,
    logs: Vec<MockLog>,
    receipt_extras: HashMap<B256, Vec<MockLog>>,
    failed_endpoints: HashSet<String>,
    failed_methods: HashSet<String>,
    pruned_below: Option<u64>,
    requests_by_endpoint: BTreeMap<String, usize>,
    requests_by_method: BTreeMap<String, usize>,
    call_counts: HashMap<(Address, [u8; 4]), usize>,
    log_queries: Vec<(u64, u64)>,
}

/// Cheap-clone handle; clones share state.
#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<MockState>>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.state().head = head;
        chain
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn client(&self, chain: ChainKey, endpoints: &[&str]) -> RpcClient {
        RpcClient::new(
            chain,
            endpoints.iter().map(|e| e.to_string()).collect(),
            Arc::new(self.clone()),
        )
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn set_total_supply(&self, token: Address, value: U256) {
        self.state().total_supply.insert(token, value);
    }

    pub fn set_balance(&self, token: Address, holder: Address, value: U256) {
        self.state().balances.insert((token, holder), value);
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.state().decimals.insert(token, decimals);
    }

    /// Overrides any built-in ERC-20 answer for this contract and selector.
    pub fn set_call_result(&self, to: Address, selector: [u8; 4], result: CallResult) {
        self.state().calls.insert((to, selector), result);
    }

    pub fn add_log(&self, log: MockLog) {
        self.state().logs.push(log);
    }

    /// Extra log that only shows up in the receipt of `tx_hash`.
    pub fn add_receipt_log(&self, tx_hash: B256, log: MockLog) {
        let log = MockLog {
            tx_hash: Some(tx_hash),
            ..log
        };
        self.state().receipt_extras.entry(tx_hash).or_default().push(log);
    }

    pub fn fail_endpoint(&self, endpoint: &str) {
        self.state().failed_endpoints.insert(endpoint.to_string());
    }

    /// Every endpoint rejects `method` with a JSON-RPC error.
    pub fn fail_method(&self, method: &str) {
        self.state().failed_methods.insert(method.to_string());
    }

    /// `eth_getLogs` queries starting below `block` fail like a pruned node.
    pub fn prune_history_below(&self, block: u64) {
        self.state().pruned_below = Some(block);
    }

    pub fn requests_to(&self, endpoint: &str) -> usize {
        self.state()
            .requests_by_endpoint
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn method_count(&self, method: &str) -> usize {
        self.state()
            .requests_by_method
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls_to_selector(&self, to: Address, selector: [u8; 4]) -> usize {
        self.state()
            .call_counts
            .get(&(to, selector))
            .copied()
            .unwrap_or(0)
    }

    /// `(fromBlock, toBlock)` of every `eth_getLogs` that reached a live endpoint.
    pub fn log_query_ranges(&self) -> Vec<(u64, u64)> {
        self.state().log_queries.clone()
    }

    pub fn clear_log_queries(&self) {
        self.state().log_queries.clear();
    }
}

fn decode_error(method: &str, reason: impl Into<String>) -> RpcError {
    RpcError::Decode {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn reverted(endpoint: &str) -> RpcError {
    RpcError::JsonRpc {
        endpoint: endpoint.to_string(),
        code: 3,
        message: "execution reverted".to_string(),
    }
}

fn word_json(value: U256) -> Value {
    Value::String(format!("0x{}", hex::encode(value.to_be_bytes::<32>())))
}

fn param_address(value: &Value) -> Option<Address> {
    value.as_str().and_then(|s| Address::from_str(s).ok())
}

fn param_block(value: &Value) -> Option<u64> {
    value.as_str().and_then(parse_quantity)
}

impl MockState {
    fn eth_call(&mut self, endpoint: &str, params: &Value) -> Result<Value, RpcError> {
        let call = &params[0];
        let to = param_address(&call["to"]).ok_or_else(|| decode_error("eth_call", "bad `to`"))?;
        let data = call["data"]
            .as_str()
            .and_then(|d| hex::decode(clean_hex(d)).ok())
            .ok_or_else(|| decode_error("eth_call", "bad `data`"))?;
        if data.len() < 4 {
            return Err(decode_error("eth_call", "calldata shorter than a selector"));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        *self.call_counts.entry((to, selector)).or_default() += 1;

        if let Some(result) = self.calls.get(&(to, selector)) {
            return match result {
                CallResult::Word(value) => Ok(word_json(*value)),
                CallResult::Empty => Ok(Value::String("0x".to_string())),
                CallResult::Revert => Err(reverted(endpoint)),
            };
        }

        match selector {
            TOTAL_SUPPLY_SELECTOR => self
                .total_supply
                .get(&to)
                .map(|v| word_json(*v))
                .ok_or_else(|| reverted(endpoint)),
            DECIMALS_SELECTOR => self
                .decimals
                .get(&to)
                .map(|d| word_json(U256::from(*d)))
                .ok_or_else(|| reverted(endpoint)),
            BALANCE_OF_SELECTOR => {
                if data.len() < 36 {
                    return Err(decode_error("eth_call", "balanceOf without an argument"));
                }
                let holder = Address::from_slice(&data[16..36]);
                let balance = self
                    .balances
                    .get(&(to, holder))
                    .copied()
                    .unwrap_or(U256::ZERO);
                Ok(word_json(balance))
            }
            _ => Err(reverted(endpoint)),
        }
    }

    fn get_logs(&mut self, endpoint: &str, params: &Value) -> Result<Value, RpcError> {
        let filter = &params[0];
        let from = param_block(&filter["fromBlock"])
            .ok_or_else(|| decode_error("eth_getLogs", "bad fromBlock"))?;
        let to = param_block(&filter["toBlock"])
            .ok_or_else(|| decode_error("eth_getLogs", "bad toBlock"))?;
        self.log_queries.push((from, to));

        if self.pruned_below.is_some_and(|floor| from < floor) {
            return Err(RpcError::JsonRpc {
                endpoint: endpoint.to_string(),
                code: -32000,
                message: "History has been pruned for this block range".to_string(),
            });
        }

        let address = param_address(&filter["address"]);
        let topics: Vec<Option<B256>> = filter["topics"]
            .as_array()
            .map(|topics| {
                topics
                    .iter()
                    .map(|t| t.as_str().and_then(|s| B256::from_str(s).ok()))
                    .collect()
            })
            .unwrap_or_default();

        let matched: Vec<Value> = self
            .logs
            .iter()
            .filter(|log| log.block.is_some_and(|b| b >= from && b <= to))
            .filter(|log| address.map_or(true, |a| a == log.address))
            .filter(|log| {
                topics.iter().enumerate().all(|(idx, wanted)| match wanted {
                    Some(topic) => log.topics.get(idx) == Some(topic),
                    None => true,
                })
            })
            .map(MockLog::to_json)
            .collect();
        Ok(Value::Array(matched))
    }

    fn receipt(&self, params: &Value) -> Result<Value, RpcError> {
        let tx_hash = params[0]
            .as_str()
            .and_then(|s| B256::from_str(s).ok())
            .ok_or_else(|| decode_error("eth_getTransactionReceipt", "bad hash"))?;
        let mut logs: Vec<Value> = self
            .logs
            .iter()
            .filter(|log| log.tx_hash == Some(tx_hash))
            .map(MockLog::to_json)
            .collect();
        if let Some(extras) = self.receipt_extras.get(&tx_hash) {
            logs.extend(extras.iter().map(MockLog::to_json));
        }
        if logs.is_empty() {
            return Ok(Value::Null);
        }
        Ok(json!({ "transactionHash": format!("{tx_hash:#x}"), "logs": logs }))
    }
}

#[async_trait]
impl RpcTransport for MockChain {
    async fn request(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let mut state = self.state();
        *state
            .requests_by_endpoint
            .entry(endpoint.to_string())
            .or_default() += 1;
        *state.requests_by_method.entry(method.to_string()).or_default() += 1;

        if state.failed_endpoints.contains(endpoint) {
            return Err(RpcError::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("connection refused by {endpoint}"),
            });
        }
        if state.failed_methods.contains(method) {
            return Err(RpcError::JsonRpc {
                endpoint: endpoint.to_string(),
                code: -32601,
                message: format!("{method} is not available"),
            });
        }

        match method {
            "eth_blockNumber" => Ok(Value::String(block_tag(state.head))),
            "eth_call" => state.eth_call(endpoint, &params),
            "eth_getLogs" => state.get_logs(endpoint, &params),
            "eth_getTransactionReceipt" => state.receipt(&params),
            other => Err(RpcError::JsonRpc {
                endpoint: endpoint.to_string(),
                code: -32601,
                message: format!("method {other} not found"),
            }),
        }
    }
}

/// Routes requests to a `MockChain` by endpoint, so one transport can serve several
/// chains with independent state.
#[derive(Clone, Default)]
pub struct MockNetwork {
    routes: Arc<Mutex<HashMap<String, MockChain>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, endpoint: &str, chain: &MockChain) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(endpoint.to_string(), chain.clone());
        self
    }
}

#[async_trait]
impl RpcTransport for MockNetwork {
    async fn request(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let chain = self
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(endpoint)
            .cloned();
        match chain {
            Some(chain) => chain.request(endpoint, method, params).await,
            None => Err(RpcError::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("no route to {endpoint}"),
            }),
        }
    }
}
