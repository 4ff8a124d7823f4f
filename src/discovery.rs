//! Institutional wallet discovery.
//!
//! Every address the multisig has ever sent the token to (minus a fixed exclusion list)
//! is treated as an institutional wallet. The registry only grows; balances are re-read
//! in full every run.

use crate::config::chains::ChainDescriptor;
use crate::error::{IndexerError, RpcError};
use crate::protocols::erc20;
use crate::scanner::LogScanner;
use crate::storage::state::AddressRegistryState;
use crate::utils::constants::TRANSFER_EVENT;
use crate::utils::hex::{address_from_topic, address_topic, event_topic};
use crate::utils::rpc::{RpcClient, RpcLog};
use alloy::primitives::{Address, U256};
use std::collections::BTreeSet;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub registry: AddressRegistryState,
    pub added: usize,
}

pub struct AddressDiscovery<'a> {
    client: &'a RpcClient,
    chain: &'a ChainDescriptor,
    token: Address,
    source: Address,
    excluded: BTreeSet<Address>,
}

impl<'a> AddressDiscovery<'a> {
    /// `source` and the zero address are always excluded on top of `extra_excluded`.
    pub fn new(
        client: &'a RpcClient,
        chain: &'a ChainDescriptor,
        token: Address,
        source: Address,
        extra_excluded: &[Address],
    ) -> Self {
        let mut excluded: BTreeSet<Address> = extra_excluded.iter().copied().collect();
        excluded.insert(Address::ZERO);
        excluded.insert(source);
        Self {
            client,
            chain,
            token,
            source,
            excluded,
        }
    }

    pub async fn update(
        &self,
        previous: &AddressRegistryState,
        latest_block: u64,
    ) -> Result<DiscoveryOutcome, RpcError> {
        let cursor = previous.last_block;
        let from_block = cursor.resume_from(latest_block, self.chain.lookback_blocks);
        let mut addresses = previous.addresses.clone();

        if from_block <= latest_block {
            let mut scanner = LogScanner::new(
                self.client,
                self.token,
                vec![Some(event_topic(TRANSFER_EVENT)), Some(address_topic(self.source))],
                from_block,
                latest_block,
                self.chain.chunk_blocks,
            );
            while let Some(batch) = scanner.next_batch().await {
                for log in batch?.logs {
                    if let Some(to) = self.destination(&log) {
                        addresses.insert(to);
                    }
                }
            }
        }

        let added = addresses.len() - previous.addresses.len();
        tracing::info!(
            "[VC] registry blocks=[{}..={}] added={} total={}",
            from_block,
            latest_block,
            added,
            addresses.len()
        );
        Ok(DiscoveryOutcome {
            registry: AddressRegistryState {
                last_block: cursor.advanced_to(latest_block),
                addresses,
            },
            added,
        })
    }

    fn destination(&self, log: &RpcLog) -> Option<Address> {
        let to = address_from_topic(*log.topics.get(2)?);
        (!self.excluded.contains(&to)).then_some(to)
    }
}

/// Sum of current token balances across `addresses`, read concurrently. Any failed read
/// fails the whole total.
pub async fn institutional_total(
    client: &RpcClient,
    token: Address,
    addresses: &BTreeSet<Address>,
) -> Result<U256, IndexerError> {
    let mut reads = JoinSet::new();
    for holder in addresses.iter().copied() {
        let client = client.clone();
        reads.spawn(async move { erc20::balance_of(&client, token, holder).await });
    }

    let mut total = U256::ZERO;
    while let Some(joined) = reads.join_next().await {
        let balance = joined.map_err(|err| IndexerError::TaskAborted(err.to_string()))??;
        total = total.saturating_add(balance);
    }
    tracing::debug!(
        "[VC] institutional_wei={} wallets={}",
        total,
        addresses.len()
    );
    Ok(total)
}
