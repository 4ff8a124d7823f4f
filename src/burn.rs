//! Incremental burn accounting for one chain.
//!
//! Burns are `Transfer(from, 0x0, amount)` logs on the token. A transaction whose receipt
//! also carries a token log with any other signature is a bridge burn/mint pairing and
//! is left out of the total. The cursor only moves once every sub-range up to the head
//! has been scanned and every matched transaction classified.

use crate::config::chains::ChainDescriptor;
use crate::error::RpcError;
use crate::scanner::{BlockRange, LogScanner};
use crate::storage::state::ChainCursorState;
use crate::utils::constants::TRANSFER_EVENT;
use crate::utils::hex::{address_topic, decode_word, event_topic};
use crate::utils::rpc::{RpcClient, RpcLog};
use alloy::primitives::{Address, B256, U256};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnOutcome {
    pub state: ChainCursorState,
    /// `None` when the cursor was already at or past the head.
    pub scanned: Option<BlockRange>,
    pub delta_wei: U256,
    pub counted_txs: usize,
    pub excluded_txs: usize,
    /// Block the scan jumped to after hitting pruned history on a cold start.
    pub pruned_restart: Option<u64>,
}

#[derive(Debug, Default)]
struct BatchTally {
    delta_wei: U256,
    counted_txs: usize,
    excluded_txs: usize,
}

pub struct BurnDetector<'a> {
    client: &'a RpcClient,
    chain: &'a ChainDescriptor,
    token: Address,
    transfer_topic: B256,
}

impl<'a> BurnDetector<'a> {
    pub fn new(client: &'a RpcClient, chain: &'a ChainDescriptor, token: Address) -> Self {
        Self {
            client,
            chain,
            token,
            transfer_topic: event_topic(TRANSFER_EVENT),
        }
    }

    pub async fn run(
        &self,
        previous: &ChainCursorState,
        latest_block: u64,
    ) -> Result<BurnOutcome, RpcError> {
        let cursor = previous.last_burn_block;
        let from_block = cursor.resume_from(latest_block, self.chain.lookback_blocks);
        if from_block > latest_block {
            tracing::debug!(
                "[BURN] chain={} cursor={:?} already covers head={}",
                self.chain.key,
                cursor,
                latest_block
            );
            return Ok(BurnOutcome {
                state: previous.clone(),
                scanned: None,
                delta_wei: U256::ZERO,
                counted_txs: 0,
                excluded_txs: 0,
                pruned_restart: None,
            });
        }

        let topics = vec![
            Some(self.transfer_topic),
            None,
            Some(address_topic(Address::ZERO)),
        ];
        let mut scanner = LogScanner::new(
            self.client,
            self.token,
            topics,
            from_block,
            latest_block,
            self.chain.chunk_blocks,
        );

        let mut tally = BatchTally::default();
        let mut pruned_restart = None;
        let mut scanned_from = from_block;
        while let Some(batch) = scanner.next_batch().await {
            let batch = match batch {
                Ok(batch) => batch,
                Err(err) if err.is_pruned_history() && !cursor.is_initialized() => {
                    let restart = latest_block.saturating_sub(self.chain.chunk_blocks);
                    let failed = scanner.pending_range();
                    if pruned_restart.is_some() || failed.is_some_and(|r| restart <= r.from) {
                        return Err(err);
                    }
                    tracing::warn!(
                        "[BURN] chain={} history pruned at {:?} on first run; skipping to block {} (burns before it are not counted)",
                        self.chain.key,
                        failed,
                        restart
                    );
                    scanner.restart_from(restart);
                    pruned_restart = Some(restart);
                    scanned_from = restart;
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.classify_batch(&batch.logs, &mut tally).await?;
        }

        let state = ChainCursorState {
            last_burn_block: cursor.advanced_to(latest_block),
            burned_wei: previous.burned_wei.saturating_add(tally.delta_wei),
        };
        tracing::info!(
            "[BURN] chain={} blocks=[{}..={}] delta_wei={} burned_wei={} counted_txs={} excluded_bridge_txs={}",
            self.chain.key,
            scanned_from,
            latest_block,
            tally.delta_wei,
            state.burned_wei,
            tally.counted_txs,
            tally.excluded_txs
        );
        Ok(BurnOutcome {
            state,
            scanned: Some(BlockRange {
                from: scanned_from,
                to: latest_block,
            }),
            delta_wei: tally.delta_wei,
            counted_txs: tally.counted_txs,
            excluded_txs: tally.excluded_txs,
            pruned_restart,
        })
    }

    async fn classify_batch(&self, logs: &[RpcLog], tally: &mut BatchTally) -> Result<(), RpcError> {
        for (tx_hash, tx_logs) in group_by_transaction(logs) {
            let receipt = self
                .client
                .transaction_receipt(tx_hash)
                .await?
                .ok_or_else(|| RpcError::Decode {
                    method: "eth_getTransactionReceipt".to_string(),
                    reason: format!("no receipt for burn transaction {tx_hash:#x}"),
                })?;

            if is_bridge_transaction(&receipt.logs, self.token, self.transfer_topic) {
                tally.excluded_txs += 1;
                tracing::debug!(
                    "[BURN] chain={} tx={:#x} excluded: token emitted non-Transfer events",
                    self.chain.key,
                    tx_hash
                );
                continue;
            }

            for log in tx_logs {
                tally.delta_wei = tally.delta_wei.saturating_add(decode_word(&log.data));
            }
            tally.counted_txs += 1;
        }
        Ok(())
    }
}

/// Logs grouped by transaction hash, in first-seen order. Logs without a hash cannot be
/// cross-checked and are dropped.
pub fn group_by_transaction(logs: &[RpcLog]) -> Vec<(B256, Vec<&RpcLog>)> {
    let mut order: Vec<(B256, Vec<&RpcLog>)> = Vec::new();
    let mut index: HashMap<B256, usize> = HashMap::new();
    for log in logs {
        let Some(tx_hash) = log.transaction_hash else {
            tracing::debug!("[BURN] skipping log without transaction hash: {:?}", log.block());
            continue;
        };
        match index.get(&tx_hash) {
            Some(&slot) => order[slot].1.push(log),
            None => {
                index.insert(tx_hash, order.len());
                order.push((tx_hash, vec![log]));
            }
        }
    }
    order
}

/// True if the token emitted any event other than `Transfer` in this receipt.
pub fn is_bridge_transaction(receipt_logs: &[RpcLog], token: Address, transfer_topic: B256) -> bool {
    receipt_logs.iter().any(|log| {
        log.address == token && log.topic0().is_some_and(|topic| topic != transfer_topic)
    })
}
