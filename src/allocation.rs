//! Allocation resolution: how much of the token sits allocated in PUTs.
//!
//! Strategies run in a fixed order and the first strictly positive answer wins. A stage
//! that errors is logged and skipped. Only the event ledger carries persistent state;
//! its updated checkpoint is returned whenever its scan completed, including when it
//! resolved to zero.

use crate::config::chains::ChainDescriptor;
use crate::error::RpcError;
use crate::protocols::erc20;
use crate::scanner::LogScanner;
use crate::storage::state::AllocationLedgerState;
use crate::utils::constants::{
    DIVESTED_EVENT, FT_ALLOCATED_SELECTOR, FT_ALLOCATED_SIGNATURE, INVESTED_EVENT, WITHDRAW_EVENT,
};
use crate::utils::hex::{decode_word, encode_call, event_topic, selector};
use crate::utils::rpc::RpcClient;
use alloy::primitives::{Address, U256};

/// Provenance of the published `inPuts` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatedSource {
    EventLedger,
    DirectProbe,
    HoldingBalance,
    Unavailable,
}

impl AllocatedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventLedger => "events-invested-divested-withdraw",
            Self::DirectProbe => "putmanager-ftAllocated-fallback",
            Self::HoldingBalance => "ftput-balance-fallback",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "events-invested-divested-withdraw" => Some(Self::EventLedger),
            "putmanager-ftAllocated-fallback" => Some(Self::DirectProbe),
            "ftput-balance-fallback" => Some(Self::HoldingBalance),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

/// Cascade order.
pub const STRATEGIES: [AllocatedSource; 3] = [
    AllocatedSource::EventLedger,
    AllocatedSource::DirectProbe,
    AllocatedSource::HoldingBalance,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResolution {
    pub value: U256,
    pub source: AllocatedSource,
    /// Ledger state to persist; `None` when the ledger stage failed.
    pub ledger: Option<AllocationLedgerState>,
}

/// Contracts the resolver reads on the primary chain.
#[derive(Debug, Clone, Copy)]
pub struct AllocationTargets {
    pub token: Address,
    /// Emits the ledger events and answers the direct probes.
    pub manager: Address,
    /// Holder whose token balance is the last-resort answer.
    pub holding: Address,
}

pub struct AllocationResolver<'a> {
    client: &'a RpcClient,
    chain: &'a ChainDescriptor,
    targets: AllocationTargets,
}

impl<'a> AllocationResolver<'a> {
    pub fn new(client: &'a RpcClient, chain: &'a ChainDescriptor, targets: AllocationTargets) -> Self {
        Self {
            client,
            chain,
            targets,
        }
    }

    pub async fn resolve(
        &self,
        previous: &AllocationLedgerState,
        latest_block: u64,
    ) -> AllocationResolution {
        let mut ledger = None;
        for strategy in STRATEGIES {
            let attempt = match strategy {
                AllocatedSource::EventLedger => {
                    match self.ledger(previous, latest_block).await {
                        Ok(next) => {
                            let value = next.allocated();
                            ledger = Some(next);
                            Ok(Some(value))
                        }
                        Err(err) => Err(err),
                    }
                }
                AllocatedSource::DirectProbe => Ok(self.probe().await),
                AllocatedSource::HoldingBalance => {
                    erc20::balance_of(self.client, self.targets.token, self.targets.holding)
                        .await
                        .map(Some)
                }
                AllocatedSource::Unavailable => Ok(None),
            };

            match attempt {
                Ok(Some(value)) if value > U256::ZERO => {
                    tracing::info!(
                        "[ALLOC] resolved allocated_wei={} source={}",
                        value,
                        strategy.as_str()
                    );
                    return AllocationResolution {
                        value,
                        source: strategy,
                        ledger,
                    };
                }
                Ok(_) => {
                    tracing::info!(
                        "[ALLOC] {} yielded nothing positive; trying next strategy",
                        strategy.as_str()
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "[ALLOC] {} failed: {}; trying next strategy",
                        strategy.as_str(),
                        crate::utils::error::compact_error_message(&err.to_string(), 260)
                    );
                }
            }
        }

        tracing::warn!("[ALLOC] every strategy yielded zero or failed; publishing 0");
        AllocationResolution {
            value: U256::ZERO,
            source: AllocatedSource::Unavailable,
            ledger,
        }
    }

    /// Incremental `Invested - Divested - Withdraw` ledger on the manager contract.
    pub async fn ledger(
        &self,
        previous: &AllocationLedgerState,
        latest_block: u64,
    ) -> Result<AllocationLedgerState, RpcError> {
        let cursor = previous.last_block;
        let from_block = cursor.resume_from(latest_block, self.chain.lookback_blocks);
        if from_block > latest_block {
            return Ok(previous.clone());
        }

        let invested = self.sum_event(INVESTED_EVENT, from_block, latest_block).await?;
        let divested = self.sum_event(DIVESTED_EVENT, from_block, latest_block).await?;
        let withdrawn = self.sum_event(WITHDRAW_EVENT, from_block, latest_block).await?;

        let next = AllocationLedgerState {
            last_block: cursor.advanced_to(latest_block),
            invested_wei: previous.invested_wei.saturating_add(invested),
            divested_wei: previous.divested_wei.saturating_add(divested),
            withdrawn_wei: previous.withdrawn_wei.saturating_add(withdrawn),
        };
        tracing::debug!(
            "[ALLOC] ledger blocks=[{}..={}] +invested={} +divested={} +withdrawn={}",
            from_block,
            latest_block,
            invested,
            divested,
            withdrawn
        );
        Ok(next)
    }

    async fn sum_event(&self, signature: &str, from_block: u64, to_block: u64) -> Result<U256, RpcError> {
        let mut scanner = LogScanner::new(
            self.client,
            self.targets.manager,
            vec![Some(event_topic(signature))],
            from_block,
            to_block,
            self.chain.chunk_blocks,
        );
        let mut total = U256::ZERO;
        while let Some(batch) = scanner.next_batch().await {
            for log in batch?.logs {
                total = total.saturating_add(decode_word(&log.data));
            }
        }
        Ok(total)
    }

    /// First strictly positive answer across the probe selectors. Reverts and empty
    /// returns count as no answer.
    pub async fn probe(&self) -> Option<U256> {
        for probe in probe_selectors() {
            match erc20::call_uint(
                self.client,
                self.targets.manager,
                encode_call(probe, &[]),
                "ftAllocated",
            )
            .await
            {
                Ok(value) if value > U256::ZERO => return Some(value),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        "[ALLOC] probe 0x{} on {:#x} failed: {}",
                        hex::encode(probe),
                        self.targets.manager,
                        err
                    );
                }
            }
        }
        None
    }
}

/// Known selector first, then the one derived from the signature, without duplicates.
pub fn probe_selectors() -> Vec<[u8; 4]> {
    let mut selectors = vec![FT_ALLOCATED_SELECTOR];
    let derived = selector(FT_ALLOCATED_SIGNATURE);
    if !selectors.contains(&derived) {
        selectors.push(derived);
    }
    selectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::chains::ChainKey;
    use crate::storage::state::Cursor;
    use crate::testing::{CallResult, MockChain, MockLog};
    use alloy::primitives::B256;

    const TOKEN: Address = Address::repeat_byte(0x5d);
    const MANAGER: Address = Address::repeat_byte(0xba);
    const HOLDING: Address = Address::repeat_byte(0xa4);

    fn targets() -> AllocationTargets {
        AllocationTargets {
            token: TOKEN,
            manager: MANAGER,
            holding: HOLDING,
        }
    }

    fn desc() -> ChainDescriptor {
        ChainDescriptor {
            lookback_blocks: 1_000,
            chunk_blocks: 250,
            ..ChainDescriptor::ethereum()
        }
    }

    fn ledger_event(signature: &str, amount: u64, block: u64, tx: u8) -> MockLog {
        MockLog::event(MANAGER, event_topic(signature))
            .with_amount(U256::from(amount))
            .at(block, B256::repeat_byte(tx))
    }

    #[test]
    fn source_labels_round_trip() {
        for source in [
            AllocatedSource::EventLedger,
            AllocatedSource::DirectProbe,
            AllocatedSource::HoldingBalance,
            AllocatedSource::Unavailable,
        ] {
            assert_eq!(AllocatedSource::parse(source.as_str()), Some(source));
        }
    }

    #[test]
    fn probe_selectors_are_deduplicated() {
        let selectors = probe_selectors();
        assert_eq!(selectors[0], FT_ALLOCATED_SELECTOR);
        let mut unique = selectors.clone();
        unique.dedup();
        assert_eq!(unique, selectors);
    }

    #[tokio::test]
    async fn positive_ledger_short_circuits_the_cascade() {
        let mock = MockChain::new(1_000);
        mock.add_log(ledger_event(INVESTED_EVENT, 500, 100, 1));
        mock.add_log(ledger_event(DIVESTED_EVENT, 150, 200, 2));
        mock.add_log(ledger_event(WITHDRAW_EVENT, 50, 300, 3));
        mock.set_call_result(MANAGER, FT_ALLOCATED_SELECTOR, CallResult::Word(U256::from(7u64)));
        mock.set_balance(TOKEN, HOLDING, U256::from(9u64));
        let client = mock.client(ChainKey::Ethereum, &["https://node"]);
        let chain = desc();

        let resolution = AllocationResolver::new(&client, &chain, targets())
            .resolve(&AllocationLedgerState::default(), 1_000)
            .await;

        assert_eq!(resolution.value, U256::from(300u64));
        assert_eq!(resolution.source, AllocatedSource::EventLedger);
        assert_eq!(mock.calls_to_selector(MANAGER, FT_ALLOCATED_SELECTOR), 0);
        assert_eq!(mock.method_count("eth_call"), 0);
        let ledger = resolution.ledger.expect("ledger state");
        assert_eq!(ledger.last_block, Cursor::Checkpoint(1_000));
        assert_eq!(ledger.invested_wei, U256::from(500u64));
    }

    #[tokio::test]
    async fn zero_ledger_tries_probe_before_balance() {
        let mock = MockChain::new(1_000);
        mock.set_call_result(MANAGER, FT_ALLOCATED_SELECTOR, CallResult::Word(U256::from(42u64)));
        mock.set_balance(TOKEN, HOLDING, U256::from(9u64));
        let client = mock.client(ChainKey::Ethereum, &["https://node"]);
        let chain = desc();

        let resolution = AllocationResolver::new(&client, &chain, targets())
            .resolve(&AllocationLedgerState::default(), 1_000)
            .await;

        assert_eq!(resolution.value, U256::from(42u64));
        assert_eq!(resolution.source, AllocatedSource::DirectProbe);
        // The zero ledger still completed, so its checkpoint is kept.
        assert_eq!(
            resolution.ledger.map(|l| l.last_block),
            Some(Cursor::Checkpoint(1_000))
        );
    }

    #[tokio::test]
    async fn reverting_probes_fall_through_to_holding_balance() {
        let mock = MockChain::new(1_000);
        mock.set_call_result(MANAGER, FT_ALLOCATED_SELECTOR, CallResult::Revert);
        mock.set_call_result(MANAGER, selector(FT_ALLOCATED_SIGNATURE), CallResult::Empty);
        mock.set_balance(TOKEN, HOLDING, U256::from(9u64));
        let client = mock.client(ChainKey::Ethereum, &["https://node"]);
        let chain = desc();

        let resolution = AllocationResolver::new(&client, &chain, targets())
            .resolve(&AllocationLedgerState::default(), 1_000)
            .await;

        assert_eq!(resolution.value, U256::from(9u64));
        assert_eq!(resolution.source, AllocatedSource::HoldingBalance);
        assert_eq!(mock.calls_to_selector(MANAGER, FT_ALLOCATED_SELECTOR), 1);
    }

    #[tokio::test]
    async fn failed_ledger_is_not_committed_and_everything_zero_is_unavailable() {
        let mock = MockChain::new(1_000);
        mock.fail_method("eth_getLogs");
        let client = mock.client(ChainKey::Ethereum, &["https://node"]);
        let chain = desc();
        let previous = AllocationLedgerState {
            last_block: Cursor::Checkpoint(10),
            invested_wei: U256::from(1u64),
            ..AllocationLedgerState::default()
        };

        let resolution = AllocationResolver::new(&client, &chain, targets())
            .resolve(&previous, 1_000)
            .await;

        assert_eq!(resolution.value, U256::ZERO);
        assert_eq!(resolution.source, AllocatedSource::Unavailable);
        assert_eq!(resolution.ledger, None);
    }

    #[tokio::test]
    async fn ledger_is_incremental_from_its_checkpoint() {
        let mock = MockChain::new(2_000);
        mock.add_log(ledger_event(INVESTED_EVENT, 5, 1_200, 1));
        mock.add_log(ledger_event(INVESTED_EVENT, 99, 900, 2));
        let client = mock.client(ChainKey::Ethereum, &["https://node"]);
        let chain = desc();
        let previous = AllocationLedgerState {
            last_block: Cursor::Checkpoint(1_000),
            invested_wei: U256::from(10u64),
            divested_wei: U256::from(3u64),
            withdrawn_wei: U256::ZERO,
        };

        let next = AllocationResolver::new(&client, &chain, targets())
            .ledger(&previous, 2_000)
            .await
            .expect("ledger scan");
        assert_eq!(next.invested_wei, U256::from(15u64));
        assert_eq!(next.allocated(), U256::from(12u64));
        assert_eq!(mock.log_query_ranges().first(), Some(&(1_001, 1_250)));
    }
}
