//! One indexing run: fan out per-chain pipelines, fold their results into the persisted
//! state, compose the snapshot, then write both documents.
//!
//! Nothing touches disk until every pipeline has succeeded. A failure anywhere aborts
//! the run and leaves the previous state and snapshot in place.

use crate::aggregator::{compose, ChainReading, PrimaryInputs};
use crate::allocation::{AllocatedSource, AllocationResolution, AllocationResolver, AllocationTargets};
use crate::burn::{BurnDetector, BurnOutcome};
use crate::config::chains::{ChainDescriptor, ChainKey};
use crate::discovery::{institutional_total, AddressDiscovery, DiscoveryOutcome};
use crate::error::{IndexerError, Result};
use crate::protocols::erc20;
use crate::scanner::BlockRange;
use crate::storage::snapshot::{MetricsSnapshot, SnapshotMeta, SnapshotWriter};
use crate::storage::state::{
    AddressRegistryState, AllocationLedgerState, ChainCursorState, PersistedState, StateStore,
};
use crate::utils::config::{IndexerConfig, TokenProfile};
use crate::utils::constants::BURNED_SOURCE;
use crate::utils::rpc::{RpcClient, RpcTransport};
use alloy::primitives::U256;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Per-chain summary of what a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRunSummary {
    pub chain: ChainKey,
    pub latest_block: u64,
    pub scanned: Option<BlockRange>,
    pub burn_delta_wei: U256,
    pub counted_txs: usize,
    pub excluded_txs: usize,
    pub pruned_restart: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub snapshot: MetricsSnapshot,
    pub chains: Vec<ChainRunSummary>,
    pub allocated_source: AllocatedSource,
    pub registry_size: usize,
    pub registry_added: usize,
}

struct ChainOutput {
    reading: ChainReading,
    burn: BurnOutcome,
}

struct PrimaryOutput {
    decimals: u8,
    allocation: AllocationResolution,
    discovery: DiscoveryOutcome,
    institutional: U256,
    holding_balance: U256,
}

struct PipelineOutput {
    chain: ChainOutput,
    primary: Option<PrimaryOutput>,
}

pub async fn run_once(config: &IndexerConfig, transport: Arc<dyn RpcTransport>) -> Result<RunReport> {
    config.validate()?;
    let store = StateStore::new(&config.state_path);
    let mut state = store.load()?;

    let mut pipelines = JoinSet::new();
    for desc in &config.chains {
        let client = RpcClient::new(desc.key, desc.rpc_urls.clone(), Arc::clone(&transport));
        let desc = desc.clone();
        let profile = config.profile.clone();
        let previous = state.chain(desc.key);
        if desc.key == config.primary {
            let ledger = state.ft_alloc.clone();
            let registry = state.vc.clone();
            pipelines.spawn(async move {
                let key = desc.key;
                primary_pipeline(desc, client, profile, previous, ledger, registry)
                    .await
                    .map_err(|err| err.in_chain(key))
            });
        } else {
            pipelines.spawn(async move {
                let key = desc.key;
                let chain = chain_pipeline(&desc, &client, &profile, &previous)
                    .await
                    .map_err(|err| err.in_chain(key))?;
                Ok::<_, IndexerError>(PipelineOutput {
                    chain,
                    primary: None,
                })
            });
        }
    }

    let mut outputs: Vec<ChainOutput> = Vec::with_capacity(config.chains.len());
    let mut primary: Option<PrimaryOutput> = None;
    while let Some(joined) = pipelines.join_next().await {
        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::error!("[RUN] aborting without writing state: {}", err);
                return Err(err);
            }
            Err(err) => {
                let detail = if err.is_panic() {
                    format!("panic: {err:?}")
                } else {
                    format!("cancelled: {err:?}")
                };
                tracing::error!("[RUN] pipeline task failed: {}", detail);
                return Err(IndexerError::TaskAborted(detail));
            }
        };
        if output.primary.is_some() {
            primary = output.primary;
        }
        outputs.push(output.chain);
    }
    outputs.sort_by_key(|o| o.reading.chain);

    let primary = primary.ok_or_else(|| IndexerError::TaskAborted(format!(
        "primary chain `{}` produced no result",
        config.primary
    )))?;

    let report = apply_and_compose(config, &mut state, &outputs, primary);
    store.save(&state)?;
    SnapshotWriter::new(&config.snapshot_path).publish(&report.snapshot)?;
    tracing::info!(
        "[RUN] wrote state={} snapshot={}",
        config.state_path.display(),
        config.snapshot_path.display()
    );
    Ok(report)
}

/// Head, supply, multisig balance and burns for one chain.
async fn chain_pipeline(
    desc: &ChainDescriptor,
    client: &RpcClient,
    profile: &TokenProfile,
    previous: &ChainCursorState,
) -> Result<ChainOutput> {
    let latest_block = client.block_number().await?;
    chain_pipeline_at(desc, client, profile, previous, latest_block).await
}

async fn chain_pipeline_at(
    desc: &ChainDescriptor,
    client: &RpcClient,
    profile: &TokenProfile,
    previous: &ChainCursorState,
    latest_block: u64,
) -> Result<ChainOutput> {
    let (total_supply, msig_balance) = tokio::try_join!(
        erc20::total_supply(client, profile.token),
        erc20::balance_of(client, profile.token, profile.msig_wallet),
    )?;
    let burn = BurnDetector::new(client, desc, profile.token)
        .run(previous, latest_block)
        .await?;
    tracing::info!(
        "[RUN] chain={} head={} supply_wei={} msig_wei={} burned_wei={}",
        desc.key,
        latest_block,
        total_supply,
        msig_balance,
        burn.state.burned_wei
    );
    Ok(ChainOutput {
        reading: ChainReading {
            chain: desc.key,
            latest_block,
            total_supply,
            msig_balance,
            burned: burn.state.burned_wei,
        },
        burn,
    })
}

/// The primary chain additionally resolves allocation, grows the address registry and
/// reads decimals, all against the same head as its burn scan.
async fn primary_pipeline(
    desc: ChainDescriptor,
    client: RpcClient,
    profile: TokenProfile,
    previous: ChainCursorState,
    ledger: AllocationLedgerState,
    registry: AddressRegistryState,
) -> Result<PipelineOutput> {
    let latest_block = client.block_number().await?;
    let targets = AllocationTargets {
        token: profile.token,
        manager: profile.put_manager,
        holding: profile.ft_put,
    };
    let resolver = AllocationResolver::new(&client, &desc, targets);
    let registry_scan = AddressDiscovery::new(
        &client,
        &desc,
        profile.token,
        profile.msig_wallet,
        &[profile.put_manager],
    );

    let (chain, allocation, (discovery, institutional), holding_balance, decimals) = tokio::try_join!(
        chain_pipeline_at(&desc, &client, &profile, &previous, latest_block),
        async { Ok::<_, IndexerError>(resolver.resolve(&ledger, latest_block).await) },
        async {
            let outcome = registry_scan.update(&registry, latest_block).await?;
            let total = institutional_total(&client, profile.token, &outcome.registry.addresses).await?;
            Ok::<_, IndexerError>((outcome, total))
        },
        async {
            erc20::balance_of(&client, profile.token, profile.put_manager)
                .await
                .map_err(IndexerError::from)
        },
        async {
            erc20::decimals(&client, profile.token)
                .await
                .map_err(IndexerError::from)
        },
    )?;

    Ok(PipelineOutput {
        chain,
        primary: Some(PrimaryOutput {
            decimals,
            allocation,
            discovery,
            institutional,
            holding_balance,
        }),
    })
}

/// Fold pipeline results into `state` and build the snapshot. Pure apart from the clock.
fn apply_and_compose(
    config: &IndexerConfig,
    state: &mut PersistedState,
    outputs: &[ChainOutput],
    primary: PrimaryOutput,
) -> RunReport {
    let mut summaries = Vec::with_capacity(outputs.len());
    let mut latest_blocks = BTreeMap::new();
    for output in outputs {
        let key = output.reading.chain;
        state.set_chain(key, output.burn.state.clone());
        latest_blocks.insert(key.as_str().to_string(), output.reading.latest_block.to_string());
        summaries.push(ChainRunSummary {
            chain: key,
            latest_block: output.reading.latest_block,
            scanned: output.burn.scanned,
            burn_delta_wei: output.burn.delta_wei,
            counted_txs: output.burn.counted_txs,
            excluded_txs: output.burn.excluded_txs,
            pruned_restart: output.burn.pruned_restart,
        });
    }
    if let Some(ledger) = primary.allocation.ledger.clone() {
        state.ft_alloc = ledger;
    }
    state.vc = primary.discovery.registry.clone();

    let readings: Vec<ChainReading> = outputs.iter().map(|o| o.reading).collect();
    let inputs = PrimaryInputs {
        allocated: primary.allocation.value,
        holding_balance: primary.holding_balance,
        institutional: primary.institutional,
    };
    let values = compose(&readings, config.primary, &inputs);

    let snapshot = MetricsSnapshot {
        updated_at: MetricsSnapshot::timestamp_now(),
        decimals: primary.decimals,
        meta: SnapshotMeta {
            allocated_source: primary.allocation.source.as_str().to_string(),
            invariant_target_wei: config.profile.max_supply_wei,
            burned_source: BURNED_SOURCE.to_string(),
        },
        latest_blocks,
        values_wei: values,
    };

    RunReport {
        snapshot,
        chains: summaries,
        allocated_source: primary.allocation.source,
        registry_size: state.vc.addresses.len(),
        registry_added: primary.discovery.added,
    }
}
