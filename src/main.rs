//! Single-shot indexing binary: run once, write state and snapshot, exit.

use anyhow::Context;
use std::sync::Arc;
use supply_indexer::utils::rpc::HttpTransport;
use supply_indexer::{run_once, IndexerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to `info` when `RUST_LOG` is unset or invalid to avoid silent startup.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = IndexerConfig::from_env().context("failed to load indexer configuration")?;
    tracing::info!(
        "[STARTUP] chains={} primary={} state={} snapshot={} rpc_timeout_ms={}",
        config.chains.len(),
        config.primary,
        config.state_path.display(),
        config.snapshot_path.display(),
        config.rpc_timeout_ms
    );

    let transport = Arc::new(HttpTransport::new(config.rpc_timeout_ms));
    let report = run_once(&config, transport)
        .await
        .context("indexing run failed; previous state and snapshot left untouched")?;

    for chain in &report.chains {
        tracing::info!(
            "[RUN] chain={} head={} scanned={:?} burn_delta_wei={} excluded_bridge_txs={} pruned_restart={:?}",
            chain.chain,
            chain.latest_block,
            chain.scanned.map(|r| (r.from, r.to)),
            chain.burn_delta_wei,
            chain.excluded_txs,
            chain.pruned_restart
        );
    }
    tracing::info!(
        "[RUN] allocated_source={} registry_size={} (+{})",
        report.allocated_source.as_str(),
        report.registry_size,
        report.registry_added
    );
    println!("Indexed metrics at {}", report.snapshot.updated_at);
    Ok(())
}
