use alloy::primitives::{Address, B256, U256};
use std::path::Path;
use std::sync::Arc;
use supply_indexer::allocation::AllocatedSource;
use supply_indexer::config::chains::{ChainDescriptor, ChainKey};
use supply_indexer::error::IndexerError;
use supply_indexer::storage::state::{Cursor, StateStore};
use supply_indexer::testing::{CallResult, MockChain, MockLog, MockNetwork};
use supply_indexer::utils::constants::{
    FT_ALLOCATED_SELECTOR, FT_TOKEN, INVESTED_EVENT, MSIG_WALLET, PUT_MANAGER, WAD,
};
use supply_indexer::utils::hex::event_topic;
use supply_indexer::{run_once, IndexerConfig};

const ETH_RPC: &str = "https://eth.test";
const SONIC_RPC: &str = "https://sonic.test";
const FUND: Address = Address::repeat_byte(0xf1);

fn wad(n: u128) -> U256 {
    U256::from(n * WAD)
}

fn tx(n: u8) -> B256 {
    B256::repeat_byte(n)
}

struct Fixture {
    eth: MockChain,
    sonic: MockChain,
    network: MockNetwork,
    config: IndexerConfig,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let eth_desc = ChainDescriptor {
            rpc_urls: vec![ETH_RPC.to_string()],
            lookback_blocks: 1_000,
            chunk_blocks: 200,
            ..ChainDescriptor::ethereum()
        };
        let sonic_desc = ChainDescriptor {
            rpc_urls: vec![SONIC_RPC.to_string()],
            lookback_blocks: 1_000,
            chunk_blocks: 200,
            ..ChainDescriptor::sonic()
        };
        let config = IndexerConfig::with_chains(
            vec![eth_desc, sonic_desc],
            dir.path().join("data/state.json"),
            dir.path().join("public/data/metrics.json"),
        );

        let eth = MockChain::new(5_000);
        eth.set_decimals(FT_TOKEN, 18);
        eth.set_total_supply(FT_TOKEN, wad(10_000));
        eth.set_balance(FT_TOKEN, MSIG_WALLET, wad(50));
        eth.set_balance(FT_TOKEN, PUT_MANAGER, wad(500));
        eth.set_balance(FT_TOKEN, FUND, wad(20));
        // Plain burn.
        eth.add_log(MockLog::transfer(FT_TOKEN, FUND, Address::ZERO, wad(7)).at(4_500, tx(1)));
        // Bridge burn: the token also emits a non-Transfer event in the same receipt.
        eth.add_log(MockLog::transfer(FT_TOKEN, FUND, Address::ZERO, wad(100)).at(4_600, tx(2)));
        eth.add_receipt_log(
            tx(2),
            MockLog::event(FT_TOKEN, event_topic("OFTSent(bytes32,uint32,address,uint256,uint256)")),
        );
        eth.add_log(
            MockLog::event(PUT_MANAGER, event_topic(INVESTED_EVENT))
                .with_amount(wad(300))
                .at(4_200, tx(3)),
        );
        eth.add_log(MockLog::transfer(FT_TOKEN, MSIG_WALLET, FUND, wad(20)).at(4_300, tx(4)));

        let sonic = MockChain::new(9_000);
        sonic.set_total_supply(FT_TOKEN, wad(1_000));
        sonic.add_log(MockLog::transfer(FT_TOKEN, FUND, Address::ZERO, wad(3)).at(8_900, tx(5)));

        let network = MockNetwork::new();
        network.route(ETH_RPC, &eth).route(SONIC_RPC, &sonic);

        Self {
            eth,
            sonic,
            network,
            config,
            _dir: dir,
        }
    }

    async fn run(&self) -> supply_indexer::Result<supply_indexer::RunReport> {
        run_once(&self.config, Arc::new(self.network.clone())).await
    }

    fn read(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

#[tokio::test]
async fn first_run_publishes_expected_accounting() {
    let fx = Fixture::new();
    let report = fx.run().await.expect("run succeeds");
    let values = &report.snapshot.values_wei;

    assert_eq!(values.burned, wad(10));
    assert_eq!(values.in_puts, wad(300));
    assert_eq!(values.unallocated, wad(200));
    assert_eq!(values.institutional, wad(20));
    assert_eq!(values.vc_msig, wad(50));
    assert_eq!(values.on_ethereum, wad(10_000 - 50 - 500 - 20));
    assert_eq!(values.on_sonic, wad(1_000));
    assert_eq!(values.tradable, wad(10_430));
    assert_eq!(values.circulating, wad(10_730));
    assert_eq!(values.non_circulating, wad(270));
    // Every token is counted once: total supply across chains plus what was burned.
    assert_eq!(values.final_sum, wad(10_000 + 1_000) + values.burned);

    assert_eq!(report.snapshot.decimals, 18);
    assert_eq!(report.allocated_source, AllocatedSource::EventLedger);
    assert_eq!(
        report.snapshot.meta.allocated_source,
        "events-invested-divested-withdraw"
    );
    assert_eq!(report.snapshot.meta.burned_source, "event-indexed");
    assert_eq!(report.snapshot.latest_blocks["ethereum"], "5000");
    assert_eq!(report.snapshot.latest_blocks["sonic"], "9000");

    let eth_summary = report
        .chains
        .iter()
        .find(|c| c.chain == ChainKey::Ethereum)
        .expect("ethereum summary");
    assert_eq!(eth_summary.excluded_txs, 1);
    assert_eq!(eth_summary.counted_txs, 1);

    // Positive ledger: no probe was needed.
    assert_eq!(fx.eth.calls_to_selector(PUT_MANAGER, FT_ALLOCATED_SELECTOR), 0);

    let state = StateStore::new(&fx.config.state_path).load().expect("state written");
    assert_eq!(state.chain(ChainKey::Ethereum).last_burn_block, Cursor::Checkpoint(5_000));
    assert_eq!(state.chain(ChainKey::Sonic).burned_wei, wad(3));
    assert_eq!(state.ft_alloc.last_block, Cursor::Checkpoint(5_000));
    assert!(state.vc.addresses.contains(&FUND));

    let raw = fx.read(&fx.config.snapshot_path).expect("snapshot written");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(doc["valuesWei"]["burned"], wad(10).to_string());
    assert_eq!(doc["meta"]["invariantTargetWei"], "10000000000000000000000000000");
}

#[tokio::test]
async fn rerun_without_new_blocks_is_idempotent() {
    let fx = Fixture::new();
    let first = fx.run().await.expect("first run");
    let state_after_first = fx.read(&fx.config.state_path).expect("state");
    fx.eth.clear_log_queries();
    fx.sonic.clear_log_queries();

    let second = fx.run().await.expect("second run");

    assert_eq!(second.snapshot.values_wei, first.snapshot.values_wei);
    assert_eq!(second.snapshot.latest_blocks, first.snapshot.latest_blocks);
    assert_eq!(second.snapshot.meta, first.snapshot.meta);
    assert_eq!(fx.read(&fx.config.state_path).expect("state"), state_after_first);
    assert!(fx.eth.log_query_ranges().is_empty());
    assert!(fx.sonic.log_query_ranges().is_empty());
}

#[tokio::test]
async fn cursors_and_totals_only_move_forward() {
    let fx = Fixture::new();
    fx.run().await.expect("first run");
    let before = StateStore::new(&fx.config.state_path).load().expect("state");

    fx.eth.set_head(5_400);
    fx.eth.add_log(MockLog::transfer(FT_TOKEN, FUND, Address::ZERO, wad(1)).at(5_200, tx(9)));
    let other_fund = Address::repeat_byte(0xf2);
    fx.eth.add_log(MockLog::transfer(FT_TOKEN, MSIG_WALLET, other_fund, wad(1)).at(5_300, tx(10)));
    fx.eth.clear_log_queries();

    let report = fx.run().await.expect("second run");
    let after = StateStore::new(&fx.config.state_path).load().expect("state");

    assert_eq!(after.chain(ChainKey::Ethereum).last_burn_block, Cursor::Checkpoint(5_400));
    assert_eq!(after.chain(ChainKey::Ethereum).burned_wei, wad(8));
    assert!(after.vc.addresses.is_superset(&before.vc.addresses));
    assert!(after.vc.addresses.contains(&other_fund));
    assert_eq!(report.snapshot.values_wei.burned, wad(11));
    // Only the new blocks were scanned.
    assert!(fx.eth.log_query_ranges().iter().all(|(from, _)| *from >= 5_001));
}

#[tokio::test]
async fn zero_ledger_falls_back_to_direct_probe() {
    let fx = Fixture::new();
    // Withdraw cancels the investment: ledger resolves to zero.
    fx.eth.add_log(
        MockLog::event(PUT_MANAGER, event_topic("Withdraw(uint256)"))
            .with_amount(wad(300))
            .at(4_250, tx(20)),
    );
    fx.eth.set_call_result(PUT_MANAGER, FT_ALLOCATED_SELECTOR, CallResult::Word(wad(120)));

    let report = fx.run().await.expect("run");
    assert_eq!(report.allocated_source, AllocatedSource::DirectProbe);
    assert_eq!(report.snapshot.values_wei.in_puts, wad(120));
    assert_eq!(fx.eth.calls_to_selector(PUT_MANAGER, FT_ALLOCATED_SELECTOR), 1);
}

#[tokio::test]
async fn failed_chain_aborts_without_touching_documents() {
    let fx = Fixture::new();
    fx.run().await.expect("first run");
    let state_before = fx.read(&fx.config.state_path).expect("state");
    let snapshot_before = fx.read(&fx.config.snapshot_path).expect("snapshot");

    fx.eth.set_head(6_000);
    fx.sonic.fail_endpoint(SONIC_RPC);
    let err = fx.run().await.expect_err("sonic is down");

    assert!(matches!(
        err,
        IndexerError::Pipeline {
            chain: ChainKey::Sonic,
            ..
        }
    ));
    assert_eq!(fx.read(&fx.config.state_path).expect("state"), state_before);
    assert_eq!(fx.read(&fx.config.snapshot_path).expect("snapshot"), snapshot_before);
}

#[tokio::test]
async fn pruned_cold_start_restarts_near_head() {
    let fx = Fixture::new();
    fx.sonic.prune_history_below(8_500);

    let report = fx.run().await.expect("run tolerates pruning on a cold start");
    let sonic = report
        .chains
        .iter()
        .find(|c| c.chain == ChainKey::Sonic)
        .expect("sonic summary");
    assert_eq!(sonic.pruned_restart, Some(8_800));
    assert_eq!(report.snapshot.values_wei.burned, wad(10));
}

#[tokio::test]
async fn corrupt_state_document_is_rejected() {
    let fx = Fixture::new();
    let path = &fx.config.state_path;
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, "{ not json").expect("write");

    let err = fx.run().await.expect_err("corrupt state");
    assert!(matches!(err, IndexerError::State(_)));
    assert!(fx.read(&fx.config.snapshot_path).is_none());
}
