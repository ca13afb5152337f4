//! End-to-end pipeline scenarios over deterministic doubles: selection
//! across pools, failure isolation, latest-wins mailboxes, the gas cap,
//! dry-run containment, and reproducibility.

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use jit_liquidity_strategy::bundle::BundleAssembler;
use jit_liquidity_strategy::config::{known, BotConfig, PoolConfig};
use jit_liquidity_strategy::coordinator::{Coordinator, RatedCandidate};
use jit_liquidity_strategy::decoder::PoolRegistry;
use jit_liquidity_strategy::executor::{ChainView, ExecutionOutcome, Executor};
use jit_liquidity_strategy::fetcher::{FetcherError, PoolStateFetcher, PoolStateSource};
use jit_liquidity_strategy::flash_loan::{
    FlashCall, FlashProvider, LendingPoolProvider, MockLiquiditySource, ProviderSelection,
    ProviderSelector, VaultProvider,
};
use jit_liquidity_strategy::metrics::MetricsSink;
use jit_liquidity_strategy::oracle::StaticPriceOracle;
use jit_liquidity_strategy::relay::{BundleRelay, RelayError, SimulationReport};
use jit_liquidity_strategy::simulator::Simulator;
use jitter_amm::sqrt_ratio_at_tick;
use jitter_types::{
    Bundle, FailureKind, JitPosition, OpportunityCandidate, PoolId, PoolState, SwapIntent,
};

const ANCHOR: u64 = 100;
const TARGET: u64 = 101;
const GWEI: u64 = 1_000_000_000;

fn dai_pool_config() -> PoolConfig {
    PoolConfig {
        label: "WETH-DAI-0.3%".to_string(),
        address: known::WETH_DAI_030.to_string(),
        token0: known::DAI.to_string(),
        token1: known::WETH.to_string(),
        fee: 3000,
        tick_spacing: 60,
    }
}

fn usdc_pool_config() -> PoolConfig {
    PoolConfig {
        label: "WETH-USDC-0.05%".to_string(),
        address: known::WETH_USDC_005.to_string(),
        token0: known::USDC.to_string(),
        token1: known::WETH.to_string(),
        fee: 500,
        tick_spacing: 10,
    }
}

fn pool_id(config: &PoolConfig) -> PoolId {
    PoolId {
        label: config.label.clone(),
        address: Address::from_str(&config.address).unwrap(),
        token0: Address::from_str(&config.token0).unwrap(),
        token1: Address::from_str(&config.token1).unwrap(),
        fee: config.fee,
        tick_spacing: config.tick_spacing,
    }
}

/// Per-pool deterministic states.
struct MapSource {
    states: HashMap<Address, (i32, u128)>,
}

#[async_trait]
impl PoolStateSource for MapSource {
    async fn fetch(&self, pool: Address, block: u64) -> Result<PoolState, FetcherError> {
        let (tick, liquidity) = self
            .states
            .get(&pool)
            .copied()
            .ok_or_else(|| FetcherError::PoolUnavailable(format!("{pool:?}")))?;
        Ok(PoolState {
            sqrt_price_x96: sqrt_ratio_at_tick(tick).unwrap(),
            tick,
            liquidity,
            unlocked: true,
            block,
            fetched_at: Instant::now(),
        })
    }
}

/// Relay double: counts traffic, succeeds simulations.
struct CountingRelay {
    simulations: AtomicU64,
    submissions: AtomicU64,
}

impl CountingRelay {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            simulations: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl BundleRelay for CountingRelay {
    async fn simulate(&self, _bundle: &Bundle) -> Result<SimulationReport, RelayError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(SimulationReport {
            success: true,
            revert_reason: None,
            gas_used: 420_000,
        })
    }

    async fn submit(&self, _bundle: &Bundle) -> Result<String, RelayError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok("0xbundle".to_string())
    }
}

struct FixedChain;

#[async_trait]
impl ChainView for FixedChain {
    async fn block_number(&self) -> Result<u64, String> {
        Ok(ANCHOR)
    }

    async fn transaction_block(&self, _tx_hash: H256) -> Result<Option<u64>, String> {
        Ok(None)
    }
}

struct Harness {
    coordinator: Arc<Coordinator>,
    metrics: Arc<MetricsSink>,
    relay: Arc<CountingRelay>,
    _head_tx: watch::Sender<u64>,
}

fn harness(mut config: BotConfig) -> Harness {
    let metrics = MetricsSink::new();
    let relay = CountingRelay::new();
    let oracle = Arc::new(StaticPriceOracle::new(&config.oracle));
    let weth = Address::from_str(known::WETH).unwrap();

    config.bundle.jit_contract = "0x000000000000000000000000000000000000dEaD".to_string();

    let mut states = HashMap::new();
    // Deep enough for a 150 ETH swap to clear the impact gate with a
    // meaningful share (see simulator tests for the arithmetic).
    states.insert(
        Address::from_str(known::WETH_DAI_030).unwrap(),
        (0i32, 3_000_000_000_000_000_000_000u128),
    );
    states.insert(
        Address::from_str(known::WETH_USDC_005).unwrap(),
        (0i32, 3_000_000_000_000_000_000_000u128),
    );
    let fetcher = Arc::new(PoolStateFetcher::new(
        Arc::new(MapSource { states }),
        Duration::from_secs(12),
    ));

    let simulator = Arc::new(Simulator::new(
        config.simulator.clone(),
        oracle.clone(),
        weth,
    ));

    let liquidity = Arc::new(MockLiquiditySource::default());
    let flash_selector = Arc::new(ProviderSelector::new(
        vec![
            FlashProvider::Vault(VaultProvider::new(
                Address::from_str(known::VAULT).unwrap(),
                liquidity.clone(),
            )),
            FlashProvider::LendingPool(LendingPoolProvider::new(
                Address::from_str(known::LENDING_POOL).unwrap(),
                liquidity,
                Duration::from_secs(300),
                5,
            )),
        ],
        oracle,
        config.flash_loan.vault_max_notional_usd,
    ));

    let assembler = Arc::new(
        BundleAssembler::new(
            LocalWallet::from_bytes(&[0x01; 32]).unwrap(),
            config.bundle.clone(),
            1,
        )
        .unwrap(),
    );

    let chain: Arc<dyn ChainView> = Arc::new(FixedChain);
    let executor = Arc::new(Executor::new(
        relay.clone(),
        chain.clone(),
        config.executor.clone(),
    ));

    let registry = PoolRegistry::from_configs(&config.pools).unwrap();
    let (head_tx, head_rx) = watch::channel(ANCHOR);

    let coordinator = Coordinator::new(
        registry,
        fetcher,
        simulator,
        flash_selector,
        assembler,
        executor,
        chain,
        metrics.clone(),
        config,
        head_rx,
    );

    Harness {
        coordinator,
        metrics,
        relay,
        _head_tx: head_tx,
    }
}

fn two_pool_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.pools = vec![dai_pool_config(), usdc_pool_config()];
    config
}

fn whale_intent(pool: &PoolConfig, priority_gwei: u64) -> SwapIntent {
    let id = pool_id(pool);
    SwapIntent {
        tx_hash: H256::repeat_byte(0x42),
        sender: Address::repeat_byte(0x03),
        token_in: id.token1,
        token_out: id.token0,
        pool: id,
        amount_in: U256::from(150u64) * U256::exp10(18),
        amount_out_minimum: U256::zero(),
        fee: pool.fee,
        deadline: U256::from(4_000_000_000u64),
        raw_tx: vec![0x02, 0xf8, 0x71, 0x05].into(),
        max_fee_per_gas: U256::from(priority_gwei * GWEI) * 2,
        max_priority_fee_per_gas: U256::from(priority_gwei * GWEI),
        nonce: U256::from(9u64),
    }
}

fn stub_candidate(pool: &PoolConfig, profit_usd: Decimal, gas_units: u64) -> RatedCandidate {
    let id = pool_id(pool);
    let intent = whale_intent(pool, 20);
    RatedCandidate {
        candidate: OpportunityCandidate {
            position: JitPosition {
                pool: id,
                tick_lower: -600,
                tick_upper: 600,
                amount0: U256::exp10(18),
                amount1: U256::exp10(18),
                liquidity: 1_000_000,
                deadline: 4_000_000_000,
            },
            estimated_profit_wei: U256::exp10(16),
            estimated_profit_usd: profit_usd,
            gas_units,
            pool_id: pool.label.clone(),
            anchor_block: ANCHOR,
            created_at_ns: 1,
            intent,
        },
        selection: ProviderSelection {
            provider_name: "vault",
            call: FlashCall {
                to: Address::from_str(known::VAULT).unwrap(),
                data: vec![0x5c].into(),
                value: U256::zero(),
            },
            fee_wei: U256::zero(),
            adjusted_profit_usd: profit_usd,
        },
    }
}

#[tokio::test]
async fn full_pipeline_submits_and_includes_a_whale_swap() {
    let h = harness(two_pool_config());
    let intent = whale_intent(&dai_pool_config(), 20);

    h.coordinator.evaluate_intent(intent, ANCHOR).await;

    assert_eq!(h.metrics.simulated.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.profitable.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.bundles_submitted.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.bundles_included.load(Ordering::SeqCst), 1);
    // Dry-run by default: simulated at the local relay, never submitted.
    assert_eq!(h.relay.submissions.load(Ordering::SeqCst), 0);
    assert_eq!(h.relay.simulations.load(Ordering::SeqCst), 1);
    // Success resets the failure counter.
    let health = h.coordinator.pool_health("WETH-DAI-0.3%").unwrap();
    assert!(health.enabled);
    assert_eq!(health.failure_count, 0);
}

#[tokio::test]
async fn selection_picks_highest_profit_across_pools() {
    // S4: candidates worth $40 / $150 / $80 in one block window.
    let h = harness(two_pool_config());
    let dai = dai_pool_config();
    let usdc = usdc_pool_config();

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator.begin_evaluation(TARGET);
    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(40), 480_000));
    h.coordinator
        .admit_candidate(stub_candidate(&usdc, dec!(150), 480_000));
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(80), 480_000));

    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    let result = h
        .coordinator
        .finish_evaluation(TARGET)
        .await
        .expect("selection runs when the bucket quiesces");

    assert_eq!(result.pool_id, "WETH-USDC-0.05%");
    assert_eq!(result.profit_usd, dec!(150));
    assert!(matches!(
        result.outcome,
        Some(ExecutionOutcome::Included { .. })
    ));
    // The two losers are recorded as evaluated-but-not-selected.
    assert_eq!(h.metrics.not_selected.load(Ordering::SeqCst), 2);
    assert_eq!(h.metrics.bundles_submitted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn at_most_one_bundle_per_target_block() {
    // Invariant 5: a second quiescent bucket for the same target is dropped.
    let h = harness(two_pool_config());
    let dai = dai_pool_config();

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(50), 480_000));
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_some());

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(500), 480_000));
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    assert_eq!(h.metrics.bundles_submitted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deterministic_tie_break_prefers_lower_gas_then_pool_id() {
    let h = harness(two_pool_config());
    let dai = dai_pool_config();
    let usdc = usdc_pool_config();

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&usdc, dec!(75), 480_000));
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(75), 400_000));
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    let result = h.coordinator.finish_evaluation(TARGET).await.unwrap();
    // Equal profit: the cheaper bundle wins.
    assert_eq!(result.pool_id, "WETH-DAI-0.3%");
}

#[tokio::test]
async fn failure_isolation_disables_one_pool_only() {
    // S3: pool A trips its budget, pool B keeps submitting.
    let h = harness(two_pool_config());
    let dai = dai_pool_config();
    let usdc = usdc_pool_config();

    for _ in 0..3 {
        h.coordinator
            .record_pool_failure("WETH-DAI-0.3%", FailureKind::PoolUnavailable);
    }
    let a = h.coordinator.pool_health("WETH-DAI-0.3%").unwrap();
    assert!(!a.enabled);
    assert!(a.cooldown_until_ns > 0);
    let b = h.coordinator.pool_health("WETH-USDC-0.05%").unwrap();
    assert!(b.enabled);

    // A's candidate is ignored even when it is the most profitable.
    h.coordinator.begin_evaluation(TARGET);
    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(900), 480_000));
    h.coordinator
        .admit_candidate(stub_candidate(&usdc, dec!(30), 480_000));
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    let result = h.coordinator.finish_evaluation(TARGET).await.unwrap();
    assert_eq!(result.pool_id, "WETH-USDC-0.05%");
}

#[tokio::test]
async fn inclusion_resets_the_failure_counter() {
    // Invariant 4.
    let h = harness(two_pool_config());
    let dai = dai_pool_config();

    h.coordinator
        .record_pool_failure("WETH-DAI-0.3%", FailureKind::RelayRejected);
    h.coordinator
        .record_pool_failure("WETH-DAI-0.3%", FailureKind::RelayRejected);
    assert_eq!(
        h.coordinator
            .pool_health("WETH-DAI-0.3%")
            .unwrap()
            .failure_count,
        2
    );

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(60), 480_000));
    let result = h.coordinator.finish_evaluation(TARGET).await.unwrap();
    assert!(matches!(
        result.outcome,
        Some(ExecutionOutcome::Included { .. })
    ));
    assert_eq!(
        h.coordinator
            .pool_health("WETH-DAI-0.3%")
            .unwrap()
            .failure_count,
        0
    );
}

#[tokio::test]
async fn latest_wins_mailbox_drops_superseded_intents() {
    // S5: three swaps for one pool before the first evaluation runs.
    let h = harness(two_pool_config());
    let dai = dai_pool_config();

    let mut first = whale_intent(&dai, 20);
    first.tx_hash = H256::repeat_byte(0x01);
    let mut second = whale_intent(&dai, 20);
    second.tx_hash = H256::repeat_byte(0x02);
    let mut third = whale_intent(&dai, 20);
    third.tx_hash = H256::repeat_byte(0x03);

    h.coordinator.offer_intent(first);
    h.coordinator.offer_intent(second);
    h.coordinator.offer_intent(third);

    let taken = h.coordinator.take_intent("WETH-DAI-0.3%").unwrap();
    assert_eq!(taken.tx_hash, H256::repeat_byte(0x03));
    assert!(h.coordinator.take_intent("WETH-DAI-0.3%").is_none());
    assert_eq!(h.metrics.intents_dropped.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gas_cap_blocks_assembly_and_charges_the_pool() {
    // S2: victim priority 30 gwei against a 15 gwei cap.
    let mut config = two_pool_config();
    config.bundle.max_gas_gwei = 15;
    let h = harness(config);
    let dai = dai_pool_config();

    let mut rated = stub_candidate(&dai, dec!(60), 480_000);
    rated.candidate.intent = whale_intent(&dai, 30);

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator.admit_candidate(rated);
    let result = h.coordinator.finish_evaluation(TARGET).await.unwrap();

    assert!(result.bundle_id.is_none());
    assert!(result.outcome.is_none());
    assert_eq!(h.relay.submissions.load(Ordering::SeqCst), 0);
    assert_eq!(h.relay.simulations.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.coordinator
            .pool_health("WETH-DAI-0.3%")
            .unwrap()
            .failure_count,
        1
    );
    assert_eq!(
        h.metrics
            .failure_count("WETH-DAI-0.3%", FailureKind::GasPriceExceedsCap),
        1
    );
}

#[tokio::test]
async fn sealed_blocks_expire_their_buckets() {
    let h = harness(two_pool_config());
    let dai = dai_pool_config();

    h.coordinator.begin_evaluation(TARGET);
    h.coordinator
        .admit_candidate(stub_candidate(&dai, dec!(60), 480_000));
    // The chain sealed past the target before the bucket quiesced.
    h.coordinator.expire_buckets(TARGET);
    assert!(h.coordinator.finish_evaluation(TARGET).await.is_none());
    assert_eq!(h.metrics.bundles_submitted.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.not_selected.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identical_inputs_reproduce_identical_selections() {
    // Invariant 8: two fresh pipelines, same inputs, same decision.
    let run = |priority: u64| async move {
        let h = harness(two_pool_config());
        let intent = whale_intent(&dai_pool_config(), priority);
        h.coordinator.evaluate_intent(intent, ANCHOR).await;
        (
            h.metrics.profitable.load(Ordering::SeqCst),
            h.metrics.bundles_included.load(Ordering::SeqCst),
        )
    };
    let a = run(20).await;
    let b = run(20).await;
    assert_eq!(a, b);
    assert_eq!(a, (1, 1));
}

#[tokio::test]
async fn unprofitable_swaps_do_not_charge_pool_health() {
    let h = harness(two_pool_config());
    let dai = dai_pool_config();
    // 1 ETH: decodes and simulates fine, profit nowhere near the floor.
    let mut intent = whale_intent(&dai, 20);
    intent.amount_in = U256::exp10(18);

    h.coordinator.evaluate_intent(intent, ANCHOR).await;

    assert_eq!(
        h.metrics
            .failure_count("WETH-DAI-0.3%", FailureKind::Unprofitable),
        1
    );
    let health = h.coordinator.pool_health("WETH-DAI-0.3%").unwrap();
    assert!(health.enabled);
    assert_eq!(health.failure_count, 0);
    assert_eq!(h.metrics.bundles_submitted.load(Ordering::SeqCst), 0);
}
