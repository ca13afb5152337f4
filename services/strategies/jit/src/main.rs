//! CLI entry point: `start` runs the pipeline, `simulate` replays recorded
//! fixtures through it, `fixtures` records fresh ones. All configuration is
//! environment-driven; misconfiguration exits non-zero before anything
//! subscribes or signs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::providers::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::Address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jit_liquidity_strategy::bundle::BundleAssembler;
use jit_liquidity_strategy::config::BotConfig;
use jit_liquidity_strategy::coordinator::Coordinator;
use jit_liquidity_strategy::decoder::PoolRegistry;
use jit_liquidity_strategy::executor::{
    ChainView, Executor, RpcChainView, StaticChainView,
};
use jit_liquidity_strategy::fetcher::{
    MockPoolStateSource, PoolStateFetcher, PoolStateSource, RpcPoolStateSource, DEFAULT_TTL,
};
use jit_liquidity_strategy::fixtures::{build_fixture, FixtureFile};
use jit_liquidity_strategy::flash_loan::{
    FlashProvider, LendingPoolProvider, LiquiditySource, MockLiquiditySource,
    ProviderSelector, RpcLiquiditySource, VaultProvider,
};
use jit_liquidity_strategy::mempool::{spawn_block_listener, spawn_pending_tx_listener};
use jit_liquidity_strategy::metrics::{spawn_scrape_endpoint, MetricsSink};
use jit_liquidity_strategy::oracle::StaticPriceOracle;
use jit_liquidity_strategy::relay::{BundleRelay, LocalSimRelay, RelayClient};
use jit_liquidity_strategy::simulator::Simulator;

#[derive(Parser)]
#[command(name = "jit_liquidity", about = "JIT liquidity provisioning bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live pipeline (dry-run unless explicitly acknowledged)
    Start,
    /// Replay recorded fixtures through the simulator
    Simulate,
    /// Record fresh fixtures for the configured pools
    Fixtures,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = BotConfig::from_env().context("loading configuration from environment")?;
    config.validate().context("validating configuration")?;

    match cli.command {
        Command::Start => run_start(config).await,
        Command::Simulate => run_simulate(config).await,
        Command::Fixtures => run_fixtures(config).await,
    }
}

/// The construction graph. Everything is built here and handed down; no
/// component reaches for ambient state.
async fn run_start(config: BotConfig) -> Result<()> {
    info!("🚀 Starting JIT liquidity strategy");
    let simulation = config.network.simulation_mode;
    let live = config.executor.is_live();
    info!(
        simulation,
        dry_run = !live,
        pools = config.pools.len(),
        "mode resolved"
    );

    let metrics = MetricsSink::new();
    spawn_scrape_endpoint(metrics.clone(), config.metrics.prometheus_port);

    let oracle = Arc::new(StaticPriceOracle::new(&config.oracle));
    let registry = PoolRegistry::from_configs(&config.pools)?;
    let weth = Address::from_str(jit_liquidity_strategy::config::known::WETH)
        .expect("known address");

    let http_provider = if simulation {
        None
    } else {
        let provider = Provider::<Http>::try_from(config.network.rpc_url_http.as_str())
            .context("parsing RPC_URL_HTTP")?;
        Some(Arc::new(provider))
    };

    let state_source: Arc<dyn PoolStateSource> = match &http_provider {
        Some(provider) => Arc::new(RpcPoolStateSource::new(provider.clone())),
        None => Arc::new(MockPoolStateSource::default()),
    };
    let fetcher = Arc::new(PoolStateFetcher::new(state_source, DEFAULT_TTL));

    let simulator = Arc::new(Simulator::new(
        config.simulator.clone(),
        oracle.clone(),
        weth,
    ));

    let vault_address = Address::from_str(&config.flash_loan.vault_address)
        .context("parsing vault address")?;
    let lending_address = Address::from_str(&config.flash_loan.lending_pool_address)
        .context("parsing lending pool address")?;
    let liquidity_source: Arc<dyn LiquiditySource> = match &http_provider {
        Some(provider) => Arc::new(RpcLiquiditySource::new(provider.clone(), lending_address)),
        None => Arc::new(MockLiquiditySource::default()),
    };
    let flash_selector = Arc::new(ProviderSelector::new(
        vec![
            FlashProvider::Vault(VaultProvider::new(vault_address, liquidity_source.clone())),
            FlashProvider::LendingPool(LendingPoolProvider::new(
                lending_address,
                liquidity_source,
                Duration::from_secs(config.flash_loan.premium_ttl_secs),
                config.flash_loan.fallback_premium_bps,
            )),
        ],
        oracle.clone(),
        config.flash_loan.vault_max_notional_usd,
    ));

    let wallet = signing_wallet(&config)?;
    let relay_identity = wallet.clone();
    let assembler = Arc::new(BundleAssembler::new(
        wallet,
        config.bundle.clone(),
        config.network.chain_id,
    )?);

    let relay: Arc<dyn BundleRelay> = if live {
        Arc::new(RelayClient::new(
            &config.executor.relay_url,
            relay_identity,
            Duration::from_millis(config.executor.relay_timeout_ms),
        )?)
    } else {
        // Dry-run: bundles never leave the process.
        Arc::new(LocalSimRelay)
    };

    let chain: Arc<dyn ChainView> = match &http_provider {
        Some(provider) => Arc::new(RpcChainView::new(provider.clone())),
        None => Arc::new(StaticChainView { head: 100 }),
    };

    let executor = Arc::new(Executor::new(
        relay,
        chain.clone(),
        config.executor.clone(),
    ));

    let (head_tx, head_rx) = watch::channel(0u64);
    let (intent_tx, intent_rx) = mpsc::channel(1024);

    let coordinator = Coordinator::new(
        registry,
        fetcher,
        simulator,
        flash_selector,
        assembler,
        executor,
        chain,
        metrics.clone(),
        config.clone(),
        head_rx,
    );

    let mut handles = coordinator.start(intent_rx);
    if simulation {
        info!("simulation mode: mempool and head streams idle");
        // Keep the channel alive so the coordinator does not see EOF.
        handles.push(tokio::spawn(async move {
            let _keepalive = (intent_tx, head_tx);
            std::future::pending::<()>().await;
        }));
    } else {
        handles.push(spawn_pending_tx_listener(
            config.network.rpc_url_ws.clone(),
            intent_tx,
            metrics.clone(),
        ));
        handles.push(spawn_block_listener(
            config.network.rpc_url_ws.clone(),
            head_tx,
        ));
    }

    info!("✅ Pipeline running; ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    coordinator.stop();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

/// Replay every fixture in the configured directory and print a JSON report.
async fn run_simulate(config: BotConfig) -> Result<()> {
    let oracle = Arc::new(StaticPriceOracle::new(&config.oracle));
    let weth = Address::from_str(jit_liquidity_strategy::config::known::WETH)
        .expect("known address");
    let simulator = Simulator::new(config.simulator.clone(), oracle.clone(), weth);

    let dir = std::path::Path::new(&config.fixture_dir);
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading fixture directory {}", config.fixture_dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
        .collect();
    entries.sort();
    if entries.is_empty() {
        warn!(dir = %config.fixture_dir, "no fixtures found");
    }

    let mut reports = Vec::new();
    for path in entries {
        let fixture = FixtureFile::load(&path)
            .with_context(|| format!("loading fixture {}", path.display()))?;
        let state = fixture.pool_state()?;
        let floor = config.profit_floor(&fixture.pool.label);
        let mut outcomes = Vec::new();
        for intent in fixture.intents()? {
            let gas_price = intent.effective_priority_fee();
            let verdict = match simulator.simulate(&intent, &state, gas_price, floor) {
                Ok(Some(candidate)) => serde_json::json!({
                    "txHash": format!("{:?}", intent.tx_hash),
                    "outcome": "candidate",
                    "profitUsd": candidate.estimated_profit_usd.to_string(),
                    "tickLower": candidate.position.tick_lower,
                    "tickUpper": candidate.position.tick_upper,
                    "gasUnits": candidate.gas_units,
                }),
                Ok(None) => serde_json::json!({
                    "txHash": format!("{:?}", intent.tx_hash),
                    "outcome": "unprofitable",
                }),
                Err(e) => serde_json::json!({
                    "txHash": format!("{:?}", intent.tx_hash),
                    "outcome": "error",
                    "kind": e.kind().label(),
                }),
            };
            outcomes.push(verdict);
        }
        reports.push(serde_json::json!({
            "fixture": path.display().to_string(),
            "pool": fixture.pool.label,
            "anchorBlock": fixture.state.block,
            "swaps": outcomes,
        }));
    }

    let report = serde_json::json!({
        "fixtureVersion": jit_liquidity_strategy::fixtures::FIXTURE_VERSION,
        "results": reports,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Record one fixture per configured pool at the current head.
async fn run_fixtures(config: BotConfig) -> Result<()> {
    let registry = PoolRegistry::from_configs(&config.pools)?;
    let simulation = config.network.simulation_mode;

    let (source, block): (Arc<dyn PoolStateSource>, u64) = if simulation {
        (Arc::new(MockPoolStateSource::default()), 100)
    } else {
        let provider = Provider::<Http>::try_from(config.network.rpc_url_http.as_str())
            .context("parsing RPC_URL_HTTP")?;
        let provider = Arc::new(provider);
        let chain = RpcChainView::new(provider.clone());
        let head = chain
            .block_number()
            .await
            .map_err(|e| anyhow::anyhow!("reading chain head: {e}"))?;
        (Arc::new(RpcPoolStateSource::new(provider)), head)
    };
    let fetcher = PoolStateFetcher::new(source, DEFAULT_TTL);

    std::fs::create_dir_all(&config.fixture_dir)
        .with_context(|| format!("creating fixture directory {}", config.fixture_dir))?;

    // One anchored batch read: every pool's snapshot comes from the same
    // block, so fixtures recorded together replay against consistent state.
    let pools: Vec<_> = registry.pools().cloned().collect();
    let addresses: Vec<_> = pools.iter().map(|pool| pool.address).collect();
    let states = fetcher
        .get_states(&addresses, block)
        .await
        .with_context(|| format!("fetching pool states at block {block}"))?;

    for (pool, state) in pools.iter().zip(&states) {
        let fixture = build_fixture(pool, state, Vec::new());
        let filename = pool
            .label
            .to_ascii_lowercase()
            .replace(['%', '.'], "")
            .replace('-', "_");
        let path = std::path::Path::new(&config.fixture_dir).join(format!("{filename}.json"));
        fixture.save(&path)?;
        info!(pool = %pool.label, path = %path.display(), "📼 fixture recorded");
    }
    Ok(())
}

/// The signing key. Live mode requires a configured key; dry-run and
/// simulation fall back to a fixed development key so bundles can still be
/// assembled and inspected.
fn signing_wallet(config: &BotConfig) -> Result<LocalWallet> {
    if !config.network.private_key.is_empty() {
        return config
            .network
            .private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("parsing PRIVATE_KEY");
    }
    if config.executor.is_live() {
        anyhow::bail!("live execution requires PRIVATE_KEY");
    }
    Ok(LocalWallet::from_bytes(&[0x2a; 32]).expect("fixed dev key is a valid scalar"))
}
