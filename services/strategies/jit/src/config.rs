//! # JIT Strategy Configuration - Environment-Driven Parameters
//!
//! ## Purpose
//!
//! Complete runtime configuration for the JIT liquidity strategy with no
//! hardcoded values in the pipeline: pool roster, simulator thresholds, gas
//! model line items, flash-loan routing, bundle caps, executor mode, and
//! coordinator failure budgets. Environment variables override defaults;
//! validation runs once at startup and misconfiguration is fatal.
//!
//! ## Integration Points
//!
//! - **Input Sources**: process environment (see the variable table in the
//!   operator docs), built-in mainnet pool/token registry
//! - **Output Destinations**: every component receives its section by value
//!   at construction; nothing re-reads the environment afterwards
//! - **Safety**: live trading requires `DRY_RUN=false` AND
//!   `I_UNDERSTAND_LIVE_RISK=true` — the two acknowledgments are checked
//!   independently and never collapse into one flag

use anyhow::{bail, Context, Result};
use ethers::types::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Well-known mainnet addresses the strategy recognizes out of the box.
pub mod known {
    /// Canonical mainnet USDC. Authoritative: fixtures carrying any other
    /// address under the USDC symbol are rejected at load.
    pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    pub const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    pub const DAI: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";

    /// Canonical swap router whose `exactInputSingle` the decoder recognizes.
    pub const SWAP_ROUTER: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564";
    /// Zero-fee vault flash-loan source.
    pub const VAULT: &str = "0xBA12222222228d8Ba445958a75a0704d566BF2C8";
    /// Premium-bearing lending pool flash-loan source.
    pub const LENDING_POOL: &str = "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2";

    pub const WETH_USDC_005: &str = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640";
    pub const WETH_USDC_030: &str = "0x8ad599c3A0ff1De082011EFDDc58f1908eb6e6D8";
    pub const WETH_DAI_030: &str = "0xC2e9F25Be6257c210d7Adf0D4Cd6E3E881ba25f8";
}

/// One monitored pool, as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub label: String,
    pub address: String,
    pub token0: String,
    pub token1: String,
    /// Fee tier in hundredths of a basis point
    pub fee: u32,
    pub tick_spacing: i32,
}

/// Simulator thresholds and the gas line-item model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Half-width of the minted range, in tick spacings
    pub k_range: i32,
    /// Fraction of the swap notional committed as position value, in bps
    pub notional_fraction_bps: u32,
    /// Swaps below this input amount (wei) are filtered at the decoder
    pub min_swap_amount_wei: u128,
    /// Global profit floor in USD
    pub global_min_profit_usd: Decimal,
    /// Per-pool floor overrides keyed by pool label
    pub pool_profit_thresholds_usd: HashMap<String, Decimal>,
    /// Wall-clock budget for one simulation
    pub budget_ms: u64,
    pub gas: GasModelConfig,
}

/// Gas units per bundle line item. All configurable; the totals feed the
/// profit rule, not the signed transactions' gas limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasModelConfig {
    pub flash_borrow: u64,
    pub mint: u64,
    pub burn: u64,
    pub collect: u64,
    pub repay: u64,
    pub overhead: u64,
}

impl GasModelConfig {
    pub fn total_units(&self) -> u64 {
        self.flash_borrow + self.mint + self.burn + self.collect + self.repay + self.overhead
    }
}

/// Flash-loan routing thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashLoanConfig {
    pub vault_address: String,
    pub lending_pool_address: String,
    /// Notionals at or below this (USD) prefer the zero-fee vault
    pub vault_max_notional_usd: Decimal,
    /// TTL for the cached on-chain premium
    pub premium_ttl_secs: u64,
    /// Premium assumed when the on-chain read fails or is stale
    pub fallback_premium_bps: u32,
}

/// Bundle assembly caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Executor contract our pre/post transactions call
    pub jit_contract: String,
    /// Hard cap on the priority fee we will match, in gwei
    pub max_gas_gwei: u64,
    /// Gas limit given to each of our transactions
    pub tx_gas_limit: u64,
}

/// Executor mode and relay parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Simulate-only unless explicitly acknowledged otherwise
    pub dry_run: bool,
    /// Second live-risk acknowledgment; both must be set to go live
    pub live_risk_acknowledged: bool,
    pub relay_url: String,
    /// Per-call relay timeout
    pub relay_timeout_ms: u64,
    /// Blocks to poll for inclusion before declaring a timeout
    pub inclusion_blocks: u64,
}

impl ExecutorConfig {
    /// Live submission needs both negations: `DRY_RUN=false` and the
    /// explicit risk acknowledgment. Anything else simulates.
    pub fn is_live(&self) -> bool {
        !self.dry_run && self.live_risk_acknowledged
    }
}

/// Coordinator failure budgets and rate caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Consecutive failures before a pool is disabled
    pub max_failures: u32,
    /// Cooldown once disabled
    pub cooldown_ms: u64,
}

/// Chain endpoints and identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url_http: String,
    pub rpc_url_ws: String,
    /// Chain the signed transactions are bound to
    pub chain_id: u64,
    /// Hex private key; only the bundle assembler ever touches it
    pub private_key: String,
    /// Deterministic mocks everywhere, no network
    pub simulation_mode: bool,
    /// Sustained loss of both RPC endpoints past this window is fatal
    pub rpc_loss_fatal_secs: u64,
}

/// Metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub prometheus_port: u16,
}

/// Price oracle table (USD per whole token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub eth_price_usd: Decimal,
}

/// Complete configuration for the JIT strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub pools: Vec<PoolConfig>,
    pub simulator: SimulatorConfig,
    pub flash_loan: FlashLoanConfig,
    pub bundle: BundleConfig,
    pub executor: ExecutorConfig,
    pub coordinator: CoordinatorConfig,
    pub network: NetworkConfig,
    pub metrics: MetricsConfig,
    pub oracle: OracleConfig,
    /// Directory fixture records are written to and replayed from
    pub fixture_dir: String,
}

fn builtin_pool(label: &str) -> Option<PoolConfig> {
    match label {
        "WETH-USDC-0.05%" => Some(PoolConfig {
            label: label.to_string(),
            address: known::WETH_USDC_005.to_string(),
            token0: known::USDC.to_string(),
            token1: known::WETH.to_string(),
            fee: 500,
            tick_spacing: 10,
        }),
        "WETH-USDC-0.3%" => Some(PoolConfig {
            label: label.to_string(),
            address: known::WETH_USDC_030.to_string(),
            token0: known::USDC.to_string(),
            token1: known::WETH.to_string(),
            fee: 3000,
            tick_spacing: 60,
        }),
        "WETH-DAI-0.3%" => Some(PoolConfig {
            label: label.to_string(),
            address: known::WETH_DAI_030.to_string(),
            token0: known::DAI.to_string(),
            token1: known::WETH.to_string(),
            fee: 3000,
            tick_spacing: 60,
        }),
        _ => None,
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            pools: vec![builtin_pool("WETH-USDC-0.05%").expect("builtin pool")],
            simulator: SimulatorConfig {
                k_range: 10,
                notional_fraction_bps: 1000, // 10% of swap notional
                min_swap_amount_wei: 100_000_000_000_000_000, // 0.1 ETH
                global_min_profit_usd: dec!(20),
                pool_profit_thresholds_usd: HashMap::new(),
                budget_ms: 1500,
                gas: GasModelConfig {
                    flash_borrow: 50_000,
                    mint: 150_000,
                    burn: 120_000,
                    collect: 80_000,
                    repay: 30_000,
                    overhead: 50_000,
                },
            },
            flash_loan: FlashLoanConfig {
                vault_address: known::VAULT.to_string(),
                lending_pool_address: known::LENDING_POOL.to_string(),
                vault_max_notional_usd: dec!(50000),
                premium_ttl_secs: 300,
                fallback_premium_bps: 5,
            },
            bundle: BundleConfig {
                jit_contract: "0x0000000000000000000000000000000000000000".to_string(),
                max_gas_gwei: 300,
                tx_gas_limit: 600_000,
            },
            executor: ExecutorConfig {
                dry_run: true,
                live_risk_acknowledged: false,
                relay_url: "https://relay.flashbots.net".to_string(),
                relay_timeout_ms: 1000,
                inclusion_blocks: 2,
            },
            coordinator: CoordinatorConfig {
                max_failures: 3,
                cooldown_ms: 300_000, // 5 minutes
            },
            network: NetworkConfig {
                rpc_url_http: String::new(),
                rpc_url_ws: String::new(),
                chain_id: 1,
                private_key: String::new(),
                simulation_mode: false,
                rpc_loss_fatal_secs: 60,
            },
            metrics: MetricsConfig {
                prometheus_port: 9464,
            },
            oracle: OracleConfig {
                eth_price_usd: dec!(2500),
            },
            fixture_dir: "./fixtures".to_string(),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(ids) = std::env::var("POOL_IDS") {
            let mut pools = Vec::new();
            for label in ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let pool = builtin_pool(label)
                    .with_context(|| format!("unknown pool id in POOL_IDS: {label}"))?;
                pools.push(pool);
            }
            if !pools.is_empty() {
                config.pools = pools;
            }
        }

        if let Ok(url) = std::env::var("RPC_URL_HTTP") {
            config.network.rpc_url_http = url;
        }
        if let Ok(url) = std::env::var("RPC_URL_WS") {
            config.network.rpc_url_ws = url;
        }
        if let Ok(key) = std::env::var("PRIVATE_KEY") {
            config.network.private_key = key;
        }
        if let Ok(addr) = std::env::var("JIT_CONTRACT_ADDRESS") {
            config.bundle.jit_contract = addr;
        }
        if let Ok(url) = std::env::var("RELAY_URL") {
            config.executor.relay_url = url;
        }

        if let Ok(floor) = std::env::var("GLOBAL_MIN_PROFIT_USD") {
            config.simulator.global_min_profit_usd = floor
                .parse::<Decimal>()
                .context("GLOBAL_MIN_PROFIT_USD must be a decimal")?;
        }
        for pool in &config.pools {
            let key = format!(
                "POOL_PROFIT_THRESHOLD_USD__{}",
                pool.label
                    .replace('%', "")
                    .replace(['-', '.'], "_")
                    .to_ascii_uppercase()
            );
            if let Ok(value) = std::env::var(&key) {
                let floor = value
                    .parse::<Decimal>()
                    .with_context(|| format!("{key} must be a decimal"))?;
                config
                    .simulator
                    .pool_profit_thresholds_usd
                    .insert(pool.label.clone(), floor);
            }
        }

        if let Ok(v) = std::env::var("POOL_MAX_FAILURES") {
            config.coordinator.max_failures =
                v.parse().context("POOL_MAX_FAILURES must be an integer")?;
        }
        if let Ok(v) = std::env::var("POOL_COOLDOWN_MS") {
            config.coordinator.cooldown_ms =
                v.parse().context("POOL_COOLDOWN_MS must be an integer")?;
        }
        if let Ok(v) = std::env::var("MAX_GAS_GWEI") {
            config.bundle.max_gas_gwei = v.parse().context("MAX_GAS_GWEI must be an integer")?;
        }
        if let Ok(v) = std::env::var("MIN_SWAP_AMOUNT_WEI") {
            config.simulator.min_swap_amount_wei =
                v.parse().context("MIN_SWAP_AMOUNT_WEI must be an integer")?;
        }

        if let Ok(v) = std::env::var("DRY_RUN") {
            config.executor.dry_run = v.to_lowercase() != "false";
        }
        config.executor.live_risk_acknowledged = std::env::var("I_UNDERSTAND_LIVE_RISK")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        if let Ok(v) = std::env::var("SIMULATION_MODE") {
            config.network.simulation_mode = v.to_lowercase() == "true";
        }
        if let Ok(v) = std::env::var("PROMETHEUS_PORT") {
            config.metrics.prometheus_port =
                v.parse().context("PROMETHEUS_PORT must be a port number")?;
        }
        if let Ok(v) = std::env::var("ETH_PRICE_USD") {
            config.oracle.eth_price_usd =
                v.parse().context("ETH_PRICE_USD must be a decimal")?;
        }
        if let Ok(dir) = std::env::var("FIXTURE_DIR") {
            config.fixture_dir = dir;
        }

        Ok(config)
    }

    /// Validate configuration parameters. Called once at startup; failures
    /// here exit the process.
    pub fn validate(&self) -> Result<()> {
        if self.pools.is_empty() {
            bail!("at least one pool must be configured");
        }
        for pool in &self.pools {
            Address::from_str(&pool.address)
                .with_context(|| format!("invalid pool address for {}", pool.label))?;
            if pool.tick_spacing <= 0 {
                bail!("tick_spacing must be positive for {}", pool.label);
            }
        }

        if self.simulator.k_range <= 0 {
            bail!("k_range must be positive");
        }
        if self.simulator.notional_fraction_bps == 0
            || self.simulator.notional_fraction_bps > 10_000
        {
            bail!("notional_fraction_bps must be in (0, 10000]");
        }
        if self.simulator.global_min_profit_usd < Decimal::ZERO {
            bail!("GLOBAL_MIN_PROFIT_USD must be non-negative");
        }

        if self.bundle.max_gas_gwei == 0 {
            bail!("MAX_GAS_GWEI must be positive");
        }
        Address::from_str(&self.bundle.jit_contract).context("invalid JIT_CONTRACT_ADDRESS")?;

        if self.coordinator.max_failures == 0 {
            bail!("POOL_MAX_FAILURES must be positive");
        }

        let live = self.executor.is_live();
        if !self.executor.dry_run && !self.executor.live_risk_acknowledged {
            bail!("DRY_RUN=false requires I_UNDERSTAND_LIVE_RISK=true");
        }
        if live && !self.network.simulation_mode {
            if self.network.rpc_url_http.is_empty() || self.network.rpc_url_ws.is_empty() {
                bail!("RPC_URL_HTTP and RPC_URL_WS are required for live execution");
            }
            if self.network.private_key.is_empty() {
                bail!("PRIVATE_KEY is required for live execution");
            }
        }

        Ok(())
    }

    /// Profit floor for a pool: the larger of the global floor and any
    /// per-pool override.
    pub fn profit_floor(&self, pool_label: &str) -> Decimal {
        let global = self.simulator.global_min_profit_usd;
        match self.simulator.pool_profit_thresholds_usd.get(pool_label) {
            Some(overridden) => global.max(*overridden),
            None => global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.executor.dry_run);
        assert!(!config.executor.is_live());
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = BotConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: BotConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            config.simulator.global_min_profit_usd,
            back.simulator.global_min_profit_usd
        );
        assert_eq!(config.bundle.max_gas_gwei, back.bundle.max_gas_gwei);
    }

    #[test]
    fn live_requires_both_acknowledgments() {
        let mut config = BotConfig::default();
        config.executor.dry_run = false;
        config.executor.live_risk_acknowledged = false;
        assert!(config.validate().is_err());

        config.executor.live_risk_acknowledged = true;
        config.network.simulation_mode = true;
        assert!(config.validate().is_ok());
        assert!(config.executor.is_live());

        // The acknowledgment alone must not flip anything.
        let mut ack_only = BotConfig::default();
        ack_only.executor.live_risk_acknowledged = true;
        assert!(!ack_only.executor.is_live());
    }

    #[test]
    fn profit_floor_takes_the_larger_of_global_and_override() {
        let mut config = BotConfig::default();
        config
            .simulator
            .pool_profit_thresholds_usd
            .insert("WETH-USDC-0.05%".to_string(), dec!(35));
        assert_eq!(config.profit_floor("WETH-USDC-0.05%"), dec!(35));
        assert_eq!(config.profit_floor("WETH-DAI-0.3%"), dec!(20));

        config
            .simulator
            .pool_profit_thresholds_usd
            .insert("WETH-DAI-0.3%".to_string(), dec!(5));
        // An override below the global floor does not lower it.
        assert_eq!(config.profit_floor("WETH-DAI-0.3%"), dec!(20));
    }

    #[test]
    fn gas_model_totals_line_items() {
        let gas = BotConfig::default().simulator.gas;
        assert_eq!(gas.total_units(), 480_000);
    }
}
