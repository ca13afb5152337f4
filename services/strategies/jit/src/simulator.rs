//! # JIT Simulator - Candidate Construction and Profit Prediction
//!
//! ## Purpose
//!
//! Turns a decoded swap intent plus an anchored pool snapshot into a costed
//! opportunity candidate: a spacing-aligned tick range around the current
//! price, the token amounts funding it, the fees the position would capture
//! from the victim swap, and the net profit after the gas line items. Emits
//! a candidate only when the USD profit clears the pool's floor.
//!
//! ## Integration Points
//!
//! - **Input Sources**: `SwapIntent` from the decoder, `PoolState` from the
//!   fetcher, gas price from the intent, thresholds from configuration
//! - **Output Destinations**: the coordinator's per-target-block bucket;
//!   flash-loan fees are applied afterwards by the provider selector
//! - **Validity gate**: the fee prediction assumes the swap stays inside the
//!   minted range and is reported as a conservative lower bound; candidates
//!   whose predicted impact reaches half the range width are rejected
//!
//! ## Performance Profile
//!
//! - Pure math over one snapshot; no I/O, cancellable from outside
//! - Wall-clock budget enforced by the coordinator (default 1.5 s)

use crate::config::SimulatorConfig;
use crate::oracle::PriceOracle;
use ethers::types::{Address, U256};
use jitter_amm::tick_math;
use jitter_amm::{
    amounts_for_liquidity, fee_capture, liquidity_for_amounts, price_impact_fraction,
    range_width_fraction, select_range, sqrt_ratio_at_tick, AmmError,
};
use jitter_types::{FailureKind, JitPosition, OpportunityCandidate, PoolState, SwapIntent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error)]
pub enum SimulatorError {
    #[error("pool snapshot unusable for simulation")]
    PoolUnavailable,

    #[error("tick range degenerate after clamping")]
    TickRangeDegenerate,

    #[error("swap below minimum notional")]
    SwapTooSmall,

    #[error("predicted impact {impact} invalidates the in-range bound (half-width {half_width})")]
    ImpactExceedsRange { impact: Decimal, half_width: Decimal },

    #[error("amm math: {0}")]
    Math(#[from] AmmError),
}

impl SimulatorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SimulatorError::PoolUnavailable => FailureKind::PoolUnavailable,
            SimulatorError::TickRangeDegenerate => FailureKind::TickRangeDegenerate,
            SimulatorError::SwapTooSmall => FailureKind::SwapTooSmall,
            SimulatorError::ImpactExceedsRange { .. } => FailureKind::ImpactExceedsRange,
            SimulatorError::Math(_) => FailureKind::TickRangeDegenerate,
        }
    }
}

/// Stateless except for configuration and the injected oracle; every output
/// is a pure function of its inputs, which is what makes dry-run replays
/// reproducible.
pub struct Simulator {
    config: SimulatorConfig,
    oracle: Arc<dyn PriceOracle>,
    weth: Address,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, oracle: Arc<dyn PriceOracle>, weth: Address) -> Self {
        Self {
            config,
            oracle,
            weth,
        }
    }

    /// Evaluate one intent against its anchor snapshot.
    ///
    /// `Ok(None)` is the Unprofitable outcome: everything computed, the
    /// floor not met. Errors are conditions the coordinator charges against
    /// the pool's health.
    pub fn simulate(
        &self,
        intent: &SwapIntent,
        state: &PoolState,
        gas_price_wei: U256,
        profit_floor_usd: Decimal,
    ) -> Result<Option<OpportunityCandidate>, SimulatorError> {
        if !state.is_ready() {
            return Err(SimulatorError::PoolUnavailable);
        }
        if intent.amount_in < U256::from(self.config.min_swap_amount_wei) {
            return Err(SimulatorError::SwapTooSmall);
        }

        let spacing = intent.pool.tick_spacing;
        let (tick_lower, tick_upper) =
            select_range(state.tick, spacing, self.config.k_range).map_err(|e| match e {
                AmmError::TickRangeDegenerate { .. } => SimulatorError::TickRangeDegenerate,
                other => SimulatorError::Math(other),
            })?;

        // The in-range fee bound only holds while the swap cannot push the
        // price out of our range.
        let impact = price_impact_fraction(intent.amount_in, state.liquidity)?;
        let half_width = range_width_fraction(tick_lower, tick_upper) / dec!(2);
        if impact >= half_width {
            return Err(SimulatorError::ImpactExceedsRange { impact, half_width });
        }

        let position = self.plan_position(intent, state, tick_lower, tick_upper)?;

        let captured = fee_capture(
            intent.amount_in,
            intent.fee,
            position.liquidity,
            state.liquidity,
        )?;
        let captured_usd = self.oracle.to_usd(intent.token_in, captured);

        let gas_units = self.config.gas.total_units();
        let gas_cost_wei = gas_price_wei
            .checked_mul(U256::from(gas_units))
            .unwrap_or(U256::MAX);
        let gas_cost_usd = self.oracle.to_usd(self.weth, gas_cost_wei);

        // Flash-loan fee is applied by the provider selector; the default
        // route (vault) is free, so this is the candidate's upper bound.
        let net_usd = captured_usd - gas_cost_usd;

        trace!(
            pool = %intent.pool,
            captured = %captured_usd,
            gas = %gas_cost_usd,
            net = %net_usd,
            floor = %profit_floor_usd,
            "simulated candidate"
        );

        if net_usd < profit_floor_usd {
            return Ok(None);
        }

        let created_at_ns = now_ns();
        let candidate = OpportunityCandidate {
            estimated_profit_wei: self.oracle.usd_to_wei(self.weth, net_usd),
            estimated_profit_usd: net_usd,
            gas_units,
            pool_id: intent.pool.label.clone(),
            anchor_block: state.block,
            created_at_ns,
            position,
            intent: intent.clone(),
        };
        debug!(
            pool = %candidate.pool_id,
            profit_usd = %candidate.estimated_profit_usd,
            target_block = candidate.target_block(),
            "profitable candidate"
        );
        Ok(Some(candidate))
    }

    /// Size the position: a configured fraction of the swap notional, split
    /// evenly in value across the two sides of the current price, then
    /// converted to the maximum liquidity both sides can fund.
    fn plan_position(
        &self,
        intent: &SwapIntent,
        state: &PoolState,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Result<JitPosition, SimulatorError> {
        let sqrt_price = state.sqrt_price_x96;
        let sqrt_lower = sqrt_ratio_at_tick(tick_lower)?;
        let sqrt_upper = sqrt_ratio_at_tick(tick_upper)?;

        let notional = tick_math::mul_div(
            intent.amount_in,
            U256::from(self.config.notional_fraction_bps),
            U256::from(10_000u64),
        )?;
        let half = notional / 2;

        // Express each half in its side's token units at the anchor price.
        let token0_is_input = intent.token_in == intent.pool.token0;
        let (amount0_target, amount1_target) = if token0_is_input {
            (half, convert_0_to_1(half, sqrt_price)?)
        } else {
            (convert_1_to_0(half, sqrt_price)?, half)
        };

        let liquidity = liquidity_for_amounts(
            sqrt_price,
            sqrt_lower,
            sqrt_upper,
            amount0_target,
            amount1_target,
        )?;
        if liquidity == 0 {
            return Err(SimulatorError::SwapTooSmall);
        }
        let (amount0, amount1) =
            amounts_for_liquidity(sqrt_price, sqrt_lower, sqrt_upper, liquidity)?;

        Ok(JitPosition {
            pool: intent.pool.clone(),
            tick_lower,
            tick_upper,
            amount0,
            amount1,
            liquidity,
            // The mint must land in the same block as the victim swap, so
            // the victim's own deadline is the natural bound. Keeping it
            // input-derived also keeps replays bit-stable.
            deadline: intent.deadline.low_u64(),
        })
    }

}

/// token1 value of a token0 amount at `sqrt_price`, two-step to stay in 512
/// bits: amount * sqrtP / Q96, twice.
fn convert_0_to_1(amount0: U256, sqrt_price: U256) -> Result<U256, AmmError> {
    let q96 = tick_math::q96();
    let step = tick_math::mul_div(amount0, sqrt_price, q96)?;
    tick_math::mul_div(step, sqrt_price, q96)
}

/// token0 value of a token1 amount at `sqrt_price`.
fn convert_1_to_0(amount1: U256, sqrt_price: U256) -> Result<U256, AmmError> {
    let q96 = tick_math::q96();
    let step = tick_math::mul_div(amount1, q96, sqrt_price)?;
    tick_math::mul_div(step, q96, sqrt_price)
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{known, BotConfig, OracleConfig};
    use crate::oracle::StaticPriceOracle;
    use ethers::types::H256;
    use jitter_types::PoolId;
    use std::str::FromStr;
    use std::time::Instant;

    const GWEI_20: u64 = 20_000_000_000;

    fn usdc_pool() -> PoolId {
        PoolId {
            label: "WETH-USDC-0.05%".to_string(),
            address: Address::from_str(known::WETH_USDC_005).unwrap(),
            token0: Address::from_str(known::USDC).unwrap(),
            token1: Address::from_str(known::WETH).unwrap(),
            fee: 500,
            tick_spacing: 10,
        }
    }

    fn dai_pool() -> PoolId {
        PoolId {
            label: "WETH-DAI-0.3%".to_string(),
            address: Address::from_str(known::WETH_DAI_030).unwrap(),
            token0: Address::from_str(known::DAI).unwrap(),
            token1: Address::from_str(known::WETH).unwrap(),
            fee: 3000,
            tick_spacing: 60,
        }
    }

    fn intent_for(pool: PoolId, amount_in: U256) -> SwapIntent {
        let token_in = pool.token1; // WETH in
        let token_out = pool.token0;
        let fee = pool.fee;
        SwapIntent {
            tx_hash: H256::repeat_byte(0x42),
            sender: Address::repeat_byte(0x01),
            pool,
            token_in,
            token_out,
            amount_in,
            amount_out_minimum: U256::zero(),
            fee,
            deadline: U256::from(4_000_000_000u64),
            raw_tx: vec![0xde, 0xad].into(),
            max_fee_per_gas: U256::from(GWEI_20),
            max_priority_fee_per_gas: U256::from(2_000_000_000u64),
            nonce: U256::zero(),
        }
    }

    fn state_at(tick: i32, liquidity: u128) -> PoolState {
        PoolState {
            sqrt_price_x96: sqrt_ratio_at_tick(tick).unwrap(),
            tick,
            liquidity,
            unlocked: true,
            block: 100,
            fetched_at: Instant::now(),
        }
    }

    fn simulator() -> Simulator {
        let config = BotConfig::default();
        let oracle = Arc::new(StaticPriceOracle::new(&OracleConfig {
            eth_price_usd: dec!(2500),
        }));
        Simulator::new(
            config.simulator,
            oracle,
            Address::from_str(known::WETH).unwrap(),
        )
    }

    // A 150 ETH swap through a 0.3% pool sitting at tick 0 with 20x the
    // swap's liquidity in range: ~7.8% share of a 0.45 ETH fee, about $88
    // captured against $24 of gas at 20 gwei.
    fn profitable_setup() -> (SwapIntent, PoolState) {
        let intent = intent_for(dai_pool(), U256::from(150u64) * U256::exp10(18));
        let state = state_at(0, 3_000_000_000_000_000_000_000u128);
        (intent, state)
    }

    #[test]
    fn range_selection_matches_the_anchor_tick() {
        // Pool anchored at tick 201240, spacing 10, k_range 10. Deep
        // liquidity keeps the impact gate quiet; the floor is lowered so the
        // geometry is observable regardless of profitability.
        let sim = simulator();
        let state = state_at(201240, 10_000_000_000_000_000_000_000u128);
        let intent = intent_for(usdc_pool(), U256::exp10(19)); // 10 ETH

        let candidate = sim
            .simulate(
                &intent,
                &state,
                U256::from(GWEI_20),
                dec!(-1000000000),
            )
            .unwrap()
            .expect("floor disabled, candidate always emitted");

        assert_eq!(candidate.position.tick_lower, 201140);
        assert_eq!(candidate.position.tick_upper, 201340);
        assert!(candidate.position.liquidity > 0);
        assert_eq!(candidate.gas_units, 480_000);
        assert_eq!(candidate.anchor_block, 100);
        assert_eq!(candidate.target_block(), 101);
    }

    #[test]
    fn whale_swap_clears_the_default_floor() {
        let sim = simulator();
        let (intent, state) = profitable_setup();

        let candidate = sim
            .simulate(&intent, &state, U256::from(GWEI_20), dec!(20))
            .unwrap()
            .expect("candidate clears the floor");

        assert!(candidate.estimated_profit_usd >= dec!(20));
        assert!(candidate.estimated_profit_wei > U256::zero());
        assert_eq!(candidate.position.tick_lower, -600);
        assert_eq!(candidate.position.tick_upper, 600);
    }

    #[test]
    fn emitted_candidates_always_clear_the_floor() {
        let sim = simulator();
        let state = state_at(0, 3_000_000_000_000_000_000_000u128);
        for whole_eth in [1u64, 10, 50, 150, 400] {
            let amount = U256::from(whole_eth) * U256::exp10(18);
            let intent = intent_for(dai_pool(), amount);
            if let Ok(Some(candidate)) =
                sim.simulate(&intent, &state, U256::from(GWEI_20), dec!(20))
            {
                assert!(candidate.estimated_profit_usd >= dec!(20));
                assert_eq!(candidate.position.tick_lower % 60, 0);
                assert_eq!(candidate.position.tick_upper % 60, 0);
                assert!(candidate.position.tick_lower < candidate.position.tick_upper);
            }
        }
    }

    #[test]
    fn small_swap_is_unprofitable_not_an_error() {
        let sim = simulator();
        let state = state_at(0, 3_000_000_000_000_000_000_000u128);
        // 1 ETH is far above the dust filter but nowhere near the floor.
        let intent = intent_for(dai_pool(), U256::exp10(18));
        let outcome = sim
            .simulate(&intent, &state, U256::from(GWEI_20), dec!(20))
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn dust_swap_is_rejected_not_simulated() {
        let sim = simulator();
        let (_, state) = profitable_setup();
        let intent = intent_for(dai_pool(), U256::exp10(15));
        assert!(matches!(
            sim.simulate(&intent, &state, U256::one(), dec!(20)),
            Err(SimulatorError::SwapTooSmall)
        ));
    }

    #[test]
    fn oversized_swap_trips_the_impact_gate() {
        let sim = simulator();
        // Thin pool: 150 ETH dwarfs in-range liquidity.
        let state = state_at(0, 1_000_000_000_000u128);
        let intent = intent_for(dai_pool(), U256::from(150u64) * U256::exp10(18));
        assert!(matches!(
            sim.simulate(&intent, &state, U256::one(), dec!(20)),
            Err(SimulatorError::ImpactExceedsRange { .. })
        ));
    }

    #[test]
    fn same_inputs_reproduce_the_same_candidate() {
        let sim = simulator();
        let (intent, state) = profitable_setup();
        let a = sim
            .simulate(&intent, &state, U256::from(GWEI_20), dec!(20))
            .unwrap()
            .unwrap();
        let b = sim
            .simulate(&intent, &state, U256::from(GWEI_20), dec!(20))
            .unwrap()
            .unwrap();
        assert_eq!(a.position, b.position);
        assert_eq!(a.estimated_profit_usd, b.estimated_profit_usd);
        assert_eq!(a.gas_units, b.gas_units);
    }

    #[test]
    fn locked_pool_is_unavailable() {
        let sim = simulator();
        let (intent, mut state) = profitable_setup();
        state.unlocked = false;
        assert!(matches!(
            sim.simulate(&intent, &state, U256::one(), dec!(20)),
            Err(SimulatorError::PoolUnavailable)
        ));
    }
}
