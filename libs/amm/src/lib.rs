//! # Jitter AMM Library - Concentrated Liquidity Mathematics
//!
//! ## Purpose
//!
//! Exact mathematics for Uniswap-V3-style concentrated liquidity pools:
//! canonical Q64.96 tick-to-price conversion, amount/liquidity inversion via
//! 512-bit intermediate arithmetic, JIT range planning, fee-capture share
//! prediction, and the conservative price-impact bound that gates it.
//!
//! ## Integration Points
//!
//! - **Input Sources**: pool snapshots from the state fetcher, swap sizes from
//!   decoded intents, range parameters from strategy configuration
//! - **Output Destinations**: the simulator (position planning and profit
//!   prediction) and its property tests
//! - **Precision**: tick-to-ratio matches the canonical pool contract
//!   bit-for-bit; fee-share prediction is only faithful if it does
//!
//! ## Performance Profile
//!
//! - All functions are pure and allocation-free on the hot path
//! - Tick conversion is a fixed 20-step multiply ladder, no loops over ticks
//! - Amount inversion uses `U256::full_mul` (512-bit) — no silent overflow

pub mod jit;
pub mod liquidity_math;
pub mod tick_math;

pub use jit::{fee_capture, price_impact_fraction, range_width_fraction, select_range};
pub use liquidity_math::{
    amounts_for_liquidity, liquidity_for_amount0, liquidity_for_amount1, liquidity_for_amounts,
};
pub use tick_math::{sqrt_ratio_at_tick, MAX_TICK, MIN_TICK};

use thiserror::Error;

/// Failures from AMM math. All variants are programmer-visible conditions,
/// not chain errors; the simulator maps them onto its own error kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmmError {
    #[error("tick {0} outside the valid range")]
    TickOutOfBounds(i32),

    #[error("tick range degenerate after clamping: [{lower}, {upper}]")]
    TickRangeDegenerate { lower: i32, upper: i32 },

    #[error("sqrt price bounds inverted or equal")]
    InvalidPriceBounds,

    #[error("zero liquidity")]
    ZeroLiquidity,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}
