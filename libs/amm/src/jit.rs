//! JIT-specific planning math: range selection, fee-capture share, and the
//! price-impact bound that decides whether the in-range assumption holds.

use crate::tick_math::{ceil_to_spacing, floor_to_spacing, mul_div, MAX_TICK, MIN_TICK};
use crate::AmmError;
use ethers::types::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Ticks are 1.0001-spaced in price; one tick is one basis point to first
/// order, which is all the conservative bound needs.
const TICK_PRICE_FRACTION: Decimal = dec!(0.0001);

/// Symmetric spacing-aligned range around the current tick.
///
/// `half_width = k_range * spacing`; the lower bound floors to the grid, the
/// upper bound ceils, and both clamp to the aligned ticks nearest the global
/// bounds. A range that collapses after clamping is degenerate.
pub fn select_range(tick: i32, spacing: i32, k_range: i32) -> Result<(i32, i32), AmmError> {
    debug_assert!(spacing > 0 && k_range > 0);
    let half_width = k_range * spacing;
    let mut lower = floor_to_spacing(tick - half_width, spacing);
    let mut upper = ceil_to_spacing(tick + half_width, spacing);

    let min_aligned = ceil_to_spacing(MIN_TICK, spacing);
    let max_aligned = floor_to_spacing(MAX_TICK, spacing);
    lower = lower.max(min_aligned);
    upper = upper.min(max_aligned);

    if upper <= lower {
        return Err(AmmError::TickRangeDegenerate { lower, upper });
    }
    Ok((lower, upper))
}

/// Fees our position captures from the victim swap.
///
/// `amount_in * fee_tier * L_ours / (L_pool + L_ours)`, evaluated at the
/// anchor tick. Valid only while the swap stays inside our range; callers
/// gate on [`price_impact_fraction`] first.
pub fn fee_capture(
    amount_in: U256,
    fee_hundredths_bps: u32,
    liquidity_ours: u128,
    liquidity_pool: u128,
) -> Result<U256, AmmError> {
    if liquidity_ours == 0 {
        return Err(AmmError::ZeroLiquidity);
    }
    let fee_amount = mul_div(
        amount_in,
        U256::from(fee_hundredths_bps),
        U256::from(1_000_000u64),
    )?;
    let combined = U256::from(liquidity_pool)
        .checked_add(U256::from(liquidity_ours))
        .ok_or(AmmError::Overflow("liquidity sum"))?;
    mul_div(fee_amount, U256::from(liquidity_ours), combined)
}

/// Conservative price-impact approximation `amount_in / L_pool`, clamped to
/// 10%. Coarse by design: it only decides whether the in-range fee bound is
/// trustworthy.
pub fn price_impact_fraction(amount_in: U256, liquidity_pool: u128) -> Result<Decimal, AmmError> {
    const CLAMP: Decimal = dec!(0.10);
    const CLAMP_PPM: u64 = 100_000;
    if liquidity_pool == 0 {
        return Err(AmmError::ZeroLiquidity);
    }
    // Parts-per-million keeps the ratio exact and deterministic; anything at
    // or beyond the clamp needs no further resolution.
    let ppm = mul_div(
        amount_in,
        U256::from(1_000_000u64),
        U256::from(liquidity_pool),
    )?;
    if ppm >= U256::from(CLAMP_PPM) {
        return Ok(CLAMP);
    }
    Ok(Decimal::new(ppm.as_u64() as i64, 6))
}

/// Width of a tick range as a price fraction, first order.
pub fn range_width_fraction(tick_lower: i32, tick_upper: i32) -> Decimal {
    Decimal::from(tick_upper - tick_lower) * TICK_PRICE_FRACTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn symmetric_range_around_reference_tick() {
        // tickSpacing 10, k_range 10: +/- 100 ticks, already aligned.
        let (lower, upper) = select_range(201240, 10, 10).unwrap();
        assert_eq!(lower, 201140);
        assert_eq!(upper, 201340);
    }

    #[test]
    fn unaligned_tick_widens_outward() {
        let (lower, upper) = select_range(201245, 10, 10).unwrap();
        assert_eq!(lower, 201140);
        assert_eq!(upper, 201350);
        assert!(lower <= 201245 - 100 && upper >= 201245 + 100);
    }

    #[test]
    fn clamped_range_at_max_tick_stays_aligned() {
        let (lower, upper) = select_range(MAX_TICK - 5, 60, 10).unwrap();
        assert_eq!(lower % 60, 0);
        assert_eq!(upper % 60, 0);
        assert!(upper <= MAX_TICK);
        assert!(lower < upper);
    }

    #[test]
    fn fee_capture_scales_with_share() {
        let amount_in = U256::exp10(19); // 10 ETH
        let full = fee_capture(amount_in, 500, 1_000_000, 0).unwrap();
        // Sole LP captures the whole 0.05% fee.
        assert_eq!(full, amount_in * 500 / 1_000_000);

        let half = fee_capture(amount_in, 500, 1_000_000, 1_000_000).unwrap();
        assert_eq!(half, full / 2);
    }

    #[test]
    fn impact_clamps_at_ten_percent() {
        let impact = price_impact_fraction(U256::exp10(30), 1_000u128).unwrap();
        assert_eq!(impact, dec!(0.10));
    }

    #[test]
    fn impact_tracks_ratio_below_clamp() {
        let impact = price_impact_fraction(U256::from(5u64), 1_000u128).unwrap();
        assert_eq!(impact, dec!(0.005));
    }

    proptest! {
        #[test]
        fn selected_ranges_always_satisfy_position_invariants(
            tick in MIN_TICK..=MAX_TICK,
            spacing in prop::sample::select(vec![1i32, 10, 60, 200]),
            k_range in 1i32..=50,
        ) {
            let (lower, upper) = select_range(tick, spacing, k_range).unwrap();
            prop_assert!(lower < upper);
            prop_assert_eq!(lower % spacing, 0);
            prop_assert_eq!(upper % spacing, 0);
            prop_assert!(lower >= MIN_TICK && upper <= MAX_TICK);
        }
    }
}
