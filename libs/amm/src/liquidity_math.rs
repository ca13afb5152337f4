//! Conversions between token amounts and position liquidity.
//!
//! These mirror the periphery's LiquidityAmounts helpers: liquidity from
//! amounts is rounded down, amounts from liquidity are rounded down, and all
//! intermediate products run through 512 bits.

use crate::tick_math::{mul_div, q96};
use crate::AmmError;
use ethers::types::U256;

fn ordered(sqrt_a: U256, sqrt_b: U256) -> Result<(U256, U256), AmmError> {
    if sqrt_a == sqrt_b || sqrt_a.is_zero() || sqrt_b.is_zero() {
        return Err(AmmError::InvalidPriceBounds);
    }
    Ok(if sqrt_a < sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    })
}

/// Liquidity purchasable with `amount0` of token0 across `[sqrt_a, sqrt_b]`.
pub fn liquidity_for_amount0(sqrt_a: U256, sqrt_b: U256, amount0: U256) -> Result<u128, AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    let intermediate = mul_div(lo, hi, q96())?;
    let liquidity = mul_div(amount0, intermediate, hi - lo)?;
    narrow_liquidity(liquidity)
}

/// Liquidity purchasable with `amount1` of token1 across `[sqrt_a, sqrt_b]`.
pub fn liquidity_for_amount1(sqrt_a: U256, sqrt_b: U256, amount1: U256) -> Result<u128, AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    let liquidity = mul_div(amount1, q96(), hi - lo)?;
    narrow_liquidity(liquidity)
}

/// Maximum liquidity fundable with both amounts, given the current price.
///
/// Below the range only token0 funds it, above only token1; inside, the
/// binding side wins.
pub fn liquidity_for_amounts(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
    amount1: U256,
) -> Result<u128, AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    if sqrt_price <= lo {
        liquidity_for_amount0(lo, hi, amount0)
    } else if sqrt_price < hi {
        let l0 = liquidity_for_amount0(sqrt_price, hi, amount0)?;
        let l1 = liquidity_for_amount1(lo, sqrt_price, amount1)?;
        Ok(l0.min(l1))
    } else {
        liquidity_for_amount1(lo, hi, amount1)
    }
}

/// Token0 owed for `liquidity` across `[sqrt_a, sqrt_b]`.
pub fn amount0_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256, AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    let shifted = U256::from(liquidity) << 96;
    let numerator = mul_div(shifted, hi - lo, hi)?;
    Ok(numerator / lo)
}

/// Token1 owed for `liquidity` across `[sqrt_a, sqrt_b]`.
pub fn amount1_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256, AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    mul_div(U256::from(liquidity), hi - lo, q96())
}

/// Both token amounts owed for `liquidity`, given the current price.
pub fn amounts_for_liquidity(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
) -> Result<(U256, U256), AmmError> {
    let (lo, hi) = ordered(sqrt_a, sqrt_b)?;
    if sqrt_price <= lo {
        Ok((amount0_for_liquidity(lo, hi, liquidity)?, U256::zero()))
    } else if sqrt_price < hi {
        Ok((
            amount0_for_liquidity(sqrt_price, hi, liquidity)?,
            amount1_for_liquidity(lo, sqrt_price, liquidity)?,
        ))
    } else {
        Ok((U256::zero(), amount1_for_liquidity(lo, hi, liquidity)?))
    }
}

fn narrow_liquidity(value: U256) -> Result<u128, AmmError> {
    if value > U256::from(u128::MAX) {
        return Err(AmmError::Overflow("liquidity narrowing"));
    }
    Ok(value.as_u128())
}
