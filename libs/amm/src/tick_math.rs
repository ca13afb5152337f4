//! Canonical tick-to-sqrt-price conversion and spacing alignment.
//!
//! `sqrt_ratio_at_tick` reproduces the pool contract's fixed-point ladder
//! exactly. Fee-share prediction compares our minted liquidity against the
//! pool's at specific prices, so an approximate conversion here would skew
//! every profit estimate downstream.

use crate::AmmError;
use ethers::types::{U256, U512};

/// Lowest tick a position endpoint may take.
pub const MIN_TICK: i32 = -887272;
/// Highest tick a position endpoint may take.
pub const MAX_TICK: i32 = 887272;

/// sqrt ratio at MIN_TICK, Q64.96.
pub fn min_sqrt_ratio() -> U256 {
    U256::from(4295128739u64)
}

/// sqrt ratio at MAX_TICK, Q64.96.
pub fn max_sqrt_ratio() -> U256 {
    U256::from_dec_str("1461446703485210103287273052203988822378723970342")
        .expect("constant parses")
}

/// Q64.96 one.
pub fn q96() -> U256 {
    U256::one() << 96
}

/// Multiply two Q128 values and renormalize, via a 512-bit intermediate.
fn mul_shift_128(ratio: U256, constant: &str) -> U256 {
    let c = U256::from_str_radix(constant, 16).expect("ladder constant parses");
    let wide: U512 = ratio.full_mul(c) >> 128;
    u512_to_u256(wide).expect("Q128 product fits after shift")
}

/// Narrow a 512-bit value, failing if the high half is populated.
pub(crate) fn u512_to_u256(value: U512) -> Option<U256> {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    if bytes[..32].iter().any(|b| *b != 0) {
        return None;
    }
    Some(U256::from_big_endian(&bytes[32..]))
}

/// Exact `(a * b) / denominator` with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, AmmError> {
    if denominator.is_zero() {
        return Err(AmmError::Overflow("mul_div denominator"));
    }
    let product = a.full_mul(b);
    let quotient = product / U512::from(denominator);
    u512_to_u256(quotient).ok_or(AmmError::Overflow("mul_div quotient"))
}

/// Canonical Q64.96 sqrt ratio for a tick.
///
/// Matches the pool contract bit-for-bit: the per-bit Q128 ladder, inversion
/// for positive ticks, and the rounding-up narrow from Q128.128 to Q64.96.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256, AmmError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(AmmError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from_str_radix("fffcb933bd6fad37aa2d162d1a594001", 16).expect("constant")
    } else {
        U256::one() << 128
    };

    if abs_tick & 0x2 != 0 {
        ratio = mul_shift_128(ratio, "fff97272373d413259a46990580e213a");
    }
    if abs_tick & 0x4 != 0 {
        ratio = mul_shift_128(ratio, "fff2e50f5f656932ef12357cf3c7fdcc");
    }
    if abs_tick & 0x8 != 0 {
        ratio = mul_shift_128(ratio, "ffe5caca7e10e4e61c3624eaa0941cd0");
    }
    if abs_tick & 0x10 != 0 {
        ratio = mul_shift_128(ratio, "ffcb9843d60f6159c9db58835c926644");
    }
    if abs_tick & 0x20 != 0 {
        ratio = mul_shift_128(ratio, "ff973b41fa98c081472e6896dfb254c0");
    }
    if abs_tick & 0x40 != 0 {
        ratio = mul_shift_128(ratio, "ff2ea16466c96a3843ec78b326b52861");
    }
    if abs_tick & 0x80 != 0 {
        ratio = mul_shift_128(ratio, "fe5dee046a99a2a811c461f1969c3053");
    }
    if abs_tick & 0x100 != 0 {
        ratio = mul_shift_128(ratio, "fcbe86c7900a88aedcffc83b479aa3a4");
    }
    if abs_tick & 0x200 != 0 {
        ratio = mul_shift_128(ratio, "f987a7253ac413176f2b074cf7815e54");
    }
    if abs_tick & 0x400 != 0 {
        ratio = mul_shift_128(ratio, "f3392b0822b70005940c7a398e4b70f3");
    }
    if abs_tick & 0x800 != 0 {
        ratio = mul_shift_128(ratio, "e7159475a2c29b7443b29c7fa6e889d9");
    }
    if abs_tick & 0x1000 != 0 {
        ratio = mul_shift_128(ratio, "d097f3bdfd2022b8845ad8f792aa5825");
    }
    if abs_tick & 0x2000 != 0 {
        ratio = mul_shift_128(ratio, "a9f746462d870fdf8a65dc1f90e061e5");
    }
    if abs_tick & 0x4000 != 0 {
        ratio = mul_shift_128(ratio, "70d869a156d2a1b890bb3df62baf32f7");
    }
    if abs_tick & 0x8000 != 0 {
        ratio = mul_shift_128(ratio, "31be135f97d08fd981231505542fcfa6");
    }
    if abs_tick & 0x10000 != 0 {
        ratio = mul_shift_128(ratio, "9aa508b5b7a84e1c677de54f3e99bc9");
    }
    if abs_tick & 0x20000 != 0 {
        ratio = mul_shift_128(ratio, "5d6af8dedb81196699c329225ee604");
    }
    if abs_tick & 0x40000 != 0 {
        ratio = mul_shift_128(ratio, "2216e584f5fa1ea926041bedfe98");
    }
    if abs_tick & 0x80000 != 0 {
        ratio = mul_shift_128(ratio, "48a170391f7dc42444e8fa2");
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up so round-trips through the contract agree.
    let shifted = ratio >> 32;
    let remainder_mask = (U256::one() << 32) - U256::one();
    Ok(if (ratio & remainder_mask).is_zero() {
        shifted
    } else {
        shifted + U256::one()
    })
}

/// Largest spacing-aligned tick at or below `tick`.
pub fn floor_to_spacing(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Smallest spacing-aligned tick at or above `tick`.
pub fn ceil_to_spacing(tick: i32, spacing: i32) -> i32 {
    -((-tick).div_euclid(spacing)) * spacing
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tick_zero_is_exactly_q96() {
        assert_eq!(sqrt_ratio_at_tick(0).unwrap(), q96());
    }

    #[test]
    fn boundary_ticks_match_contract_constants() {
        assert_eq!(sqrt_ratio_at_tick(MIN_TICK).unwrap(), min_sqrt_ratio());
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK).unwrap(), max_sqrt_ratio());
    }

    #[test]
    fn unit_ticks_match_contract_vectors() {
        // Published pool-contract test vectors for ticks ±1.
        assert_eq!(
            sqrt_ratio_at_tick(1).unwrap(),
            U256::from_dec_str("79232123823359799118286999568").unwrap()
        );
        assert_eq!(
            sqrt_ratio_at_tick(-1).unwrap(),
            U256::from_dec_str("79224201403219477170569942574").unwrap()
        );
    }

    #[test]
    fn out_of_bounds_tick_rejected() {
        assert!(matches!(
            sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(AmmError::TickOutOfBounds(_))
        ));
    }

    #[test]
    fn alignment_handles_negative_ticks() {
        assert_eq!(floor_to_spacing(-15, 10), -20);
        assert_eq!(ceil_to_spacing(-15, 10), -10);
        assert_eq!(floor_to_spacing(15, 10), 10);
        assert_eq!(ceil_to_spacing(15, 10), 20);
        assert_eq!(floor_to_spacing(20, 10), 20);
        assert_eq!(ceil_to_spacing(20, 10), 20);
    }

    proptest! {
        #[test]
        fn ratio_is_monotone_in_tick(tick in (MIN_TICK + 1)..MAX_TICK) {
            let below = sqrt_ratio_at_tick(tick - 1).unwrap();
            let at = sqrt_ratio_at_tick(tick).unwrap();
            prop_assert!(below < at);
        }

        #[test]
        fn alignment_brackets_the_tick(tick in MIN_TICK..=MAX_TICK, spacing in 1i32..=200) {
            let floor = floor_to_spacing(tick, spacing);
            let ceil = ceil_to_spacing(tick, spacing);
            prop_assert!(floor <= tick && tick <= ceil);
            prop_assert_eq!(floor % spacing, 0);
            prop_assert_eq!(ceil % spacing, 0);
            prop_assert!(ceil - floor <= spacing);
        }
    }
}
