//! USD conversion for profit-floor comparisons.
//!
//! The pipeline computes profit in wei of the pool's quote token; the floor
//! is configured in USD. The oracle is injected so tests and simulation mode
//! can pin prices.

use crate::config::{known, OracleConfig};
use ethers::types::{Address, U256};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;

/// Price source for USD conversion. Implementations must be cheap and
/// infallible on the hot path; unknown tokens price at zero, which can only
/// make a candidate less attractive.
pub trait PriceOracle: Send + Sync {
    /// USD per whole token.
    fn price_usd(&self, token: Address) -> Decimal;

    /// Decimals the token's wei amounts are denominated in.
    fn decimals(&self, token: Address) -> u32;

    /// Convert a wei amount of `token` into USD. Amounts are saturated at a
    /// billion whole tokens; nothing real gets near that.
    fn to_usd(&self, token: Address, amount_wei: U256) -> Decimal {
        const MAX_WEI: u128 = 1_000_000_000_000_000_000_000_000_000; // 1e9 * 1e18
        let decimals = self.decimals(token);
        let scale = Decimal::from(10u64.pow(decimals.min(18)));
        let wei = if amount_wei > U256::from(MAX_WEI) {
            MAX_WEI
        } else {
            amount_wei.as_u128()
        };
        let wei_dec = Decimal::from_u128(wei).expect("capped amount fits the mantissa");
        wei_dec / scale * self.price_usd(token)
    }

    /// Wei of `token` equivalent to a USD amount. Zero when the token is
    /// unpriced or the amount is non-positive.
    fn usd_to_wei(&self, token: Address, usd: Decimal) -> U256 {
        let price = self.price_usd(token);
        if price <= Decimal::ZERO || usd <= Decimal::ZERO {
            return U256::zero();
        }
        let scale = Decimal::from(10u64.pow(self.decimals(token).min(18)));
        let wei = (usd / price * scale).trunc();
        wei.to_u128().map(U256::from).unwrap_or(U256::zero())
    }
}

/// Fixed price table: configured ETH price plus $1 stables. Deterministic by
/// construction, which is what simulation mode and the reproducibility
/// property need.
pub struct StaticPriceOracle {
    prices: HashMap<Address, Decimal>,
    decimals: HashMap<Address, u32>,
}

impl StaticPriceOracle {
    pub fn new(config: &OracleConfig) -> Self {
        let weth = Address::from_str(known::WETH).expect("known address");
        let usdc = Address::from_str(known::USDC).expect("known address");
        let dai = Address::from_str(known::DAI).expect("known address");

        let mut prices = HashMap::new();
        prices.insert(weth, config.eth_price_usd);
        prices.insert(usdc, dec!(1));
        prices.insert(dai, dec!(1));

        let mut decimals = HashMap::new();
        decimals.insert(weth, 18);
        decimals.insert(usdc, 6);
        decimals.insert(dai, 18);

        Self { prices, decimals }
    }
}

impl PriceOracle for StaticPriceOracle {
    fn price_usd(&self, token: Address) -> Decimal {
        self.prices.get(&token).copied().unwrap_or(Decimal::ZERO)
    }

    fn decimals(&self, token: Address) -> u32 {
        self.decimals.get(&token).copied().unwrap_or(18)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_amounts_convert_through_configured_price() {
        let oracle = StaticPriceOracle::new(&OracleConfig {
            eth_price_usd: dec!(2500),
        });
        let weth = Address::from_str(known::WETH).unwrap();
        // 0.1 ETH at $2500
        let usd = oracle.to_usd(weth, U256::exp10(17));
        assert_eq!(usd, dec!(250));
    }

    #[test]
    fn six_decimal_stables_scale_correctly() {
        let oracle = StaticPriceOracle::new(&OracleConfig {
            eth_price_usd: dec!(2500),
        });
        let usdc = Address::from_str(known::USDC).unwrap();
        let usd = oracle.to_usd(usdc, U256::from(25_000_000u64)); // 25 USDC
        assert_eq!(usd, dec!(25));
    }

    #[test]
    fn unknown_tokens_price_at_zero() {
        let oracle = StaticPriceOracle::new(&OracleConfig {
            eth_price_usd: dec!(2500),
        });
        assert_eq!(oracle.price_usd(Address::zero()), Decimal::ZERO);
    }
}
