//! Pool identity and per-block state snapshots.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Stable identity of a monitored pool.
///
/// The label (e.g. `WETH-USDC-0.05%`) is what operators configure and what
/// metrics are keyed by; the on-chain address is what the fetcher and bundle
/// assembler use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolId {
    /// Human-readable identifier, unique within a deployment
    pub label: String,
    /// Pool contract address
    pub address: Address,
    /// Token 0 address
    pub token0: Address,
    /// Token 1 address
    pub token1: Address,
    /// Fee tier in hundredths of a basis point (500 = 0.05%)
    pub fee: u32,
    /// Tick spacing for this fee tier
    pub tick_spacing: i32,
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Snapshot of a pool's observable state at a specific block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    /// Q64.96 sqrt of token1/token0 price
    pub sqrt_price_x96: U256,
    /// Current tick; may sit between spacing grid points
    pub tick: i32,
    /// Active in-range liquidity
    pub liquidity: u128,
    /// slot0 unlocked flag; a locked pool is mid-swap and unusable
    pub unlocked: bool,
    /// Block the snapshot was taken at
    pub block: u64,
    /// When the snapshot was captured (cache TTL anchor)
    pub fetched_at: Instant,
}

impl PoolState {
    /// Whether the snapshot is usable for simulation.
    pub fn is_ready(&self) -> bool {
        self.unlocked && !self.sqrt_price_x96.is_zero() && self.liquidity > 0
    }
}
