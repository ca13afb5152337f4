//! Proposed JIT positions and the opportunity candidates built around them.

use crate::intent::SwapIntent;
use crate::pool::PoolId;
use ethers::types::U256;
use rust_decimal::Decimal;

/// A mint the simulator proposes: a spacing-aligned tick range around the
/// current price plus the token amounts that fund it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitPosition {
    pub pool: PoolId,
    /// Lower tick, aligned to the pool's spacing
    pub tick_lower: i32,
    /// Upper tick, aligned to the pool's spacing; strictly above `tick_lower`
    pub tick_upper: i32,
    /// Token0 funding amount
    pub amount0: U256,
    /// Token1 funding amount
    pub amount1: U256,
    /// Liquidity the amounts convert to at the anchor price
    pub liquidity: u128,
    /// Mint deadline (unix seconds)
    pub deadline: u64,
}

impl JitPosition {
    /// Range width in ticks.
    pub fn width(&self) -> i32 {
        self.tick_upper - self.tick_lower
    }
}

/// A fully-costed opportunity: the victim swap, the position to mint around
/// it, and the profit estimate that cleared the floor.
///
/// Created by the simulator, held in the coordinator's per-target-block
/// bucket until that block is sealed or the candidate is selected.
#[derive(Debug, Clone)]
pub struct OpportunityCandidate {
    pub intent: SwapIntent,
    pub position: JitPosition,
    /// Net profit estimate in wei of the pool's quote token
    pub estimated_profit_wei: U256,
    /// Net profit estimate converted through the price oracle
    pub estimated_profit_usd: Decimal,
    /// Total gas units across the bundle's line items
    pub gas_units: u64,
    /// Pool label, for selection tie-breaks and metrics
    pub pool_id: String,
    /// Block whose state the simulation ran against
    pub anchor_block: u64,
    /// Creation timestamp, nanoseconds since the epoch
    pub created_at_ns: u64,
}

impl OpportunityCandidate {
    /// Block the bundle must land in.
    pub fn target_block(&self) -> u64 {
        self.anchor_block + 1
    }
}
