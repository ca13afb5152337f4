//! Closed taxonomy of pipeline failure kinds.
//!
//! Every recoverable error in the pipeline maps to exactly one of these
//! values so the coordinator can charge the originating pool's health
//! counter and metrics can label the failure without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Address input failed checksum normalization
    InvalidAddress,
    /// Pool contract unreachable, locked, or not answering `fee()`
    PoolUnavailable,
    /// Tick range collapsed after clamping
    TickRangeDegenerate,
    /// Swap notional below the configured minimum
    SwapTooSmall,
    /// Predicted price impact invalidates the in-range fee bound
    ImpactExceedsRange,
    /// No flash-loan provider had liquidity and a clearing fee
    NoViableFlashProvider,
    /// Required gas price exceeds the configured hard cap
    GasPriceExceedsCap,
    /// The relay refused the bundle
    RelayRejected,
    /// Simulation exceeded its wall-clock budget
    SimulationTimeout,
    /// Net profit below the floor; a normal outcome, never charged
    /// against pool health
    Unprofitable,
}

impl FailureKind {
    /// Whether this kind counts against the pool's failure budget.
    /// Unprofitable is a normal outcome, not a failure.
    pub fn charges_health(&self) -> bool {
        !matches!(self, FailureKind::Unprofitable)
    }

    /// Stable label for metrics series.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::InvalidAddress => "invalid_address",
            FailureKind::PoolUnavailable => "pool_unavailable",
            FailureKind::TickRangeDegenerate => "tick_range_degenerate",
            FailureKind::SwapTooSmall => "swap_too_small",
            FailureKind::ImpactExceedsRange => "impact_exceeds_range",
            FailureKind::NoViableFlashProvider => "no_viable_flash_provider",
            FailureKind::GasPriceExceedsCap => "gas_price_exceeds_cap",
            FailureKind::RelayRejected => "relay_rejected",
            FailureKind::SimulationTimeout => "simulation_timeout",
            FailureKind::Unprofitable => "unprofitable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
