//! Per-pool failure accounting owned by the coordinator.

use rust_decimal::Decimal;

/// Health record for one monitored pool.
///
/// Invariant: `enabled == false` only while `failure_count >= max_failures`
/// or the cooldown deadline has not passed. Transitions are monotone within
/// a cooldown window; only a successful inclusion resets the counter early.
#[derive(Debug, Clone)]
pub struct PoolHealth {
    pub enabled: bool,
    /// Consecutive failures since the last successful inclusion
    pub failure_count: u32,
    /// Nanosecond deadline before which the pool may not submit
    pub cooldown_until_ns: u64,
    /// Per-pool profit floor override, if configured
    pub profit_threshold_override_usd: Option<Decimal>,
}

impl PoolHealth {
    pub fn new(profit_threshold_override_usd: Option<Decimal>) -> Self {
        Self {
            enabled: true,
            failure_count: 0,
            cooldown_until_ns: 0,
            profit_threshold_override_usd,
        }
    }

    /// Record one failure. Disables the pool and starts the cooldown once
    /// the budget is exhausted. Returns true if this failure tripped the
    /// breaker.
    pub fn record_failure(&mut self, max_failures: u32, cooldown_ns: u64, now_ns: u64) -> bool {
        self.failure_count += 1;
        if self.failure_count >= max_failures {
            self.enabled = false;
            self.cooldown_until_ns = now_ns + cooldown_ns;
            true
        } else {
            false
        }
    }

    /// A successful inclusion clears the budget and lifts any cooldown.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.cooldown_until_ns = 0;
        self.enabled = true;
    }

    /// Whether the pool may submit at `now_ns`. Re-enables the pool when a
    /// cooldown has lapsed.
    pub fn is_eligible(&mut self, now_ns: u64) -> bool {
        if !self.enabled && now_ns >= self.cooldown_until_ns {
            self.enabled = true;
            self.failure_count = 0;
        }
        self.enabled && now_ns >= self.cooldown_until_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: u64 = 300_000_000_000; // 5 min in ns

    #[test]
    fn trips_after_budget_exhausted() {
        let mut health = PoolHealth::new(None);
        assert!(!health.record_failure(3, COOLDOWN, 1_000));
        assert!(!health.record_failure(3, COOLDOWN, 2_000));
        assert!(health.record_failure(3, COOLDOWN, 3_000));
        assert!(!health.enabled);
        assert_eq!(health.cooldown_until_ns, 3_000 + COOLDOWN);
        assert!(!health.is_eligible(3_000 + COOLDOWN - 1));
    }

    #[test]
    fn cooldown_lapse_re_enables() {
        let mut health = PoolHealth::new(None);
        for i in 0..3 {
            health.record_failure(3, COOLDOWN, i);
        }
        assert!(health.is_eligible(2 + COOLDOWN));
        assert_eq!(health.failure_count, 0);
    }

    #[test]
    fn inclusion_resets_counter() {
        let mut health = PoolHealth::new(None);
        health.record_failure(3, COOLDOWN, 1_000);
        health.record_failure(3, COOLDOWN, 2_000);
        health.record_success();
        assert_eq!(health.failure_count, 0);
        assert!(health.is_eligible(2_001));
    }
}
