//! # Executor - Dry-Run Gate, Submission, Inclusion Tracking
//!
//! ## Purpose
//!
//! The last stop before the relay. In dry-run mode (the default) bundles are
//! only simulated and the outcome recorded; nothing is broadcast anywhere.
//! Live mode submits, then polls for inclusion over a bounded number of
//! blocks. Opportunities are one-shot per block: there are no retries, a
//! missed block is a terminal outcome for that candidate.
//!
//! ## Integration Points
//!
//! - **Input Sources**: assembled bundles from the coordinator
//! - **Output Destinations**: the relay (simulate / submit), in-flight
//!   records for observability
//! - **Safety**: the live path is unreachable unless both environment
//!   acknowledgments were present at startup

use crate::config::ExecutorConfig;
use crate::relay::{BundleRelay, RelayError};
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::H256;
use ethers::utils::keccak256;
use jitter_types::Bundle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal result for one bundle. One of these is produced for every
/// bundle handed to the executor; the coordinator feeds them into health
/// accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Included { block: u64 },
    Reverted { reason: String },
    TimedOut,
    RelayRejected { reason: String },
}

/// Chain reads the inclusion poller and bundle assembly need; mocked in
/// tests.
#[async_trait]
pub trait ChainView: Send + Sync {
    async fn block_number(&self) -> Result<u64, String>;
    async fn transaction_block(&self, tx_hash: H256) -> Result<Option<u64>, String>;

    /// Next nonce for `address` at the pending block.
    async fn next_nonce(&self, address: ethers::types::Address) -> Result<ethers::types::U256, String> {
        let _ = address;
        Ok(ethers::types::U256::zero())
    }
}

pub struct RpcChainView {
    provider: Arc<Provider<Http>>,
}

impl RpcChainView {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainView for RpcChainView {
    async fn block_number(&self) -> Result<u64, String> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| e.to_string())
    }

    async fn transaction_block(&self, tx_hash: H256) -> Result<Option<u64>, String> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| e.to_string())?;
        Ok(receipt.and_then(|r| r.block_number).map(|n| n.as_u64()))
    }

    async fn next_nonce(
        &self,
        address: ethers::types::Address,
    ) -> Result<ethers::types::U256, String> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Fixed-head chain view for simulation mode: nothing ever lands, nonces
/// start at zero.
pub struct StaticChainView {
    pub head: u64,
}

#[async_trait]
impl ChainView for StaticChainView {
    async fn block_number(&self) -> Result<u64, String> {
        Ok(self.head)
    }

    async fn transaction_block(&self, _tx_hash: H256) -> Result<Option<u64>, String> {
        Ok(None)
    }
}

/// Record kept while a bundle's fate is undecided.
#[derive(Debug, Clone)]
pub struct InFlightRecord {
    pub target_block: u64,
    pub pool_id: String,
    pub relay_handle: Option<String>,
}

pub struct Executor {
    relay: Arc<dyn BundleRelay>,
    chain: Arc<dyn ChainView>,
    config: ExecutorConfig,
    in_flight: DashMap<String, InFlightRecord>,
}

impl Executor {
    pub fn new(
        relay: Arc<dyn BundleRelay>,
        chain: Arc<dyn ChainView>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            relay,
            chain,
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one bundle to a terminal outcome.
    pub async fn execute(&self, bundle: &Bundle, pool_id: &str) -> ExecutionOutcome {
        self.in_flight.insert(
            bundle.id.clone(),
            InFlightRecord {
                target_block: bundle.target_block,
                pool_id: pool_id.to_string(),
                relay_handle: None,
            },
        );
        let outcome = if self.config.is_live() {
            self.execute_live(bundle).await
        } else {
            self.execute_dry_run(bundle).await
        };
        self.in_flight.remove(&bundle.id);
        outcome
    }

    /// Simulate only. A clean simulation counts as the success outcome so
    /// dry-run campaigns exercise the same health transitions live would.
    async fn execute_dry_run(&self, bundle: &Bundle) -> ExecutionOutcome {
        match self.relay.simulate(bundle).await {
            Ok(report) if report.success => {
                info!(
                    bundle = %bundle.id,
                    target = bundle.target_block,
                    gas_used = report.gas_used,
                    "dry-run simulation clean, not broadcasting"
                );
                ExecutionOutcome::Included {
                    block: bundle.target_block,
                }
            }
            Ok(report) => ExecutionOutcome::Reverted {
                reason: report
                    .revert_reason
                    .unwrap_or_else(|| "unspecified revert".to_string()),
            },
            Err(RelayError::Timeout) => ExecutionOutcome::TimedOut,
            Err(e) => ExecutionOutcome::RelayRejected {
                reason: e.to_string(),
            },
        }
    }

    async fn execute_live(&self, bundle: &Bundle) -> ExecutionOutcome {
        // Pre-flight through the relay's simulate RPC; a bundle that reverts
        // in simulation is not worth a submission slot.
        match self.relay.simulate(bundle).await {
            Ok(report) if !report.success => {
                return ExecutionOutcome::Reverted {
                    reason: report
                        .revert_reason
                        .unwrap_or_else(|| "unspecified revert".to_string()),
                }
            }
            Ok(_) => {}
            // Simulation being unavailable is not a reason to skip the shot.
            Err(e) => warn!(bundle = %bundle.id, "pre-flight simulation failed: {e}"),
        }

        let handle = match self.relay.submit(bundle).await {
            Ok(handle) => handle,
            Err(RelayError::Timeout) => return ExecutionOutcome::TimedOut,
            Err(e) => {
                return ExecutionOutcome::RelayRejected {
                    reason: e.to_string(),
                }
            }
        };
        if let Some(mut record) = self.in_flight.get_mut(&bundle.id) {
            record.relay_handle = Some(handle);
        }

        // Our pre-swap transaction landing is the bundle landing: bundles
        // are atomic.
        let pre_tx_hash = H256::from(keccak256(&bundle.transactions[0]));
        let deadline_block = bundle.target_block + self.config.inclusion_blocks;

        loop {
            match self.chain.transaction_block(pre_tx_hash).await {
                Ok(Some(block)) => {
                    info!(bundle = %bundle.id, block, "bundle included");
                    return ExecutionOutcome::Included { block };
                }
                Ok(None) => {}
                Err(e) => warn!(bundle = %bundle.id, "inclusion poll failed: {e}"),
            }
            match self.chain.block_number().await {
                Ok(head) if head > deadline_block => {
                    debug!(bundle = %bundle.id, head, deadline_block, "inclusion window closed");
                    return ExecutionOutcome::TimedOut;
                }
                _ => {}
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::SimulationReport;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Relay double that counts what actually leaves the process.
    pub(crate) struct RecordingRelay {
        pub simulations: AtomicU64,
        pub submissions: AtomicU64,
        pub simulate_success: bool,
    }

    impl RecordingRelay {
        pub(crate) fn new(simulate_success: bool) -> Self {
            Self {
                simulations: AtomicU64::new(0),
                submissions: AtomicU64::new(0),
                simulate_success,
            }
        }
    }

    #[async_trait]
    impl BundleRelay for RecordingRelay {
        async fn simulate(&self, _bundle: &Bundle) -> Result<SimulationReport, RelayError> {
            self.simulations.fetch_add(1, Ordering::SeqCst);
            Ok(SimulationReport {
                success: self.simulate_success,
                revert_reason: (!self.simulate_success).then(|| "jit: no fees".to_string()),
                gas_used: 420_000,
            })
        }

        async fn submit(&self, _bundle: &Bundle) -> Result<String, RelayError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok("0xbundle".to_string())
        }
    }

    struct StaticChain {
        head: u64,
        included_at: Option<u64>,
    }

    #[async_trait]
    impl ChainView for StaticChain {
        async fn block_number(&self) -> Result<u64, String> {
            Ok(self.head)
        }

        async fn transaction_block(&self, _tx_hash: H256) -> Result<Option<u64>, String> {
            Ok(self.included_at)
        }
    }

    fn bundle() -> Bundle {
        Bundle {
            transactions: vec![
                vec![0x02, 0x01].into(),
                vec![0x02, 0x02].into(),
                vec![0x02, 0x03].into(),
            ],
            target_block: 101,
            min_timestamp: None,
            max_timestamp: None,
            id: "test-bundle".to_string(),
        }
    }

    fn dry_config() -> ExecutorConfig {
        crate::config::BotConfig::default().executor
    }

    fn live_config() -> ExecutorConfig {
        let mut config = dry_config();
        config.dry_run = false;
        config.live_risk_acknowledged = true;
        config
    }

    #[tokio::test]
    async fn dry_run_simulates_but_never_submits() {
        let relay = Arc::new(RecordingRelay::new(true));
        let chain = Arc::new(StaticChain {
            head: 101,
            included_at: None,
        });
        let executor = Executor::new(relay.clone(), chain, dry_config());

        let outcome = executor.execute(&bundle(), "A").await;
        assert_eq!(outcome, ExecutionOutcome::Included { block: 101 });
        assert_eq!(relay.simulations.load(Ordering::SeqCst), 1);
        assert_eq!(relay.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_surfaces_reverts() {
        let relay = Arc::new(RecordingRelay::new(false));
        let chain = Arc::new(StaticChain {
            head: 101,
            included_at: None,
        });
        let executor = Executor::new(relay, chain, dry_config());

        match executor.execute(&bundle(), "A").await {
            ExecutionOutcome::Reverted { reason } => assert_eq!(reason, "jit: no fees"),
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn live_submission_reports_inclusion() {
        let relay = Arc::new(RecordingRelay::new(true));
        let chain = Arc::new(StaticChain {
            head: 101,
            included_at: Some(101),
        });
        let executor = Executor::new(relay.clone(), chain, live_config());

        let outcome = executor.execute(&bundle(), "A").await;
        assert_eq!(outcome, ExecutionOutcome::Included { block: 101 });
        assert_eq!(relay.submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn live_submission_times_out_after_the_window() {
        let relay = Arc::new(RecordingRelay::new(true));
        // Head already past target + inclusion window, tx never lands.
        let chain = Arc::new(StaticChain {
            head: 104,
            included_at: None,
        });
        let executor = Executor::new(relay.clone(), chain, live_config());

        let outcome = executor.execute(&bundle(), "A").await;
        assert_eq!(outcome, ExecutionOutcome::TimedOut);
        // One shot: no resubmission on timeout.
        assert_eq!(relay.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(executor.in_flight_count(), 0);
    }
}
