//! # Pool Coordinator - Orchestration and Policy Center
//!
//! ## Purpose
//!
//! The one component that owns everything: per-pool single-slot mailboxes
//! (latest-wins under mempool bursts), per-target-block candidate buckets,
//! the pool health table with failure budgets and cooldowns, the selection
//! rule that picks at most one bundle per block, and the hand-off to the
//! bundle assembler and executor. Every failure anywhere in the pipeline is
//! recovered here and charged to the originating pool.
//!
//! ## Integration Points
//!
//! - **Input Sources**: raw transactions from the mempool task, head numbers
//!   from the block listener
//! - **Output Destinations**: executor (selected bundles), metrics (every
//!   stage transition)
//! - **Ownership**: health table and buckets are exclusive to the
//!   coordinator; leaves (fetcher, decoder, metrics) hold no back-references
//!
//! ## Architecture Role
//!
//! ```text
//! Transaction ─▶ decode ─▶ mailbox (1 slot, latest wins) ─▶ pool worker
//!                                                              │
//!                     fetch state ◀── anchor = current head ───┤
//!                     simulate ──▶ flash select ──▶ bucket[anchor+1]
//!                                                              │
//!             all in-flight done, or head sealed ──▶ selection ─▶ executor
//! ```
//!
//! ## Selection rule
//!
//! Eligible pools only (enabled, off cooldown), highest post-fee USD profit,
//! ties to lowest gas then lexically-smallest pool id. One bundle per target
//! block globally, which also bounds each pool to one per block.

use crate::bundle::BundleAssembler;
use crate::config::BotConfig;
use crate::decoder::{decode_swap, DecodeOutcome, PoolRegistry};
use crate::executor::{ChainView, ExecutionOutcome, Executor};
use crate::fetcher::PoolStateFetcher;
use crate::flash_loan::{ProviderSelection, ProviderSelector};
use crate::metrics::MetricsSink;
use crate::simulator::{now_ns, Simulator};
use ethers::types::{Transaction, U256};
use jitter_amm::tick_math::mul_div;
use jitter_types::{FailureKind, OpportunityCandidate, PoolHealth, SwapIntent};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A candidate with its funding decided and its profit net of the flash fee.
#[derive(Debug, Clone)]
pub struct RatedCandidate {
    pub candidate: OpportunityCandidate,
    pub selection: ProviderSelection,
}

/// What one selection round did, for logs and tests.
#[derive(Debug)]
pub struct SelectionResult {
    pub pool_id: String,
    pub bundle_id: Option<String>,
    pub outcome: Option<ExecutionOutcome>,
    pub profit_usd: Decimal,
}

struct Mailbox {
    slot: Mutex<Option<SwapIntent>>,
    notify: Notify,
}

#[derive(Default)]
struct Bucket {
    candidates: Vec<RatedCandidate>,
    in_flight: usize,
}

pub struct Coordinator {
    registry: PoolRegistry,
    fetcher: Arc<PoolStateFetcher>,
    simulator: Arc<Simulator>,
    flash_selector: Arc<ProviderSelector>,
    assembler: Arc<BundleAssembler>,
    executor: Arc<Executor>,
    chain: Arc<dyn ChainView>,
    metrics: Arc<MetricsSink>,
    config: BotConfig,

    health: RwLock<HashMap<String, PoolHealth>>,
    mailboxes: HashMap<String, Mailbox>,
    buckets: Mutex<HashMap<u64, Bucket>>,
    submitted_targets: Mutex<HashSet<u64>>,

    head: watch::Receiver<u64>,
    shutdown: watch::Sender<bool>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: PoolRegistry,
        fetcher: Arc<PoolStateFetcher>,
        simulator: Arc<Simulator>,
        flash_selector: Arc<ProviderSelector>,
        assembler: Arc<BundleAssembler>,
        executor: Arc<Executor>,
        chain: Arc<dyn ChainView>,
        metrics: Arc<MetricsSink>,
        config: BotConfig,
        head: watch::Receiver<u64>,
    ) -> Arc<Self> {
        let mut health = HashMap::new();
        let mut mailboxes = HashMap::new();
        for pool in &config.pools {
            let override_floor = config
                .simulator
                .pool_profit_thresholds_usd
                .get(&pool.label)
                .copied();
            health.insert(pool.label.clone(), PoolHealth::new(override_floor));
            mailboxes.insert(
                pool.label.clone(),
                Mailbox {
                    slot: Mutex::new(None),
                    notify: Notify::new(),
                },
            );
        }
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            registry,
            fetcher,
            simulator,
            flash_selector,
            assembler,
            executor,
            chain,
            metrics,
            config,
            health: RwLock::new(health),
            mailboxes,
            buckets: Mutex::new(HashMap::new()),
            submitted_targets: Mutex::new(HashSet::new()),
            head,
            shutdown,
        })
    }

    /// Subscribe to the streams and run until `stop()`. Returns the task
    /// handles; the caller owns their lifetime.
    pub fn start(
        self: &Arc<Self>,
        mut transactions: mpsc::Receiver<Transaction>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        // Intake: raw mempool transactions -> mailboxes.
        {
            let this = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        maybe_tx = transactions.recv() => match maybe_tx {
                            Some(tx) => this.handle_transaction(&tx),
                            None => break,
                        },
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        // One worker per pool: drain the mailbox, evaluate, repeat.
        for label in self.mailboxes.keys().cloned() {
            let this = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    let mailbox = this.mailboxes.get(&label).expect("worker owns its mailbox");
                    tokio::select! {
                        _ = mailbox.notify.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                    while let Some(intent) = this.take_intent(&label) {
                        let anchor = *this.head.borrow();
                        this.evaluate_intent(intent, anchor).await;
                    }
                }
            }));
        }

        // Head watcher: expire sealed buckets, enforce the liveness window.
        {
            let this = self.clone();
            let mut head = self.head.clone();
            let mut shutdown = self.shutdown.subscribe();
            let liveness = Duration::from_secs(this.config.network.rpc_loss_fatal_secs);
            let watch_liveness = !this.config.network.simulation_mode;
            handles.push(tokio::spawn(async move {
                loop {
                    let waited = tokio::select! {
                        changed = tokio::time::timeout(liveness, head.changed()) => changed,
                        _ = shutdown.changed() => break,
                    };
                    match waited {
                        Ok(Ok(())) => {
                            let sealed = *head.borrow_and_update();
                            this.expire_buckets(sealed);
                            this.fetcher.evict_stale();
                        }
                        Ok(Err(_)) => break, // sender gone
                        Err(_) if watch_liveness => {
                            error!(
                                "no block heads for {}s; chain endpoints presumed lost",
                                liveness.as_secs()
                            );
                            std::process::exit(2);
                        }
                        Err(_) => {}
                    }
                }
            }));
        }

        info!(
            pools = self.mailboxes.len(),
            dry_run = !self.config.executor.is_live(),
            "✅ Coordinator started"
        );
        handles
    }

    /// Drain in-flight work and stop the tasks.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        for mailbox in self.mailboxes.values() {
            mailbox.notify.notify_one();
        }
        info!("Coordinator stopped");
    }

    /// Decode one raw transaction and park it in its pool's mailbox.
    pub fn handle_transaction(&self, tx: &Transaction) {
        match decode_swap(
            tx,
            &self.registry,
            U256::from(self.config.simulator.min_swap_amount_wei),
        ) {
            DecodeOutcome::Intent(intent) => {
                self.metrics.swap_detected(&intent.pool.label);
                self.offer_intent(*intent);
            }
            DecodeOutcome::BelowMinimum => self.metrics.swap_below_minimum(),
            DecodeOutcome::NotASwap => {}
        }
    }

    /// Latest-wins mailbox write. A superseded intent is dropped and
    /// counted; it is never an error.
    pub fn offer_intent(&self, intent: SwapIntent) {
        let label = intent.pool.label.clone();
        let Some(mailbox) = self.mailboxes.get(&label) else {
            return;
        };
        let superseded = mailbox.slot.lock().replace(intent).is_some();
        if superseded {
            self.metrics.intent_dropped(&label);
            debug!(pool = %label, "superseded queued intent (latest wins)");
        }
        mailbox.notify.notify_one();
    }

    /// Take the pending intent for a pool, if any.
    pub fn take_intent(&self, label: &str) -> Option<SwapIntent> {
        self.mailboxes.get(label)?.slot.lock().take()
    }

    /// Evaluate one intent against the anchor block, under the simulation
    /// budget, and feed the result into the target block's bucket.
    pub async fn evaluate_intent(&self, intent: SwapIntent, anchor: u64) {
        let label = intent.pool.label.clone();
        let target = anchor + 1;
        self.begin_evaluation(target);

        let budget = Duration::from_millis(self.config.simulator.budget_ms);
        let mut head = self.head.clone();
        let evaluated = tokio::select! {
            outcome = tokio::time::timeout(budget, self.evaluate_inner(&intent, anchor)) => Some(outcome),
            // The target block arriving mid-simulation makes the work moot;
            // abandon without charging the pool.
            _ = watch_past(&mut head, anchor) => None,
        };

        match evaluated {
            Some(Ok(Ok(Some(rated)))) => self.admit_candidate(rated),
            Some(Ok(Ok(None))) => {
                self.metrics.failure(&label, FailureKind::Unprofitable);
            }
            Some(Ok(Err(kind))) => self.record_pool_failure(&label, kind),
            Some(Err(_elapsed)) => {
                self.record_pool_failure(&label, FailureKind::SimulationTimeout)
            }
            None => debug!(pool = %label, target, "evaluation abandoned at block arrival"),
        }

        if let Some(result) = self.finish_evaluation(target).await {
            debug!(
                pool = %result.pool_id,
                profit = %result.profit_usd,
                "selection complete"
            );
        }
    }

    async fn evaluate_inner(
        &self,
        intent: &SwapIntent,
        anchor: u64,
    ) -> Result<Option<RatedCandidate>, FailureKind> {
        let label = &intent.pool.label;
        self.metrics.simulated(label);

        let state = self
            .fetcher
            .get_state(intent.pool.address, anchor)
            .await
            .map_err(|e| e.kind())?;

        let floor = self.config.profit_floor(label);
        let gas_price = intent.effective_priority_fee();
        let candidate = self
            .simulator
            .simulate(intent, &state, gas_price, floor)
            .map_err(|e| e.kind())?;
        let Some(mut candidate) = candidate else {
            return Ok(None);
        };
        self.metrics.profitable(label);

        // Fund the position: borrow the notional in the input token.
        let notional = mul_div(
            intent.amount_in,
            U256::from(self.config.simulator.notional_fraction_bps),
            U256::from(10_000u64),
        )
        .map_err(|_| FailureKind::NoViableFlashProvider)?;
        let selection = self
            .flash_selector
            .select(
                intent.token_in,
                notional,
                self.assembler.signer_address(),
                ethers::types::Bytes::default(),
                candidate.estimated_profit_usd,
                floor,
            )
            .await
            .map_err(|e| e.kind())?;

        candidate.estimated_profit_usd = selection.adjusted_profit_usd;
        Ok(Some(RatedCandidate {
            candidate,
            selection,
        }))
    }

    /// Register an evaluation targeting `target`. Selection for that block
    /// waits until every registered evaluation finishes.
    pub fn begin_evaluation(&self, target: u64) {
        self.buckets.lock().entry(target).or_default().in_flight += 1;
    }

    /// Park a finished candidate in its target bucket.
    pub fn admit_candidate(&self, rated: RatedCandidate) {
        let target = rated.candidate.target_block();
        self.buckets
            .lock()
            .entry(target)
            .or_default()
            .candidates
            .push(rated);
    }

    /// Mark one evaluation finished; when the bucket quiesces and the chain
    /// has not moved past it, run selection.
    pub async fn finish_evaluation(&self, target: u64) -> Option<SelectionResult> {
        {
            let mut buckets = self.buckets.lock();
            let bucket = buckets.get_mut(&target)?;
            bucket.in_flight = bucket.in_flight.saturating_sub(1);
            if bucket.in_flight > 0 {
                return None;
            }
        }
        if *self.head.borrow() >= target {
            // Sealed elsewhere; expire_buckets will sweep it.
            return None;
        }
        self.select_and_execute(target).await
    }

    /// The per-block synchronization point: rank the bucket, submit at most
    /// one bundle, settle health accounting on the outcome.
    pub async fn select_and_execute(&self, target: u64) -> Option<SelectionResult> {
        let bucket = self.buckets.lock().remove(&target)?;
        if bucket.candidates.is_empty() {
            return None;
        }

        // Global rate cap: one bundle per target block, ever.
        if !self.submitted_targets.lock().insert(target) {
            for rated in &bucket.candidates {
                self.metrics.not_selected(&rated.candidate.pool_id);
            }
            return None;
        }

        let now = now_ns();
        let mut eligible = Vec::new();
        {
            let mut health = self.health.write();
            for rated in bucket.candidates {
                let label = rated.candidate.pool_id.clone();
                let ok = health
                    .get_mut(&label)
                    .map(|h| h.is_eligible(now))
                    .unwrap_or(false);
                if ok {
                    eligible.push(rated);
                } else {
                    debug!(pool = %label, "candidate from disabled pool skipped");
                    self.metrics.not_selected(&label);
                }
            }
        }
        if eligible.is_empty() {
            return None;
        }

        // Highest profit, then lowest gas, then lexical pool id. Fully
        // deterministic for identical inputs.
        eligible.sort_by(|a, b| {
            b.candidate
                .estimated_profit_usd
                .cmp(&a.candidate.estimated_profit_usd)
                .then(a.candidate.gas_units.cmp(&b.candidate.gas_units))
                .then(a.candidate.pool_id.cmp(&b.candidate.pool_id))
        });
        let mut rest = eligible;
        let winner = rest.remove(0);
        for loser in &rest {
            self.metrics.not_selected(&loser.candidate.pool_id);
        }

        let label = winner.candidate.pool_id.clone();
        info!(
            pool = %label,
            target,
            profit = %winner.candidate.estimated_profit_usd,
            provider = winner.selection.provider_name,
            "🎯 candidate selected"
        );

        let nonce = match self
            .chain
            .next_nonce(self.assembler.signer_address())
            .await
        {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(pool = %label, "nonce read failed: {e}");
                self.record_pool_failure(&label, FailureKind::RelayRejected);
                return Some(SelectionResult {
                    pool_id: label,
                    bundle_id: None,
                    outcome: None,
                    profit_usd: winner.candidate.estimated_profit_usd,
                });
            }
        };

        let bundle = match self
            .assembler
            .assemble(&winner.candidate, &winner.selection.call, nonce)
        {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(pool = %label, "bundle assembly failed: {e}");
                self.record_pool_failure(&label, e.kind());
                return Some(SelectionResult {
                    pool_id: label,
                    bundle_id: None,
                    outcome: None,
                    profit_usd: winner.candidate.estimated_profit_usd,
                });
            }
        };

        self.metrics.bundle_submitted(&label);
        let outcome = self.executor.execute(&bundle, &label).await;
        match &outcome {
            ExecutionOutcome::Included { block } => {
                info!(pool = %label, block, bundle = %bundle.id, "✅ bundle included");
                self.health.write().entry(label.clone()).and_modify(|h| h.record_success());
                self.metrics
                    .bundle_included(&label, winner.candidate.gas_units);
                self.metrics.profit(
                    winner.candidate.estimated_profit_wei.low_u128(),
                    winner.candidate.estimated_profit_usd,
                );
            }
            ExecutionOutcome::Reverted { reason } => {
                warn!(pool = %label, %reason, "bundle reverted");
                self.metrics.bundle_rejected();
                self.record_pool_failure(&label, FailureKind::RelayRejected);
            }
            ExecutionOutcome::TimedOut => {
                warn!(pool = %label, "bundle missed its inclusion window");
                self.record_pool_failure(&label, FailureKind::RelayRejected);
            }
            ExecutionOutcome::RelayRejected { reason } => {
                warn!(pool = %label, %reason, "relay rejected bundle");
                self.metrics.bundle_rejected();
                self.record_pool_failure(&label, FailureKind::RelayRejected);
            }
        }

        Some(SelectionResult {
            pool_id: label,
            bundle_id: Some(bundle.id),
            outcome: Some(outcome),
            profit_usd: winner.candidate.estimated_profit_usd,
        })
    }

    /// Drop buckets whose target block is already sealed.
    pub fn expire_buckets(&self, sealed_head: u64) {
        let mut buckets = self.buckets.lock();
        let expired: Vec<u64> = buckets
            .keys()
            .copied()
            .filter(|target| *target <= sealed_head)
            .collect();
        for target in expired {
            if let Some(bucket) = buckets.remove(&target) {
                for rated in &bucket.candidates {
                    self.metrics.not_selected(&rated.candidate.pool_id);
                }
                if !bucket.candidates.is_empty() {
                    debug!(target, dropped = bucket.candidates.len(), "bucket expired");
                }
            }
        }
    }

    /// Charge a failure to a pool. Tripping the budget disables the pool
    /// and starts its cooldown.
    pub fn record_pool_failure(&self, label: &str, kind: FailureKind) {
        self.metrics.failure(label, kind);
        if !kind.charges_health() {
            return;
        }
        let cooldown_ns = self.config.coordinator.cooldown_ms * 1_000_000;
        let mut health = self.health.write();
        if let Some(entry) = health.get_mut(label) {
            let tripped = entry.record_failure(
                self.config.coordinator.max_failures,
                cooldown_ns,
                now_ns(),
            );
            if tripped {
                warn!(
                    pool = %label,
                    failures = entry.failure_count,
                    cooldown_ms = self.config.coordinator.cooldown_ms,
                    "🚫 pool disabled"
                );
            }
        }
    }

    /// Point-in-time copy of a pool's health record.
    pub fn pool_health(&self, label: &str) -> Option<PoolHealth> {
        self.health.read().get(label).cloned()
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }
}

/// Resolves when the watched head moves past `anchor`.
async fn watch_past(head: &mut watch::Receiver<u64>, anchor: u64) {
    loop {
        if *head.borrow_and_update() > anchor {
            return;
        }
        if head.changed().await.is_err() {
            // Stream gone; never resolves, the timeout wins.
            std::future::pending::<()>().await;
        }
    }
}
