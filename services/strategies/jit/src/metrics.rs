//! # Metrics Sink - Pipeline Counters and Scrape Endpoint
//!
//! ## Purpose
//!
//! Lock-free event counters for every stage of the opportunity pipeline,
//! per pool and global, rendered in Prometheus text format over a small
//! hyper endpoint. Emission is fire-and-forget: a counter bump is a couple
//! of relaxed atomic adds and can never exert back-pressure on the pipeline.
//!
//! ## Integration Points
//!
//! - **Producers**: decoder (swaps seen/dropped), coordinator (evaluations,
//!   selections, failures by kind), executor (submissions, inclusions)
//! - **Consumers**: Prometheus scraping `GET /metrics` on the configured port

use dashmap::DashMap;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use jitter_types::FailureKind;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Counters tracked for one pool.
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub swaps_detected: AtomicU64,
    pub intents_dropped: AtomicU64,
    pub simulated: AtomicU64,
    pub profitable: AtomicU64,
    pub not_selected: AtomicU64,
    pub bundles_submitted: AtomicU64,
    pub bundles_included: AtomicU64,
    pub failures: DashMap<FailureKind, AtomicU64>,
}

impl PoolCounters {
    fn record_failure(&self, kind: FailureKind) {
        self.failures
            .entry(kind)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Global pipeline metrics. One instance per process, shared by `Arc`.
#[derive(Debug, Default)]
pub struct MetricsSink {
    pub swaps_detected: AtomicU64,
    pub swaps_below_minimum: AtomicU64,
    pub mempool_dropped: AtomicU64,
    pub intents_dropped: AtomicU64,
    pub simulated: AtomicU64,
    pub profitable: AtomicU64,
    pub not_selected: AtomicU64,
    pub bundles_submitted: AtomicU64,
    pub bundles_included: AtomicU64,
    pub bundles_rejected: AtomicU64,
    pub gas_spent_units: AtomicU64,
    per_pool: DashMap<String, Arc<PoolCounters>>,
    /// USD totals need more than an integer; profit is low-rate, a mutex
    /// is fine off the hot path.
    net_profit_usd: Mutex<Decimal>,
    /// Wei profit modulo 2^64 would lie; keep the full value.
    net_profit_wei: Mutex<u128>,
}

impl MetricsSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pool(&self, pool_label: &str) -> Arc<PoolCounters> {
        self.per_pool
            .entry(pool_label.to_string())
            .or_default()
            .clone()
    }

    pub fn swap_detected(&self, pool_label: &str) {
        self.swaps_detected.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label)
            .swaps_detected
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn swap_below_minimum(&self) {
        self.swaps_below_minimum.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mempool_drop(&self) {
        self.mempool_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn intent_dropped(&self, pool_label: &str) {
        self.intents_dropped.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label)
            .intents_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn simulated(&self, pool_label: &str) {
        self.simulated.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label).simulated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn profitable(&self, pool_label: &str) {
        self.profitable.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label)
            .profitable
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_selected(&self, pool_label: &str) {
        self.not_selected.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label)
            .not_selected
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn bundle_submitted(&self, pool_label: &str) {
        self.bundles_submitted.fetch_add(1, Ordering::Relaxed);
        self.pool(pool_label)
            .bundles_submitted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn bundle_included(&self, pool_label: &str, gas_units: u64) {
        self.bundles_included.fetch_add(1, Ordering::Relaxed);
        self.gas_spent_units.fetch_add(gas_units, Ordering::Relaxed);
        self.pool(pool_label)
            .bundles_included
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn bundle_rejected(&self) {
        self.bundles_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure(&self, pool_label: &str, kind: FailureKind) {
        self.pool(pool_label).record_failure(kind);
    }

    pub fn profit(&self, wei: u128, usd: Decimal) {
        *self.net_profit_wei.lock() += wei;
        *self.net_profit_usd.lock() += usd;
    }

    pub fn failure_count(&self, pool_label: &str, kind: FailureKind) -> u64 {
        self.pool(pool_label)
            .failures
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn pool_counter(&self, pool_label: &str) -> Arc<PoolCounters> {
        self.pool(pool_label)
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        let gauge = |out: &mut String, name: &str, value: u64| {
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        };
        gauge(
            &mut out,
            "jit_swaps_detected_total",
            self.swaps_detected.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_swaps_below_minimum_total",
            self.swaps_below_minimum.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_mempool_dropped_total",
            self.mempool_dropped.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_intents_dropped_total",
            self.intents_dropped.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_opportunities_simulated_total",
            self.simulated.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_opportunities_profitable_total",
            self.profitable.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_opportunities_not_selected_total",
            self.not_selected.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_bundles_submitted_total",
            self.bundles_submitted.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_bundles_included_total",
            self.bundles_included.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_bundles_rejected_total",
            self.bundles_rejected.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "jit_gas_spent_units_total",
            self.gas_spent_units.load(Ordering::Relaxed),
        );
        let _ = writeln!(out, "# TYPE jit_net_profit_usd counter");
        let _ = writeln!(out, "jit_net_profit_usd {}", self.net_profit_usd.lock());
        let _ = writeln!(out, "# TYPE jit_net_profit_wei counter");
        let _ = writeln!(out, "jit_net_profit_wei {}", self.net_profit_wei.lock());

        let _ = writeln!(out, "# TYPE jit_pool_events_total counter");
        for entry in self.per_pool.iter() {
            let (label, counters) = (entry.key(), entry.value());
            let mut row = |stage: &str, value: u64| {
                let _ = writeln!(
                    out,
                    "jit_pool_events_total{{pool=\"{label}\",stage=\"{stage}\"}} {value}"
                );
            };
            row(
                "swaps_detected",
                counters.swaps_detected.load(Ordering::Relaxed),
            );
            row(
                "intents_dropped",
                counters.intents_dropped.load(Ordering::Relaxed),
            );
            row("simulated", counters.simulated.load(Ordering::Relaxed));
            row("profitable", counters.profitable.load(Ordering::Relaxed));
            row(
                "not_selected",
                counters.not_selected.load(Ordering::Relaxed),
            );
            row(
                "bundles_submitted",
                counters.bundles_submitted.load(Ordering::Relaxed),
            );
            row(
                "bundles_included",
                counters.bundles_included.load(Ordering::Relaxed),
            );
        }

        let _ = writeln!(out, "# TYPE jit_failures_total counter");
        for entry in self.per_pool.iter() {
            let (label, counters) = (entry.key(), entry.value());
            for failure in counters.failures.iter() {
                let _ = writeln!(
                    out,
                    "jit_failures_total{{pool=\"{label}\",kind=\"{}\"}} {}",
                    failure.key().label(),
                    failure.value().load(Ordering::Relaxed)
                );
            }
        }
        out
    }
}

async fn serve_scrape(
    req: Request<Body>,
    sink: Arc<MetricsSink>,
) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Ok(Response::new(Body::from(sink.render()))),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found"))
            .expect("static response")),
    }
}

/// Start the scrape endpoint on a background task. Failure to bind is logged
/// and swallowed: metrics must never take the pipeline down.
pub fn spawn_scrape_endpoint(sink: Arc<MetricsSink>, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::spawn(async move {
        let make_svc = make_service_fn(move |_conn| {
            let sink = sink.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_scrape(req, sink.clone())))
            }
        });
        let builder = match Server::try_bind(&addr) {
            Ok(builder) => builder,
            Err(e) => {
                warn!("metrics endpoint failed to bind {addr}: {e}");
                return;
            }
        };
        info!("📊 Metrics endpoint listening on {addr}/metrics");
        if let Err(e) = builder.serve(make_svc).await {
            warn!("metrics endpoint terminated: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_pool_and_failure_series() {
        let sink = MetricsSink::new();
        sink.swap_detected("WETH-USDC-0.05%");
        sink.simulated("WETH-USDC-0.05%");
        sink.failure("WETH-USDC-0.05%", FailureKind::GasPriceExceedsCap);
        sink.profit(1_000_000_000_000_000, Decimal::from(42));

        let text = sink.render();
        assert!(text.contains("jit_swaps_detected_total 1"));
        assert!(text.contains("pool=\"WETH-USDC-0.05%\",stage=\"simulated\"} 1"));
        assert!(text.contains("kind=\"gas_price_exceeds_cap\"} 1"));
        assert!(text.contains("jit_net_profit_usd 42"));
    }

    #[test]
    fn drops_are_counted_not_errored() {
        let sink = MetricsSink::new();
        sink.intent_dropped("A");
        sink.intent_dropped("A");
        assert_eq!(sink.intents_dropped.load(Ordering::Relaxed), 2);
    }
}
