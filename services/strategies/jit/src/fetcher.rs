//! # Pool State Fetcher - Anchored Snapshots with TTL Cache
//!
//! ## Purpose
//!
//! Reads a pool's `slot0`, `liquidity`, `fee`, `tickSpacing` and token
//! addresses at a given block and caches the snapshot for roughly one block
//! time. Simulations anchored to the same `(pool, block)` must see the exact
//! same state, and a cache hit must cost nothing but a map lookup.
//!
//! ## Integration Points
//!
//! - **Input Sources**: HTTP RPC endpoint (hand-rolled `eth_call` probes), or
//!   the deterministic mock source in simulation mode
//! - **Output Destinations**: the simulator (anchor state) and the fixture
//!   recorder
//! - **Validation**: a pool that does not answer `fee()` or reports a locked
//!   slot0 is `PoolUnavailable`; malformed address input is `InvalidAddress`

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, TransactionRequest, U256};
use ethers::utils::to_checksum;
use jitter_types::{FailureKind, PoolState};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// One block on the base chain; snapshots older than this are refetched.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12);

// Probe selectors for the pool interface.
const SEL_SLOT0: [u8; 4] = [0x38, 0x50, 0xc7, 0xbd];
const SEL_LIQUIDITY: [u8; 4] = [0x1a, 0x68, 0x65, 0x02];
const SEL_FEE: [u8; 4] = [0xdd, 0xca, 0x3f, 0x43];

#[derive(Debug, Clone, Error)]
pub enum FetcherError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),
}

impl FetcherError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetcherError::InvalidAddress(_) => FailureKind::InvalidAddress,
            FetcherError::PoolUnavailable(_) => FailureKind::PoolUnavailable,
        }
    }
}

/// Normalize an address string to its checksummed form.
pub fn normalize_address(input: &str) -> Result<String, FetcherError> {
    let parsed = Address::from_str(input.trim())
        .map_err(|_| FetcherError::InvalidAddress(input.to_string()))?;
    Ok(to_checksum(&parsed, None))
}

/// Transport behind the fetcher. The RPC source talks to the chain; the mock
/// source fabricates deterministic state for simulation mode and tests.
#[async_trait]
pub trait PoolStateSource: Send + Sync {
    async fn fetch(&self, pool: Address, block: u64) -> Result<PoolState, FetcherError>;
}

/// Live source probing the pool contract with raw `eth_call`s.
pub struct RpcPoolStateSource {
    provider: Arc<Provider<Http>>,
}

impl RpcPoolStateSource {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }

    async fn call(
        &self,
        pool: Address,
        selector: [u8; 4],
        block: u64,
    ) -> Result<Bytes, FetcherError> {
        let request = TransactionRequest::new()
            .to(pool)
            .data(selector.to_vec());
        let tx: TypedTransaction = request.into();
        self.provider
            .call(&tx, Some(BlockId::from(block)))
            .await
            .map_err(|e| FetcherError::PoolUnavailable(format!("{pool:?}: {e}")))
    }
}

fn decode_int24(token: &Token) -> Option<i32> {
    match token {
        // int24 arrives sign-extended to 256 bits; the low 32 bits carry it.
        Token::Int(raw) => Some(raw.low_u32() as i32),
        _ => None,
    }
}

#[async_trait]
impl PoolStateSource for RpcPoolStateSource {
    async fn fetch(&self, pool: Address, block: u64) -> Result<PoolState, FetcherError> {
        // fee() doubles as the liveness probe: a contract that cannot answer
        // it is not a pool we can mint into.
        let fee_raw = self.call(pool, SEL_FEE, block).await?;
        if fee_raw.len() < 32 {
            return Err(FetcherError::PoolUnavailable(format!(
                "{pool:?} returned no fee"
            )));
        }

        let slot0_raw = self.call(pool, SEL_SLOT0, block).await?;
        let tokens = abi::decode(
            &[
                ParamType::Uint(160), // sqrtPriceX96
                ParamType::Int(24),   // tick
                ParamType::Uint(16),  // observationIndex
                ParamType::Uint(16),  // observationCardinality
                ParamType::Uint(16),  // observationCardinalityNext
                ParamType::Uint(8),   // feeProtocol
                ParamType::Bool,      // unlocked
            ],
            &slot0_raw,
        )
        .map_err(|e| FetcherError::PoolUnavailable(format!("{pool:?} slot0 decode: {e}")))?;

        let sqrt_price_x96 = match &tokens[0] {
            Token::Uint(v) => *v,
            _ => return Err(FetcherError::PoolUnavailable(format!("{pool:?} slot0 shape"))),
        };
        let tick = decode_int24(&tokens[1])
            .ok_or_else(|| FetcherError::PoolUnavailable(format!("{pool:?} slot0 shape")))?;
        let unlocked = matches!(tokens[6], Token::Bool(true));
        if !unlocked {
            return Err(FetcherError::PoolUnavailable(format!(
                "{pool:?} is locked mid-swap"
            )));
        }

        let liquidity_raw = self.call(pool, SEL_LIQUIDITY, block).await?;
        let liquidity_word = U256::from_big_endian(&liquidity_raw);
        if liquidity_word > U256::from(u128::MAX) {
            return Err(FetcherError::PoolUnavailable(format!(
                "{pool:?} liquidity out of range"
            )));
        }
        let liquidity = liquidity_word.as_u128();

        Ok(PoolState {
            sqrt_price_x96,
            tick,
            liquidity,
            unlocked,
            block,
            fetched_at: Instant::now(),
        })
    }
}

/// Deterministic state for simulation mode: a WETH/USDC-shaped pool pinned
/// at tick 201240 with ample in-range liquidity. Same inputs, same snapshot,
/// every run.
pub struct MockPoolStateSource {
    pub tick: i32,
    pub liquidity: u128,
}

impl Default for MockPoolStateSource {
    fn default() -> Self {
        Self {
            tick: 201240,
            liquidity: 5_000_000_000_000_000_000,
        }
    }
}

#[async_trait]
impl PoolStateSource for MockPoolStateSource {
    async fn fetch(&self, _pool: Address, block: u64) -> Result<PoolState, FetcherError> {
        let sqrt_price_x96 = jitter_amm::sqrt_ratio_at_tick(self.tick)
            .map_err(|e| FetcherError::PoolUnavailable(e.to_string()))?;
        Ok(PoolState {
            sqrt_price_x96,
            tick: self.tick,
            liquidity: self.liquidity,
            unlocked: true,
            block,
            fetched_at: Instant::now(),
        })
    }
}

/// The fetcher proper: source + TTL cache keyed by `(pool, block)`.
pub struct PoolStateFetcher {
    source: Arc<dyn PoolStateSource>,
    cache: DashMap<(Address, u64), PoolState>,
    ttl: Duration,
}

impl PoolStateFetcher {
    pub fn new(source: Arc<dyn PoolStateSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Snapshot of `pool` at `block`, from cache when fresh.
    pub async fn get_state(&self, pool: Address, block: u64) -> Result<PoolState, FetcherError> {
        if let Some(cached) = self.cache.get(&(pool, block)) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.clone());
            }
        }
        let state = self.source.fetch(pool, block).await?;
        debug!(pool = ?pool, block, tick = state.tick, "fetched pool state");
        self.cache.insert((pool, block), state.clone());
        Ok(state)
    }

    /// Batch form; states resolve concurrently.
    pub async fn get_states(
        &self,
        pools: &[Address],
        block: u64,
    ) -> Result<Vec<PoolState>, FetcherError> {
        let futures = pools.iter().map(|pool| self.get_state(*pool, block));
        futures_util::future::try_join_all(futures).await
    }

    /// Drop snapshots older than the TTL. Called opportunistically on block
    /// boundaries; correctness never depends on it.
    pub fn evict_stale(&self) {
        let ttl = self.ttl;
        self.cache.retain(|_, state| state.fetched_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSource {
        inner: MockPoolStateSource,
        calls: AtomicU64,
    }

    #[async_trait]
    impl PoolStateSource for CountingSource {
        async fn fetch(&self, pool: Address, block: u64) -> Result<PoolState, FetcherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.fetch(pool, block).await
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_source_and_is_identical() {
        let source = Arc::new(CountingSource {
            inner: MockPoolStateSource::default(),
            calls: AtomicU64::new(0),
        });
        let fetcher = PoolStateFetcher::new(source.clone(), DEFAULT_TTL);
        let pool = Address::repeat_byte(0x11);

        let first = fetcher.get_state(pool, 100).await.unwrap();
        let started = Instant::now();
        let second = fetcher.get_state(pool, 100).await.unwrap();
        let hit_elapsed = started.elapsed();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        // A hit never waits on the (20ms) source.
        assert!(hit_elapsed < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn distinct_blocks_are_distinct_cache_keys() {
        let source = Arc::new(CountingSource {
            inner: MockPoolStateSource::default(),
            calls: AtomicU64::new(0),
        });
        let fetcher = PoolStateFetcher::new(source.clone(), DEFAULT_TTL);
        let pool = Address::repeat_byte(0x22);

        fetcher.get_state(pool, 100).await.unwrap();
        fetcher.get_state(pool, 101).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn address_normalization_checksums_or_rejects() {
        let mixed = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
        assert_eq!(
            normalize_address(mixed).unwrap(),
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        );
        assert!(matches!(
            normalize_address("not-an-address"),
            Err(FetcherError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn mock_source_is_deterministic() {
        let source = MockPoolStateSource::default();
        let pool = Address::repeat_byte(0x33);
        let a = source.fetch(pool, 5).await.unwrap();
        let b = source.fetch(pool, 5).await.unwrap();
        assert_eq!(a.sqrt_price_x96, b.sqrt_price_x96);
        assert_eq!(a.tick, b.tick);
        assert_eq!(a.liquidity, b.liquidity);
    }
}
