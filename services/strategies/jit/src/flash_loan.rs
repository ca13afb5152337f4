//! # Flash-Loan Providers - Closed Adapter Set and Selector
//!
//! ## Purpose
//!
//! Funding for the JIT mint without holding inventory: borrow the position
//! amounts atomically, mint, collect, repay. Two adapters cover the
//! practical fee/liquidity space — a zero-fee vault for small and medium
//! notionals and a premium-bearing lending pool for size — modeled as a
//! closed sum so the selector stays exhaustive.
//!
//! ## Integration Points
//!
//! - **Input Sources**: on-chain balance/supply/premium reads through the
//!   `LiquiditySource` transport (mocked deterministically in simulation)
//! - **Output Destinations**: calldata for the bundle assembler's pre-swap
//!   transaction; fee adjustments applied to candidate profit
//! - **Caching**: the lending-pool premium is cached with a 5-minute TTL and
//!   a static fallback; stale reads are tolerated, single writer refreshes
//!
//! ## Selection policy
//!
//! Providers are tried in priority order — vault first while the notional is
//! within its configured ceiling, lending pool first beyond it. The first
//! provider with sufficient liquidity whose post-fee profit still clears the
//! pool's floor wins; if none qualifies the candidate is dropped with
//! `NoViableFlashProvider`.

use crate::oracle::PriceOracle;
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use jitter_types::FailureKind;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error)]
pub enum FlashLoanError {
    #[error("no flash provider with sufficient liquidity and a clearing fee")]
    NoViableProvider,

    #[error("liquidity source: {0}")]
    Source(String),
}

impl FlashLoanError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::NoViableFlashProvider
    }
}

/// One borrow instruction for the executor contract.
#[derive(Debug, Clone)]
pub struct FlashCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// On-chain reads the adapters need. Swapped for a deterministic mock in
/// simulation mode.
#[async_trait]
pub trait LiquiditySource: Send + Sync {
    /// ERC-20 balance of `holder` in `token` (vault aggregated liquidity).
    async fn token_balance(&self, holder: Address, token: Address)
        -> Result<U256, FlashLoanError>;

    /// Total supply of the reserve's interest-bearing token.
    async fn reserve_supply(&self, token: Address) -> Result<U256, FlashLoanError>;

    /// Current flash premium in basis points from the pool configuration.
    async fn flash_premium_bps(&self) -> Result<u32, FlashLoanError>;
}

/// Deterministic liquidity for tests and simulation mode.
pub struct MockLiquiditySource {
    pub vault_balance: U256,
    pub reserve_supply: U256,
    pub premium_bps: u32,
}

impl Default for MockLiquiditySource {
    fn default() -> Self {
        Self {
            vault_balance: U256::exp10(22),   // 10k ETH-equivalent
            reserve_supply: U256::exp10(24),  // effectively bottomless
            premium_bps: 5,
        }
    }
}

#[async_trait]
impl LiquiditySource for MockLiquiditySource {
    async fn token_balance(
        &self,
        _holder: Address,
        _token: Address,
    ) -> Result<U256, FlashLoanError> {
        Ok(self.vault_balance)
    }

    async fn reserve_supply(&self, _token: Address) -> Result<U256, FlashLoanError> {
        Ok(self.reserve_supply)
    }

    async fn flash_premium_bps(&self) -> Result<u32, FlashLoanError> {
        Ok(self.premium_bps)
    }
}

/// Live reads over HTTP RPC.
pub struct RpcLiquiditySource {
    provider: Arc<ethers::providers::Provider<ethers::providers::Http>>,
    lending_pool: Address,
}

impl RpcLiquiditySource {
    pub fn new(
        provider: Arc<ethers::providers::Provider<ethers::providers::Http>>,
        lending_pool: Address,
    ) -> Self {
        Self {
            provider,
            lending_pool,
        }
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, FlashLoanError> {
        use ethers::providers::Middleware;
        use ethers::types::transaction::eip2718::TypedTransaction;
        use ethers::types::TransactionRequest;
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| FlashLoanError::Source(e.to_string()))
    }

    fn word_as_u256(raw: &Bytes, index: usize) -> Result<U256, FlashLoanError> {
        let start = index * 32;
        let end = start + 32;
        if raw.len() < end {
            return Err(FlashLoanError::Source("short eth_call return".to_string()));
        }
        Ok(U256::from_big_endian(&raw[start..end]))
    }
}

#[async_trait]
impl LiquiditySource for RpcLiquiditySource {
    async fn token_balance(
        &self,
        holder: Address,
        token: Address,
    ) -> Result<U256, FlashLoanError> {
        let mut data = id("balanceOf(address)").to_vec();
        data.extend(abi::encode(&[Token::Address(holder)]));
        let raw = self.eth_call(token, data).await?;
        Self::word_as_u256(&raw, 0)
    }

    async fn reserve_supply(&self, token: Address) -> Result<U256, FlashLoanError> {
        // getReserveData's ninth word is the interest-bearing token; its
        // total supply is the reserve's lendable depth.
        let mut data = id("getReserveData(address)").to_vec();
        data.extend(abi::encode(&[Token::Address(token)]));
        let raw = self.eth_call(self.lending_pool, data).await?;
        let word = Self::word_as_u256(&raw, 8)?;
        let reserve_token = Address::from_slice(&{
            let mut bytes = [0u8; 32];
            word.to_big_endian(&mut bytes);
            bytes[12..].to_vec()
        });
        let supply_raw = self
            .eth_call(reserve_token, id("totalSupply()").to_vec())
            .await?;
        Self::word_as_u256(&supply_raw, 0)
    }

    async fn flash_premium_bps(&self) -> Result<u32, FlashLoanError> {
        let raw = self
            .eth_call(self.lending_pool, id("FLASHLOAN_PREMIUM_TOTAL()").to_vec())
            .await?;
        Ok(Self::word_as_u256(&raw, 0)?.low_u32())
    }
}

/// Zero-fee vault adapter. Liquidity is whatever the vault holds of the
/// borrowed token.
pub struct VaultProvider {
    vault: Address,
    source: Arc<dyn LiquiditySource>,
}

impl VaultProvider {
    pub fn new(vault: Address, source: Arc<dyn LiquiditySource>) -> Self {
        Self { vault, source }
    }

    pub fn fee_bps(&self) -> u32 {
        0
    }

    pub async fn fee_bps_async(&self) -> u32 {
        0
    }

    pub fn calculate_fee(&self, _token: Address, _amount: U256) -> U256 {
        U256::zero()
    }

    pub async fn max_amount(&self, token: Address) -> Result<U256, FlashLoanError> {
        self.source.token_balance(self.vault, token).await
    }

    pub async fn has_sufficient_liquidity(
        &self,
        token: Address,
        amount: U256,
    ) -> Result<bool, FlashLoanError> {
        Ok(self.max_amount(token).await? >= amount)
    }

    pub fn build_call(
        &self,
        token: Address,
        amount: U256,
        receiver: Address,
        user_data: Bytes,
    ) -> FlashCall {
        let selector = id("flashLoan(address,address[],uint256[],bytes)");
        let mut data = selector.to_vec();
        data.extend(abi::encode(&[
            Token::Address(receiver),
            Token::Array(vec![Token::Address(token)]),
            Token::Array(vec![Token::Uint(amount)]),
            Token::Bytes(user_data.to_vec()),
        ]));
        FlashCall {
            to: self.vault,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub async fn health_check(&self, token: Address) -> bool {
        self.source.token_balance(self.vault, token).await.is_ok()
    }
}

/// Premium-bearing lending-pool adapter. The premium is read from on-chain
/// configuration behind a TTL cache; a static fallback covers cold and
/// failed reads.
pub struct LendingPoolProvider {
    pool: Address,
    source: Arc<dyn LiquiditySource>,
    premium_cache: RwLock<Option<(u32, Instant)>>,
    premium_ttl: Duration,
    fallback_premium_bps: u32,
}

impl LendingPoolProvider {
    pub fn new(
        pool: Address,
        source: Arc<dyn LiquiditySource>,
        premium_ttl: Duration,
        fallback_premium_bps: u32,
    ) -> Self {
        Self {
            pool,
            source,
            premium_cache: RwLock::new(None),
            premium_ttl,
            fallback_premium_bps,
        }
    }

    /// Cached premium; stale or cold reads fall back to the static value.
    pub fn fee_bps(&self) -> u32 {
        match *self.premium_cache.read() {
            Some((bps, at)) if at.elapsed() < self.premium_ttl => bps,
            _ => self.fallback_premium_bps,
        }
    }

    /// Premium with a refresh when the cache is cold or stale.
    pub async fn fee_bps_async(&self) -> u32 {
        if let Some((bps, at)) = *self.premium_cache.read() {
            if at.elapsed() < self.premium_ttl {
                return bps;
            }
        }
        match self.source.flash_premium_bps().await {
            Ok(bps) => {
                *self.premium_cache.write() = Some((bps, Instant::now()));
                bps
            }
            Err(e) => {
                warn!("flash premium read failed, using fallback: {e}");
                self.fallback_premium_bps
            }
        }
    }

    pub fn calculate_fee(&self, _token: Address, amount: U256) -> U256 {
        amount * U256::from(self.fee_bps()) / U256::from(10_000u64)
    }

    pub async fn max_amount(&self, token: Address) -> Result<U256, FlashLoanError> {
        self.source.reserve_supply(token).await
    }

    pub async fn has_sufficient_liquidity(
        &self,
        token: Address,
        amount: U256,
    ) -> Result<bool, FlashLoanError> {
        Ok(self.max_amount(token).await? >= amount)
    }

    pub fn build_call(
        &self,
        token: Address,
        amount: U256,
        receiver: Address,
        user_data: Bytes,
    ) -> FlashCall {
        let selector = id("flashLoanSimple(address,address,uint256,bytes,uint16)");
        let mut data = selector.to_vec();
        data.extend(abi::encode(&[
            Token::Address(receiver),
            Token::Address(token),
            Token::Uint(amount),
            Token::Bytes(user_data.to_vec()),
            Token::Uint(U256::zero()), // referral code
        ]));
        FlashCall {
            to: self.pool,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub async fn health_check(&self, _token: Address) -> bool {
        self.source.flash_premium_bps().await.is_ok()
    }
}

/// The closed provider set. A new funding source means a new variant and the
/// compiler walks every match for us.
pub enum FlashProvider {
    Vault(VaultProvider),
    LendingPool(LendingPoolProvider),
}

impl FlashProvider {
    pub fn name(&self) -> &'static str {
        match self {
            FlashProvider::Vault(_) => "vault",
            FlashProvider::LendingPool(_) => "lending_pool",
        }
    }

    pub fn fee_bps(&self) -> u32 {
        match self {
            FlashProvider::Vault(p) => p.fee_bps(),
            FlashProvider::LendingPool(p) => p.fee_bps(),
        }
    }

    pub async fn fee_bps_async(&self) -> u32 {
        match self {
            FlashProvider::Vault(p) => p.fee_bps_async().await,
            FlashProvider::LendingPool(p) => p.fee_bps_async().await,
        }
    }

    pub fn calculate_fee(&self, token: Address, amount: U256) -> U256 {
        match self {
            FlashProvider::Vault(p) => p.calculate_fee(token, amount),
            FlashProvider::LendingPool(p) => p.calculate_fee(token, amount),
        }
    }

    pub async fn max_amount(&self, token: Address) -> Result<U256, FlashLoanError> {
        match self {
            FlashProvider::Vault(p) => p.max_amount(token).await,
            FlashProvider::LendingPool(p) => p.max_amount(token).await,
        }
    }

    pub async fn has_sufficient_liquidity(
        &self,
        token: Address,
        amount: U256,
    ) -> Result<bool, FlashLoanError> {
        match self {
            FlashProvider::Vault(p) => p.has_sufficient_liquidity(token, amount).await,
            FlashProvider::LendingPool(p) => p.has_sufficient_liquidity(token, amount).await,
        }
    }

    pub fn build_call(
        &self,
        token: Address,
        amount: U256,
        receiver: Address,
        user_data: Bytes,
    ) -> FlashCall {
        match self {
            FlashProvider::Vault(p) => p.build_call(token, amount, receiver, user_data),
            FlashProvider::LendingPool(p) => p.build_call(token, amount, receiver, user_data),
        }
    }

    pub async fn health_check(&self, token: Address) -> bool {
        match self {
            FlashProvider::Vault(p) => p.health_check(token).await,
            FlashProvider::LendingPool(p) => p.health_check(token).await,
        }
    }
}

/// The provider chosen for a candidate, with its cost applied.
#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub provider_name: &'static str,
    pub call: FlashCall,
    pub fee_wei: U256,
    pub adjusted_profit_usd: Decimal,
}

/// Walks the providers in priority order for each candidate.
pub struct ProviderSelector {
    providers: Vec<FlashProvider>,
    oracle: Arc<dyn PriceOracle>,
    vault_max_notional_usd: Decimal,
}

impl ProviderSelector {
    pub fn new(
        providers: Vec<FlashProvider>,
        oracle: Arc<dyn PriceOracle>,
        vault_max_notional_usd: Decimal,
    ) -> Self {
        Self {
            providers,
            oracle,
            vault_max_notional_usd,
        }
    }

    /// Pick the funding source for a borrow of `amount` of `token`.
    ///
    /// `profit_usd` is the candidate's pre-flash-fee estimate; the returned
    /// selection carries the post-fee figure that actually cleared `floor`.
    pub async fn select(
        &self,
        token: Address,
        amount: U256,
        receiver: Address,
        user_data: Bytes,
        profit_usd: Decimal,
        floor_usd: Decimal,
    ) -> Result<ProviderSelection, FlashLoanError> {
        let notional_usd = self.oracle.to_usd(token, amount);
        let vault_first = notional_usd <= self.vault_max_notional_usd;

        let mut order: Vec<&FlashProvider> = self.providers.iter().collect();
        if !vault_first {
            order.sort_by_key(|p| match p {
                FlashProvider::LendingPool(_) => 0,
                FlashProvider::Vault(_) => 1,
            });
        }

        for provider in order {
            match provider.has_sufficient_liquidity(token, amount).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        provider = provider.name(),
                        ?amount,
                        "insufficient flash liquidity"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(provider = provider.name(), "liquidity probe failed: {e}");
                    continue;
                }
            }

            // Refresh the premium before costing it.
            provider.fee_bps_async().await;
            let fee_wei = provider.calculate_fee(token, amount);
            let fee_usd = self.oracle.to_usd(token, fee_wei);
            let adjusted = profit_usd - fee_usd;
            if adjusted < floor_usd {
                debug!(
                    provider = provider.name(),
                    %fee_usd,
                    %adjusted,
                    "post-fee profit below floor"
                );
                continue;
            }

            return Ok(ProviderSelection {
                provider_name: provider.name(),
                call: provider.build_call(token, amount, receiver, user_data),
                fee_wei,
                adjusted_profit_usd: adjusted,
            });
        }

        Err(FlashLoanError::NoViableProvider)
    }
}
