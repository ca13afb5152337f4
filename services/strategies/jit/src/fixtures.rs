//! # Fixture Records - Recorded State for Offline Replay
//!
//! ## Purpose
//!
//! JSON snapshots of pool state plus observed (or synthesized) pending swaps
//! that the `simulate` subcommand replays through the real pipeline without
//! touching the network. Schemas are stable across the `fixtureVersion`
//! field; loading fails closed on version or token mismatches.
//!
//! ## Integration Points
//!
//! - **Producers**: the `fixtures` subcommand (fresh recordings)
//! - **Consumers**: the `simulate` subcommand (replay)
//! - **Validation**: every token address must checksum-parse, and tokens
//!   claiming a known symbol must carry that symbol's canonical mainnet
//!   address — divergent USDC clones are rejected at load

use crate::config::known;
use crate::fetcher::normalize_address;
use ethers::types::{Address, Bytes, H256, U256};
use jitter_types::{PoolId, PoolState, SwapIntent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;

pub const FIXTURE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported fixtureVersion {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("token {symbol} rejected: {reason}")]
    TokenRejected { symbol: String, reason: String },

    #[error("malformed field {field}: {value}")]
    BadField { field: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFixture {
    pub symbol: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolFixture {
    pub label: String,
    pub address: String,
    pub token0: TokenFixture,
    pub token1: TokenFixture,
    pub fee: u32,
    pub tick_spacing: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFixture {
    pub sqrt_price_x96: String,
    pub tick: i32,
    pub liquidity: String,
    pub unlocked: bool,
    pub block: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapFixture {
    pub tx_hash: String,
    pub sender: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub amount_out_minimum: String,
    pub fee: u32,
    pub deadline: u64,
    pub raw_tx: String,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureFile {
    #[serde(rename = "fixtureVersion")]
    pub fixture_version: u32,
    pub pool: PoolFixture,
    pub state: StateFixture,
    pub swaps: Vec<SwapFixture>,
}

/// Canonical address for a symbol the loader recognizes. The mainnet USDC
/// address is authoritative; fixture generators shipping the other clone
/// are rejected here.
fn canonical_address(symbol: &str) -> Option<&'static str> {
    match symbol {
        "USDC" => Some(known::USDC),
        "WETH" => Some(known::WETH),
        "DAI" => Some(known::DAI),
        _ => None,
    }
}

fn validate_token(token: &TokenFixture) -> Result<Address, FixtureError> {
    let checksummed =
        normalize_address(&token.address).map_err(|e| FixtureError::TokenRejected {
            symbol: token.symbol.clone(),
            reason: e.to_string(),
        })?;
    let canonical = canonical_address(&token.symbol).ok_or_else(|| FixtureError::TokenRejected {
        symbol: token.symbol.clone(),
        reason: "unknown token symbol".to_string(),
    })?;
    if checksummed != canonical {
        return Err(FixtureError::TokenRejected {
            symbol: token.symbol.clone(),
            reason: format!("address {checksummed} is not the canonical {canonical}"),
        });
    }
    Address::from_str(&checksummed).map_err(|_| FixtureError::TokenRejected {
        symbol: token.symbol.clone(),
        reason: "unparseable after checksum".to_string(),
    })
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, FixtureError> {
    U256::from_dec_str(value).map_err(|_| FixtureError::BadField {
        field,
        value: value.to_string(),
    })
}

impl FixtureFile {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let contents = std::fs::read_to_string(path)?;
        let fixture: FixtureFile = serde_json::from_str(&contents)?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn save(&self, path: &Path) -> Result<(), FixtureError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FixtureError> {
        if self.fixture_version != FIXTURE_VERSION {
            return Err(FixtureError::VersionMismatch {
                found: self.fixture_version,
                expected: FIXTURE_VERSION,
            });
        }
        validate_token(&self.pool.token0)?;
        validate_token(&self.pool.token1)?;
        normalize_address(&self.pool.address).map_err(|e| FixtureError::BadField {
            field: "pool.address",
            value: e.to_string(),
        })?;
        Ok(())
    }

    pub fn pool_id(&self) -> Result<PoolId, FixtureError> {
        Ok(PoolId {
            label: self.pool.label.clone(),
            address: Address::from_str(&self.pool.address).map_err(|_| FixtureError::BadField {
                field: "pool.address",
                value: self.pool.address.clone(),
            })?,
            token0: validate_token(&self.pool.token0)?,
            token1: validate_token(&self.pool.token1)?,
            fee: self.pool.fee,
            tick_spacing: self.pool.tick_spacing,
        })
    }

    pub fn pool_state(&self) -> Result<PoolState, FixtureError> {
        let liquidity = parse_u256("state.liquidity", &self.state.liquidity)?;
        if liquidity > U256::from(u128::MAX) {
            return Err(FixtureError::BadField {
                field: "state.liquidity",
                value: self.state.liquidity.clone(),
            });
        }
        Ok(PoolState {
            sqrt_price_x96: parse_u256("state.sqrt_price_x96", &self.state.sqrt_price_x96)?,
            tick: self.state.tick,
            liquidity: liquidity.as_u128(),
            unlocked: self.state.unlocked,
            block: self.state.block,
            fetched_at: Instant::now(),
        })
    }

    pub fn intents(&self) -> Result<Vec<SwapIntent>, FixtureError> {
        let pool = self.pool_id()?;
        self.swaps
            .iter()
            .map(|swap| {
                Ok(SwapIntent {
                    tx_hash: H256::from_str(&swap.tx_hash).map_err(|_| FixtureError::BadField {
                        field: "swap.tx_hash",
                        value: swap.tx_hash.clone(),
                    })?,
                    sender: Address::from_str(&swap.sender).map_err(|_| {
                        FixtureError::BadField {
                            field: "swap.sender",
                            value: swap.sender.clone(),
                        }
                    })?,
                    pool: pool.clone(),
                    token_in: Address::from_str(&swap.token_in).map_err(|_| {
                        FixtureError::BadField {
                            field: "swap.token_in",
                            value: swap.token_in.clone(),
                        }
                    })?,
                    token_out: Address::from_str(&swap.token_out).map_err(|_| {
                        FixtureError::BadField {
                            field: "swap.token_out",
                            value: swap.token_out.clone(),
                        }
                    })?,
                    amount_in: parse_u256("swap.amount_in", &swap.amount_in)?,
                    amount_out_minimum: parse_u256(
                        "swap.amount_out_minimum",
                        &swap.amount_out_minimum,
                    )?,
                    fee: swap.fee,
                    deadline: U256::from(swap.deadline),
                    raw_tx: Bytes::from(hex::decode(swap.raw_tx.trim_start_matches("0x")).map_err(
                        |_| FixtureError::BadField {
                            field: "swap.raw_tx",
                            value: swap.raw_tx.clone(),
                        },
                    )?),
                    max_fee_per_gas: parse_u256("swap.max_fee_per_gas", &swap.max_fee_per_gas)?,
                    max_priority_fee_per_gas: parse_u256(
                        "swap.max_priority_fee_per_gas",
                        &swap.max_priority_fee_per_gas,
                    )?,
                    nonce: U256::from(swap.nonce),
                })
            })
            .collect()
    }
}

/// Build a fixture from live components: the pool roster entry, its state at
/// the anchor block, and whatever swaps were observed. A deterministic
/// synthetic swap is generated when none were, so replays have work to do.
pub fn build_fixture(pool: &PoolId, state: &PoolState, swaps: Vec<SwapIntent>) -> FixtureFile {
    let swaps = if swaps.is_empty() {
        vec![synthetic_swap(pool)]
    } else {
        swaps.iter().map(swap_to_fixture).collect()
    };
    FixtureFile {
        fixture_version: FIXTURE_VERSION,
        pool: PoolFixture {
            label: pool.label.clone(),
            address: format!("{:?}", pool.address),
            token0: TokenFixture {
                symbol: symbol_for(pool.token0),
                address: format!("{:?}", pool.token0),
            },
            token1: TokenFixture {
                symbol: symbol_for(pool.token1),
                address: format!("{:?}", pool.token1),
            },
            fee: pool.fee,
            tick_spacing: pool.tick_spacing,
        },
        state: StateFixture {
            sqrt_price_x96: state.sqrt_price_x96.to_string(),
            tick: state.tick,
            liquidity: state.liquidity.to_string(),
            unlocked: state.unlocked,
            block: state.block,
        },
        swaps,
    }
}

fn symbol_for(token: Address) -> String {
    for symbol in ["USDC", "WETH", "DAI"] {
        if let Some(canonical) = canonical_address(symbol) {
            if Address::from_str(canonical).ok() == Some(token) {
                return symbol.to_string();
            }
        }
    }
    "UNKNOWN".to_string()
}

fn swap_to_fixture(intent: &SwapIntent) -> SwapFixture {
    SwapFixture {
        tx_hash: format!("{:?}", intent.tx_hash),
        sender: format!("{:?}", intent.sender),
        token_in: format!("{:?}", intent.token_in),
        token_out: format!("{:?}", intent.token_out),
        amount_in: intent.amount_in.to_string(),
        amount_out_minimum: intent.amount_out_minimum.to_string(),
        fee: intent.fee,
        deadline: intent.deadline.low_u64(),
        raw_tx: format!("0x{}", hex::encode(&intent.raw_tx)),
        max_fee_per_gas: intent.max_fee_per_gas.to_string(),
        max_priority_fee_per_gas: intent.max_priority_fee_per_gas.to_string(),
        nonce: intent.nonce.low_u64(),
    }
}

/// A reproducible 150-whole-token swap of token1 into the pool, priced at
/// 20 gwei. Fixed bytes, fixed hash: replays are bit-stable.
fn synthetic_swap(pool: &PoolId) -> SwapFixture {
    SwapFixture {
        tx_hash: format!("{:?}", H256::repeat_byte(0x51)),
        sender: format!("{:?}", Address::repeat_byte(0x05)),
        token_in: format!("{:?}", pool.token1),
        token_out: format!("{:?}", pool.token0),
        amount_in: (U256::from(150u64) * U256::exp10(18)).to_string(),
        amount_out_minimum: "0".to_string(),
        fee: pool.fee,
        deadline: 4_000_000_000,
        raw_tx: "0x02f87001018477359400847735940083093a8094e592427a0aece92de3edee1f18e0157c0586156480b844414bf38900000000000000000000000000000000000000000000000000000000000000c0".to_string(),
        max_fee_per_gas: "40000000000".to_string(),
        max_priority_fee_per_gas: "20000000000".to_string(),
        nonce: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitter_amm::sqrt_ratio_at_tick;

    fn sample_pool() -> PoolId {
        PoolId {
            label: "WETH-USDC-0.05%".to_string(),
            address: Address::from_str(known::WETH_USDC_005).unwrap(),
            token0: Address::from_str(known::USDC).unwrap(),
            token1: Address::from_str(known::WETH).unwrap(),
            fee: 500,
            tick_spacing: 10,
        }
    }

    fn sample_state() -> PoolState {
        PoolState {
            sqrt_price_x96: sqrt_ratio_at_tick(201240).unwrap(),
            tick: 201240,
            liquidity: 5_000_000_000_000_000_000,
            unlocked: true,
            block: 100,
            fetched_at: Instant::now(),
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weth-usdc.json");

        let fixture = build_fixture(&sample_pool(), &sample_state(), Vec::new());
        fixture.save(&path).unwrap();
        let loaded = FixtureFile::load(&path).unwrap();

        assert_eq!(loaded.fixture_version, FIXTURE_VERSION);
        let state = loaded.pool_state().unwrap();
        assert_eq!(state.tick, 201240);
        assert_eq!(state.liquidity, 5_000_000_000_000_000_000);
        let intents = loaded.intents().unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].amount_in,
            U256::from(150u64) * U256::exp10(18)
        );
    }

    #[test]
    fn divergent_usdc_address_is_rejected() {
        let mut fixture = build_fixture(&sample_pool(), &sample_state(), Vec::new());
        // The "other" USDC some generators ship.
        fixture.pool.token0.address =
            "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string();
        match fixture.validate() {
            Err(FixtureError::TokenRejected { symbol, .. }) => assert_eq!(symbol, "USDC"),
            other => panic!("expected token rejection, got {other:?}"),
        }
    }

    #[test]
    fn unknown_symbols_fail_closed() {
        let mut fixture = build_fixture(&sample_pool(), &sample_state(), Vec::new());
        fixture.pool.token0.symbol = "USDC2".to_string();
        assert!(matches!(
            fixture.validate(),
            Err(FixtureError::TokenRejected { .. })
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut fixture = build_fixture(&sample_pool(), &sample_state(), Vec::new());
        fixture.fixture_version = 99;
        assert!(matches!(
            fixture.validate(),
            Err(FixtureError::VersionMismatch { found: 99, .. })
        ));
    }
}
