//! # Swap Decoder - Pending Transactions to Typed Intents
//!
//! ## Purpose
//!
//! Pure decoding of raw pending transactions into `SwapIntent`s. Recognizes
//! the canonical router's `exactInputSingle` entry point, resolves the routed
//! pool against the configured roster, and filters dust swaps before they
//! reach the coordinator's queues. No network access: everything is a
//! function of transaction bytes and static configuration.
//!
//! ## Integration Points
//!
//! - **Input Sources**: raw `Transaction`s from the mempool subscription
//! - **Output Destinations**: the coordinator's per-pool mailboxes
//! - **Filtering**: non-router traffic and unknown pools are silently
//!   dropped; below-minimum notionals are dropped with a counter

use crate::config::{known, PoolConfig};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Transaction, U256};
use jitter_types::{PoolId, SwapIntent};
use std::collections::HashMap;
use std::str::FromStr;

/// `exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))`
const EXACT_INPUT_SINGLE: [u8; 4] = [0x41, 0x4b, 0xf3, 0x89];

/// Resolves (tokenIn, tokenOut, fee) triples to configured pools.
pub struct PoolRegistry {
    router: Address,
    by_pair: HashMap<(Address, Address, u32), PoolId>,
}

impl PoolRegistry {
    pub fn from_configs(pools: &[PoolConfig]) -> anyhow::Result<Self> {
        let router = Address::from_str(known::SWAP_ROUTER).expect("known router address");
        let mut by_pair = HashMap::new();
        for pool in pools {
            let id = PoolId {
                label: pool.label.clone(),
                address: Address::from_str(&pool.address)?,
                token0: Address::from_str(&pool.token0)?,
                token1: Address::from_str(&pool.token1)?,
                fee: pool.fee,
                tick_spacing: pool.tick_spacing,
            };
            let key = pair_key(id.token0, id.token1, id.fee);
            by_pair.insert(key, id);
        }
        Ok(Self { router, by_pair })
    }

    pub fn lookup(&self, token_a: Address, token_b: Address, fee: u32) -> Option<&PoolId> {
        self.by_pair.get(&pair_key(token_a, token_b, fee))
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolId> {
        self.by_pair.values()
    }
}

fn pair_key(a: Address, b: Address, fee: u32) -> (Address, Address, u32) {
    if a <= b {
        (a, b, fee)
    } else {
        (b, a, fee)
    }
}

/// Outcome of decoding one pending transaction.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A swap on a monitored pool, large enough to evaluate
    Intent(Box<SwapIntent>),
    /// A monitored swap below the minimum notional; counted, not evaluated
    BelowMinimum,
    /// Anything else in the mempool
    NotASwap,
}

/// Decode one pending transaction. Pure; never touches the network.
pub fn decode_swap(
    tx: &Transaction,
    registry: &PoolRegistry,
    min_amount_wei: U256,
) -> DecodeOutcome {
    if tx.to != Some(registry.router) || tx.input.len() < 4 {
        return DecodeOutcome::NotASwap;
    }
    if tx.input[..4] != EXACT_INPUT_SINGLE {
        return DecodeOutcome::NotASwap;
    }

    let tokens = match abi::decode(
        &[
            ParamType::Address,   // tokenIn
            ParamType::Address,   // tokenOut
            ParamType::Uint(24),  // fee
            ParamType::Address,   // recipient
            ParamType::Uint(256), // deadline
            ParamType::Uint(256), // amountIn
            ParamType::Uint(256), // amountOutMinimum
            ParamType::Uint(160), // sqrtPriceLimitX96
        ],
        &tx.input[4..],
    ) {
        Ok(tokens) => tokens,
        Err(_) => return DecodeOutcome::NotASwap,
    };

    let (token_in, token_out, fee, deadline, amount_in, amount_out_minimum) = match (
        &tokens[0], &tokens[1], &tokens[2], &tokens[4], &tokens[5], &tokens[6],
    ) {
        (
            Token::Address(token_in),
            Token::Address(token_out),
            Token::Uint(fee),
            Token::Uint(deadline),
            Token::Uint(amount_in),
            Token::Uint(amount_out_minimum),
        ) => (
            *token_in,
            *token_out,
            fee.low_u32(),
            *deadline,
            *amount_in,
            *amount_out_minimum,
        ),
        _ => return DecodeOutcome::NotASwap,
    };

    let pool = match registry.lookup(token_in, token_out, fee) {
        Some(pool) => pool.clone(),
        None => return DecodeOutcome::NotASwap,
    };

    if amount_in < min_amount_wei {
        return DecodeOutcome::BelowMinimum;
    }

    DecodeOutcome::Intent(Box::new(SwapIntent {
        tx_hash: tx.hash,
        sender: tx.from,
        pool,
        token_in,
        token_out,
        amount_in,
        amount_out_minimum,
        fee,
        deadline,
        raw_tx: tx.rlp(),
        max_fee_per_gas: tx.max_fee_per_gas.or(tx.gas_price).unwrap_or_default(),
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas.unwrap_or_default(),
        nonce: tx.nonce,
    }))
}
