//! # Bundle Assembler - Signed Pre/Victim/Post Ordering
//!
//! ## Purpose
//!
//! Builds the atomic bundle for a selected candidate: our signed pre-swap
//! transaction (flash-borrow + mint through the executor contract), the
//! victim's raw transaction byte-for-byte, and our signed post-swap
//! transaction (burn + collect + repay), all targeted at `anchor + 1`.
//! Priority fees are pinned at or above the victim's so the relay cannot
//! order us behind them; the configured gwei cap is a hard refusal.
//!
//! ## Integration Points
//!
//! - **Input Sources**: selected `OpportunityCandidate` + flash call from the
//!   provider selector, signing key from configuration
//! - **Output Destinations**: the executor (relay submission)
//! - **Key handling**: the wallet lives inside the assembler and raw key
//!   material never crosses its boundary

use crate::config::BundleConfig;
use crate::flash_loan::FlashCall;
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, U256};
use ethers::utils::{id, keccak256};
use jitter_types::{Bundle, FailureKind, OpportunityCandidate};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Clone, Error)]
pub enum BundleError {
    #[error("required priority fee {required_gwei} gwei exceeds cap {cap_gwei} gwei")]
    GasPriceExceedsCap { required_gwei: u64, cap_gwei: u64 },

    #[error("transaction signing failed: {0}")]
    Signing(String),

    #[error("invalid executor contract address: {0}")]
    BadContract(String),
}

impl BundleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BundleError::GasPriceExceedsCap { .. } => FailureKind::GasPriceExceedsCap,
            // Signing or contract problems surface exactly like a relay
            // refusal from the coordinator's point of view.
            BundleError::Signing(_) | BundleError::BadContract(_) => FailureKind::RelayRejected,
        }
    }
}

/// Assembles and signs bundles. Owns the only copy of the signing key.
pub struct BundleAssembler {
    wallet: LocalWallet,
    jit_contract: Address,
    config: BundleConfig,
    chain_id: u64,
}

impl BundleAssembler {
    pub fn new(wallet: LocalWallet, config: BundleConfig, chain_id: u64) -> Result<Self, BundleError> {
        let jit_contract = Address::from_str(&config.jit_contract)
            .map_err(|e| BundleError::BadContract(e.to_string()))?;
        let wallet = wallet.with_chain_id(chain_id);
        Ok(Self {
            wallet,
            jit_contract,
            config,
            chain_id,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    /// Build the `[pre, victim, post]` bundle for one candidate.
    ///
    /// `nonce` is the signer's next nonce at the target block; the post
    /// transaction uses `nonce + 1`.
    pub fn assemble(
        &self,
        candidate: &OpportunityCandidate,
        flash_call: &FlashCall,
        nonce: U256,
    ) -> Result<Bundle, BundleError> {
        let victim_priority = candidate.intent.effective_priority_fee();
        let cap_wei = U256::from(self.config.max_gas_gwei) * U256::from(GWEI);
        if victim_priority > cap_wei {
            return Err(BundleError::GasPriceExceedsCap {
                required_gwei: (victim_priority / U256::from(GWEI)).as_u64(),
                cap_gwei: self.config.max_gas_gwei,
            });
        }

        // Match the victim's priority exactly; paying more buys nothing once
        // we are adjacent in the same bundle.
        let priority = victim_priority;
        let max_fee = candidate.intent.max_fee_per_gas.max(priority);

        let pre_raw = self.sign_call(
            self.encode_open(candidate, flash_call),
            nonce,
            priority,
            max_fee,
        )?;
        let post_raw = self.sign_call(
            self.encode_close(candidate),
            nonce + U256::one(),
            priority,
            max_fee,
        )?;

        let target_block = candidate.target_block();
        let id_material = [
            candidate.intent.tx_hash.as_bytes(),
            &target_block.to_be_bytes()[..],
        ]
        .concat();
        let bundle = Bundle {
            transactions: vec![pre_raw, candidate.intent.raw_tx.clone(), post_raw],
            target_block,
            min_timestamp: None,
            max_timestamp: None,
            id: hex::encode(&keccak256(id_material)[..8]),
        };
        debug!(
            bundle = %bundle.id,
            target_block,
            pool = %candidate.pool_id,
            "assembled bundle"
        );
        Ok(bundle)
    }

    /// Pre-swap call: hand the executor contract the flash-loan instruction
    /// and the position to mint with the borrowed funds.
    fn encode_open(&self, candidate: &OpportunityCandidate, flash_call: &FlashCall) -> Bytes {
        let position = &candidate.position;
        let selector =
            id("openPosition(address,int24,int24,uint256,uint256,uint256,address,bytes)");
        let mut data = selector.to_vec();
        data.extend(abi::encode(&[
            Token::Address(position.pool.address),
            Token::Int(int24_token(position.tick_lower)),
            Token::Int(int24_token(position.tick_upper)),
            Token::Uint(position.amount0),
            Token::Uint(position.amount1),
            Token::Uint(U256::from(position.deadline)),
            Token::Address(flash_call.to),
            Token::Bytes(flash_call.data.to_vec()),
        ]));
        data.into()
    }

    /// Post-swap call: burn the range, collect fees, repay the loan.
    fn encode_close(&self, candidate: &OpportunityCandidate) -> Bytes {
        let position = &candidate.position;
        let selector = id("closePosition(address,int24,int24)");
        let mut data = selector.to_vec();
        data.extend(abi::encode(&[
            Token::Address(position.pool.address),
            Token::Int(int24_token(position.tick_lower)),
            Token::Int(int24_token(position.tick_upper)),
        ]));
        data.into()
    }

    fn sign_call(
        &self,
        data: Bytes,
        nonce: U256,
        priority: U256,
        max_fee: U256,
    ) -> Result<Bytes, BundleError> {
        let request = Eip1559TransactionRequest::new()
            .to(self.jit_contract)
            .data(data)
            .gas(self.config.tx_gas_limit)
            .nonce(nonce)
            .max_priority_fee_per_gas(priority)
            .max_fee_per_gas(max_fee)
            .chain_id(self.chain_id);
        let typed: TypedTransaction = request.into();
        let signature = self
            .wallet
            .sign_transaction_sync(&typed)
            .map_err(|e| BundleError::Signing(e.to_string()))?;
        Ok(typed.rlp_signed(&signature))
    }
}

/// Two's-complement int24 as the ABI expects it, sign-extended to 256 bits.
fn int24_token(tick: i32) -> U256 {
    if tick >= 0 {
        U256::from(tick as u64)
    } else {
        // Sign extension: U256::MAX is -1.
        U256::MAX - U256::from((-(tick as i64) - 1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use ethers::types::H256;
    use jitter_types::{JitPosition, PoolId, SwapIntent};

    fn test_wallet() -> LocalWallet {
        LocalWallet::from_bytes(&[0x01; 32]).unwrap()
    }

    fn candidate(priority_gwei: u64) -> OpportunityCandidate {
        let pool = PoolId {
            label: "WETH-USDC-0.05%".to_string(),
            address: Address::repeat_byte(0x88),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            fee: 500,
            tick_spacing: 10,
        };
        let intent = SwapIntent {
            tx_hash: H256::repeat_byte(0x42),
            sender: Address::repeat_byte(0x03),
            pool: pool.clone(),
            token_in: pool.token1,
            token_out: pool.token0,
            amount_in: U256::exp10(19),
            amount_out_minimum: U256::zero(),
            fee: 500,
            deadline: U256::from(4_000_000_000u64),
            raw_tx: vec![0x02, 0xf8, 0x71, 0xde, 0xad, 0xbe, 0xef].into(),
            max_fee_per_gas: U256::from(priority_gwei * GWEI) * 2,
            max_priority_fee_per_gas: U256::from(priority_gwei * GWEI),
            nonce: U256::from(7u64),
        };
        OpportunityCandidate {
            position: JitPosition {
                pool,
                tick_lower: 201140,
                tick_upper: 201340,
                amount0: U256::exp10(9),
                amount1: U256::exp10(18),
                liquidity: 1_000_000_000,
                deadline: 1_700_000_060,
            },
            estimated_profit_wei: U256::exp10(16),
            estimated_profit_usd: rust_decimal_macros::dec!(42),
            gas_units: 480_000,
            pool_id: "WETH-USDC-0.05%".to_string(),
            anchor_block: 100,
            created_at_ns: 1,
            intent,
        }
    }

    fn flash_call() -> FlashCall {
        FlashCall {
            to: Address::repeat_byte(0xba),
            data: vec![0x5c, 0x38, 0x44, 0x9e].into(),
            value: U256::zero(),
        }
    }

    fn assembler(max_gas_gwei: u64) -> BundleAssembler {
        let mut config = BotConfig::default().bundle;
        config.max_gas_gwei = max_gas_gwei;
        config.jit_contract = "0x000000000000000000000000000000000000dEaD".to_string();
        BundleAssembler::new(test_wallet(), config, 1).unwrap()
    }

    #[test]
    fn victim_raw_bytes_sit_verbatim_between_ours() {
        let candidate = candidate(20);
        let bundle = assembler(300)
            .assemble(&candidate, &flash_call(), U256::zero())
            .unwrap();
        assert_eq!(bundle.transaction_count(), 3);
        assert_eq!(
            bundle.transactions[Bundle::VICTIM_INDEX],
            candidate.intent.raw_tx
        );
        assert_ne!(bundle.transactions[0], bundle.transactions[2]);
        assert_eq!(bundle.target_block, 101);
    }

    #[test]
    fn priority_fee_cap_is_a_hard_refusal() {
        // Victim pays 30 gwei priority, our cap is 15.
        let candidate = candidate(30);
        let result = assembler(15).assemble(&candidate, &flash_call(), U256::zero());
        match result {
            Err(BundleError::GasPriceExceedsCap {
                required_gwei,
                cap_gwei,
            }) => {
                assert_eq!(required_gwei, 30);
                assert_eq!(cap_gwei, 15);
            }
            other => panic!("expected gas cap error, got {other:?}"),
        }
    }

    #[test]
    fn assembly_is_deterministic_for_fixed_inputs() {
        let candidate = candidate(20);
        let a = assembler(300)
            .assemble(&candidate, &flash_call(), U256::zero())
            .unwrap();
        let b = assembler(300)
            .assemble(&candidate, &flash_call(), U256::zero())
            .unwrap();
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn int24_encoding_is_twos_complement() {
        assert_eq!(int24_token(1), U256::one());
        assert_eq!(int24_token(-1), U256::MAX);
        assert_eq!(int24_token(-2), U256::MAX - 1);
        assert_eq!(int24_token(201140), U256::from(201140u64));
    }
}
