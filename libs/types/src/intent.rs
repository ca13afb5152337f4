//! Decoded pending swaps observed in the public mempool.

use crate::pool::PoolId;
use ethers::types::{Address, Bytes, H256, U256};

/// A pending `exactInputSingle` swap parsed from a raw mempool transaction.
///
/// The raw signed bytes are kept verbatim: they are re-emitted unchanged as
/// the middle transaction of the bundle, signature intact.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    /// Hash of the pending transaction
    pub tx_hash: H256,
    /// Transaction sender
    pub sender: Address,
    /// Pool the swap routes through
    pub pool: PoolId,
    /// Input token
    pub token_in: Address,
    /// Output token
    pub token_out: Address,
    /// Exact input amount
    pub amount_in: U256,
    /// Slippage bound the victim set
    pub amount_out_minimum: U256,
    /// Fee tier from calldata (hundredths of a bp)
    pub fee: u32,
    /// Swap deadline from calldata (unix seconds)
    pub deadline: U256,
    /// Raw signed transaction bytes, verbatim
    pub raw_tx: Bytes,
    /// EIP-1559 max fee per gas
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee per gas
    pub max_priority_fee_per_gas: U256,
    /// Sender nonce
    pub nonce: U256,
}

impl SwapIntent {
    /// The priority fee the relay will use when ordering this transaction.
    /// Legacy transactions carry their gas price in `max_fee_per_gas` with a
    /// zero priority field, so fall back to the max fee.
    pub fn effective_priority_fee(&self) -> U256 {
        if self.max_priority_fee_per_gas.is_zero() {
            self.max_fee_per_gas
        } else {
            self.max_priority_fee_per_gas
        }
    }
}
