//! Atomic transaction bundles targeted at a single block.

use ethers::types::Bytes;

/// An ordered group of raw signed transactions for relay submission.
///
/// Ordering is fixed at assembly: our pre-swap transaction, the victim's raw
/// transaction byte-for-byte as observed in the mempool, then our post-swap
/// transaction. The victim's signature is never touched.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Raw signed transactions in execution order
    pub transactions: Vec<Bytes>,
    /// Block the bundle is valid for
    pub target_block: u64,
    /// Earliest acceptable block timestamp
    pub min_timestamp: Option<u64>,
    /// Latest acceptable block timestamp
    pub max_timestamp: Option<u64>,
    /// Identifier for relay-side tracking and in-flight records
    pub id: String,
}

impl Bundle {
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Index of the victim transaction within the bundle.
    pub const VICTIM_INDEX: usize = 1;
}
