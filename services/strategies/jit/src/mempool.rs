//! # Mempool Subscription - Pending Transactions and Block Heads
//!
//! ## Purpose
//!
//! Background tasks that keep the coordinator fed: a pending-transaction
//! stream over the WS endpoint and a block-head stream that drives the
//! per-block selection deadline. Both reconnect with backoff and degrade
//! loudly but non-fatally; sustained loss of the endpoint is escalated by
//! the coordinator's liveness window, not here.
//!
//! ## Integration Points
//!
//! - **Input Sources**: `eth_subscribe` newPendingTransactions (full bodies)
//!   and newHeads over WS
//! - **Output Destinations**: bounded channel of raw transactions (drop-new
//!   when full; the per-pool mailboxes are the real back-pressure), watch
//!   channel of head numbers
//! - **Back-pressure**: dropping is counted, never blocking

use crate::metrics::MetricsSink;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::Transaction;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Forward full pending transactions into `sender` until it closes.
pub fn spawn_pending_tx_listener(
    ws_url: String,
    sender: mpsc::Sender<Transaction>,
    metrics: Arc<MetricsSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if sender.is_closed() {
                return;
            }
            let provider = match Provider::<Ws>::connect(&ws_url).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!("mempool WS connect failed: {e}; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            let mut stream = match provider.subscribe_full_pending_txs().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("pending-tx subscription failed: {e}; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            info!("📡 Subscribed to pending transactions");
            while let Some(tx) = stream.next().await {
                match sender.try_send(tx) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // The decoder is behind; newest intents lose here,
                        // per-pool latest-wins happens downstream.
                        metrics.mempool_drop();
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            }
            warn!("pending-tx stream ended; reconnecting");
        }
    })
}

/// Publish new head numbers into `heads` until every receiver is gone.
pub fn spawn_block_listener(ws_url: String, heads: watch::Sender<u64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if heads.is_closed() {
                return;
            }
            let provider = match Provider::<Ws>::connect(&ws_url).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!("head WS connect failed: {e}; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("newHeads subscription failed: {e}; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            info!("📡 Subscribed to block heads");
            while let Some(block) = stream.next().await {
                if let Some(number) = block.number {
                    if heads.send(number.as_u64()).is_err() {
                        return;
                    }
                }
            }
            warn!("head stream ended; reconnecting");
        }
    })
}
