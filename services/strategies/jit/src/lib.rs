//! # JIT Liquidity Strategy - Mempool-Driven Liquidity Provisioning
//!
//! ## Purpose
//!
//! Watches the public mempool for pending Uniswap-V3-style swaps, predicts
//! whether a narrow liquidity position minted immediately before the swap and
//! burned immediately after would capture enough fees to cover gas plus
//! flash-loan cost plus a profit floor, and submits an atomic
//! `[mint, victim, burn]` bundle to a block-builder relay when it would.
//!
//! ## Integration Points
//!
//! - **Input Sources**: WS pending-transaction stream, HTTP pool-state reads,
//!   on-chain flash-loan premium configuration
//! - **Output Destinations**: block-builder relay (bundle submission and
//!   simulation), Prometheus scrape endpoint
//! - **Coordination**: the pool coordinator owns all components and routes
//!   every failure back into per-pool health accounting
//!
//! ## Architecture Role
//!
//! ```text
//! Mempool WS → [Decoder] → [Coordinator] → [Simulator] → [Flash Selector]
//!                              ↓                ↓               ↓
//!                        Pool Mailboxes   Pool Fetcher     Fee + Liquidity
//!                        Block Buckets    TTL Cache        Provider Choice
//!                              ↓
//!                       [Bundle Assembler] → [Executor] → Relay
//!                        Signed pre/post     Dry-run gate   eth_sendBundle
//! ```

pub mod bundle;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod executor;
pub mod fetcher;
pub mod fixtures;
pub mod flash_loan;
pub mod mempool;
pub mod metrics;
pub mod oracle;
pub mod relay;
pub mod simulator;
