//! # Jitter Types Library - Shared Data Model
//!
//! ## Purpose
//!
//! Core data model shared across the JIT liquidity pipeline: pool identity and
//! snapshots, decoded swap intents, proposed positions, opportunity candidates,
//! per-pool health accounting, and the relay bundle shape. Everything here is
//! plain data; behavior lives in the math library and the strategy service.
//!
//! ## Integration Points
//!
//! - **Producers**: swap decoder (SwapIntent), pool state fetcher (PoolState),
//!   simulator (JitPosition, OpportunityCandidate), bundle assembler (Bundle)
//! - **Consumers**: coordinator (health table, candidate buckets), executor
//!   (in-flight bundle records), metrics (FailureKind labels)
//! - **Precision**: wei amounts stay `U256`, USD values are `Decimal` —
//!   no floating point in profit paths

pub mod bundle;
pub mod failure;
pub mod health;
pub mod intent;
pub mod pool;
pub mod position;

pub use bundle::Bundle;
pub use failure::FailureKind;
pub use health::PoolHealth;
pub use intent::SwapIntent;
pub use pool::{PoolId, PoolState};
pub use position::{JitPosition, OpportunityCandidate};
