//! # Relay Client - Bundle Submission and Simulation RPC
//!
//! ## Purpose
//!
//! JSON-RPC client for the block-builder relay: `eth_sendBundle` for
//! submission, `eth_callBundle` for pre-flight simulation. The wire envelope
//! is the ordered list of raw signed transactions, a hex target block, and
//! optional timestamp bounds; requests carry the searcher-identity signature
//! header the relay uses for reputation.
//!
//! ## Integration Points
//!
//! - **Input Sources**: assembled `Bundle`s from the executor
//! - **Output Destinations**: one HTTPS relay endpoint
//! - **Timeouts**: every call is bounded (default 1 s); the relay being slow
//!   must never hold the block deadline hostage

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::keccak256;
use jitter_types::Bundle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("relay rejected: {0}")]
    Rejected(String),

    #[error("relay call timed out")]
    Timeout,

    #[error("relay transport: {0}")]
    Transport(String),
}

/// Outcome of `eth_callBundle`.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub success: bool,
    pub revert_reason: Option<String>,
    pub gas_used: u64,
}

/// The relay surface the executor depends on. Production uses the HTTP
/// client; tests substitute a recorder to prove dry-run never submits.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationReport, RelayError>;
    async fn submit(&self, bundle: &Bundle) -> Result<String, RelayError>;
}

/// In-process stand-in used whenever bundles must not leave the process:
/// dry-run mode and simulation mode. Simulation always succeeds;
/// submission refuses.
pub struct LocalSimRelay;

#[async_trait]
impl BundleRelay for LocalSimRelay {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationReport, RelayError> {
        debug!(bundle = %bundle.id, "local simulation (no relay contact)");
        Ok(SimulationReport {
            success: true,
            revert_reason: None,
            gas_used: 0,
        })
    }

    async fn submit(&self, _bundle: &Bundle) -> Result<String, RelayError> {
        Err(RelayError::Rejected(
            "local relay never broadcasts".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct BundleParams {
    txs: Vec<String>,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "minTimestamp", skip_serializing_if = "Option::is_none")]
    min_timestamp: Option<u64>,
    #[serde(rename = "maxTimestamp", skip_serializing_if = "Option::is_none")]
    max_timestamp: Option<u64>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

/// HTTPS relay client with identity signing.
pub struct RelayClient {
    http: reqwest::Client,
    relay_url: Url,
    identity: LocalWallet,
}

impl RelayClient {
    pub fn new(relay_url: &str, identity: LocalWallet, timeout: Duration) -> Result<Self, RelayError> {
        let relay_url = Url::parse(relay_url).map_err(|e| RelayError::Transport(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            relay_url,
            identity,
        })
    }

    fn bundle_params(bundle: &Bundle) -> BundleParams {
        BundleParams {
            txs: bundle
                .transactions
                .iter()
                .map(|raw| format!("0x{}", hex::encode(raw)))
                .collect(),
            block_number: format!("0x{:x}", bundle.target_block),
            min_timestamp: bundle.min_timestamp,
            max_timestamp: bundle.max_timestamp,
        }
    }

    async fn rpc(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RelayError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        })
        .to_string();

        // Identity header: sign the keccak of the body, hex-encoded, with
        // the searcher key.
        let digest = format!("0x{}", hex::encode(keccak256(body.as_bytes())));
        let signature = self
            .identity
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let header = format!("{:?}:0x{}", self.identity.address(), signature);

        let response = self
            .http
            .post(self.relay_url.clone())
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", header)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(RelayError::Rejected(error.message));
        }
        parsed
            .result
            .ok_or_else(|| RelayError::Rejected("empty relay response".to_string()))
    }
}

#[async_trait]
impl BundleRelay for RelayClient {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationReport, RelayError> {
        let mut params = serde_json::to_value(Self::bundle_params(bundle))
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        params["stateBlockNumber"] = json!("latest");

        let result = self.rpc("eth_callBundle", params).await?;
        let gas_used = result
            .get("totalGasUsed")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let revert_reason = result
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|txs| {
                txs.iter()
                    .find_map(|tx| tx.get("error").and_then(|e| e.as_str()))
            })
            .map(|s| s.to_string());
        if let Some(reason) = &revert_reason {
            warn!(bundle = %bundle.id, %reason, "bundle simulation reverted");
        } else {
            debug!(bundle = %bundle.id, gas_used, "bundle simulation clean");
        }
        Ok(SimulationReport {
            success: revert_reason.is_none(),
            revert_reason,
            gas_used,
        })
    }

    async fn submit(&self, bundle: &Bundle) -> Result<String, RelayError> {
        let params = serde_json::to_value(Self::bundle_params(bundle))
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let result = self.rpc("eth_sendBundle", params).await?;
        let bundle_hash = result
            .get("bundleHash")
            .and_then(|v| v.as_str())
            .unwrap_or(&bundle.id)
            .to_string();
        debug!(bundle = %bundle.id, %bundle_hash, "bundle submitted");
        Ok(bundle_hash)
    }
}
