pub mod logsink;
pub mod nft;
pub mod token;
pub mod wallet;

use crate::error::AnalyzerError;
use crate::feed::FeedAdapter;
use crate::model::job::{Job, JobAction, Network};
use crate::model::snapshot::{NftSnapshot, TokenSnapshot, WalletSnapshot};
use crate::store::SnapshotStore;
use ethers::types::Address;
use logsink::LogSink;
use std::str::FromStr;
use std::sync::Arc;

/// What an analyzer cycle produced, mirroring spec §4.D step 5's
/// "return null" short-circuit vs. a freshly persisted snapshot.
pub enum AnalyzerOutcome {
    NoChange,
    Written { risk_score: u8 },
}

/// Everything an Analyzer cycle needs, grouped so the Scheduler/Worker can
/// hold one `Arc<AnalyzerContext>` rather than threading four dependencies
/// through every call.
pub struct AnalyzerContext {
    pub feed: Arc<dyn FeedAdapter>,
    pub wallet_snapshots: Arc<dyn SnapshotStore<WalletSnapshot>>,
    pub token_snapshots: Arc<dyn SnapshotStore<TokenSnapshot>>,
    pub nft_snapshots: Arc<dyn SnapshotStore<NftSnapshot>>,
}

/// Validates entity-address syntax (spec §4.D step 1): "20-byte hex with
/// `0x` prefix". `ethers::types::Address::from_str` already enforces
/// exactly that shape, so it doubles as the validator here the way the
/// teacher's `config.rs` reuses `Address::from_str` to validate the OpenSub
/// contract address from its deployment artifact.
pub fn validate_address(raw: &str) -> Result<Address, crate::error::ValidationError> {
    Address::from_str(raw).map_err(|_| crate::error::ValidationError::InvalidAddressFormat(raw.to_string()))
}

/// Reads a per-job threshold override from `payload.thresholds.{key}`
/// (spec §4.D "thresholds.largeTransfer", "thresholds.volumeSpike", etc.),
/// falling back to `default` when the submitter did not set one.
pub fn threshold_u64(job: &Job, key: &str, default: u64) -> u64 {
    job.payload
        .get("thresholds")
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_u64())
        .unwrap_or(default)
}

pub fn threshold_f64(job: &Job, key: &str, default: f64) -> f64 {
    job.payload
        .get("thresholds")
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
}

/// Common template dispatch (spec §4.D): validate, then hand off to the
/// kind-specific merge logic, which itself follows fetch/load-prior/dedupe/
/// short-circuit/merge/alerts/risk/persist.
pub async fn run(ctx: &AnalyzerContext, job: &Job, sink: &LogSink) -> Result<AnalyzerOutcome, AnalyzerError> {
    let raw_address = job
        .entity_address()
        .ok_or_else(|| crate::error::ValidationError::InvalidAddressFormat("<missing>".to_string()))?;
    let address = validate_address(raw_address)?;
    let address_str = format!("{address:#x}");
    let network: Network = job.network;

    match job.action {
        JobAction::WalletSnapshot => wallet::run(ctx, job, &address_str, network, sink).await,
        JobAction::AnalyzeCoinFlows => token::run(ctx, job, &address_str, network, sink).await,
        JobAction::AnalyzeNftMovements => nft::run(ctx, job, &address_str, network, sink).await,
    }
}
