use crate::model::alert::{Alert, AnalysisMetadata};
use crate::model::bigint::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Wallet,
    Token,
    Nft,
}

/// Fields common to every snapshot kind (spec §3 "Snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub entity_address: String,
    pub network: crate::model::job::Network,
    pub timestamp: DateTime<Utc>,
    pub alerts: Vec<Alert>,
    pub risk_score: u8,
    pub analysis_metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenHolding {
    pub symbol: String,
    pub contract: String,
    pub balance: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NftHolding {
    pub collection: String,
    pub token_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionTotals {
    pub incoming: Amount,
    pub outgoing: Amount,
    pub fees: Amount,
    pub gas_used: Amount,
}

/// Wallet analysis cumulative metrics (spec §3 "Wallet metrics", §4.D wallet merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletMetrics {
    pub native_balance: Amount,
    pub token_holdings: Vec<TokenHolding>,
    pub nft_holdings: Vec<NftHolding>,
    pub totals: DirectionTotals,
    pub category_counts: BTreeMap<String, u64>,
    pub unique_contracts: BTreeSet<String>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub portfolio_value_usd: f64,
    pub failed_count: u64,
    pub successful_outgoing_count: u64,
    pub processed_transaction_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressVolume {
    pub address: String,
    pub total: Amount,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LargeTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub value: Amount,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeByTimeframe {
    pub last_1h: Amount,
    pub last_6h: Amount,
    pub last_24h: Amount,
}

/// Token-flow cumulative metrics (spec §3 "Token-flow metrics", §4.D token-flow merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub total_transfers: u64,
    pub total_volume: Amount,
    pub unique_addresses: BTreeSet<String>,
    pub large_transfers: Vec<LargeTransfer>,
    pub burn_transactions: Vec<LargeTransfer>,
    pub senders: BTreeMap<String, AddressVolume>,
    pub receivers: BTreeMap<String, AddressVolume>,
    pub top_senders: Vec<AddressVolume>,
    pub top_receivers: Vec<AddressVolume>,
    pub volume_by_timeframe: VolumeByTimeframe,
    pub processed_transaction_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NftTransfer {
    pub token_id: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HolderCount {
    pub address: String,
    pub token_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderActivity {
    pub address: String,
    pub transfer_count: u64,
    pub distinct_tokens: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransfersByTimeframe {
    pub last_1h: u64,
    pub last_24h: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeBuckets {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

/// NFT-movement cumulative metrics (spec §3 "NFT-movement metrics", §4.D NFT merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NftMetrics {
    pub total_transfers: u64,
    pub current_holders: BTreeMap<String, String>,
    pub unique_holders: BTreeSet<String>,
    pub transfer_history: Vec<NftTransfer>,
    pub mint_transactions: Vec<NftTransfer>,
    pub burn_transactions: Vec<NftTransfer>,
    pub trader_activity: BTreeMap<String, TraderActivity>,
    pub top_holders: Vec<HolderCount>,
    pub most_active_traders: Vec<TraderActivity>,
    pub transfers_by_timeframe: TransfersByTimeframe,
    pub fee_distribution: FeeBuckets,
    pub processed_transaction_hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSnapshot {
    #[serde(flatten)]
    pub envelope: SnapshotEnvelope,
    pub metrics: WalletMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    #[serde(flatten)]
    pub envelope: SnapshotEnvelope,
    pub metrics: TokenMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftSnapshot {
    #[serde(flatten)]
    pub envelope: SnapshotEnvelope,
    pub metrics: NftMetrics,
}

/// Upper bounds enforced on every merge (spec §3 invariants, §8 quantified invariants).
pub mod limits {
    pub const TOKEN_LARGE_TRANSFERS: usize = 100;
    pub const TOKEN_BURNS: usize = 100;
    pub const TOKEN_PROCESSED_HASHES: usize = 1000;
    pub const TOKEN_TOP_N: usize = 10;

    pub const NFT_TRANSFER_HISTORY: usize = 1000;
    pub const NFT_MINTS: usize = 500;
    pub const NFT_BURNS: usize = 500;
    pub const NFT_PROCESSED_HASHES: usize = 2000;
}
