pub mod endpoints;
pub mod prices;
pub mod rest;
pub mod signatures;

use crate::error::FeedError;
use crate::model::bigint::Amount;
use crate::model::job::Network;
use crate::model::DataQuality;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One wallet transaction as delivered by the upstream feed (spec §4.D
/// "Transaction processing").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: Amount,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub tx_type: u64,
    pub status: bool,
    pub fee: Amount,
    pub gas_used: Amount,
    pub timestamp: DateTime<Utc>,
}

/// One token or NFT transfer (spec §4.D token-flow / NFT-movement merging).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub value: Amount,
    #[serde(default)]
    pub token_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: bool,
    #[serde(default)]
    pub fee: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

/// One page returned by `fetchLatest` (spec §4.C). `items` are newest-first,
/// exactly as the upstream delivers them. `data_quality` is
/// `ServiceUnavailable` when every candidate endpoint failed — the Feed
/// Adapter never fails the call outright for that case; it is the
/// Analyzer's job per kind to decide whether that degrades the cycle to
/// partial data (wallet) or fails it (token, NFT), per spec §4.C step 4.
#[derive(Debug, Clone)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    pub token_info: Option<TokenInfo>,
    pub data_quality: DataQuality,
}

impl<T> FeedPage<T> {
    pub fn unavailable() -> Self {
        Self { items: Vec::new(), token_info: None, data_quality: DataQuality::ServiceUnavailable }
    }
}

#[async_trait]
pub trait FeedAdapter: Send + Sync {
    async fn fetch_wallet(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransaction>, FeedError>;
    async fn fetch_token_transfers(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransfer>, FeedError>;
    async fn fetch_nft_transfers(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransfer>, FeedError>;

    /// `None` denotes "source unavailable this cycle" (spec §4.D wallet
    /// merging: "any of which may be unavailable ... do not fail the whole
    /// run unless native balance itself is unavailable"). Native balance
    /// absence is escalated to a hard failure by the wallet Analyzer, not here.
    async fn fetch_native_balance(&self, address: &str, network: Network) -> Option<Amount>;
    async fn fetch_token_holdings(&self, address: &str, network: Network) -> Option<Vec<crate::model::snapshot::TokenHolding>>;
    async fn fetch_nft_holdings(&self, address: &str, network: Network) -> Option<Vec<crate::model::snapshot::NftHolding>>;
}

/// In-memory fake feed used by end-to-end scenario tests (spec §8) so they
/// do not depend on a live upstream REST API.
#[cfg(any(test, feature = "test-fakes"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeFeedAdapter {
        pub wallet_pages: Mutex<Vec<FeedPage<RawTransaction>>>,
        pub token_pages: Mutex<Vec<FeedPage<RawTransfer>>>,
        pub nft_pages: Mutex<Vec<FeedPage<RawTransfer>>>,
        pub native_balance: Mutex<Option<Amount>>,
        pub token_holdings: Mutex<Option<Vec<crate::model::snapshot::TokenHolding>>>,
        pub nft_holdings: Mutex<Option<Vec<crate::model::snapshot::NftHolding>>>,
    }

    impl FakeFeedAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pages are consumed front-to-back on successive calls; the last
        /// pushed page repeats once the queue is drained, so a test can
        /// model "same items every cycle" without pre-sizing the queue.
        fn next<T: Clone>(queue: &Mutex<Vec<FeedPage<T>>>) -> FeedPage<T> {
            let mut q = queue.lock().unwrap();
            if q.len() > 1 {
                q.remove(0)
            } else {
                q.first().cloned().unwrap_or_else(FeedPage::unavailable)
            }
        }
    }

    #[async_trait]
    impl FeedAdapter for FakeFeedAdapter {
        async fn fetch_wallet(&self, _address: &str, _network: Network, _limit: u32) -> Result<FeedPage<RawTransaction>, FeedError> {
            Ok(Self::next(&self.wallet_pages))
        }

        async fn fetch_token_transfers(&self, _address: &str, _network: Network, _limit: u32) -> Result<FeedPage<RawTransfer>, FeedError> {
            Ok(Self::next(&self.token_pages))
        }

        async fn fetch_nft_transfers(&self, _address: &str, _network: Network, _limit: u32) -> Result<FeedPage<RawTransfer>, FeedError> {
            Ok(Self::next(&self.nft_pages))
        }

        async fn fetch_native_balance(&self, _address: &str, _network: Network) -> Option<Amount> {
            *self.native_balance.lock().unwrap()
        }

        async fn fetch_token_holdings(&self, _address: &str, _network: Network) -> Option<Vec<crate::model::snapshot::TokenHolding>> {
            self.token_holdings.lock().unwrap().clone()
        }

        async fn fetch_nft_holdings(&self, _address: &str, _network: Network) -> Option<Vec<crate::model::snapshot::NftHolding>> {
            self.nft_holdings.lock().unwrap().clone()
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        let trimmed = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(trimmed).map_err(serde::de::Error::custom)
    }
}
