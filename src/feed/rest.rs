use super::{endpoints, FeedAdapter, FeedPage, RawTransaction, RawTransfer, TokenInfo};
use crate::error::FeedError;
use crate::model::bigint::Amount;
use crate::model::job::Network;
use crate::model::snapshot::{NftHolding, TokenHolding};
use crate::model::DataQuality;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `reqwest`-backed implementation of the Feed Adapter (spec §4.C).
///
/// Endpoint fallback here mirrors the shape of the teacher's
/// `fetch_logs_with_retries` in `scanner.rs` — try, log a warning, move to
/// the next candidate — but the fallback axis is different endpoints rather
/// than a shrinking block range, and there is deliberately no sleep between
/// candidates: spec §4.C says "retries beyond endpoint fallback are not
/// performed here".
pub struct RestFeedAdapter {
    client: reqwest::Client,
}

impl RestFeedAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builder");
        Self { client }
    }
}

impl Default for RestFeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WalletItemsResponse {
    #[serde(default)]
    items: Vec<WalletItemDto>,
}

#[derive(Debug, Deserialize)]
struct WalletItemDto {
    hash: String,
    from: String,
    to: String,
    value: String,
    #[serde(default)]
    input: String,
    #[serde(rename = "type", default)]
    tx_type: u64,
    status: bool,
    #[serde(default)]
    fee: String,
    #[serde(default, rename = "gasUsed")]
    gas_used: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct TransfersResponse {
    #[serde(default)]
    transfers: Vec<TransferDto>,
    #[serde(default, rename = "tokenInfo")]
    token_info: Option<TokenInfoDto>,
}

#[derive(Debug, Deserialize)]
struct TransferDto {
    #[serde(rename = "transactionHash")]
    tx_hash: String,
    from: String,
    to: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default, rename = "tokenId")]
    token_id: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_true")]
    status: bool,
    #[serde(default)]
    fee: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TokenInfoDto {
    symbol: String,
    decimals: u8,
}

fn parse_amount(raw: &str) -> crate::model::bigint::Amount {
    raw.parse().unwrap_or(crate::model::bigint::Amount::ZERO)
}

impl From<WalletItemDto> for RawTransaction {
    fn from(dto: WalletItemDto) -> Self {
        let data = dto.input.strip_prefix("0x").unwrap_or(&dto.input);
        RawTransaction {
            hash: dto.hash,
            from: dto.from,
            to: dto.to,
            value: parse_amount(&dto.value),
            data: hex::decode(data).unwrap_or_default(),
            tx_type: dto.tx_type,
            status: dto.status,
            fee: parse_amount(&dto.fee),
            gas_used: parse_amount(&dto.gas_used),
            timestamp: dto.timestamp,
        }
    }
}

impl From<TransferDto> for RawTransfer {
    fn from(dto: TransferDto) -> Self {
        RawTransfer {
            tx_hash: dto.tx_hash,
            from: dto.from,
            to: dto.to,
            value: dto.amount.as_deref().map(parse_amount).unwrap_or_default(),
            token_id: dto.token_id,
            timestamp: dto.timestamp,
            status: dto.status,
            fee: dto.fee.as_deref().map(parse_amount).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl FeedAdapter for RestFeedAdapter {
    async fn fetch_wallet(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransaction>, FeedError> {
        let base = endpoints::endpoint_for(network).base_url;
        let candidates = endpoints::wallet_candidates(base, address);
        let mut saw_not_found = false;

        for url in &candidates {
            match self.client.get(url).query(&[("limit", limit)]).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                    saw_not_found = true;
                    tracing::debug!(url, "wallet candidate returned 404");
                }
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<WalletItemsResponse>().await {
                        Ok(body) => {
                            return Ok(FeedPage {
                                items: body.items.into_iter().map(RawTransaction::from).collect(),
                                token_info: None,
                                data_quality: DataQuality::Complete,
                            });
                        }
                        Err(err) => tracing::warn!(url, error = %err, "wallet candidate body did not match expected shape"),
                    }
                }
                Ok(resp) => tracing::warn!(url, status = %resp.status(), "wallet candidate failed"),
                Err(err) => tracing::warn!(url, error = %err, "wallet candidate request failed"),
            }
        }

        if saw_not_found {
            return Err(FeedError::NotFound { entity: address.to_string() });
        }
        tracing::warn!(address, "all wallet endpoint candidates failed; degrading to SERVICE_UNAVAILABLE");
        Ok(FeedPage::unavailable())
    }

    async fn fetch_token_transfers(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransfer>, FeedError> {
        let base = endpoints::endpoint_for(network).base_url;
        let url = endpoints::token_transfers_url(base, address, limit);
        fetch_transfers(&self.client, &url).await
    }

    async fn fetch_nft_transfers(&self, address: &str, network: Network, limit: u32) -> Result<FeedPage<RawTransfer>, FeedError> {
        let base = endpoints::endpoint_for(network).base_url;
        let url = endpoints::nft_transfers_url(base, address, limit);
        fetch_transfers(&self.client, &url).await
    }

    async fn fetch_native_balance(&self, address: &str, network: Network) -> Option<Amount> {
        #[derive(Deserialize)]
        struct Resp {
            balance: String,
        }
        let base = endpoints::endpoint_for(network).base_url;
        let url = endpoints::address_url(base, address);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            tracing::warn!(url, status = %resp.status(), "native balance fetch failed");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        Some(parse_amount(&body.balance))
    }

    async fn fetch_token_holdings(&self, address: &str, network: Network) -> Option<Vec<TokenHolding>> {
        #[derive(Deserialize)]
        struct Item {
            symbol: String,
            #[serde(rename = "contractAddress")]
            contract: String,
            balance: String,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            items: Vec<Item>,
        }
        let base = endpoints::endpoint_for(network).base_url;
        let url = endpoints::token_holdings_url(base, address);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            tracing::warn!(url, status = %resp.status(), "token holdings fetch failed");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        Some(
            body.items
                .into_iter()
                .map(|i| TokenHolding { symbol: i.symbol, contract: i.contract, balance: parse_amount(&i.balance) })
                .collect(),
        )
    }

    async fn fetch_nft_holdings(&self, address: &str, network: Network) -> Option<Vec<NftHolding>> {
        #[derive(Deserialize)]
        struct Item {
            #[serde(rename = "collectionAddress")]
            collection: String,
            #[serde(default, rename = "tokenIds")]
            token_ids: Vec<String>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            items: Vec<Item>,
        }
        let base = endpoints::endpoint_for(network).base_url;
        let url = endpoints::nft_holdings_url(base, address);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            tracing::warn!(url, status = %resp.status(), "nft holdings fetch failed");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        Some(body.items.into_iter().map(|i| NftHolding { collection: i.collection, token_ids: i.token_ids }).collect())
    }
}

async fn fetch_transfers(client: &reqwest::Client, url: &str) -> Result<FeedPage<RawTransfer>, FeedError> {
    match client.get(url).send().await {
        Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
            Err(FeedError::NotFound { entity: url.to_string() })
        }
        Ok(resp) if resp.status().is_success() => match resp.json::<TransfersResponse>().await {
            Ok(body) => Ok(FeedPage {
                items: body.transfers.into_iter().map(RawTransfer::from).collect(),
                token_info: body.token_info.map(|t| TokenInfo { symbol: t.symbol, decimals: t.decimals }),
                data_quality: DataQuality::Complete,
            }),
            Err(err) => {
                tracing::warn!(url, error = %err, "transfers candidate body did not match expected shape");
                Ok(FeedPage::unavailable())
            }
        },
        Ok(resp) => {
            tracing::warn!(url, status = %resp.status(), "transfers candidate failed");
            Ok(FeedPage::unavailable())
        }
        Err(err) => {
            tracing::warn!(url, error = %err, "transfers candidate request failed");
            Ok(FeedPage::unavailable())
        }
    }
}
