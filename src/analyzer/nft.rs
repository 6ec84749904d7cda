use super::logsink::LogSink;
use super::{threshold_f64, threshold_u64, AnalyzerContext, AnalyzerOutcome};
use crate::error::AnalyzerError;
use crate::model::bounded::{fifo_truncate, prepend_and_truncate};
use crate::model::job::{Job, Network};
use crate::model::snapshot::{limits, HolderCount, NftSnapshot, NftTransfer, SnapshotEnvelope, TraderActivity};
use crate::model::{Alert, AlertType, AnalysisMetadata, DataQuality, Severity};
use chrono::{Duration, Utc};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub async fn run(
    ctx: &AnalyzerContext,
    job: &Job,
    address: &str,
    network: Network,
    sink: &LogSink,
) -> Result<AnalyzerOutcome, AnalyzerError> {
    sink.info(format!("fetching nft transfer page for {address}"));
    let page = ctx.feed.fetch_nft_transfers(address, network, crate::feed::endpoints::DEFAULT_LIMIT).await?;

    if page.data_quality == DataQuality::ServiceUnavailable {
        return Err(AnalyzerError::Feed(crate::error::FeedError::AllEndpointsFailed { entity: address.to_string() }));
    }

    let prior = ctx.nft_snapshots.latest(address, network).await?;
    let processed: std::collections::BTreeSet<String> =
        prior.as_ref().map(|s| s.metrics.processed_transaction_hashes.iter().cloned().collect()).unwrap_or_default();

    let new_items: Vec<_> = page.items.iter().filter(|t| t.status && !processed.contains(&t.tx_hash)).collect();

    if new_items.is_empty() && prior.is_some() {
        sink.info("no new transfers; reusing prior snapshot");
        return Ok(AnalyzerOutcome::NoChange);
    }

    let mut metrics = prior.as_ref().map(|s| s.metrics.clone()).unwrap_or_default();
    let now = Utc::now();
    let mass_transfer_count = threshold_u64(job, "massTransferCount", 50);
    let whale_token_count = threshold_u64(job, "whaleTokenCount", 20);
    let suspicious_mint_rate = threshold_u64(job, "suspiciousMintRate", 30);
    let high_activity_spike_pct = threshold_f64(job, "highActivitySpike", 50.0);

    let prior_24h_count = metrics.transfers_by_timeframe.last_24h;
    let mut new_mints = Vec::new();
    let mut new_burns = Vec::new();
    let mut new_transfer_records = Vec::new();
    let mut new_in_last_hour = 0u64;
    // `new_items` is newest-first (spec §4.C); the first time a tokenId is
    // seen in this batch is its most recent transfer, so later duplicates
    // within the same batch must not overwrite `current_holders`.
    let mut holder_set_this_batch = std::collections::BTreeSet::new();

    for t in &new_items {
        metrics.total_transfers += 1;
        let token_id = t.token_id.clone().unwrap_or_default();
        if holder_set_this_batch.insert(token_id.clone()) {
            metrics.current_holders.insert(token_id.clone(), t.to.to_lowercase());
        }

        let record = NftTransfer { token_id: token_id.clone(), from: t.from.clone(), to: t.to.clone(), timestamp: t.timestamp, tx_hash: t.tx_hash.clone() };

        if t.from.eq_ignore_ascii_case(ZERO_ADDRESS) {
            new_mints.push(record.clone());
        } else if t.to.eq_ignore_ascii_case(ZERO_ADDRESS) {
            new_burns.push(record.clone());
        }

        let trader = metrics.trader_activity.entry(t.from.to_lowercase()).or_insert_with(|| TraderActivity { address: t.from.to_lowercase(), ..Default::default() });
        trader.transfer_count += 1;
        trader.distinct_tokens.insert(token_id.clone());

        let age = now.signed_duration_since(t.timestamp);
        if age <= Duration::hours(1) {
            new_in_last_hour += 1;
        }
        if age <= Duration::hours(24) {
            metrics.transfers_by_timeframe.last_24h += 1;
        }
        if age <= Duration::hours(1) {
            metrics.transfers_by_timeframe.last_1h += 1;
        }

        metrics.processed_transaction_hashes.push(t.tx_hash.clone());
        new_transfer_records.push(record);
    }

    prepend_and_truncate(&mut metrics.transfer_history, new_transfer_records, limits::NFT_TRANSFER_HISTORY);
    prepend_and_truncate(&mut metrics.mint_transactions, new_mints.clone(), limits::NFT_MINTS);
    prepend_and_truncate(&mut metrics.burn_transactions, new_burns.clone(), limits::NFT_BURNS);
    fifo_truncate(&mut metrics.processed_transaction_hashes, limits::NFT_PROCESSED_HASHES);

    // Rebuild holder stats from currentHolders, excluding the zero address (spec §4.D NFT merging).
    metrics.unique_holders = metrics
        .current_holders
        .values()
        .filter(|h| !h.eq_ignore_ascii_case(ZERO_ADDRESS))
        .cloned()
        .collect();
    let mut counts: std::collections::BTreeMap<String, u64> = std::collections::BTreeMap::new();
    for holder in metrics.current_holders.values() {
        if !holder.eq_ignore_ascii_case(ZERO_ADDRESS) {
            *counts.entry(holder.clone()).or_insert(0) += 1;
        }
    }
    let mut top_holders: Vec<HolderCount> = counts.into_iter().map(|(address, token_count)| HolderCount { address, token_count }).collect();
    top_holders.sort_by(|a, b| b.token_count.cmp(&a.token_count));
    top_holders.truncate(10);
    metrics.top_holders = top_holders;

    let mut traders: Vec<TraderActivity> = metrics.trader_activity.values().cloned().collect();
    traders.sort_by(|a, b| b.transfer_count.cmp(&a.transfer_count));
    traders.truncate(10);
    metrics.most_active_traders = traders;

    let mut alerts = Vec::new();
    if new_in_last_hour > mass_transfer_count {
        alerts.push(Alert::new(AlertType::MassTransfer, Severity::High, format!("{new_in_last_hour} transfers in the last hour"), serde_json::json!({})));
    }
    if metrics.top_holders.iter().any(|h| h.token_count >= whale_token_count) {
        alerts.push(Alert::new(AlertType::WhaleAccumulation, Severity::Medium, "a holder reached the whale token-count threshold", serde_json::json!({})));
    }
    let mints_last_hour = new_mints.iter().filter(|m| now.signed_duration_since(m.timestamp) <= Duration::hours(1)).count() as u64;
    if mints_last_hour > suspicious_mint_rate {
        alerts.push(Alert::new(AlertType::SuspiciousMinting, Severity::High, format!("{mints_last_hour} mints in the last hour"), serde_json::json!({})));
    }
    if prior_24h_count > 0 {
        let pct = ((metrics.transfers_by_timeframe.last_24h.saturating_sub(prior_24h_count)) as f64 / prior_24h_count as f64) * 100.0;
        if pct > high_activity_spike_pct {
            alerts.push(Alert::new(AlertType::HighActivitySpike, Severity::Medium, format!("24h transfer count increased {pct:.1}%"), serde_json::json!({})));
        }
    }
    for trader in metrics.trader_activity.values() {
        if trader.transfer_count > 20 && trader.distinct_tokens.len() < 3 {
            alerts.push(Alert::new(
                AlertType::WashTrading,
                Severity::Medium,
                format!("{} has {} transfers across only {} tokens", trader.address, trader.transfer_count, trader.distinct_tokens.len()),
                serde_json::json!({}),
            ));
            break;
        }
    }
    for watched in job.watched_addresses() {
        if new_items.iter().any(|t| t.from.eq_ignore_ascii_case(&watched) || t.to.eq_ignore_ascii_case(&watched)) {
            alerts.push(Alert::new(AlertType::WatchedWalletActivity, Severity::Low, format!("transfer touching watched address {watched}"), serde_json::json!({})));
        }
    }

    let mut risk: i32 = 1;
    risk += match new_in_last_hour {
        n if n > mass_transfer_count * 2 => 3,
        n if n > mass_transfer_count => 2,
        n if n > mass_transfer_count / 2 => 1,
        _ => 0,
    };
    let top_holder_share = metrics.top_holders.first().map(|h| h.token_count).unwrap_or(0);
    let total_holdings: u64 = metrics.top_holders.iter().map(|h| h.token_count).sum::<u64>().max(1);
    let concentration_pct = (top_holder_share * 100) / total_holdings;
    risk += if concentration_pct >= 50 { 2 } else if concentration_pct >= 25 { 1 } else { 0 };
    let mints_24h = new_mints.iter().filter(|m| now.signed_duration_since(m.timestamp) <= Duration::hours(24)).count();
    risk += if mints_24h > 100 { 2 } else if mints_24h > 50 { 1 } else { 0 };
    if metrics.trader_activity.values().any(|t| t.transfer_count > 20) {
        risk += 1;
    }
    for alert in &alerts {
        risk += alert.severity.risk_weight();
    }
    let risk_score = risk.clamp(1, 10) as u8;

    let snapshot = NftSnapshot {
        envelope: SnapshotEnvelope {
            entity_address: address.to_string(),
            network,
            timestamp: now,
            alerts,
            risk_score,
            analysis_metadata: AnalysisMetadata {
                items_fetched: page.items.len(),
                items_new: new_items.len(),
                data_quality: page.data_quality,
            },
        },
        metrics,
    };

    ctx.nft_snapshots.append(&snapshot).await?;
    sink.info(format!("nft snapshot written, risk_score={risk_score}"));

    Ok(AnalyzerOutcome::Written { risk_score })
}
