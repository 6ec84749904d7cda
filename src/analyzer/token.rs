use super::logsink::LogSink;
use super::{threshold_f64, threshold_u64, AnalyzerContext, AnalyzerOutcome};
use crate::error::AnalyzerError;
use crate::model::bounded::{fifo_truncate, prepend_and_truncate};
use crate::model::job::{Job, Network};
use crate::model::snapshot::{limits, AddressVolume, LargeTransfer, SnapshotEnvelope, TokenSnapshot};
use crate::model::{Alert, AlertType, AnalysisMetadata, DataQuality, Severity};
use chrono::{Duration, Utc};
use std::collections::BTreeSet;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub async fn run(
    ctx: &AnalyzerContext,
    job: &Job,
    address: &str,
    network: Network,
    sink: &LogSink,
) -> Result<AnalyzerOutcome, AnalyzerError> {
    sink.info(format!("fetching token transfer page for {address}"));
    let page = ctx.feed.fetch_token_transfers(address, network, crate::feed::endpoints::DEFAULT_LIMIT).await?;

    if page.data_quality == DataQuality::ServiceUnavailable {
        // Fatal for token/NFT kinds per spec §4.C step 4 / §7 "Upstream unavailability".
        return Err(AnalyzerError::Feed(crate::error::FeedError::AllEndpointsFailed { entity: address.to_string() }));
    }

    let prior = ctx.token_snapshots.latest(address, network).await?;
    let processed: BTreeSet<String> =
        prior.as_ref().map(|s| s.metrics.processed_transaction_hashes.iter().cloned().collect()).unwrap_or_default();

    let new_items: Vec<_> = page.items.iter().filter(|t| t.status && !processed.contains(&t.tx_hash)).collect();

    if new_items.is_empty() && prior.is_some() {
        sink.info("no new transfers; reusing prior snapshot");
        return Ok(AnalyzerOutcome::NoChange);
    }

    let mut metrics = prior.as_ref().map(|s| s.metrics.clone()).unwrap_or_default();
    let now = Utc::now();
    let large_transfer_threshold = threshold_u64(job, "largeTransfer", 10_000);
    let volume_spike_pct = threshold_f64(job, "volumeSpike", 50.0);

    let prior_24h = metrics.volume_by_timeframe.last_24h;
    let mut new_large_transfers = Vec::new();
    let mut new_burns = Vec::new();

    for t in &new_items {
        metrics.total_transfers += 1;
        metrics.total_volume += t.value;
        metrics.unique_addresses.insert(t.from.to_lowercase());
        metrics.unique_addresses.insert(t.to.to_lowercase());

        let sender = metrics.senders.entry(t.from.to_lowercase()).or_insert_with(|| AddressVolume { address: t.from.to_lowercase(), ..Default::default() });
        sender.total += t.value;
        sender.count += 1;

        let receiver = metrics.receivers.entry(t.to.to_lowercase()).or_insert_with(|| AddressVolume { address: t.to.to_lowercase(), ..Default::default() });
        receiver.total += t.value;
        receiver.count += 1;

        let age = now.signed_duration_since(t.timestamp);
        if age <= Duration::hours(1) {
            metrics.volume_by_timeframe.last_1h += t.value;
        }
        if age <= Duration::hours(6) {
            metrics.volume_by_timeframe.last_6h += t.value;
        }
        if age <= Duration::hours(24) {
            metrics.volume_by_timeframe.last_24h += t.value;
        }

        let record = LargeTransfer { tx_hash: t.tx_hash.clone(), from: t.from.clone(), to: t.to.clone(), value: t.value, timestamp: t.timestamp };
        if t.value.0 >= ethers::types::U256::from(large_transfer_threshold) {
            new_large_transfers.push(record.clone());
        }
        if t.to.eq_ignore_ascii_case(ZERO_ADDRESS) {
            new_burns.push(record);
        }

        metrics.processed_transaction_hashes.push(t.tx_hash.clone());
    }

    prepend_and_truncate(&mut metrics.large_transfers, new_large_transfers.clone(), limits::TOKEN_LARGE_TRANSFERS);
    prepend_and_truncate(&mut metrics.burn_transactions, new_burns.clone(), limits::TOKEN_BURNS);
    fifo_truncate(&mut metrics.processed_transaction_hashes, limits::TOKEN_PROCESSED_HASHES);

    metrics.top_senders = top_n(&metrics.senders, limits::TOKEN_TOP_N);
    metrics.top_receivers = top_n(&metrics.receivers, limits::TOKEN_TOP_N);

    let mut alerts = Vec::new();
    if new_large_transfers.iter().any(|t| now.signed_duration_since(t.timestamp) <= Duration::hours(1)) {
        alerts.push(Alert::new(AlertType::LargeTransfer, Severity::High, "large transfer within the last hour", serde_json::json!({})));
    }
    if !new_burns.is_empty() && new_burns.iter().any(|t| now.signed_duration_since(t.timestamp) <= Duration::hours(1)) {
        alerts.push(Alert::new(AlertType::BurnDetected, Severity::Medium, "burn transaction within the last hour", serde_json::json!({})));
    }
    let whale_threshold = ethers::types::U256::from(large_transfer_threshold) * ethers::types::U256::from(10u64);
    if metrics.top_senders.iter().any(|s| s.total.0 >= whale_threshold) {
        alerts.push(Alert::new(AlertType::WhaleMovement, Severity::High, "top sender's cumulative volume exceeds 10x the large-transfer threshold", serde_json::json!({})));
    }
    if prior_24h.0 > ethers::types::U256::zero() {
        // Integer arithmetic until the final division (spec §9), basis points (1/100 of a percent).
        let delta = metrics.volume_by_timeframe.last_24h.0.saturating_sub(prior_24h.0);
        let pct_bps = delta.saturating_mul(ethers::types::U256::from(10_000u64)) / prior_24h.0;
        let pct = pct_bps.as_u128() as f64 / 100.0;
        if pct > volume_spike_pct {
            alerts.push(Alert::new(AlertType::VolumeSpike, Severity::Medium, format!("24h volume increased {pct:.1}%"), serde_json::json!({})));
        }
    }
    for addr_volume in metrics.senders.values() {
        let below_avg = addr_volume.total.0 < ethers::types::U256::from(100u64) * ethers::types::U256::from(addr_volume.count);
        if addr_volume.count > 100 && below_avg {
            alerts.push(Alert::new(
                AlertType::SuspiciousPattern,
                Severity::Medium,
                format!("{} has {} low-value transactions", addr_volume.address, addr_volume.count),
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
    if new_large_transfers.len() > 5 {
        risk += 1;
    }
    if !new_burns.is_empty() {
        risk += 1;
    }
    for alert in &alerts {
        risk += alert.severity.risk_weight();
    }
    let risk_score = risk.clamp(1, 10) as u8;

    let snapshot = TokenSnapshot {
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

    ctx.token_snapshots.append(&snapshot).await?;
    sink.info(format!("token snapshot written, risk_score={risk_score}"));

    Ok(AnalyzerOutcome::Written { risk_score })
}

fn top_n(map: &std::collections::BTreeMap<String, AddressVolume>, n: usize) -> Vec<AddressVolume> {
    let mut items: Vec<AddressVolume> = map.values().cloned().collect();
    items.sort_by(|a, b| b.total.cmp(&a.total));
    items.truncate(n);
    items
}
