use super::logsink::LogSink;
use super::{AnalyzerContext, AnalyzerOutcome};
use crate::error::AnalyzerError;
use crate::feed::{prices, signatures, RawTransaction};
use crate::model::job::{Job, Network};
use crate::model::snapshot::{SnapshotEnvelope, WalletSnapshot};
use crate::model::{Alert, AlertType, Amount, AnalysisMetadata, DataQuality, Severity};
use chrono::Utc;
use std::collections::BTreeSet;

const LARGE_TX_THRESHOLD_EXP: u32 = 20; // 10^20
const LARGE_TRANSACTION_ALERT_EXP: u32 = 21; // 10^21
const HIGH_GAS_ALERT_EXP: u32 = 18; // 10^18
const LARGE_CALLDATA_BYTES: usize = 68;

pub async fn run(
    ctx: &AnalyzerContext,
    job: &Job,
    address: &str,
    network: Network,
    sink: &LogSink,
) -> Result<AnalyzerOutcome, AnalyzerError> {
    sink.info(format!("fetching wallet page for {address}"));

    let native_balance = ctx
        .feed
        .fetch_native_balance(address, network)
        .await
        .ok_or_else(|| AnalyzerError::NativeBalanceUnavailable(address.to_string()))?;
    let token_holdings = ctx.feed.fetch_token_holdings(address, network).await;
    let nft_holdings = ctx.feed.fetch_nft_holdings(address, network).await;
    let tx_page = ctx.feed.fetch_wallet(address, network, crate::feed::endpoints::DEFAULT_LIMIT).await?;

    if tx_page.data_quality == DataQuality::ServiceUnavailable {
        sink.warn("transactions feed unavailable this cycle; degrading to partial data");
    }

    let prior = ctx.wallet_snapshots.latest(address, network).await?;
    let processed: BTreeSet<String> =
        prior.as_ref().map(|s| s.metrics.processed_transaction_hashes.iter().cloned().collect()).unwrap_or_default();

    let new_items: Vec<&RawTransaction> = tx_page.items.iter().filter(|tx| !processed.contains(&tx.hash)).collect();

    if new_items.is_empty() && prior.is_some() {
        sink.info("no new transactions; reusing prior snapshot");
        return Ok(AnalyzerOutcome::NoChange);
    }

    let mut metrics = prior.as_ref().map(|s| s.metrics.clone()).unwrap_or_default();

    let mut batch_large_tx = 0u32;
    let mut batch_zero_value_calls = 0u32;

    for tx in &new_items {
        let category = signatures::categorize(&tx.data, tx.tx_type);
        *metrics.category_counts.entry(category.to_string()).or_insert(0) += 1;

        if !tx.status {
            metrics.failed_count += 1;
            metrics.processed_transaction_hashes.push(tx.hash.clone());
            continue;
        }

        let to_wallet = tx.to.eq_ignore_ascii_case(address);
        let from_wallet = tx.from.eq_ignore_ascii_case(address);

        if to_wallet {
            metrics.totals.incoming += tx.value;
        }
        if from_wallet {
            metrics.totals.outgoing += tx.value;
            metrics.totals.fees += tx.fee;
            metrics.totals.gas_used += tx.gas_used;
            metrics.successful_outgoing_count += 1;

            if tx.tx_type == 2 {
                metrics.unique_contracts.insert(tx.to.to_lowercase());
            }
        }

        if tx.value > Amount::ZERO && tx.value.0 > ethers::types::U256::exp10(LARGE_TX_THRESHOLD_EXP as usize) {
            batch_large_tx += 1;
        }
        if tx.value.is_zero() && tx.tx_type == 2 && tx.data.len() > LARGE_CALLDATA_BYTES {
            batch_zero_value_calls += 1;
        }

        metrics.last_activity_time = Some(metrics.last_activity_time.map(|t| t.max(tx.timestamp)).unwrap_or(tx.timestamp));
        metrics.processed_transaction_hashes.push(tx.hash.clone());
    }

    metrics.native_balance = native_balance;
    if let Some(holdings) = token_holdings {
        metrics.token_holdings = holdings;
    }
    if let Some(holdings) = nft_holdings {
        metrics.nft_holdings = holdings;
    }

    let prior_portfolio_value = metrics.portfolio_value_usd;
    metrics.portfolio_value_usd = prices::usd_value("NATIVE", &metrics.native_balance)
        + metrics.token_holdings.iter().map(|h| prices::usd_value(&h.symbol, &h.balance)).sum::<f64>();

    let mut alerts = Vec::new();
    if new_items.iter().any(|tx| tx.value.0 > ethers::types::U256::exp10(LARGE_TRANSACTION_ALERT_EXP as usize)) {
        alerts.push(Alert::new(AlertType::LargeTransaction, Severity::High, "transaction value exceeds 10^21", serde_json::json!({})));
    }
    if metrics.totals.gas_used.0 > ethers::types::U256::exp10(HIGH_GAS_ALERT_EXP as usize) {
        alerts.push(Alert::new(AlertType::HighGasUsage, Severity::Medium, "cumulative gas usage exceeds 10^18", serde_json::json!({})));
    }
    if metrics.unique_contracts.len() > 10 {
        alerts.push(Alert::new(
            AlertType::MultipleContractInteractions,
            Severity::Medium,
            format!("{} unique contracts interacted with", metrics.unique_contracts.len()),
            serde_json::json!({}),
        ));
    }
    if prior_portfolio_value > 0.0 {
        let delta_pct = ((metrics.portfolio_value_usd - prior_portfolio_value) / prior_portfolio_value) * 100.0;
        if delta_pct.abs() > 20.0 {
            let severity = if delta_pct < 0.0 { Severity::High } else { Severity::Medium };
            alerts.push(Alert::new(
                AlertType::PortfolioValueChange,
                severity,
                format!("portfolio value changed by {delta_pct:.1}%"),
                serde_json::json!({ "deltaPercent": delta_pct }),
            ));
        }
    }
    if batch_zero_value_calls > 10 {
        alerts.push(Alert::new(
            AlertType::SuspiciousActivity,
            Severity::High,
            format!("{batch_zero_value_calls} zero-value contract calls with large calldata"),
            serde_json::json!({}),
        ));
    }
    for watched in job.watched_addresses() {
        if new_items.iter().any(|tx| tx.from.eq_ignore_ascii_case(&watched) || tx.to.eq_ignore_ascii_case(&watched)) {
            alerts.push(Alert::new(AlertType::WatchedWalletActivity, Severity::Low, format!("activity touching watched address {watched}"), serde_json::json!({})));
        }
    }

    let mut risk: i32 = 1;
    if new_items.len() > 50 {
        risk += 1;
    }
    if batch_large_tx > 5 {
        risk += 1;
    }
    if metrics.unique_contracts.len() > 20 {
        risk += 1;
    }
    if metrics.successful_outgoing_count > 0 {
        let avg_gas = metrics.totals.gas_used.0 / ethers::types::U256::from(metrics.successful_outgoing_count);
        if avg_gas > ethers::types::U256::from(200_000u64) {
            risk += 1;
        }
    }
    let total_count = metrics.processed_transaction_hashes.len() as u64;
    if total_count > 0 && (metrics.failed_count as f64 / total_count as f64) > 0.10 {
        risk += 1;
    }
    if !new_items.is_empty() && (batch_zero_value_calls as f64 / new_items.len() as f64) > 0.5 {
        risk += 1;
    }
    for alert in &alerts {
        risk += alert.severity.risk_weight();
    }
    let risk_score = risk.clamp(1, 10) as u8;

    let snapshot = WalletSnapshot {
        envelope: SnapshotEnvelope {
            entity_address: address.to_string(),
            network,
            timestamp: Utc::now(),
            alerts,
            risk_score,
            analysis_metadata: AnalysisMetadata {
                items_fetched: tx_page.items.len(),
                items_new: new_items.len(),
                data_quality: tx_page.data_quality,
            },
        },
        metrics,
    };

    ctx.wallet_snapshots.append(&snapshot).await?;
    sink.info(format!("wallet snapshot written, risk_score={risk_score}"));

    Ok(AnalyzerOutcome::Written { risk_score })
}
