//! End-to-end scenario coverage exercised against in-memory fakes: no live
//! Mongo or Redis is required to run this file.

use chain_watch_runner::analyzer::logsink::LogSink;
use chain_watch_runner::analyzer::{self, AnalyzerContext, AnalyzerOutcome};
use chain_watch_runner::feed::fake::FakeFeedAdapter;
use chain_watch_runner::feed::{FeedAdapter, FeedPage, RawTransaction, RawTransfer};
use chain_watch_runner::model::bigint::Amount;
use chain_watch_runner::model::job::{Job, JobAction, JobStatus, JobSubmission, JobType, Network};
use chain_watch_runner::model::{AlertType, DataQuality, NftSnapshot, Severity, TokenSnapshot, WalletSnapshot};
use chain_watch_runner::queue::fake::FakeDelayQueue;
use chain_watch_runner::queue::{DelayQueue, JOBS_QUEUE};
use chain_watch_runner::scheduler::{Scheduler, Worker};
use chain_watch_runner::store::job_store::fake::InMemoryJobStore;
use chain_watch_runner::store::snapshot_store::fake::InMemorySnapshotStore;
use chain_watch_runner::store::JobStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const WALLET: &str = "0x1111111111111111111111111111111111111111";
const TOKEN: &str = "0x2222222222222222222222222222222222222222";

fn analyzer_ctx(feed: Arc<FakeFeedAdapter>) -> Arc<AnalyzerContext> {
    let feed: Arc<dyn FeedAdapter> = feed;
    Arc::new(AnalyzerContext {
        feed,
        wallet_snapshots: Arc::new(InMemorySnapshotStore::<WalletSnapshot>::new(|s| {
            (&s.envelope.entity_address, s.envelope.network, s.envelope.timestamp)
        })),
        token_snapshots: Arc::new(InMemorySnapshotStore::<TokenSnapshot>::new(|s| {
            (&s.envelope.entity_address, s.envelope.network, s.envelope.timestamp)
        })),
        nft_snapshots: Arc::new(InMemorySnapshotStore::<NftSnapshot>::new(|s| {
            (&s.envelope.entity_address, s.envelope.network, s.envelope.timestamp)
        })),
    })
}

fn sample_tx(hash: &str) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        from: WALLET.to_string(),
        to: TOKEN.to_string(),
        value: Amount::from_u64(1),
        data: vec![],
        tx_type: 0,
        status: true,
        fee: Amount::from_u64(1),
        gas_used: Amount::from_u64(21_000),
        timestamp: Utc::now(),
    }
}

fn token_job(thresholds: HashMap<String, serde_json::Value>) -> Job {
    let mut payload = HashMap::from([("tokenAddress".to_string(), serde_json::json!(TOKEN))]);
    if !thresholds.is_empty() {
        payload.insert("thresholds".to_string(), serde_json::json!(thresholds));
    }
    Job {
        id: "job-token".to_string(),
        action: JobAction::AnalyzeCoinFlows,
        payload,
        network: Network::Testnet,
        job_type: JobType::Retry,
        scheduled_at: None,
        interval_minutes: Some(5),
        status: JobStatus::Pending,
        last_run_at: None,
        next_run_at: None,
        logs: Vec::new(),
        service_logs: Vec::new(),
        error_details: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn transfer(hash: &str, value: u64, timestamp: chrono::DateTime<Utc>) -> RawTransfer {
    RawTransfer {
        tx_hash: hash.to_string(),
        from: "0x3333333333333333333333333333333333333333".to_string(),
        to: "0x4444444444444444444444444444444444444444".to_string(),
        value: Amount::from_u64(value),
        token_id: None,
        timestamp,
        status: true,
        fee: Amount::from_u64(0),
    }
}

async fn wait_for<F>(job_store: &Arc<dyn JobStore>, id: &str, predicate: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    for _ in 0..200 {
        if let Some(job) = job_store.get(id).await.unwrap() {
            if predicate(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}

/// Scenario 1 (spec §8): a scheduled job fires once due, transitions
/// pending -> running -> completed, and persists exactly one Wallet snapshot.
#[tokio::test]
async fn scheduled_fire_persists_one_wallet_snapshot() {
    let feed = Arc::new(FakeFeedAdapter::new());
    *feed.native_balance.lock().unwrap() = Some(Amount::from_u64(1_000_000_000_000_000_000));
    feed.wallet_pages.lock().unwrap().push(FeedPage {
        items: vec![sample_tx("0xaaa")],
        token_info: None,
        data_quality: DataQuality::Complete,
    });

    let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
    let scheduler = Scheduler::new(job_store.clone(), queue.clone());

    let spec = JobSubmission {
        action: "wallet_snapshot".to_string(),
        payload: HashMap::from([("wallet".to_string(), serde_json::json!(WALLET))]),
        network: Some("testnet".to_string()),
        job_type: "scheduled".to_string(),
        scheduled_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        interval_minutes: None,
    };
    let job = scheduler.submit(spec).await.unwrap();

    let worker = Arc::new(Worker::new(analyzer_ctx(feed), job_store.clone(), queue.clone(), 4, Duration::from_millis(20)));
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let worker_for_run = worker.clone();
    let handle = tokio::spawn(async move { worker_for_run.run(rx).await });

    let stored = wait_for(&job_store, &job.id, |j| j.status == JobStatus::Completed).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.logs.iter().any(|l| l.message.contains("execution started")));
    assert!(stored.logs.iter().any(|l| l.message.contains("job completed")));

    handle.abort();
}

/// Scenario 2 (spec §8): a retry job fires immediately on submission rather
/// than waiting a full interval, and a repeating registration is armed for
/// the next cycle.
#[tokio::test]
async fn recurring_job_fires_immediately_and_arms_next_cycle() {
    let feed = Arc::new(FakeFeedAdapter::new());
    feed.token_pages.lock().unwrap().push(FeedPage {
        items: vec![transfer("0xabc", 1, Utc::now())],
        token_info: None,
        data_quality: DataQuality::Complete,
    });

    let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
    let scheduler = Scheduler::new(job_store.clone(), queue.clone());

    let spec = JobSubmission {
        action: "analyze_coin_flows".to_string(),
        payload: HashMap::from([("tokenAddress".to_string(), serde_json::json!(TOKEN))]),
        network: Some("testnet".to_string()),
        job_type: "retry".to_string(),
        scheduled_at: None,
        interval_minutes: Some(1),
    };
    let job = scheduler.submit(spec).await.unwrap();

    assert_eq!(queue.list_waiting(JOBS_QUEUE).await.unwrap().len(), 1, "retry jobs fire immediately, not after one interval");
    assert_eq!(queue.list_repeating(JOBS_QUEUE).await.unwrap().len(), 1, "a repeating registration is armed alongside the immediate fire");

    let worker = Arc::new(Worker::new(analyzer_ctx(feed), job_store.clone(), queue.clone(), 4, Duration::from_millis(20)));
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let worker_for_run = worker.clone();
    let handle = tokio::spawn(async move { worker_for_run.run(rx).await });

    let stored = wait_for(&job_store, &job.id, |j| j.last_run_at.is_some()).await;
    // Retry jobs never reach `completed`; the repeating queue entry is authoritative.
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.next_run_at.is_some());

    handle.abort();
}

/// Scenario 3 (spec §8): a second cycle that re-delivers already-processed
/// transfers alongside one new one only advances the snapshot by that one item.
#[tokio::test]
async fn cumulative_merge_only_advances_by_new_items() {
    let feed = Arc::new(FakeFeedAdapter::new());
    let first_batch: Vec<_> = (0..25).map(|i| transfer(&format!("h{i}"), 10, Utc::now())).collect();
    let mut second_batch = vec![transfer("h25", 10, Utc::now())];
    second_batch.extend(first_batch.iter().take(24).cloned());

    {
        let mut pages = feed.token_pages.lock().unwrap();
        pages.push(FeedPage { items: first_batch, token_info: None, data_quality: DataQuality::Complete });
        pages.push(FeedPage { items: second_batch, token_info: None, data_quality: DataQuality::Complete });
    }

    let ctx = analyzer_ctx(feed);
    let job = token_job(HashMap::new());
    let sink = LogSink::new();

    let first = analyzer::run(&ctx, &job, &sink).await.unwrap();
    let AnalyzerOutcome::Written { .. } = first else { panic!("expected first cycle to write a snapshot") };
    let after_cycle1 = ctx.token_snapshots.latest(TOKEN, Network::Testnet).await.unwrap().unwrap();
    assert_eq!(after_cycle1.metrics.total_transfers, 25);

    let second = analyzer::run(&ctx, &job, &sink).await.unwrap();
    let AnalyzerOutcome::Written { .. } = second else { panic!("expected second cycle to write a snapshot") };
    let after_cycle2 = ctx.token_snapshots.latest(TOKEN, Network::Testnet).await.unwrap().unwrap();
    assert_eq!(after_cycle2.metrics.total_transfers, 26, "only h25 is new");
    assert!(after_cycle2.metrics.unique_addresses.is_superset(&after_cycle1.metrics.unique_addresses));
}

/// Scenario 4 (spec §8): a transfer above the large-transfer threshold raises
/// a HIGH-severity alert and the risk score.
#[tokio::test]
async fn large_transfer_raises_alert_and_risk_score() {
    let feed = Arc::new(FakeFeedAdapter::new());
    {
        let mut pages = feed.token_pages.lock().unwrap();
        pages.push(FeedPage { items: vec![transfer("h1", 1, Utc::now())], token_info: None, data_quality: DataQuality::Complete });
        pages.push(FeedPage {
            items: vec![transfer("h2", 50_000, Utc::now() - chrono::Duration::seconds(30))],
            token_info: None,
            data_quality: DataQuality::Complete,
        });
    }

    let ctx = analyzer_ctx(feed);
    let thresholds = HashMap::from([("largeTransfer".to_string(), serde_json::json!(10_000))]);
    let job = token_job(thresholds);
    let sink = LogSink::new();

    let baseline = analyzer::run(&ctx, &job, &sink).await.unwrap();
    let AnalyzerOutcome::Written { risk_score: baseline_risk } = baseline else { panic!("expected baseline write") };

    let spike = analyzer::run(&ctx, &job, &sink).await.unwrap();
    let AnalyzerOutcome::Written { risk_score: spike_risk } = spike else { panic!("expected spike write") };

    let snapshot = ctx.token_snapshots.latest(TOKEN, Network::Testnet).await.unwrap().unwrap();
    assert!(snapshot
        .envelope
        .alerts
        .iter()
        .any(|a| matches!(a.alert_type, AlertType::LargeTransfer) && a.severity == Severity::High));
    assert!(spike_risk > baseline_risk, "risk score should increase after a large transfer");
}

/// Scenario 5 (spec §8): a stale retry job with no live queue entry is
/// re-enrolled on Worker startup and its handler runs.
#[tokio::test]
async fn orphan_recovery_runs_the_stale_job() {
    let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());

    let spec = JobSubmission {
        action: "wallet_snapshot".to_string(),
        payload: HashMap::from([("wallet".to_string(), serde_json::json!(WALLET))]),
        network: None,
        job_type: "retry".to_string(),
        scheduled_at: None,
        interval_minutes: Some(60),
    };
    // Bypass the Scheduler: models a crash that left the Job Store populated
    // with no corresponding queue entry.
    let job = job_store.create(spec).await.unwrap();

    let feed = Arc::new(FakeFeedAdapter::new());
    *feed.native_balance.lock().unwrap() = Some(Amount::from_u64(1));
    let worker = Arc::new(Worker::new(analyzer_ctx(feed), job_store.clone(), queue.clone(), 4, Duration::from_millis(20)));

    let recovered = worker.recover_orphans().await.unwrap();
    assert_eq!(recovered, 1);

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let worker_for_run = worker.clone();
    let handle = tokio::spawn(async move { worker_for_run.run(rx).await });

    let stored = wait_for(&job_store, &job.id, |j| j.logs.iter().any(|l| l.message.contains("execution started"))).await;
    assert!(stored.logs.iter().any(|l| l.message.contains("execution started")));

    handle.abort();
}

/// Scenario 6 (spec §8): emergency clear empties the queue and fails every
/// non-terminal retry job.
#[tokio::test]
async fn emergency_clear_fails_retry_jobs_and_resets_queue() {
    let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
    let scheduler = Scheduler::new(job_store.clone(), queue.clone());

    let mut ids = Vec::new();
    for i in 0..3u8 {
        let spec = JobSubmission {
            action: "analyze_coin_flows".to_string(),
            payload: HashMap::from([("tokenAddress".to_string(), serde_json::json!(format!("0x{:040x}", i)))]),
            network: Some("testnet".to_string()),
            job_type: "retry".to_string(),
            scheduled_at: None,
            interval_minutes: Some(10),
        };
        ids.push(scheduler.submit(spec).await.unwrap().id);
    }

    queue.obliterate(JOBS_QUEUE).await.unwrap();
    let failed = job_store.mark_all_retry_failed("Job stopped by emergency clear").await.unwrap();
    assert_eq!(failed, 3);

    let counts = queue.queue_status(JOBS_QUEUE).await.unwrap();
    assert_eq!(counts.waiting + counts.active + counts.delayed + counts.repeating, 0);

    for id in ids {
        let job = job_store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_details.as_ref().unwrap().message.contains("emergency clear"));
    }

    // Submitting afterwards still works normally.
    let spec = JobSubmission {
        action: "wallet_snapshot".to_string(),
        payload: HashMap::from([("wallet".to_string(), serde_json::json!(WALLET))]),
        network: None,
        job_type: "scheduled".to_string(),
        scheduled_at: Some(Utc::now() + chrono::Duration::minutes(5)),
        interval_minutes: None,
    };
    assert!(scheduler.submit(spec).await.is_ok());
}
