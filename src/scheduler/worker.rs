use super::enrol;
use crate::analyzer::{self, logsink::LogSink, AnalyzerContext};
use crate::error::{AnalyzerError, StoreError};
use crate::model::job::{ErrorDetails, Job, JobStatus, JobType, LogEntry};
use crate::queue::{DelayQueue, JOBS_QUEUE};
use crate::store::{JobPatch, JobStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Execution side of spec §4.F: pops ready items off the Delay Queue, loads
/// the Job, dispatches to the Analyzer, and writes the outcome back.
///
/// Concurrency model mirrors the teacher's `collect_due`: a single poll loop
/// fans dispatched work out across up to `concurrency` concurrently-running
/// handlers via a bounded semaphore (spec §5 "one Worker process may run N
/// handlers concurrently").
pub struct Worker {
    ctx: Arc<AnalyzerContext>,
    job_store: Arc<dyn JobStore>,
    queue: Arc<dyn DelayQueue>,
    concurrency: usize,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(ctx: Arc<AnalyzerContext>, job_store: Arc<dyn JobStore>, queue: Arc<dyn DelayQueue>, concurrency: usize, poll_interval: Duration) -> Self {
        Self { ctx, job_store, queue, concurrency: concurrency.max(1), poll_interval }
    }

    /// Startup orphan recovery (spec §4.F "Orphan recovery"). Re-enrols every
    /// `type=retry, status=pending` job whose `lastRunAt` is missing or stale
    /// exactly as the original submission flow would have, since a queue
    /// that lost its repeat registration needs both the immediate fire and a
    /// fresh repeating entry re-armed, not just a single one-shot fire.
    pub async fn recover_orphans(&self) -> Result<usize, StoreError> {
        let orphans = self.job_store.find_orphans().await?;
        let count = orphans.len();
        for job in &orphans {
            if let Err(err) = enrol(&self.queue, job).await {
                tracing::error!(job_id = %job.id, error = %err, "failed to re-enrol orphaned job");
                continue;
            }
            tracing::info!(job_id = %job.id, "orphaned job re-enrolled");
        }
        Ok(count)
    }

    /// Runs the poll loop until `shutdown` is signalled, then waits for all
    /// in-flight handlers to finish before returning (spec §4.F "Graceful
    /// shutdown": stop accepting new handler invocations, wait for in-flight
    /// handlers, release broker connections, then exit — the connection
    /// release itself happens naturally when `self.queue`'s last `Arc`
    /// drops in the caller).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));
        let mut handlers = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                popped = self.queue.pop_ready(JOBS_QUEUE) => {
                    match popped {
                        Ok(Some(item)) => {
                            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                            let worker = self.clone();
                            handlers.spawn(async move {
                                let _permit = permit;
                                worker.execute(item.id).await;
                            });
                        }
                        Ok(None) => {
                            if let Ok(counts) = self.queue.queue_status(JOBS_QUEUE).await {
                                crate::metrics::record_queue_counts(&counts);
                            }
                            tokio::select! {
                                _ = tokio::time::sleep(self.poll_interval) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "queue poll failed; backing off");
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
            while handlers.try_join_next().is_some() {}
        }

        tracing::info!(in_flight = handlers.len(), "worker stopping; draining in-flight handlers");
        while handlers.join_next().await.is_some() {}
    }

    async fn execute(&self, job_id: String) {
        let succeeded = self.execute_job(&job_id).await;
        let outcome = if succeeded {
            self.queue.complete(JOBS_QUEUE, &job_id).await
        } else {
            self.queue.mark_failed(JOBS_QUEUE, &job_id).await
        };
        if let Err(err) = outcome {
            tracing::warn!(job_id = %job_id, error = %err, "failed to release queue entry after execution");
        }
    }

    /// Execution flow (spec §4.F). Errors inside a handler never propagate
    /// beyond the job (spec §7 "Propagation"); every branch below is
    /// best-effort against the Job Store and returns whether the Analyzer
    /// succeeded, which only affects bookkeeping in the queue's active set.
    async fn execute_job(&self, job_id: &str) -> bool {
        let job = match self.job_store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id, "queue fired for a job that no longer exists; dropping");
                return true;
            }
            Err(err) => {
                tracing::error!(job_id, error = %err, "failed to load job; dropping this fire");
                return false;
            }
        };

        let _ = self.job_store.set_status(job_id, JobStatus::Running, JobPatch::default()).await;
        let _ = self.job_store.append_log(job_id, LogEntry::info("execution started")).await;

        if job.job_type == JobType::Scheduled {
            if let Some(scheduled_at) = job.scheduled_at {
                if Utc::now() < scheduled_at {
                    let _ = self
                        .job_store
                        .append_log(job_id, LogEntry::warn("fired before scheduledAt; the queue will not re-fire"))
                        .await;
                    return true;
                }
            }
        }

        let sink = LogSink::new();
        let result = analyzer::run(&self.ctx, &job, &sink).await;

        for entry in sink.into_entries() {
            let _ = self.job_store.append_service_log(job_id, entry).await;
        }

        match result {
            Ok(_) => {
                self.record_success(&job).await;
                true
            }
            Err(err) => {
                self.record_failure(job_id, &err).await;
                false
            }
        }
    }

    async fn record_success(&self, job: &Job) {
        let now = Utc::now();
        match job.job_type {
            JobType::Scheduled => {
                let patch = JobPatch { last_run_at: Some(now), ..Default::default() };
                let _ = self.job_store.set_status(&job.id, JobStatus::Completed, patch).await;
                let _ = self.job_store.append_log(&job.id, LogEntry::info("job completed")).await;
            }
            JobType::Retry => {
                let interval_minutes = job.interval_minutes.unwrap_or(0) as i64;
                let next_run_at = now + chrono::Duration::minutes(interval_minutes);
                let patch = JobPatch { last_run_at: Some(now), next_run_at: Some(next_run_at), ..Default::default() };
                // Status does not move to `completed`; the repeating queue
                // registration is authoritative (spec §4.F step 4).
                let _ = self.job_store.set_status(&job.id, JobStatus::Pending, patch).await;
                let _ = self
                    .job_store
                    .append_log(&job.id, LogEntry::info("recurring job completed, next run scheduled"))
                    .await;
            }
        }
    }

    async fn record_failure(&self, job_id: &str, err: &AnalyzerError) {
        tracing::warn!(job_id, error = %err, "job execution failed");
        let details = ErrorDetails { message: err.to_string(), stack: None, timestamp: Utc::now() };
        let patch = JobPatch { error_details: Some(details), ..Default::default() };
        let _ = self.job_store.set_status(job_id, JobStatus::Failed, patch).await;
        let _ = self.job_store.append_log(job_id, LogEntry::error(format!("job failed: {err}"))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fake::FakeFeedAdapter;
    use crate::feed::{FeedPage, RawTransaction};
    use crate::model::bigint::Amount;
    use crate::model::job::{JobSubmission, Network};
    use crate::model::snapshot::{NftSnapshot, TokenSnapshot, WalletSnapshot};
    use crate::queue::fake::FakeDelayQueue;
    use crate::store::snapshot_store::fake::InMemorySnapshotStore;
    use crate::store::job_store::fake::InMemoryJobStore;
    use std::collections::HashMap;

    fn ctx(feed: FakeFeedAdapter) -> Arc<AnalyzerContext> {
        Arc::new(AnalyzerContext {
            feed: Arc::new(feed),
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

    #[tokio::test]
    async fn scheduled_job_fires_and_completes() {
        let feed = FakeFeedAdapter::new();
        *feed.native_balance.lock().unwrap() = Some(Amount::from_u64(1_000_000_000_000_000_000u64));
        feed.wallet_pages.lock().unwrap().push(FeedPage {
            items: vec![RawTransaction {
                hash: "0xaaa".to_string(),
                from: "0x1111111111111111111111111111111111111111".to_string(),
                to: "0x2222222222222222222222222222222222222222".to_string(),
                value: Amount::from_u64(1u64),
                data: vec![],
                tx_type: 0,
                status: true,
                fee: Amount::from_u64(1u64),
                gas_used: Amount::from_u64(21000u64),
                timestamp: Utc::now(),
            }],
            token_info: None,
            data_quality: crate::model::DataQuality::Complete,
        });

        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
        let scheduler = super::super::Scheduler::new(job_store.clone(), queue.clone());

        let spec = JobSubmission {
            action: "wallet_snapshot".to_string(),
            payload: HashMap::from([("wallet".to_string(), serde_json::json!("0x1111111111111111111111111111111111111111"))]),
            network: Some("testnet".to_string()),
            job_type: "scheduled".to_string(),
            scheduled_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            interval_minutes: None,
        };
        let job = scheduler.submit(spec).await.unwrap();

        let worker = Arc::new(Worker::new(ctx(feed), job_store.clone(), queue, 4, Duration::from_millis(10)));
        let ran = worker.execute_job(&job.id).await;
        assert!(ran);

        let stored = job_store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.logs.iter().any(|l| l.message.contains("execution started")));
        assert!(stored.logs.iter().any(|l| l.message.contains("job completed")));
    }

    #[tokio::test]
    async fn missing_native_balance_fails_wallet_job() {
        let feed = FakeFeedAdapter::new();
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
        let scheduler = super::super::Scheduler::new(job_store.clone(), queue.clone());

        let spec = JobSubmission {
            action: "wallet_snapshot".to_string(),
            payload: HashMap::from([("wallet".to_string(), serde_json::json!("0x1111111111111111111111111111111111111111"))]),
            network: None,
            job_type: "scheduled".to_string(),
            scheduled_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            interval_minutes: None,
        };
        let job = scheduler.submit(spec).await.unwrap();

        let worker = Arc::new(Worker::new(ctx(feed), job_store.clone(), queue, 4, Duration::from_millis(10)));
        let ran = worker.execute_job(&job.id).await;
        assert!(!ran);

        let stored = job_store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_details.is_some());
    }

    #[tokio::test]
    async fn orphan_recovery_re_enrols_stale_retry_jobs() {
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());

        let spec = JobSubmission {
            action: "wallet_snapshot".to_string(),
            payload: HashMap::from([("wallet".to_string(), serde_json::json!("0x1111111111111111111111111111111111111111"))]),
            network: None,
            job_type: "retry".to_string(),
            scheduled_at: None,
            interval_minutes: Some(60),
        };
        // Create the Job record directly (bypassing the Scheduler) to model a
        // crash that left the Job Store populated but the queue empty.
        let job = job_store.create(spec).await.unwrap();

        let worker = Arc::new(Worker::new(ctx(FakeFeedAdapter::new()), job_store, queue.clone(), 4, Duration::from_millis(10)));
        let recovered = worker.recover_orphans().await.unwrap();
        assert_eq!(recovered, 1);

        let waiting = queue.list_waiting(JOBS_QUEUE).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, job.id);
        assert_eq!(queue.list_repeating(JOBS_QUEUE).await.unwrap().len(), 1);
    }
}
