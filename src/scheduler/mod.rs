pub mod worker;

use crate::error::SubmissionError;
use crate::model::job::{Job, JobSubmission, JobType};
use crate::queue::{DelayQueue, SubmitOptions, JOBS_QUEUE};
use crate::store::JobStore;
use chrono::Utc;
use std::sync::Arc;

pub use worker::Worker;

/// Ties the Job Store and Delay Queue together for the submission half of
/// spec §4.F. The execution half (`Worker`) is a separate type since it
/// needs the Analyzer context too and runs its own poll loop.
pub struct Scheduler {
    job_store: Arc<dyn JobStore>,
    queue: Arc<dyn DelayQueue>,
}

impl Scheduler {
    pub fn new(job_store: Arc<dyn JobStore>, queue: Arc<dyn DelayQueue>) -> Self {
        Self { job_store, queue }
    }

    /// Submission flow (spec §4.F steps 1-4): validate, create the Job
    /// record, enrol it in the Delay Queue, return it. If enrolment fails,
    /// the Job row just created is deleted so the submitter sees exactly the
    /// contract spec §7 promises for a queue/broker error: "no Job record is
    /// created".
    pub async fn submit(&self, spec: JobSubmission) -> Result<Job, SubmissionError> {
        let job = self.job_store.create(spec).await?;

        if let Err(err) = enrol(&self.queue, &job).await {
            tracing::warn!(job_id = %job.id, error = %err, "enrolment failed; rolling back job record");
            let _ = self.job_store.delete(&job.id).await;
            return Err(err.into());
        }

        Ok(job)
    }
}

fn payload_for(job: &Job) -> serde_json::Value {
    serde_json::json!({ "jobId": job.id })
}

/// Enrols a freshly created Job in the queue (spec §4.F step 3).
pub(crate) async fn enrol(queue: &Arc<dyn DelayQueue>, job: &Job) -> Result<(), crate::error::QueueError> {
    let payload = payload_for(job);

    match job.job_type {
        JobType::Scheduled => {
            let scheduled_at = job.scheduled_at.expect("validated on submission");
            let delay_ms = (scheduled_at - Utc::now()).num_milliseconds().max(0) as u64;
            queue
                .submit(JOBS_QUEUE, &job.id, payload, SubmitOptions { delay_ms, repeat_every_ms: None })
                .await
        }
        JobType::Retry => {
            let interval_ms = job.interval_minutes.expect("validated on submission") as u64 * 60_000;
            queue
                .submit(JOBS_QUEUE, &job.id, payload.clone(), SubmitOptions { delay_ms: 0, repeat_every_ms: None })
                .await?;
            queue
                .submit(
                    JOBS_QUEUE,
                    &job.id,
                    payload,
                    SubmitOptions { delay_ms: interval_ms, repeat_every_ms: Some(interval_ms) },
                )
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::JobSubmission;
    use crate::queue::fake::FakeDelayQueue;
    use crate::store::job_store::fake::InMemoryJobStore;
    use std::collections::HashMap;

    fn scheduled_submission() -> JobSubmission {
        JobSubmission {
            action: "wallet_snapshot".to_string(),
            payload: HashMap::from([("wallet".to_string(), serde_json::json!("0x1111111111111111111111111111111111111111"))]),
            network: None,
            job_type: "scheduled".to_string(),
            scheduled_at: Some(Utc::now() + chrono::Duration::minutes(5)),
            interval_minutes: None,
        }
    }

    #[tokio::test]
    async fn scheduled_submission_enrols_with_single_delayed_entry() {
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
        let scheduler = Scheduler::new(job_store, queue.clone());

        let job = scheduler.submit(scheduled_submission()).await.unwrap();

        let delayed = queue.list_delayed(JOBS_QUEUE).await.unwrap();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].id, job.id);
        assert!(queue.list_waiting(JOBS_QUEUE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_submission_fires_immediately_and_registers_repeat() {
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::new());
        let scheduler = Scheduler::new(job_store, queue.clone());

        let spec = JobSubmission {
            action: "analyze_coin_flows".to_string(),
            payload: HashMap::from([("tokenAddress".to_string(), serde_json::json!("0x2222222222222222222222222222222222222222"))]),
            network: Some("mainnet".to_string()),
            job_type: "retry".to_string(),
            scheduled_at: None,
            interval_minutes: Some(30),
        };

        let job = scheduler.submit(spec).await.unwrap();

        assert_eq!(queue.list_waiting(JOBS_QUEUE).await.unwrap().len(), 1);
        let repeating = queue.list_repeating(JOBS_QUEUE).await.unwrap();
        assert_eq!(repeating.len(), 1);
        assert_eq!(repeating[0].id, job.id);
    }

    #[tokio::test]
    async fn broker_failure_rolls_back_job_record() {
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn DelayQueue> = Arc::new(FakeDelayQueue::failing());
        let scheduler = Scheduler::new(job_store.clone(), queue);

        let err = scheduler.submit(scheduled_submission()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Queue(_)));
        assert!(job_store.list().await.unwrap().is_empty());
    }
}
