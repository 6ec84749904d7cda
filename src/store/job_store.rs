use crate::error::{CreateJobError, StoreError, ValidationError};
use crate::model::job::{Job, JobStatus, JobSubmission, JobType, LogEntry, Network};
use async_trait::async_trait;
use bson::doc;
use chrono::{Duration, Utc};
use mongodb::{Collection, Database};
use uuid::Uuid;

/// Contract for the durable Job record store (spec §4.B Job Store).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, spec: JobSubmission) -> Result<Job, CreateJobError>;
    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;
    async fn list(&self) -> Result<Vec<Job>, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn set_status(&self, id: &str, status: JobStatus, patch: JobPatch) -> Result<(), StoreError>;
    async fn append_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError>;
    async fn append_service_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError>;
    async fn find_orphans(&self) -> Result<Vec<Job>, StoreError>;
    async fn find_failed(&self, limit: usize) -> Result<Vec<Job>, StoreError>;
    async fn mark_all_retry_failed(&self, message: &str) -> Result<u64, StoreError>;
}

/// Fields `setStatus` may merge in alongside a status transition (spec §4.B).
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub last_run_at: Option<chrono::DateTime<Utc>>,
    pub next_run_at: Option<chrono::DateTime<Utc>>,
    pub error_details: Option<crate::model::job::ErrorDetails>,
}

/// Validates a submission per spec §4.B "Validation on create".
pub fn validate_submission(spec: &JobSubmission) -> Result<(), ValidationError> {
    use crate::model::job::JobAction;

    JobAction::parse(&spec.action).ok_or_else(|| ValidationError::UnknownAction(spec.action.clone()))?;

    if let Some(network) = &spec.network {
        Network::parse(network).ok_or_else(|| ValidationError::InvalidNetwork(network.clone()))?;
    }

    match spec.job_type.as_str() {
        "scheduled" => {
            if spec.scheduled_at.is_none() {
                return Err(ValidationError::MissingScheduledAt);
            }
        }
        "retry" => {
            if !spec.interval_minutes.map(|m| m > 0).unwrap_or(false) {
                return Err(ValidationError::MissingOrInvalidInterval);
            }
        }
        other => return Err(ValidationError::UnknownAction(format!("type:{other}"))),
    }

    Ok(())
}

pub struct MongoJobStore {
    collection: Collection<Job>,
}

impl MongoJobStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("jobs"),
        }
    }
}

#[async_trait]
impl JobStore for MongoJobStore {
    async fn create(&self, spec: JobSubmission) -> Result<Job, CreateJobError> {
        validate_submission(&spec)?;

        let action = crate::model::job::JobAction::parse(&spec.action).expect("validated above");
        let network = spec
            .network
            .as_deref()
            .map(|n| Network::parse(n).expect("validated above"))
            .unwrap_or_default();
        let job_type = match spec.job_type.as_str() {
            "scheduled" => JobType::Scheduled,
            _ => JobType::Retry,
        };

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            action,
            payload: spec.payload,
            network,
            job_type,
            scheduled_at: spec.scheduled_at,
            interval_minutes: spec.interval_minutes,
            status: JobStatus::Pending,
            last_run_at: None,
            next_run_at: None,
            logs: Vec::new(),
            service_logs: Vec::new(),
            error_details: None,
            created_at: now,
            updated_at: now,
        };

        self.collection.insert_one(&job, None).await.map_err(StoreError::from)?;

        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.collection.find_one(doc! { "id": id }, None).await?)
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        use futures::stream::TryStreamExt;
        let cursor = self.collection.find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.collection.delete_one(doc! { "id": id }, None).await?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: JobStatus, patch: JobPatch) -> Result<(), StoreError> {
        let status_str = match status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };

        let mut set_doc = doc! {
            "status": status_str,
            "updated_at": bson::DateTime::from_chrono(Utc::now()),
        };
        if let Some(t) = patch.last_run_at {
            set_doc.insert("last_run_at", bson::DateTime::from_chrono(t));
        }
        if let Some(t) = patch.next_run_at {
            set_doc.insert("next_run_at", bson::DateTime::from_chrono(t));
        }
        if let Some(details) = patch.error_details {
            set_doc.insert("error_details", bson::to_bson(&details)?);
        }

        self.collection
            .update_one(doc! { "id": id }, doc! { "$set": set_doc }, None)
            .await?;
        Ok(())
    }

    async fn append_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError> {
        let bson_entry = bson::to_bson(&entry)?;
        self.collection
            .update_one(
                doc! { "id": id },
                doc! { "$push": { "logs": bson_entry }, "$set": { "updated_at": bson::DateTime::from_chrono(Utc::now()) } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn append_service_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError> {
        let bson_entry = bson::to_bson(&entry)?;
        self.collection
            .update_one(
                doc! { "id": id },
                doc! { "$push": { "service_logs": bson_entry } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn find_orphans(&self) -> Result<Vec<Job>, StoreError> {
        use futures::stream::TryStreamExt;
        let cutoff = Utc::now() - Duration::hours(24);
        let filter = doc! {
            "type": "retry",
            "status": "pending",
            "$or": [
                { "last_run_at": { "$exists": false } },
                { "last_run_at": null },
                { "last_run_at": { "$lt": bson::DateTime::from_chrono(cutoff) } },
            ],
        };
        let cursor = self.collection.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_failed(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        use futures::stream::TryStreamExt;
        use mongodb::options::FindOptions;
        let opts = FindOptions::builder()
            .sort(doc! { "updated_at": -1 })
            .limit(limit as i64)
            .build();
        let cursor = self
            .collection
            .find(doc! { "status": "failed" }, opts)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_all_retry_failed(&self, message: &str) -> Result<u64, StoreError> {
        let filter = doc! {
            "type": "retry",
            "status": { "$in": ["pending", "running"] },
        };
        let error_details = crate::model::job::ErrorDetails {
            message: message.to_string(),
            stack: None,
            timestamp: Utc::now(),
        };
        let update = doc! {
            "$set": {
                "status": "failed",
                "error_details": bson::to_bson(&error_details)?,
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        let result = self.collection.update_many(filter, update, None).await?;
        Ok(result.modified_count)
    }
}

/// In-memory fake used by tests (spec §8 scenarios run without a live MongoDB).
#[cfg(any(test, feature = "test-fakes"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<String, Job>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn create(&self, spec: JobSubmission) -> Result<Job, CreateJobError> {
            validate_submission(&spec)?;
            let action = crate::model::job::JobAction::parse(&spec.action).expect("validated");
            let network = spec
                .network
                .as_deref()
                .map(|n| Network::parse(n).expect("validated"))
                .unwrap_or_default();
            let job_type = match spec.job_type.as_str() {
                "scheduled" => JobType::Scheduled,
                _ => JobType::Retry,
            };
            let now = Utc::now();
            let job = Job {
                id: Uuid::new_v4().to_string(),
                action,
                payload: spec.payload,
                network,
                job_type,
                scheduled_at: spec.scheduled_at,
                interval_minutes: spec.interval_minutes,
                status: JobStatus::Pending,
                last_run_at: None,
                next_run_at: None,
                logs: Vec::new(),
                service_logs: Vec::new(),
                error_details: None,
                created_at: now,
                updated_at: now,
            };
            self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
            Ok(job)
        }

        async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn list(&self) -> Result<Vec<Job>, StoreError> {
            Ok(self.jobs.lock().unwrap().values().cloned().collect())
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.jobs.lock().unwrap().remove(id);
            Ok(())
        }

        async fn set_status(&self, id: &str, status: JobStatus, patch: JobPatch) -> Result<(), StoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
            job.status = status;
            if let Some(t) = patch.last_run_at {
                job.last_run_at = Some(t);
            }
            if let Some(t) = patch.next_run_at {
                job.next_run_at = Some(t);
            }
            if let Some(details) = patch.error_details {
                job.error_details = Some(details);
            }
            job.updated_at = Utc::now();
            Ok(())
        }

        async fn append_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
            job.logs.push(entry);
            job.updated_at = Utc::now();
            Ok(())
        }

        async fn append_service_log(&self, id: &str, entry: LogEntry) -> Result<(), StoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
            job.service_logs.push(entry);
            Ok(())
        }

        async fn find_orphans(&self) -> Result<Vec<Job>, StoreError> {
            let cutoff = Utc::now() - Duration::hours(24);
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| {
                    matches!(j.job_type, JobType::Retry)
                        && matches!(j.status, JobStatus::Pending)
                        && j.last_run_at.map(|t| t < cutoff).unwrap_or(true)
                })
                .cloned()
                .collect())
        }

        async fn find_failed(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
            let mut jobs: Vec<Job> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| matches!(j.status, JobStatus::Failed))
                .cloned()
                .collect();
            jobs.sort_by_key(|j| std::cmp::Reverse(j.updated_at));
            jobs.truncate(limit);
            Ok(jobs)
        }

        async fn mark_all_retry_failed(&self, message: &str) -> Result<u64, StoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut n = 0u64;
            for job in jobs.values_mut() {
                if matches!(job.job_type, JobType::Retry)
                    && matches!(job.status, JobStatus::Pending | JobStatus::Running)
                {
                    job.status = JobStatus::Failed;
                    job.error_details = Some(crate::model::job::ErrorDetails {
                        message: message.to_string(),
                        stack: None,
                        timestamp: Utc::now(),
                    });
                    job.updated_at = Utc::now();
                    n += 1;
                }
            }
            Ok(n)
        }
    }
}
