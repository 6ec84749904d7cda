use crate::api::dto::{not_found, ApiErrorResponse};
use crate::api::AppState;
use crate::model::job::{Job, LogEntry, LogLevel};
use crate::queue::JOBS_QUEUE;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `GET /jobs` (spec §6 Admin surface).
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Job>>, ApiErrorResponse> {
    Ok(Json(state.job_store.list().await?))
}

/// `GET /jobs/{id}`.
pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Job>, ApiErrorResponse> {
    state
        .job_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("job {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    level: Option<String>,
    source: Option<String>,
    limit: Option<usize>,
}

fn filter_logs(logs: &[LogEntry], query: &LogQuery) -> Vec<LogEntry> {
    let wanted_level = query.level.as_deref().and_then(|l| match l.to_uppercase().as_str() {
        "INFO" => Some(LogLevel::Info),
        "WARN" => Some(LogLevel::Warn),
        "ERROR" => Some(LogLevel::Error),
        _ => None,
    });

    let mut filtered: Vec<LogEntry> = logs
        .iter()
        .filter(|entry| wanted_level.map(|l| entry.level == l).unwrap_or(true))
        .filter(|entry| {
            query
                .source
                .as_deref()
                .map(|source| entry.function.as_deref() == Some(source))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    // Newest first (spec §6 "filtered log slice, newest first"); append order is
    // chronological so a reverse gives us that without needing the timestamp.
    filtered.reverse();
    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }
    filtered
}

/// `GET /jobs/{id}/logs?level=&source=&limit=`.
pub async fn get_job_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiErrorResponse> {
    let job = state.job_store.get(&id).await?.ok_or_else(|| not_found(format!("job {id} not found")))?;
    Ok(Json(filter_logs(&job.logs, &query)))
}

/// `GET /jobs/{id}/service-logs?level=&source=&limit=`.
pub async fn get_job_service_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiErrorResponse> {
    let job = state.job_store.get(&id).await?.ok_or_else(|| not_found(format!("job {id} not found")))?;
    Ok(Json(filter_logs(&job.service_logs, &query)))
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FailedJob {
    #[serde(flatten)]
    job: Job,
    last_error_log: Option<LogEntry>,
}

/// `GET /jobs/failed?limit=` — recently-failed Jobs with their last ERROR log.
pub async fn list_failed_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<Vec<FailedJob>>, ApiErrorResponse> {
    let limit = query.limit.unwrap_or(20);
    let jobs = state.job_store.find_failed(limit).await?;
    let out = jobs
        .into_iter()
        .map(|job| {
            let last_error_log = job.logs.iter().rev().find(|e| e.level == LogLevel::Error).cloned();
            FailedJob { job, last_error_log }
        })
        .collect();
    Ok(Json(out))
}

/// `DELETE /jobs/{id}` — removes queue entries for this id and deletes the
/// Job record. Active handlers for this id continue to completion (spec §6,
/// §5 "In-flight handlers run to completion; they are not interrupted mid-call").
pub async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiErrorResponse> {
    state.job_store.get(&id).await?.ok_or_else(|| not_found(format!("job {id} not found")))?;
    state.queue.remove_by_id(JOBS_QUEUE, &id).await?;
    state.queue.remove_repeating_by_key(JOBS_QUEUE, &id).await?;
    state.job_store.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// `DELETE /jobs/clear-all` — obliterate the queue and fail every
/// non-terminal retry job (spec §5 "emergency clear").
pub async fn clear_all_jobs(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiErrorResponse> {
    state.queue.obliterate(JOBS_QUEUE).await?;
    let failed = state.job_store.mark_all_retry_failed("Job stopped by emergency clear").await?;
    Ok(Json(serde_json::json!({ "failed": failed })))
}

/// `GET /jobs/queue-status`.
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Result<Json<crate::queue::QueueCounts>, ApiErrorResponse> {
    let counts = state.queue.queue_status(JOBS_QUEUE).await?;
    crate::metrics::record_queue_counts(&counts);
    Ok(Json(counts))
}

/// `GET /metrics` — Prometheus text exposition (SPEC_FULL.md "Metrics" supplement).
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
