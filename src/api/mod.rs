pub mod admin;
pub mod dto;
pub mod submission;

use crate::queue::DelayQueue;
use crate::scheduler::Scheduler;
use crate::store::JobStore;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared state handed to every handler (spec §6 External interfaces).
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub job_store: Arc<dyn JobStore>,
    pub queue: Arc<dyn DelayQueue>,
    pub metrics_handle: PrometheusHandle,
}

/// Builds the router exposing the Submission API and the Admin surface.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(submission::submit_job).get(admin::list_jobs))
        .route("/jobs/failed", get(admin::list_failed_jobs))
        .route("/jobs/clear-all", delete(admin::clear_all_jobs))
        .route("/jobs/queue-status", get(admin::queue_status))
        .route("/metrics", get(admin::metrics))
        .route("/jobs/:id", get(admin::get_job).delete(admin::delete_job))
        .route("/jobs/:id/logs", get(admin::get_job_logs))
        .route("/jobs/:id/service-logs", get(admin::get_job_service_logs))
        .with_state(state)
}
