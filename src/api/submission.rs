use crate::api::dto::ApiErrorResponse;
use crate::api::AppState;
use crate::model::job::{Job, JobSubmission};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

/// `POST /jobs` (spec §6 Submission API).
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<JobSubmission>,
) -> Result<(StatusCode, Json<Job>), ApiErrorResponse> {
    let job = state.scheduler.submit(spec).await?;
    Ok((StatusCode::OK, Json(job)))
}
