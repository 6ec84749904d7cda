use crate::error::{AnalyzerError, QueueError, StoreError, SubmissionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Uniform error envelope for every API failure, grounded on the pack's
/// block-explorer-style REST services that wrap domain errors in a single
/// `{code, message}` shape rather than leaking internal error enums.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
        (status, Json(ApiError { code, message: message.into() }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Fallback path; callers normally construct the `(StatusCode, Json<ApiError>)`
        // pair directly via the `From` impls below so the status code travels with it.
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

pub struct ApiErrorResponse(pub StatusCode, pub ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<SubmissionError> for ApiErrorResponse {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Validation(e) => {
                let (status, body) = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string());
                Self(status, body.0)
            }
            SubmissionError::Store(e) => Self::from(e),
            SubmissionError::Queue(e) => Self::from(e),
        }
    }
}

impl From<StoreError> for ApiErrorResponse {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = match err {
            StoreError::JobNotFound(_) => "NOT_FOUND",
            _ => "STORE_ERROR",
        };
        let (status, body) = ApiError::new(status, code, err.to_string());
        Self(status, body.0)
    }
}

impl From<QueueError> for ApiErrorResponse {
    fn from(err: QueueError) -> Self {
        let (status, body) = ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "QUEUE_ERROR", err.to_string());
        Self(status, body.0)
    }
}

impl From<AnalyzerError> for ApiErrorResponse {
    fn from(err: AnalyzerError) -> Self {
        let (status, body) = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "ANALYZER_ERROR", err.to_string());
        Self(status, body.0)
    }
}

pub fn not_found(message: impl Into<String>) -> ApiErrorResponse {
    let (status, body) = ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message);
    ApiErrorResponse(status, body.0)
}
