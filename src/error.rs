use thiserror::Error;

/// Errors surfaced synchronously by job submission (spec §7 "Validation error").
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("network must be one of mainnet|testnet|devnet, got '{0}'")]
    InvalidNetwork(String),

    #[error("scheduled jobs require scheduledAt")]
    MissingScheduledAt,

    #[error("retry jobs require a positive intervalMinutes")]
    MissingOrInvalidInterval,

    #[error("invalid address format: '{0}' (expected 0x-prefixed 20-byte hex)")]
    InvalidAddressFormat(String),
}

/// Errors raised by the Feed Adapter (spec §4.C).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("all endpoints failed for entity {entity}")]
    AllEndpointsFailed { entity: String },

    #[error("upstream reported not found (404) for entity {entity}")]
    NotFound { entity: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while analyzing a fetched page against prior state (spec §4.D, §7).
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("native balance unavailable for entity {0}")]
    NativeBalanceUnavailable(String),

    #[error("unknown action for analyzer dispatch: {0}")]
    UnknownAction(String),
}

/// Errors raised by the Job Store / Snapshot Store (spec §4.A, §4.B).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    Bson(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

/// Errors raised by the Delay Queue broker (spec §4.E, §7).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker unreachable: {0}")]
    Unreachable(#[from] redis::RedisError),

    #[error("submit failed: {0}")]
    SubmitFailed(String),
}

/// `JobStore::create` can fail synchronously for a bad request (spec §6
/// "Missing-schedule validation errors -> 400") or for a store-layer reason;
/// callers in `src/api` map the two to different HTTP statuses.
#[derive(Debug, Error)]
pub enum CreateJobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the Scheduler's submission flow (spec §4.F step 3). A
/// `Queue` failure here means the caller-visible contract is "no Job record
/// was created" even though the Job Store write happened first internally —
/// the Scheduler compensates by deleting the row it just inserted.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<CreateJobError> for SubmissionError {
    fn from(err: CreateJobError) -> Self {
        match err {
            CreateJobError::Validation(e) => Self::Validation(e),
            CreateJobError::Store(e) => Self::Store(e),
        }
    }
}
