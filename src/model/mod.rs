pub mod alert;
pub mod bigint;
pub mod bounded;
pub mod job;
pub mod snapshot;

pub use alert::{Alert, AlertType, AnalysisMetadata, DataQuality, Severity};
pub use bigint::Amount;
pub use job::{ErrorDetails, Job, JobAction, JobStatus, JobSubmission, JobType, LogEntry, LogLevel, Network};
pub use snapshot::{NftSnapshot, SnapshotEnvelope, SnapshotKind, TokenSnapshot, WalletSnapshot};
