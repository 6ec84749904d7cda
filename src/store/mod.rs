pub mod job_store;
pub mod snapshot_store;

pub use job_store::{JobPatch, JobStore, MongoJobStore};
pub use snapshot_store::{MongoSnapshotStore, SnapshotStore};

use crate::error::StoreError;
use mongodb::{Client, Database};

/// Connects to MongoDB and verifies reachability with a `ping`, grounded on
/// the teacher's startup sanity checks in `main.rs` (chain-id + contract-code
/// checks before the poll loop starts) — SPEC_FULL.md's "connectivity sanity
/// check at startup" supplement, generalized from RPC to the database.
pub async fn connect(uri: &str, db_name: &str) -> Result<Database, StoreError> {
    let client = Client::with_uri_str(uri).await?;
    let db = client.database(db_name);
    db.run_command(bson::doc! { "ping": 1 }, None).await?;
    Ok(db)
}
