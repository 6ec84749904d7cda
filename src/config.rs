use eyre::{eyre, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, grounded on the teacher's `KeeperConfig` — the same
/// post-CLI-parse "validated and duration-ified" shape, just with Mongo/Redis/
/// HTTP fields standing in for chain RPC fields.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mongo_uri: String,
    pub mongo_db: String,
    pub redis_url: String,
    pub bind_addr: String,

    pub worker_concurrency: usize,
    pub poll_interval: Duration,

    pub lock_file: PathBuf,
}

impl RunnerConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli(
        mongo_uri: String,
        mongo_db: String,
        redis_url: String,
        bind_addr: String,
        worker_concurrency: usize,
        poll_seconds: u64,
        lock_file: PathBuf,
    ) -> Result<Self> {
        if worker_concurrency == 0 {
            return Err(eyre!("worker concurrency must be > 0"));
        }

        if redis_url.contains('@') && !redis_url.starts_with("rediss://") {
            tracing::warn!("redis URL appears to carry credentials over a non-TLS scheme");
        }

        Ok(Self {
            mongo_uri,
            mongo_db,
            redis_url,
            bind_addr,
            worker_concurrency,
            poll_interval: Duration::from_secs(poll_seconds.max(1)),
            lock_file,
        })
    }
}
