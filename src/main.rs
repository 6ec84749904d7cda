use chain_watch_runner::analyzer::AnalyzerContext;
use chain_watch_runner::api::{self, AppState};
use chain_watch_runner::config::RunnerConfig;
use chain_watch_runner::feed::rest::RestFeedAdapter;
use chain_watch_runner::feed::FeedAdapter;
use chain_watch_runner::metrics;
use chain_watch_runner::model::{NftSnapshot, TokenSnapshot, WalletSnapshot};
use chain_watch_runner::queue::redis_queue::RedisDelayQueue;
use chain_watch_runner::queue::{self, DelayQueue};
use chain_watch_runner::scheduler::{Scheduler, Worker};
use chain_watch_runner::store;
use clap::Parser;
use eyre::{eyre, Result};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;

#[derive(Parser, Debug)]
#[command(
    name = "chain-watch-runner",
    version,
    about = "Recurring and scheduled job runner for incremental blockchain-analytics polling"
)]
struct Args {
    /// MongoDB connection string.
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    mongo_uri: String,

    /// MongoDB database name.
    #[arg(long, env = "MONGO_DB", default_value = "chain_watch")]
    mongo_db: String,

    /// Redis connection string backing the Delay Queue.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Address the HTTP API binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Max concurrently executing job handlers.
    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = 10)]
    worker_concurrency: usize,

    /// How often the Worker polls the Delay Queue for ready items, in seconds.
    #[arg(long, env = "POLL_SECONDS", default_value_t = 1)]
    poll_seconds: u64,

    /// Where to store the single-instance lock file.
    #[arg(long, env = "LOCK_FILE", default_value = "chain-watch-runner.lock")]
    lock_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let cfg = RunnerConfig::from_cli(
        args.mongo_uri,
        args.mongo_db,
        args.redis_url,
        args.bind_addr,
        args.worker_concurrency,
        args.poll_seconds,
        args.lock_file,
    )?;

    // Single-instance guard: two runners sharing a Job Store and Delay Queue
    // would both attempt orphan recovery on startup and double-enrol the
    // same stale retry jobs.
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&cfg.lock_file)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", cfg.lock_file.display()))?;
    lock_file.try_lock_exclusive().map_err(|e| {
        eyre!("another instance is already running or lock unavailable ({}): {e}", cfg.lock_file.display())
    })?;
    let _lock_guard = lock_file;

    tracing::info!(
        mongo_db = %cfg.mongo_db,
        bind_addr = %cfg.bind_addr,
        worker_concurrency = cfg.worker_concurrency,
        "chain-watch-runner starting"
    );

    // Connectivity sanity checks, grounded on the teacher's chain-id and
    // contract-code checks before entering its poll loop.
    let db = store::connect(&cfg.mongo_uri, &cfg.mongo_db).await.map_err(|e| eyre!("mongo connect failed: {e}"))?;

    let queue: Arc<dyn DelayQueue> = Arc::new(RedisDelayQueue::new(&cfg.redis_url).map_err(|e| eyre!("redis client init failed: {e}"))?);
    if let Err(e) = queue.queue_status(queue::JOBS_QUEUE).await {
        return Err(eyre!("redis connectivity check failed: {e}"));
    }

    let job_store: Arc<dyn store::JobStore> = Arc::new(store::MongoJobStore::new(&db));
    let wallet_snapshots = Arc::new(store::MongoSnapshotStore::<WalletSnapshot>::new(&db, "wallet_snapshots"));
    let token_snapshots = Arc::new(store::MongoSnapshotStore::<TokenSnapshot>::new(&db, "token_snapshots"));
    let nft_snapshots = Arc::new(store::MongoSnapshotStore::<NftSnapshot>::new(&db, "nft_snapshots"));

    let feed: Arc<dyn FeedAdapter> = Arc::new(RestFeedAdapter::new());

    let ctx = Arc::new(AnalyzerContext {
        feed,
        wallet_snapshots,
        token_snapshots,
        nft_snapshots,
    });

    let scheduler = Arc::new(Scheduler::new(job_store.clone(), queue.clone()));
    let worker = Arc::new(Worker::new(ctx, job_store.clone(), queue.clone(), cfg.worker_concurrency, cfg.poll_interval));

    match worker.recover_orphans().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "re-enrolled orphaned retry jobs on startup"),
        Err(e) => tracing::warn!(error = %e, "orphan recovery failed; continuing without it"),
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker_task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(shutdown_rx).await }
    });

    let metrics_handle = metrics::install_recorder()?;
    let state = Arc::new(AppState { scheduler, job_store, queue, metrics_handle });
    let app = api::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = cfg.bind_addr.parse().map_err(|e| eyre!("invalid bind address '{}': {e}", cfg.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| eyre!("failed to bind {addr}: {e}"))?;
    tracing::info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received; draining in-flight handlers");
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|e| eyre!("http server error: {e}"))?;

    worker_task.await.map_err(|e| eyre!("worker task panicked: {e}"))?;

    tracing::info!("chain-watch-runner stopped");
    Ok(())
}
