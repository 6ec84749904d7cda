use crate::queue::QueueCounts;
use eyre::{eyre, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder, grounded on the same
/// `PrometheusBuilder::build()` + `metrics::set_global_recorder` pairing the
/// pack's daemon node uses to expose its RPC-layer counters. Supplemental to
/// spec §6's `GET /jobs/queue-status` contract, not a replacement for it.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let (recorder, _) = PrometheusBuilder::new().build().map_err(|e| eyre!("failed to build prometheus recorder: {e}"))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| eyre!("failed to install global metrics recorder: {e}"))?;
    Ok(handle)
}

/// Mirrors a `queue_status()` read into gauges so the counts are observable
/// outside the HTTP contract too (SPEC_FULL.md "Metrics" supplement).
pub fn record_queue_counts(counts: &QueueCounts) {
    metrics::gauge!("chain_watch_jobs_waiting").set(counts.waiting as f64);
    metrics::gauge!("chain_watch_jobs_active").set(counts.active as f64);
    metrics::gauge!("chain_watch_jobs_delayed").set(counts.delayed as f64);
    metrics::gauge!("chain_watch_jobs_repeating").set(counts.repeating as f64);
    metrics::gauge!("chain_watch_jobs_failed").set(counts.failed as f64);
}
