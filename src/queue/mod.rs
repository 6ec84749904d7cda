pub mod redis_queue;

use crate::error::QueueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options accepted by `submit` (spec §4.E).
///
/// A submission with both fields fires first at `delay_ms`, then every
/// `repeat_every_ms` thereafter. `fire_immediately = false` models the
/// "do not fire immediately" variant the Scheduler uses for a retry job's
/// repeating registration (spec §4.F step 3: the repeating submit's first
/// fire is `intervalMs` away, the immediate first run is a *separate*
/// one-shot submit).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub delay_ms: u64,
    pub repeat_every_ms: Option<u64>,
}

/// One dispatch-ready item popped off the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub repeating: u64,
    pub failed: u64,
}

/// Contract offered to Scheduler/Worker (spec §4.E).
///
/// There is no `subscribe(name, handler)` method here: Rust's ownership
/// model makes a registered-closure-per-queue awkward across an `Arc<dyn
/// DelayQueue>` boundary, so the handler side of that contract is modeled as
/// the Worker's own poll loop calling `pop_ready` — the "at-most-one
/// concurrent handler per enqueued item" guarantee still holds because
/// `pop_ready` atomically moves an item into the active set, and no other
/// caller (including a second Worker process) can pop the same item again
/// until `complete`/`fail` releases it.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    async fn submit(&self, name: &str, id: &str, payload: serde_json::Value, opts: SubmitOptions) -> Result<(), QueueError>;

    /// Pops the next ready item for `name`, if any, moving it into the active set.
    async fn pop_ready(&self, name: &str) -> Result<Option<QueueItem>, QueueError>;

    /// Releases an item from the active set after its handler finished (success or failure).
    async fn complete(&self, name: &str, id: &str) -> Result<(), QueueError>;

    /// Records an item as failed (operational visibility only — job-level
    /// failure handling lives in the Job Store, spec §4.F step 5).
    async fn mark_failed(&self, name: &str, id: &str) -> Result<(), QueueError>;

    async fn list_waiting(&self, name: &str) -> Result<Vec<QueueItem>, QueueError>;
    async fn list_active(&self, name: &str) -> Result<Vec<QueueItem>, QueueError>;
    async fn list_delayed(&self, name: &str) -> Result<Vec<QueueItem>, QueueError>;
    async fn list_repeating(&self, name: &str) -> Result<Vec<QueueItem>, QueueError>;
    async fn list_failed(&self, name: &str) -> Result<Vec<QueueItem>, QueueError>;

    /// Removes all queue entries (waiting/delayed/repeating) for `id`. Active
    /// entries are untouched — spec §5: "In-flight handlers run to
    /// completion; they are not interrupted mid-call."
    async fn remove_by_id(&self, name: &str, id: &str) -> Result<(), QueueError>;

    /// Cancels a repeating registration's future fires without touching an
    /// already-promoted instance (spec §4.E repeating-vs-per-fire distinction).
    async fn remove_repeating_by_key(&self, name: &str, key: &str) -> Result<(), QueueError>;

    async fn queue_status(&self, name: &str) -> Result<QueueCounts, QueueError>;

    /// Wipes every entry for `name` (spec §6 `DELETE /jobs/clear-all`).
    async fn obliterate(&self, name: &str) -> Result<(), QueueError>;
}

/// The single logical queue name this crate enrolls every job under.
pub const JOBS_QUEUE: &str = "jobs";

/// In-memory fake used by scheduler/worker tests (spec §8) so they do not
/// depend on a live Redis broker.
#[cfg(any(test, feature = "test-fakes"))]
pub mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Entry {
        ready_at_ms: i64,
        repeat_every_ms: Option<u64>,
    }

    #[derive(Default)]
    struct Inner {
        delayed: HashMap<String, Entry>,
        waiting: Vec<String>,
        active: HashSet<String>,
        failed: Vec<String>,
        items: HashMap<String, serde_json::Value>,
    }

    /// Set `fail_submit` to model an unreachable broker (spec §7
    /// "Queue/broker error ... fatal to the submission").
    pub struct FakeDelayQueue {
        inner: Mutex<Inner>,
        fail_submit: bool,
    }

    impl FakeDelayQueue {
        pub fn new() -> Self {
            Self { inner: Mutex::new(Inner::default()), fail_submit: false }
        }

        pub fn failing() -> Self {
            Self { inner: Mutex::new(Inner::default()), fail_submit: true }
        }

        fn now_ms() -> i64 {
            chrono::Utc::now().timestamp_millis()
        }
    }

    impl Default for FakeDelayQueue {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DelayQueue for FakeDelayQueue {
        async fn submit(&self, _name: &str, id: &str, payload: serde_json::Value, opts: SubmitOptions) -> Result<(), QueueError> {
            if self.fail_submit {
                return Err(QueueError::SubmitFailed("broker unreachable (fake)".to_string()));
            }
            let mut inner = self.inner.lock().unwrap();
            inner.items.insert(id.to_string(), payload);
            if opts.delay_ms == 0 {
                inner.waiting.push(id.to_string());
                if let Some(interval) = opts.repeat_every_ms {
                    inner.delayed.insert(id.to_string(), Entry { ready_at_ms: Self::now_ms() + interval as i64, repeat_every_ms: Some(interval) });
                }
            } else {
                inner.delayed.insert(
                    id.to_string(),
                    Entry { ready_at_ms: Self::now_ms() + opts.delay_ms as i64, repeat_every_ms: opts.repeat_every_ms },
                );
            }
            Ok(())
        }

        async fn pop_ready(&self, _name: &str) -> Result<Option<QueueItem>, QueueError> {
            let mut inner = self.inner.lock().unwrap();
            let now = Self::now_ms();
            let due: Vec<String> = inner.delayed.iter().filter(|(_, e)| e.ready_at_ms <= now).map(|(id, _)| id.clone()).collect();
            for id in due {
                let entry = inner.delayed.remove(&id).unwrap();
                inner.waiting.push(id.clone());
                if let Some(interval) = entry.repeat_every_ms {
                    inner.delayed.insert(id, Entry { ready_at_ms: now + interval as i64, repeat_every_ms: Some(interval) });
                }
            }
            if inner.waiting.is_empty() {
                return Ok(None);
            }
            let id = inner.waiting.remove(0);
            inner.active.insert(id.clone());
            let payload = inner.items.get(&id).cloned().unwrap_or(serde_json::Value::Null);
            Ok(Some(QueueItem { id, name: JOBS_QUEUE.to_string(), payload }))
        }

        async fn complete(&self, _name: &str, id: &str) -> Result<(), QueueError> {
            self.inner.lock().unwrap().active.remove(id);
            Ok(())
        }

        async fn mark_failed(&self, _name: &str, id: &str) -> Result<(), QueueError> {
            let mut inner = self.inner.lock().unwrap();
            inner.active.remove(id);
            inner.failed.push(id.to_string());
            Ok(())
        }

        async fn list_waiting(&self, _name: &str) -> Result<Vec<QueueItem>, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.waiting.iter().map(|id| QueueItem { id: id.clone(), name: JOBS_QUEUE.to_string(), payload: inner.items.get(id).cloned().unwrap_or(serde_json::Value::Null) }).collect())
        }

        async fn list_active(&self, _name: &str) -> Result<Vec<QueueItem>, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.active.iter().map(|id| QueueItem { id: id.clone(), name: JOBS_QUEUE.to_string(), payload: inner.items.get(id).cloned().unwrap_or(serde_json::Value::Null) }).collect())
        }

        async fn list_delayed(&self, _name: &str) -> Result<Vec<QueueItem>, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.delayed.keys().map(|id| QueueItem { id: id.clone(), name: JOBS_QUEUE.to_string(), payload: inner.items.get(id).cloned().unwrap_or(serde_json::Value::Null) }).collect())
        }

        async fn list_repeating(&self, _name: &str) -> Result<Vec<QueueItem>, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .delayed
                .iter()
                .filter(|(_, e)| e.repeat_every_ms.is_some())
                .map(|(id, _)| QueueItem { id: id.clone(), name: JOBS_QUEUE.to_string(), payload: inner.items.get(id).cloned().unwrap_or(serde_json::Value::Null) })
                .collect())
        }

        async fn list_failed(&self, _name: &str) -> Result<Vec<QueueItem>, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.failed.iter().map(|id| QueueItem { id: id.clone(), name: JOBS_QUEUE.to_string(), payload: inner.items.get(id).cloned().unwrap_or(serde_json::Value::Null) }).collect())
        }

        async fn remove_by_id(&self, _name: &str, id: &str) -> Result<(), QueueError> {
            let mut inner = self.inner.lock().unwrap();
            inner.delayed.remove(id);
            inner.waiting.retain(|x| x != id);
            inner.items.remove(id);
            Ok(())
        }

        async fn remove_repeating_by_key(&self, _name: &str, key: &str) -> Result<(), QueueError> {
            let mut inner = self.inner.lock().unwrap();
            inner.delayed.remove(key);
            Ok(())
        }

        async fn queue_status(&self, _name: &str) -> Result<QueueCounts, QueueError> {
            let inner = self.inner.lock().unwrap();
            Ok(QueueCounts {
                waiting: inner.waiting.len() as u64,
                active: inner.active.len() as u64,
                delayed: inner.delayed.values().filter(|e| e.repeat_every_ms.is_none() || e.ready_at_ms > Self::now_ms()).count() as u64,
                repeating: inner.delayed.values().filter(|e| e.repeat_every_ms.is_some()).count() as u64,
                failed: inner.failed.len() as u64,
            })
        }

        async fn obliterate(&self, _name: &str) -> Result<(), QueueError> {
            *self.inner.lock().unwrap() = Inner::default();
            Ok(())
        }
    }
}
