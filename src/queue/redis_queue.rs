use super::{DelayQueue, QueueCounts, QueueItem, SubmitOptions};
use crate::error::QueueError;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// Redis-backed Delay Queue (spec §4.E).
///
/// Key layout per queue `name`, grounded on the teacher's own "a handful of
/// well-named keys, no external broker schema to stand up" approach to
/// external state (`state.rs` persists the keeper's scan cursor the same
/// way: a few flat fields, not a generic document store):
///
///   {name}:delayed    ZSET   member=id           score=ready_at_ms
///   {name}:waiting    LIST   id
///   {name}:active     SET    id
///   {name}:failed     LIST   id (bounded, most recent first)
///   {name}:item:{id}  STRING json(QueueItem)
///   {name}:repeat     HASH   id -> interval_ms
///
/// A background `tick` (driven by the Worker's poll loop, see
/// `scheduler::worker`) promotes due entries from `delayed` into `waiting`,
/// and re-arms any entry with a `repeat` registration for its next cycle —
/// the repeat schedule is authoritative and does not depend on whether a
/// given fire's handler succeeded, matching the "decoupled from job outcome"
/// rule spec §4.F documents for the retry job type's interval timer.
pub struct RedisDelayQueue {
    client: redis::Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    name: String,
    payload: serde_json::Value,
}

const FAILED_CAP: isize = 200;

impl RedisDelayQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Startup connectivity sanity check, grounded on the teacher's chain-id
    /// probe in `main.rs` before entering its poll loop.
    pub async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn key_delayed(name: &str) -> String {
        format!("{name}:delayed")
    }
    fn key_waiting(name: &str) -> String {
        format!("{name}:waiting")
    }
    fn key_active(name: &str) -> String {
        format!("{name}:active")
    }
    fn key_failed(name: &str) -> String {
        format!("{name}:failed")
    }
    fn key_repeat(name: &str) -> String {
        format!("{name}:repeat")
    }
    fn key_item(name: &str, id: &str) -> String {
        format!("{name}:item:{id}")
    }

    /// Promotes any delayed entries whose score has elapsed into `waiting`,
    /// then re-arms entries that carry a repeat registration. Called on
    /// every `pop_ready` so a single poller is enough to keep the queue
    /// moving; safe to call concurrently from several Workers since the
    /// promotion itself is a plain ZREM (idempotent once the member is gone).
    async fn tick(&self, name: &str, conn: &mut redis::aio::MultiplexedConnection) -> Result<(), QueueError> {
        let now = now_ms();
        let due: Vec<String> = conn
            .zrangebyscore(Self::key_delayed(name), 0, now)
            .await?;

        for id in due {
            let removed: i64 = conn.zrem(Self::key_delayed(name), &id).await?;
            if removed == 0 {
                // another poller already promoted this one
                continue;
            }
            conn.rpush::<_, _, ()>(Self::key_waiting(name), &id).await?;

            let interval_ms: Option<i64> = conn.hget(Self::key_repeat(name), &id).await?;
            if let Some(interval_ms) = interval_ms {
                conn.zadd::<_, _, _, ()>(Self::key_delayed(name), &id, now + interval_ms)
                    .await?;
            }
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl DelayQueue for RedisDelayQueue {
    async fn submit(&self, name: &str, id: &str, payload: serde_json::Value, opts: SubmitOptions) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stored = StoredItem { name: name.to_string(), payload };
        let json = serde_json::to_string(&stored)
            .map_err(|e| QueueError::SubmitFailed(format!("encode payload: {e}")))?;
        conn.set::<_, _, ()>(Self::key_item(name, id), json).await?;

        if let Some(interval_ms) = opts.repeat_every_ms {
            conn.hset::<_, _, _, ()>(Self::key_repeat(name), id, interval_ms).await?;
        }

        if opts.delay_ms == 0 {
            conn.rpush::<_, _, ()>(Self::key_waiting(name), id).await?;
        } else {
            conn.zadd::<_, _, _, ()>(Self::key_delayed(name), id, now_ms() + opts.delay_ms as i64)
                .await?;
        }
        tracing::debug!(name, id, delay_ms = opts.delay_ms, repeating = opts.repeat_every_ms.is_some(), "queue submit");
        Ok(())
    }

    async fn pop_ready(&self, name: &str) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.tick(name, &mut conn).await?;

        let id: Option<String> = conn.lpop(Self::key_waiting(name), None).await?;
        let Some(id) = id else { return Ok(None) };

        conn.sadd::<_, _, ()>(Self::key_active(name), &id).await?;

        let raw: Option<String> = conn.get(Self::key_item(name, &id)).await?;
        let Some(raw) = raw else {
            // item record expired or was obliterated between lpop and get; drop it
            conn.srem::<_, _, ()>(Self::key_active(name), &id).await?;
            return Ok(None);
        };
        let stored: StoredItem = serde_json::from_str(&raw)
            .map_err(|e| QueueError::SubmitFailed(format!("decode payload: {e}")))?;

        Ok(Some(QueueItem { id, name: stored.name, payload: stored.payload }))
    }

    async fn complete(&self, name: &str, id: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.srem::<_, _, ()>(Self::key_active(name), id).await?;
        let still_scheduled: bool = conn.hexists(Self::key_repeat(name), id).await?;
        if !still_scheduled {
            conn.del::<_, ()>(Self::key_item(name, id)).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, name: &str, id: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.srem::<_, _, ()>(Self::key_active(name), id).await?;
        conn.lpush::<_, _, ()>(Self::key_failed(name), id).await?;
        conn.ltrim::<_, ()>(Self::key_failed(name), 0, FAILED_CAP - 1).await?;
        Ok(())
    }

    async fn list_waiting(&self, name: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.lrange(Self::key_waiting(name), 0, -1).await?;
        self.hydrate(&mut conn, name, ids).await
    }

    async fn list_active(&self, name: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.smembers(Self::key_active(name)).await?;
        self.hydrate(&mut conn, name, ids).await
    }

    async fn list_delayed(&self, name: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.zrange(Self::key_delayed(name), 0, -1).await?;
        self.hydrate(&mut conn, name, ids).await
    }

    async fn list_repeating(&self, name: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.hkeys(Self::key_repeat(name)).await?;
        self.hydrate(&mut conn, name, ids).await
    }

    async fn list_failed(&self, name: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.lrange(Self::key_failed(name), 0, -1).await?;
        self.hydrate(&mut conn, name, ids).await
    }

    async fn remove_by_id(&self, name: &str, id: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.zrem::<_, _, ()>(Self::key_delayed(name), id).await?;
        conn.lrem::<_, _, ()>(Self::key_waiting(name), 0, id).await?;
        conn.hdel::<_, _, ()>(Self::key_repeat(name), id).await?;
        conn.del::<_, ()>(Self::key_item(name, id)).await?;
        Ok(())
    }

    async fn remove_repeating_by_key(&self, name: &str, key: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hdel::<_, _, ()>(Self::key_repeat(name), key).await?;
        conn.zrem::<_, _, ()>(Self::key_delayed(name), key).await?;
        Ok(())
    }

    async fn queue_status(&self, name: &str) -> Result<QueueCounts, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(QueueCounts {
            waiting: conn.llen(Self::key_waiting(name)).await?,
            active: conn.scard(Self::key_active(name)).await?,
            delayed: conn.zcard(Self::key_delayed(name)).await?,
            repeating: conn.hlen(Self::key_repeat(name)).await?,
            failed: conn.llen(Self::key_failed(name)).await?,
        })
    }

    async fn obliterate(&self, name: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let waiting: Vec<String> = conn.lrange(Self::key_waiting(name), 0, -1).await?;
        let delayed: Vec<String> = conn.zrange(Self::key_delayed(name), 0, -1).await?;
        let active: Vec<String> = conn.smembers(Self::key_active(name)).await?;
        for id in waiting.iter().chain(delayed.iter()).chain(active.iter()) {
            conn.del::<_, ()>(Self::key_item(name, id)).await?;
        }
        conn.del::<_, ()>((
            Self::key_waiting(name),
            Self::key_delayed(name),
            Self::key_active(name),
            Self::key_repeat(name),
            Self::key_failed(name),
        ))
        .await?;
        tracing::warn!(name, "queue obliterated");
        Ok(())
    }
}

impl RedisDelayQueue {
    async fn hydrate(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        name: &str,
        ids: Vec<String>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(Self::key_item(name, &id)).await?;
            let Some(raw) = raw else { continue };
            let stored: StoredItem = match serde_json::from_str(&raw) {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(name, id, error = %err, "dropping unparsable queue item");
                    continue;
                }
            };
            out.push(QueueItem { id, name: stored.name, payload: stored.payload });
        }
        Ok(out)
    }
}
