//! Redis queue index.

use super::RedisKeys;
use crate::error::{JobError, JobResult};
use crate::queue::{ready_score, QueueDepths, QueueIndex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::JobPriority;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Redis-backed queue index.
pub struct RedisQueueIndex {
    pool: Pool,
    keys: RedisKeys,
}

/// Processing-set value: who owns the job and since when.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProcessingEntry {
    worker_id: String,
    started_at: DateTime<Utc>,
}

/// Dead-letter member: enough to identify and explain the failure without
/// loading the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeadLetterMember {
    job_id: String,
    reason: String,
    failed_at: DateTime<Utc>,
}

/// Delayed-index member: `"<job_id>:<PRIORITY>"`. The priority travels with
/// the member so promotion can re-score without a row read.
fn delayed_member(job_id: &str, priority: JobPriority) -> String {
    format!("{}:{}", job_id, priority.as_str())
}

fn parse_delayed_member(member: &str) -> Option<(&str, JobPriority)> {
    let (job_id, priority) = member.rsplit_once(':')?;
    Some((job_id, JobPriority::parse(priority)?))
}

impl RedisQueueIndex {
    /// Create a new queue index over the given pool.
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            keys: RedisKeys::new(key_prefix),
        }
    }

    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl QueueIndex for RedisQueueIndex {
    async fn enqueue(&self, job_id: &str, priority: JobPriority) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let score = ready_score(Utc::now(), priority);

        let _: () = conn.zadd(self.keys.ready(), job_id, score).await?;

        debug!(job_id = %job_id, priority = %priority, "Enqueued job");
        Ok(())
    }

    async fn enqueue_delayed(
        &self,
        job_id: &str,
        fire_at: DateTime<Utc>,
        priority: JobPriority,
    ) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let member = delayed_member(job_id, priority);
        let score = fire_at.timestamp_millis() as f64;

        let _: () = conn.zadd(self.keys.delayed(), member, score).await?;

        debug!(job_id = %job_id, fire_at = %fire_at, "Enqueued delayed job");
        Ok(())
    }

    async fn dequeue(&self) -> JobResult<Option<String>> {
        let mut conn = self.conn().await?;

        // ZPOPMIN is the mutual exclusion: exactly one worker sees each id.
        let popped: Vec<(String, f64)> = conn.zpopmin(self.keys.ready(), 1).await?;

        Ok(popped.into_iter().next().map(|(job_id, _score)| job_id))
    }

    async fn promote_delayed(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore(self.keys.delayed(), 0i64, now_ms)
            .await?;

        let mut promoted = 0u64;

        for member in due {
            let Some((job_id, priority)) = parse_delayed_member(&member) else {
                warn!(member = %member, "Dropping malformed delayed member");
                let _: () = conn.zrem(self.keys.delayed(), &member).await?;
                continue;
            };

            // Remove first: under concurrent promoters only the executor
            // that wins the ZREM re-adds the job.
            let removed: i64 = conn.zrem(self.keys.delayed(), &member).await?;
            if removed == 0 {
                continue;
            }

            let score = ready_score(now, priority);
            let _: () = conn.zadd(self.keys.ready(), job_id, score).await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(count = promoted, "Promoted delayed jobs");
        }

        Ok(promoted)
    }

    async fn mark_processing(&self, job_id: &str, worker_id: &str) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let entry = ProcessingEntry {
            worker_id: worker_id.to_string(),
            started_at: Utc::now(),
        };

        let _: () = conn
            .hset(self.keys.processing(), job_id, serde_json::to_string(&entry)?)
            .await?;

        Ok(())
    }

    async fn mark_completed(&self, job_id: &str) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hdel(self.keys.processing(), job_id).await?;
        Ok(())
    }

    async fn requeue(&self, job_id: &str, priority: JobPriority, delay_ms: u64) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let fire_at = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
        let member = delayed_member(job_id, priority);

        let _: () = redis::pipe()
            .hdel(self.keys.processing(), job_id)
            .zadd(self.keys.delayed(), member, fire_at.timestamp_millis() as f64)
            .query_async(&mut *conn)
            .await?;

        debug!(job_id = %job_id, delay_ms = delay_ms, "Requeued job into delayed index");
        Ok(())
    }

    async fn move_to_dlq(&self, job_id: &str, reason: &str) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let failed_at = Utc::now();
        let member = DeadLetterMember {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
            failed_at,
        };

        let _: () = redis::pipe()
            .zadd(
                self.keys.deadletter(),
                serde_json::to_string(&member)?,
                failed_at.timestamp_millis() as f64,
            )
            .hdel(self.keys.processing(), job_id)
            .query_async(&mut *conn)
            .await?;

        warn!(job_id = %job_id, reason = %reason, "Moved job to dead-letter index");
        Ok(())
    }

    async fn remove_from_dlq(&self, job_id: &str) -> JobResult<u64> {
        let mut conn = self.conn().await?;

        let members: Vec<String> = conn.zrange(self.keys.deadletter(), 0, -1).await?;

        let mut removed = 0u64;
        for raw in members {
            let matches = serde_json::from_str::<DeadLetterMember>(&raw)
                .map(|m| m.job_id == job_id)
                .unwrap_or(false);

            if matches {
                let n: i64 = conn.zrem(self.keys.deadletter(), &raw).await?;
                removed += n as u64;
            }
        }

        Ok(removed)
    }

    async fn stats(&self) -> JobResult<QueueDepths> {
        let mut conn = self.conn().await?;

        let ready: u64 = conn.zcard(self.keys.ready()).await?;
        let delayed: u64 = conn.zcard(self.keys.delayed()).await?;
        let processing: u64 = conn.hlen(self.keys.processing()).await?;
        let deadletter: u64 = conn.zcard(self.keys.deadletter()).await?;

        Ok(QueueDepths {
            ready,
            delayed,
            processing,
            deadletter,
        })
    }

    async fn health_check(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisQueueIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueIndex").finish_non_exhaustive()
    }
}
