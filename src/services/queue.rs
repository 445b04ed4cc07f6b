use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::queue::{Priority, PriorityCounts};

const QUEUE_PREFIX: &str = "viralspot:queue";

fn prefixed_key(prefix: &str, priority: Priority) -> String {
    format!("{prefix}:{}", priority.as_ref().to_lowercase())
}

/// Redis list holding queue-row ids for one priority.
pub fn list_key(priority: Priority) -> String {
    prefixed_key(QUEUE_PREFIX, priority)
}

/// Id popped from a dispatch list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub queue_id: Uuid,
    pub priority: Priority,
}

/// Redis-backed dispatch lists, one per priority.
///
/// The `queue` table is the source of truth; these lists only tell workers
/// which rows to try claiming next.
pub struct JobQueue {
    client: redis::Client,
    prefix: String,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        Self::with_prefix(redis_url, QUEUE_PREFIX)
    }

    /// Dispatch lists under a different key prefix.
    pub fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, priority: Priority) -> String {
        prefixed_key(&self.prefix, priority)
    }

    /// Push a queue row id onto its priority list.
    pub async fn enqueue(&self, queue_id: Uuid, priority: Priority) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(self.key(priority), queue_id.to_string())
            .await?;
        Ok(())
    }

    /// Pop the oldest id, draining HIGH before MEDIUM before LOW.
    pub async fn dequeue(&self) -> Result<Option<Dispatched>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for priority in Priority::ALL {
            let popped: Option<String> = conn.rpop(self.key(priority), None).await?;
            if let Some(raw) = popped {
                let queue_id = Uuid::parse_str(&raw).map_err(|_| QueueError::BadPayload(raw))?;
                return Ok(Some(Dispatched { queue_id, priority }));
            }
        }

        Ok(None)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Length of every dispatch list.
    pub async fn depth(&self) -> Result<PriorityCounts, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut counts = PriorityCounts::default();
        for priority in Priority::ALL {
            let len: i64 = conn.llen(self.key(priority)).await?;
            counts.set(priority, len);
        }
        Ok(counts)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed queue id in dispatch list: {0}")]
    BadPayload(String),
}
