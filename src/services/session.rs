use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SESSION_PREFIX: &str = "viralspot:session";

/// Per-session record of content ids already shown in randomized listings.
///
/// Concurrent pages for one session are last-writer-wins.
pub enum SessionStore {
    Redis {
        client: redis::Client,
        ttl: Duration,
    },
    Memory {
        sessions: Mutex<HashMap<String, MemorySession>>,
        ttl: Duration,
    },
}

pub struct MemorySession {
    seen: HashSet<String>,
    expires_at: Instant,
}

fn seen_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}:{session_id}:seen")
}

impl SessionStore {
    pub fn redis(redis_url: &str, ttl: Duration) -> Result<Self, SessionError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::Redis { client, ttl })
    }

    pub fn memory(ttl: Duration) -> Self {
        Self::Memory {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Ids already served to this session. Unknown or expired sessions are empty.
    pub async fn seen(&self, session_id: &str) -> Result<HashSet<String>, SessionError> {
        match self {
            Self::Redis { client, .. } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let members: HashSet<String> = conn.smembers(seen_key(session_id)).await?;
                Ok(members)
            }
            Self::Memory { sessions, .. } => {
                let mut sessions = sessions.lock().map_err(|_| SessionError::Poisoned)?;
                let now = Instant::now();
                sessions.retain(|_, s| s.expires_at > now);
                Ok(sessions
                    .get(session_id)
                    .map(|s| s.seen.clone())
                    .unwrap_or_default())
            }
        }
    }

    /// Add ids to the session and push its expiry out by the TTL.
    pub async fn mark_seen(&self, session_id: &str, ids: &[String]) -> Result<(), SessionError> {
        if ids.is_empty() {
            return Ok(());
        }

        match self {
            Self::Redis { client, ttl } => {
                let key = seen_key(session_id);
                let mut conn = client.get_multiplexed_async_connection().await?;
                redis::pipe()
                    .atomic()
                    .sadd(&key, ids)
                    .ignore()
                    .expire(&key, ttl.as_secs() as i64)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await?;
                Ok(())
            }
            Self::Memory { sessions, ttl } => {
                let mut sessions = sessions.lock().map_err(|_| SessionError::Poisoned)?;
                let expires_at = Instant::now() + *ttl;
                let session = sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| MemorySession {
                        seen: HashSet::new(),
                        expires_at,
                    });
                session.seen.extend(ids.iter().cloned());
                session.expires_at = expires_at;
                Ok(())
            }
        }
    }

    /// Forget a session. Returns whether any state existed.
    pub async fn reset(&self, session_id: &str) -> Result<bool, SessionError> {
        match self {
            Self::Redis { client, .. } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let removed: i64 = conn.del(seen_key(session_id)).await?;
                Ok(removed > 0)
            }
            Self::Memory { sessions, .. } => {
                let mut sessions = sessions.lock().map_err(|_| SessionError::Poisoned)?;
                Ok(sessions.remove(session_id).is_some())
            }
        }
    }
}

/// Sort key of one id within a session. Stable for a given pair.
fn shuffle_key(session_id: &str, content_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content_id.as_bytes());
    hasher.finalize().into()
}

/// Deterministic shuffle keyed by session id: the same session always sees
/// the same relative order, different sessions see different orders.
pub fn session_shuffle(session_id: &str, ids: Vec<String>) -> Vec<String> {
    let mut keyed: Vec<([u8; 32], String)> = ids
        .into_iter()
        .map(|id| (shuffle_key(session_id, &id), id))
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, id)| id).collect()
}

/// Next randomized page: unseen candidates in session order, at most `limit`.
/// The second value reports whether unseen candidates remain after this page.
pub fn next_random_page(
    session_id: &str,
    candidates: Vec<String>,
    seen: &HashSet<String>,
    limit: usize,
) -> (Vec<String>, bool) {
    let unseen: Vec<String> = candidates
        .into_iter()
        .filter(|id| !seen.contains(id))
        .collect();
    let mut ordered = session_shuffle(session_id, unseen);
    let has_more = ordered.len() > limit;
    ordered.truncate(limit);
    (ordered, has_more)
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Session store lock poisoned")]
    Poisoned,
}
