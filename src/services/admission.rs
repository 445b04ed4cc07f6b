use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{profile_queries, queue_queries};
use crate::models::queue::{Admission, Priority, ProfileStatus, QueueEntry, QueueStatus};
use crate::services::queue::{JobQueue, QueueError};

/// Trailing window in which a COMPLETED row without a primary profile is
/// treated as a transient inconsistency.
pub const RECENT_COMPLETION_WINDOW_MINUTES: i32 = 10;

/// Priority given to profiles requested through the API.
pub const REQUEST_PRIORITY: Priority = Priority::High;

/// What the database says about a username at request time.
#[derive(Debug, Clone, Default)]
pub struct AdmissionFacts {
    pub primary_exists: bool,
    pub active: Option<QueueEntry>,
    pub recently_completed: Option<QueueEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionStep {
    AlreadyProcessed,
    Active(Box<QueueEntry>),
    Reverify,
    Enqueue,
}

/// Decide what to do with a profile request. Earlier checks win.
pub fn evaluate(facts: &AdmissionFacts) -> AdmissionStep {
    if facts.primary_exists {
        return AdmissionStep::AlreadyProcessed;
    }
    if let Some(active) = facts.active.as_ref().filter(|e| e.status.is_active()) {
        return AdmissionStep::Active(Box::new(active.clone()));
    }
    if facts.recently_completed.is_some() {
        return AdmissionStep::Reverify;
    }
    AdmissionStep::Enqueue
}

/// Request id handed back to the client for polling.
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Admit a profile for processing, avoiding duplicate work.
///
/// The checks are not transactional: two concurrent requests for a new
/// username can both insert a row. The worker's optimistic claim and the
/// primary-profile short circuit keep that harmless.
pub async fn request_profile(
    pool: &PgPool,
    queue: &JobQueue,
    username: &str,
    source: &str,
) -> Result<Admission, AdmissionError> {
    let facts = AdmissionFacts {
        primary_exists: profile_queries::primary_profile_exists(pool, username).await?,
        active: queue_queries::find_active_entry(pool, username).await?,
        recently_completed: queue_queries::find_recent_completed(
            pool,
            username,
            RECENT_COMPLETION_WINDOW_MINUTES,
        )
        .await?,
    };

    match evaluate(&facts) {
        AdmissionStep::AlreadyProcessed => {
            return Ok(Admission::AlreadyProcessed {
                username: username.to_string(),
            })
        }
        AdmissionStep::Active(entry) => {
            let estimated_position = queue_queries::estimate_position(pool, &entry).await?;
            return Ok(Admission::AlreadyQueued {
                username: username.to_string(),
                request_id: entry.request_id,
                status: entry.status,
                priority: entry.priority,
                estimated_position,
            });
        }
        AdmissionStep::Reverify => {
            tracing::warn!(
                username,
                "Queue row completed recently but no primary profile found, re-verifying"
            );
            if profile_queries::primary_profile_exists(pool, username).await? {
                return Ok(Admission::AlreadyProcessed {
                    username: username.to_string(),
                });
            }
        }
        AdmissionStep::Enqueue => {}
    }

    let request_id = new_request_id();
    let entry =
        queue_queries::insert_entry(pool, username, source, REQUEST_PRIORITY, &request_id).await?;
    queue.enqueue(entry.id, entry.priority).await?;
    let estimated_position = queue_queries::estimate_position(pool, &entry).await?;

    metrics::counter!("profile_requests_queued_total").increment(1);
    tracing::info!(
        username,
        request_id = %entry.request_id,
        queue_id = %entry.id,
        estimated_position,
        "Profile queued for processing"
    );

    Ok(Admission::Queued {
        username: username.to_string(),
        request_id: entry.request_id,
        priority: entry.priority,
        estimated_position,
    })
}

/// Processing status of a username, or `None` if it was never requested.
pub async fn profile_status(
    pool: &PgPool,
    username: &str,
) -> Result<Option<ProfileStatus>, sqlx::Error> {
    let latest = queue_queries::latest_entry(pool, username).await?;

    if profile_queries::primary_profile_exists(pool, username).await? {
        return Ok(Some(ProfileStatus {
            username: username.to_string(),
            status: QueueStatus::Completed,
            completed: true,
            request_id: latest.as_ref().map(|e| e.request_id.clone()),
            priority: latest.as_ref().map(|e| e.priority),
            estimated_position: None,
            attempts: latest.as_ref().map(|e| e.attempts).unwrap_or(0),
            error_message: None,
        }));
    }

    let Some(entry) = latest else {
        return Ok(None);
    };

    let estimated_position = if entry.status.is_active() {
        Some(queue_queries::estimate_position(pool, &entry).await?)
    } else {
        None
    };

    Ok(Some(ProfileStatus {
        username: username.to_string(),
        status: entry.status,
        completed: false,
        request_id: Some(entry.request_id),
        priority: Some(entry.priority),
        estimated_position,
        attempts: entry.attempts,
        error_message: entry.error_message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(status: QueueStatus) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            username: "chef.anna".to_string(),
            source: "api".to_string(),
            priority: Priority::High,
            status,
            attempts: 0,
            error_message: None,
            request_id: new_request_id(),
            timestamp: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn primary_profile_short_circuits_everything() {
        let facts = AdmissionFacts {
            primary_exists: true,
            active: Some(entry(QueueStatus::Pending)),
            recently_completed: Some(entry(QueueStatus::Completed)),
        };
        assert_eq!(evaluate(&facts), AdmissionStep::AlreadyProcessed);
    }

    #[test]
    fn active_row_is_reported_not_duplicated() {
        let active = entry(QueueStatus::Processing);
        let facts = AdmissionFacts {
            active: Some(active.clone()),
            recently_completed: Some(entry(QueueStatus::Completed)),
            ..Default::default()
        };
        assert_eq!(evaluate(&facts), AdmissionStep::Active(Box::new(active)));
    }

    #[test]
    fn recent_completion_without_profile_is_reverified() {
        let facts = AdmissionFacts {
            recently_completed: Some(entry(QueueStatus::Completed)),
            ..Default::default()
        };
        assert_eq!(evaluate(&facts), AdmissionStep::Reverify);
    }

    #[test]
    fn unknown_username_is_enqueued() {
        assert_eq!(evaluate(&AdmissionFacts::default()), AdmissionStep::Enqueue);
    }

    #[test]
    fn inactive_row_in_active_slot_is_ignored() {
        let facts = AdmissionFacts {
            active: Some(entry(QueueStatus::Failed)),
            ..Default::default()
        };
        assert_eq!(evaluate(&facts), AdmissionStep::Enqueue);
    }

    #[test]
    fn request_ids_are_unique_and_prefixed() {
        let a = new_request_id();
        let b = new_request_id();
        assert!(a.starts_with("req_"));
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }
}
