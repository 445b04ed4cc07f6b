use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Priority of a profile-processing job. HIGH is served first.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Dispatch order, in the order workers drain the lists.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// 0 is the most urgent.
    pub fn rank(self) -> i32 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Status of a row in the `queue` table.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// PENDING and PROCESSING rows block a new admission for the same username.
    pub fn is_active(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Processing)
    }
}

/// A scrape-and-analyze job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub username: String,
    pub source: String,
    pub priority: Priority,
    pub status: QueueStatus,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a profile request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Admission {
    /// A primary profile already exists; nothing was queued.
    AlreadyProcessed { username: String },
    /// An active row already covers this username.
    AlreadyQueued {
        username: String,
        request_id: String,
        status: QueueStatus,
        priority: Priority,
        estimated_position: i64,
    },
    /// A new HIGH priority row was inserted.
    Queued {
        username: String,
        request_id: String,
        priority: Priority,
        estimated_position: i64,
    },
}

impl Admission {
    pub fn message(&self) -> String {
        match self {
            Admission::AlreadyProcessed { username } => {
                format!("Profile {username} has already been processed")
            }
            Admission::AlreadyQueued {
                username, status, ..
            } => format!("Profile {username} is already in the queue ({status})"),
            Admission::Queued { username, .. } => {
                format!("Profile {username} added to the processing queue")
            }
        }
    }
}

/// Processing status reported for a username.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileStatus {
    pub username: String,
    pub status: QueueStatus,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_position: Option<i64>,
    pub attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Aggregate counters for `/api/queue/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub active_by_priority: PriorityCounts,
    pub dispatch_depth: PriorityCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriorityCounts {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl PriorityCounts {
    pub fn set(&mut self, priority: Priority, value: i64) {
        match priority {
            Priority::High => self.high = value,
            Priority::Medium => self.medium = value,
            Priority::Low => self.low = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips_database_text() {
        assert_eq!(Priority::High.as_ref(), "HIGH");
        assert_eq!("medium".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("LOW".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_rank_orders_high_first() {
        let mut all = vec![Priority::Low, Priority::High, Priority::Medium];
        all.sort_by_key(|p| p.rank());
        assert_eq!(all, Priority::ALL.to_vec());
    }

    #[test]
    fn only_pending_and_processing_are_active() {
        assert!(QueueStatus::Pending.is_active());
        assert!(QueueStatus::Processing.is_active());
        assert!(!QueueStatus::Completed.is_active());
        assert!(!QueueStatus::Failed.is_active());
        assert_eq!(QueueStatus::Processing.to_string(), "PROCESSING");
    }

    #[test]
    fn admission_serializes_with_state_tag() {
        let admission = Admission::AlreadyProcessed {
            username: "nasa".to_string(),
        };
        let value = serde_json::to_value(&admission).unwrap();
        assert_eq!(value["state"], "already_processed");
        assert!(admission.message().contains("already been processed"));
    }
}
