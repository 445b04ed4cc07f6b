use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest username the platform accepts.
pub const MAX_USERNAME_LEN: usize = 30;

/// Fully scraped and stored profile.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PrimaryProfile {
    pub username: String,
    pub profile_name: Option<String>,
    pub bio: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub posts_count: i64,
    pub is_verified: bool,
    pub is_business_account: bool,
    pub profile_image_url: Option<String>,
    pub account_type: Option<String>,
    pub total_reels: i32,
    pub median_views: i64,
    pub mean_views: f64,
    pub last_full_scrape: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile discovered through a similarity lookup but never processed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SecondaryProfile {
    pub username: String,
    pub full_name: Option<String>,
    pub biography: Option<String>,
    pub followers_count: i64,
    pub is_verified: bool,
    pub profile_pic_url: Option<String>,
    pub discovered_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Account listed under a primary profile's similar accounts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SimilarProfile {
    pub username: String,
    pub full_name: Option<String>,
    pub followers_count: i64,
    pub is_verified: bool,
    pub profile_pic_url: Option<String>,
    /// True once the account has its own primary profile
    pub is_processed: bool,
    pub rank: i32,
}

/// Either kind of profile, tagged for the response body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "profile_type", rename_all = "snake_case")]
pub enum ProfileView {
    Primary(PrimaryProfile),
    Secondary(SecondaryProfile),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UsernameError {
    #[error("Username must not be empty")]
    Empty,

    #[error("Username must be at most 30 characters")]
    TooLong,

    #[error("Username contains invalid character '{0}'")]
    InvalidChar(char),
}

/// Canonical form used as the key in every table: trimmed, no leading `@`,
/// lowercase, limited to letters, digits, `.` and `_`.
pub fn normalize_username(raw: &str) -> Result<String, UsernameError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let username = trimmed.to_lowercase();

    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong);
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_'))
    {
        return Err(UsernameError::InvalidChar(c));
    }

    Ok(username)
}
