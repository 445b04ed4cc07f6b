use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, SessionBackend};
use crate::services::{
    ai::AiClient,
    queue::JobQueue,
    scraper::ScraperClient,
    session::{SessionError, SessionStore},
};

/// Tunables shared by handlers and the worker.
#[derive(Debug, Clone)]
pub struct Settings {
    pub reels_per_profile: u32,
    pub similar_profiles_limit: u32,
    pub max_attempts: i32,
    /// Seconds before an untouched PROCESSING row is released
    pub processing_lease_secs: i64,
    /// Upper bound on ids considered for one randomized page
    pub random_candidate_cap: i64,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reels_per_profile: config.reels_per_profile,
            similar_profiles_limit: config.similar_profiles_limit,
            max_attempts: config.max_attempts,
            processing_lease_secs: config.processing_lease_secs,
            random_candidate_cap: 2000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reels_per_profile: 100,
            similar_profiles_limit: 20,
            max_attempts: 3,
            processing_lease_secs: 900,
            random_candidate_cap: 2000,
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub sessions: Arc<SessionStore>,
    pub scraper: Arc<ScraperClient>,
    pub ai: Arc<AiClient>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        queue: JobQueue,
        sessions: SessionStore,
        scraper: ScraperClient,
        ai: AiClient,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            sessions: Arc::new(sessions),
            scraper: Arc::new(scraper),
            ai: Arc::new(ai),
            settings: Arc::new(settings),
        }
    }
}

/// Session store selected by configuration.
pub fn session_store(config: &AppConfig) -> Result<SessionStore, SessionError> {
    let ttl = Duration::from_secs(config.session_ttl_secs);
    match config.session_backend {
        SessionBackend::Redis => SessionStore::redis(&config.redis_url, ttl),
        SessionBackend::Memory => Ok(SessionStore::memory(ttl)),
    }
}
