use serde::Deserialize;

/// Where per-session "seen" sets live.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job dispatch and session state
    pub redis_url: String,

    /// Session store for randomized listings
    #[serde(default)]
    pub session_backend: SessionBackend,

    /// Lifetime of a randomized-listing session, refreshed on each page
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Base URL of the profile scraping service
    pub scraper_base_url: String,

    /// Bearer token for the scraping service
    pub scraper_api_token: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,

    pub ai_api_token: String,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// Reels fetched per processed profile
    #[serde(default = "default_reels_per_profile")]
    pub reels_per_profile: u32,

    /// Similar accounts fetched per processed profile
    #[serde(default = "default_similar_profiles_limit")]
    pub similar_profiles_limit: u32,

    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Attempts before a queue row is marked FAILED
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Seconds a PROCESSING row may go untouched before the worker releases it
    #[serde(default = "default_processing_lease_secs")]
    pub processing_lease_secs: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reels_per_profile() -> u32 {
    100
}

fn default_similar_profiles_limit() -> u32 {
    20
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> i32 {
    3
}

fn default_processing_lease_secs() -> i64 {
    900
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
