use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;

pub mod content;
pub mod health;
pub mod metrics;
pub mod profile;
pub mod queue;
pub mod viral;

/// Every JSON endpoint, bound to the shared state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/reels", get(content::list_reels))
        .route(
            "/api/reels/session/{session_id}/reset",
            post(content::reset_session),
        )
        .route("/api/filter-options", get(content::filter_options))
        .route("/api/profile/{username}", get(profile::get_profile))
        .route("/api/profile/{username}/reels", get(profile::profile_reels))
        .route(
            "/api/profile/{username}/similar",
            get(profile::similar_profiles),
        )
        .route(
            "/api/profile/{username}/request",
            post(profile::request_profile),
        )
        .route(
            "/api/profile/{username}/status",
            get(profile::profile_status),
        )
        .route("/api/queue/stats", get(queue::queue_stats))
        .route("/api/queue/{request_id}", get(queue::queue_entry))
        .route("/api/viral-ideas/queue", post(viral::create_request))
        .route("/api/viral-ideas/queue/{id}", get(viral::get_request))
        .route(
            "/api/viral-analysis/{queue_id}/start",
            post(viral::start_analysis),
        )
        .route(
            "/api/viral-analysis/{queue_id}/results",
            get(viral::get_results),
        )
        .with_state(state)
}
