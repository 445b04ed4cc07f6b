use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::profile_queries;
use crate::error::ApiError;
use crate::models::api::ApiResponse;
use crate::models::content::{ContentFilter, ContentQuery};
use crate::models::profile::{normalize_username, ProfileView, SimilarProfile};
use crate::models::queue::{Admission, ProfileStatus};
use crate::routes::content::{fetch_page, ReelsPage};
use crate::services::admission;

#[derive(Debug, Deserialize, Validate)]
pub struct SimilarQuery {
    #[garde(range(min = 1, max = 50))]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestQuery {
    #[garde(length(min = 1, max = 50), ascii)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimilarProfiles {
    pub username: String,
    pub similar: Vec<SimilarProfile>,
}

/// GET /api/profile/{username}: primary profile, else secondary stub.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ProfileView>>, ApiError> {
    let username = normalize_username(&username)?;

    if let Some(profile) = profile_queries::get_primary_profile(&state.db, &username).await? {
        return Ok(Json(ApiResponse::ok(ProfileView::Primary(profile))));
    }
    if let Some(profile) = profile_queries::get_secondary_profile(&state.db, &username).await? {
        return Ok(Json(ApiResponse::with_message(
            ProfileView::Secondary(profile),
            "Profile discovered but not yet processed",
        )));
    }

    Err(ApiError::NotFound(format!("Profile {username} not found")))
}

/// GET /api/profile/{username}/reels: a processed profile's content.
pub async fn profile_reels(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ApiResponse<ReelsPage>>, ApiError> {
    let username = normalize_username(&username)?;
    let mut filter = ContentFilter::from_query(&query)?;
    filter.username = Some(username.clone());

    if !profile_queries::primary_profile_exists(&state.db, &username).await? {
        return Err(ApiError::NotFound(format!("Profile {username} not found")));
    }

    let page = fetch_page(&state, &filter, query.session_id.as_deref()).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/profile/{username}/similar: linked secondary profiles by rank.
pub async fn similar_profiles(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<SimilarQuery>,
) -> Result<Json<ApiResponse<SimilarProfiles>>, ApiError> {
    let username = normalize_username(&username)?;
    query.validate()?;

    if !profile_queries::primary_profile_exists(&state.db, &username).await? {
        return Err(ApiError::NotFound(format!("Profile {username} not found")));
    }

    let similar =
        profile_queries::list_similar_profiles(&state.db, &username, query.limit.unwrap_or(20))
            .await?;

    Ok(Json(ApiResponse::ok(SimilarProfiles { username, similar })))
}

/// POST /api/profile/{username}/request: admit a profile for processing.
pub async fn request_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<RequestQuery>,
) -> Result<Json<ApiResponse<Admission>>, ApiError> {
    let username = normalize_username(&username)?;
    query.validate()?;
    let source = query.source.as_deref().unwrap_or("api");

    let admission = admission::request_profile(&state.db, &state.queue, &username, source).await?;
    metrics::counter!("profile_requests_total").increment(1);

    let message = admission.message();
    Ok(Json(ApiResponse::with_message(admission, message)))
}

/// GET /api/profile/{username}/status: processing status of a username.
pub async fn profile_status(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ProfileStatus>>, ApiError> {
    let username = normalize_username(&username)?;

    match admission::profile_status(&state.db, &username).await? {
        Some(status) => Ok(Json(ApiResponse::ok(status))),
        None => Err(ApiError::NotFound(format!(
            "Profile {username} has not been requested"
        ))),
    }
}
