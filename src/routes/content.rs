use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::content_queries;
use crate::error::ApiError;
use crate::models::api::{ApiResponse, Pagination};
use crate::models::content::{ContentFilter, ContentItem, ContentQuery, FilterOptions, SortBy};
use crate::services::session;

#[derive(Debug, Serialize)]
pub struct ReelsPage {
    pub reels: Vec<ContentItem>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionReset {
    pub session_id: String,
    pub cleared: bool,
}

/// One page in the filter's order, or a session-shuffled page for `random`.
pub(crate) async fn fetch_page(
    state: &AppState,
    filter: &ContentFilter,
    session_id: Option<&str>,
) -> Result<ReelsPage, ApiError> {
    if filter.sort_by != SortBy::Random {
        let (reels, has_more) = content_queries::list_content(&state.db, filter).await?;
        return Ok(ReelsPage {
            pagination: Pagination {
                limit: filter.limit,
                offset: filter.offset,
                returned: reels.len(),
                has_more,
            },
            reels,
            session_id: None,
        });
    }

    let session_id = session_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let seen = state.sessions.seen(&session_id).await?;
    let exclude: Vec<String> = seen.iter().cloned().collect();
    let cap = state.settings.random_candidate_cap;
    let candidates =
        content_queries::list_candidate_ids(&state.db, filter, &exclude, cap).await?;
    let capped = candidates.len() as i64 >= cap;
    let (ids, has_more) =
        session::next_random_page(&session_id, candidates, &seen, filter.limit as usize);
    let has_more = has_more || (capped && !ids.is_empty());

    state.sessions.mark_seen(&session_id, &ids).await?;
    let reels = content_queries::get_content_by_ids(&state.db, &ids).await?;

    metrics::counter!("random_pages_served_total").increment(1);
    tracing::debug!(
        session_id = %session_id,
        returned = reels.len(),
        previously_seen = seen.len(),
        has_more,
        "Served randomized page"
    );

    Ok(ReelsPage {
        pagination: Pagination {
            limit: filter.limit,
            offset: 0,
            returned: reels.len(),
            has_more,
        },
        reels,
        session_id: Some(session_id),
    })
}

/// GET /api/reels: filtered, paginated content.
pub async fn list_reels(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ApiResponse<ReelsPage>>, ApiError> {
    let filter = ContentFilter::from_query(&query)?;
    let page = fetch_page(&state, &filter, query.session_id.as_deref()).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// POST /api/reels/session/{session_id}/reset: forget what a session has seen.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionReset>>, ApiError> {
    if session_id.trim().is_empty() || session_id.len() > 128 {
        return Err(ApiError::BadRequest("Invalid session id".to_string()));
    }

    let cleared = state.sessions.reset(&session_id).await?;
    tracing::debug!(session_id = %session_id, cleared, "Session reset");

    Ok(Json(ApiResponse::with_message(
        SessionReset {
            session_id,
            cleared,
        },
        "Session reset",
    )))
}

/// GET /api/filter-options: distinct categories and content types.
pub async fn filter_options(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FilterOptions>>, ApiError> {
    let options = content_queries::filter_options(&state.db).await?;
    Ok(Json(ApiResponse::ok(options)))
}
