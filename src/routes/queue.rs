use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::db::queue_queries;
use crate::error::ApiError;
use crate::models::api::ApiResponse;
use crate::models::queue::{QueueEntry, QueueStats};

/// GET /api/queue/stats: counts by status and priority, plus dispatch depth.
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<QueueStats>>, ApiError> {
    let mut stats = queue_queries::queue_stats(&state.db).await?;
    stats.dispatch_depth = state.queue.depth().await?;

    metrics::gauge!("queue_pending").set(stats.pending as f64);
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/queue/{request_id}: one queue row.
pub async fn queue_entry(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<QueueEntry>>, ApiError> {
    if !request_id.starts_with("req_") || request_id.len() > 64 {
        return Err(ApiError::BadRequest("Malformed request id".to_string()));
    }

    queue_queries::get_by_request_id(&state.db, &request_id)
        .await?
        .map(|entry| Json(ApiResponse::ok(entry)))
        .ok_or_else(|| ApiError::NotFound(format!("Queue request {request_id} not found")))
}
