use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::analysis_queries;
use crate::error::ApiError;
use crate::models::analysis::{
    AnalysisStatus, CreateViralIdeasRequest, ViralIdeasRequest, ViralResults,
};
use crate::models::api::ApiResponse;
use crate::models::profile::normalize_username;
use crate::services::viral;

/// POST /api/viral-ideas/queue: create an analysis request.
pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateViralIdeasRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ViralIdeasRequest>>), ApiError> {
    body.validate()?;

    let primary = normalize_username(&body.primary_username)?;
    let mut competitors = Vec::with_capacity(body.selected_competitors.len());
    for raw in &body.selected_competitors {
        let competitor = normalize_username(raw)?;
        if competitor != primary && !competitors.contains(&competitor) {
            competitors.push(competitor);
        }
    }
    let strategy = body.content_strategy.unwrap_or_else(|| json!({}));

    let request = analysis_queries::create_request(
        &state.db,
        body.session_id.trim(),
        &primary,
        &competitors,
        &strategy,
    )
    .await?;

    tracing::info!(
        queue_id = %request.id,
        primary = %request.primary_username,
        competitors = request.selected_competitors.len(),
        "Viral analysis requested"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(request, "Analysis request queued")),
    ))
}

/// GET /api/viral-ideas/queue/{id}: analysis request status.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ViralIdeasRequest>>, ApiError> {
    analysis_queries::get_request(&state.db, id)
        .await?
        .map(|request| Json(ApiResponse::ok(request)))
        .ok_or_else(|| ApiError::NotFound(format!("Analysis request {id} not found")))
}

/// POST /api/viral-analysis/{queue_id}/start: run the analysis in the background.
pub async fn start_analysis(
    State(state): State<AppState>,
    Path(queue_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<ViralIdeasRequest>>), ApiError> {
    let mut request = analysis_queries::get_request(&state.db, queue_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis request {queue_id} not found")))?;

    analysis_queries::update_request_status(
        &state.db,
        queue_id,
        AnalysisStatus::Processing,
        0,
        None,
    )
    .await?;
    request.status = AnalysisStatus::Processing;
    request.progress_percentage = 0;
    request.error_message = None;

    viral::spawn_analysis(state.clone(), request.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::with_message(request, "Analysis started")),
    ))
}

/// GET /api/viral-analysis/{queue_id}/results: latest run with its reels.
pub async fn get_results(
    State(state): State<AppState>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ViralResults>>, ApiError> {
    let results = viral::aggregate_results(&state.db, queue_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis request {queue_id} not found")))?;

    let message = if results.analysis.is_none() {
        Some(format!("No analysis results yet (status: {})", results.queue.status))
    } else {
        None
    };

    Ok(Json(ApiResponse {
        success: true,
        data: results,
        message,
    }))
}
