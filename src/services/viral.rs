use sqlx::PgPool;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::analysis_queries::{self, RunReel, RunReelRow};
use crate::db::content_queries;
use crate::models::analysis::{
    AnalysisSection, AnalysisStatus, AnalyzedReel, ViralIdeasRequest, ViralResults,
};
use crate::models::content::ContentItem;
use crate::services::processor::ProcessError;

/// Reels taken from the requesting profile.
pub const PRIMARY_REELS: i64 = 5;

/// Reels taken from each competitor.
pub const REELS_PER_COMPETITOR: i64 = 3;

/// Link rows for the reels fed to one run, ranked within their group.
pub fn selection(primary: &[ContentItem], competitors: &[ContentItem]) -> Vec<RunReel> {
    let ranked = |items: &[ContentItem], reel_type: &'static str| -> Vec<RunReel> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| RunReel {
                content_id: item.content_id.clone(),
                reel_type,
                username: item.username.clone(),
                rank_in_selection: i as i32 + 1,
            })
            .collect()
    };

    let mut reels = ranked(primary, "primary");
    reels.extend(ranked(competitors, "competitor"));
    reels
}

/// Split joined reel rows into primary and competitor lists.
pub fn split_reels(rows: Vec<RunReelRow>) -> (Vec<AnalyzedReel>, Vec<AnalyzedReel>) {
    let mut primary = Vec::new();
    let mut competitor = Vec::new();

    for row in rows {
        let reel = AnalyzedReel {
            rank_in_selection: row.rank_in_selection,
            content: row.content,
        };
        if row.reel_type == "primary" {
            primary.push(reel);
        } else {
            competitor.push(reel);
        }
    }

    primary.sort_by_key(|r| r.rank_in_selection);
    competitor.sort_by_key(|r| r.rank_in_selection);
    (primary, competitor)
}

/// Run one analysis for a request and store it as the next run.
async fn run_analysis(state: &AppState, request: &ViralIdeasRequest) -> Result<i32, ProcessError> {
    let pool = &state.db;

    let primary =
        content_queries::top_content_for_user(pool, &request.primary_username, PRIMARY_REELS)
            .await?;
    analysis_queries::update_request_status(pool, request.id, AnalysisStatus::Processing, 25, None)
        .await?;

    let mut competitors = Vec::new();
    for competitor in &request.selected_competitors {
        competitors.extend(
            content_queries::top_content_for_user(pool, competitor, REELS_PER_COMPETITOR).await?,
        );
    }
    analysis_queries::update_request_status(pool, request.id, AnalysisStatus::Processing, 50, None)
        .await?;

    let analysis = state
        .ai
        .analyze_viral(
            &request.primary_username,
            &request.content_strategy,
            &primary,
            &competitors,
        )
        .await?;
    analysis_queries::update_request_status(pool, request.id, AnalysisStatus::Processing, 85, None)
        .await?;

    let data = serde_json::to_value(&analysis)?;
    let mut tx = pool.begin().await?;
    let run = analysis_queries::insert_run(
        &mut tx,
        request.id,
        &data,
        primary.len() as i32,
        competitors.len() as i32,
    )
    .await?;
    analysis_queries::insert_run_reels(&mut tx, run.id, &selection(&primary, &competitors)).await?;
    tx.commit().await?;

    Ok(run.analysis_run)
}

/// Fire-and-forget: mark the request processing and analyse it in the
/// background. There is no cancellation; the caller polls the results.
pub fn spawn_analysis(state: AppState, request: ViralIdeasRequest) {
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        match run_analysis(&state, &request).await {
            Ok(analysis_run) => {
                if let Err(e) = analysis_queries::update_request_status(
                    &state.db,
                    request.id,
                    AnalysisStatus::Completed,
                    100,
                    None,
                )
                .await
                {
                    tracing::error!(
                        queue_id = %request.id,
                        error = %e,
                        "Failed to mark analysis completed"
                    );
                }
                metrics::counter!("viral_analyses_completed_total").increment(1);
                tracing::info!(
                    queue_id = %request.id,
                    analysis_run,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Viral analysis completed"
                );
            }
            Err(e) => {
                tracing::error!(queue_id = %request.id, error = %e, "Viral analysis failed");
                metrics::counter!("viral_analyses_failed_total").increment(1);
                let message = e.to_string();
                if let Err(e) = analysis_queries::update_request_status(
                    &state.db,
                    request.id,
                    AnalysisStatus::Failed,
                    0,
                    Some(&message),
                )
                .await
                {
                    tracing::error!(
                        queue_id = %request.id,
                        error = %e,
                        "Failed to mark analysis failed"
                    );
                }
            }
        }
    });
}

/// Stitch the request row, its latest run and the analysed reels together.
pub async fn aggregate_results(
    pool: &PgPool,
    queue_id: Uuid,
) -> Result<Option<ViralResults>, sqlx::Error> {
    let Some(queue) = analysis_queries::get_request(pool, queue_id).await? else {
        return Ok(None);
    };

    let Some(run) = analysis_queries::latest_run(pool, queue_id).await? else {
        return Ok(Some(ViralResults {
            queue,
            analysis: None,
            primary_reels: Vec::new(),
            competitor_reels: Vec::new(),
        }));
    };

    let (primary_reels, competitor_reels) =
        split_reels(analysis_queries::run_reels(pool, run.id).await?);

    Ok(Some(ViralResults {
        queue,
        analysis: Some(AnalysisSection::from_run(&run)),
        primary_reels,
        competitor_reels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, username: &str) -> ContentItem {
        ContentItem {
            content_id: id.to_string(),
            shortcode: None,
            username: username.to_string(),
            description: None,
            content_type: "reel".to_string(),
            url: None,
            thumbnail_url: None,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            outlier_score: 0.0,
            primary_category: None,
            secondary_category: None,
            tertiary_category: None,
            keywords: Vec::new(),
            date_posted: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn selection_ranks_each_group_from_one() {
        let primary = vec![item("p1", "me"), item("p2", "me")];
        let competitors = vec![item("c1", "rival"), item("c2", "other")];

        let reels = selection(&primary, &competitors);

        assert_eq!(reels.len(), 4);
        assert_eq!((reels[0].reel_type, reels[0].rank_in_selection), ("primary", 1));
        assert_eq!((reels[1].reel_type, reels[1].rank_in_selection), ("primary", 2));
        assert_eq!((reels[2].reel_type, reels[2].rank_in_selection), ("competitor", 1));
        assert_eq!(reels[3].username, "other");
    }

    #[test]
    fn split_groups_and_orders_by_rank() {
        let row = |id: &str, reel_type: &str, rank: i32| RunReelRow {
            reel_type: reel_type.to_string(),
            rank_in_selection: rank,
            content: item(id, "u"),
        };
        let (primary, competitor) = split_reels(vec![
            row("c2", "competitor", 2),
            row("p1", "primary", 1),
            row("c1", "competitor", 1),
        ]);

        assert_eq!(primary.len(), 1);
        assert_eq!(competitor[0].content.content_id, "c1");
        assert_eq!(competitor[1].content.content_id, "c2");
    }
}
