use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::db::parse_column;
use crate::models::analysis::{AnalysisStatus, ViralAnalysisRun, ViralIdeasRequest};
use crate::models::content::ContentItem;

const REQUEST_COLUMNS: &str = "id, session_id, primary_username, selected_competitors, \
                               content_strategy, status, progress_percentage, error_message, \
                               created_at, updated_at";

const RUN_COLUMNS: &str = "id, queue_id, analysis_run, analysis_data, total_reels_analyzed, \
                           primary_reels_count, competitor_reels_count, status, created_at";

fn request_from_row(row: &PgRow) -> Result<ViralIdeasRequest, sqlx::Error> {
    let status: String = row.try_get("status")?;

    Ok(ViralIdeasRequest {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        primary_username: row.try_get("primary_username")?,
        selected_competitors: row.try_get("selected_competitors")?,
        content_strategy: row.try_get("content_strategy")?,
        status: parse_column("status", &status)?,
        progress_percentage: row.try_get("progress_percentage")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Reel linked to an analysis run, with its content row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunReelRow {
    pub reel_type: String,
    pub rank_in_selection: i32,
    #[sqlx(flatten)]
    pub content: ContentItem,
}

/// Reel selected for a run, before insertion.
#[derive(Debug, Clone)]
pub struct RunReel {
    pub content_id: String,
    pub reel_type: &'static str,
    pub username: String,
    pub rank_in_selection: i32,
}

pub async fn create_request(
    pool: &PgPool,
    session_id: &str,
    primary_username: &str,
    competitors: &[String],
    content_strategy: &Value,
) -> Result<ViralIdeasRequest, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO viral_ideas_queue (session_id, primary_username, selected_competitors, content_strategy)
        VALUES ($1, $2, $3, $4)
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(primary_username)
    .bind(competitors)
    .bind(content_strategy)
    .fetch_one(pool)
    .await?;

    request_from_row(&row)
}

pub async fn get_request(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ViralIdeasRequest>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM viral_ideas_queue WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(request_from_row).transpose()
}

pub async fn update_request_status(
    pool: &PgPool,
    id: Uuid,
    status: AnalysisStatus,
    progress_percentage: i32,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE viral_ideas_queue
        SET status = $2, progress_percentage = $3, error_message = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_ref())
    .bind(progress_percentage)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a result row numbered one past the latest run of the same request.
pub async fn insert_run(
    tx: &mut Transaction<'_, Postgres>,
    queue_id: Uuid,
    analysis_data: &Value,
    primary_reels_count: i32,
    competitor_reels_count: i32,
) -> Result<ViralAnalysisRun, sqlx::Error> {
    // Serialize concurrent runs of the same request on the request row.
    sqlx::query("SELECT id FROM viral_ideas_queue WHERE id = $1 FOR UPDATE")
        .bind(queue_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query_as::<_, ViralAnalysisRun>(&format!(
        r#"
        INSERT INTO viral_analysis_results (
            queue_id, analysis_run, analysis_data, total_reels_analyzed,
            primary_reels_count, competitor_reels_count, status
        )
        SELECT $1, COALESCE(MAX(analysis_run), 0) + 1, $2, $3 + $4, $3, $4, 'completed'
        FROM viral_analysis_results
        WHERE queue_id = $1
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(queue_id)
    .bind(analysis_data)
    .bind(primary_reels_count)
    .bind(competitor_reels_count)
    .fetch_one(&mut **tx)
    .await
}

pub async fn insert_run_reels(
    tx: &mut Transaction<'_, Postgres>,
    analysis_id: Uuid,
    reels: &[RunReel],
) -> Result<(), sqlx::Error> {
    for reel in reels {
        sqlx::query(
            r#"
            INSERT INTO viral_analysis_reels (analysis_id, content_id, reel_type, username, rank_in_selection)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (analysis_id, content_id) DO NOTHING
            "#,
        )
        .bind(analysis_id)
        .bind(&reel.content_id)
        .bind(reel.reel_type)
        .bind(&reel.username)
        .bind(reel.rank_in_selection)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub async fn latest_run(
    pool: &PgPool,
    queue_id: Uuid,
) -> Result<Option<ViralAnalysisRun>, sqlx::Error> {
    sqlx::query_as::<_, ViralAnalysisRun>(&format!(
        r#"
        SELECT {RUN_COLUMNS}
        FROM viral_analysis_results
        WHERE queue_id = $1
        ORDER BY analysis_run DESC
        LIMIT 1
        "#
    ))
    .bind(queue_id)
    .fetch_optional(pool)
    .await
}

pub async fn run_reels(pool: &PgPool, analysis_id: Uuid) -> Result<Vec<RunReelRow>, sqlx::Error> {
    sqlx::query_as::<_, RunReelRow>(
        r#"
        SELECT r.reel_type, r.rank_in_selection,
               c.content_id, c.shortcode, c.username, c.description, c.content_type, c.url,
               c.thumbnail_url, c.view_count, c.like_count, c.comment_count, c.outlier_score,
               c.primary_category, c.secondary_category, c.tertiary_category, c.keywords,
               c.date_posted, c.created_at
        FROM viral_analysis_reels r
        JOIN content c ON c.content_id = r.content_id
        WHERE r.analysis_id = $1
        ORDER BY r.reel_type, r.rank_in_selection
        "#,
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await
}
