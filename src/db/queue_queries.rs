use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::parse_column;
use crate::models::queue::{Priority, PriorityCounts, QueueEntry, QueueStats, QueueStatus};

const QUEUE_COLUMNS: &str = "id, username, source, priority, status, attempts, error_message, \
                             request_id, timestamp, created_at, updated_at";

fn entry_from_row(row: &PgRow) -> Result<QueueEntry, sqlx::Error> {
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;

    Ok(QueueEntry {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        source: row.try_get("source")?,
        priority: parse_column("priority", &priority)?,
        status: parse_column("status", &status)?,
        attempts: row.try_get("attempts")?,
        error_message: row.try_get("error_message")?,
        request_id: row.try_get("request_id")?,
        timestamp: row.try_get("timestamp")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new PENDING row
pub async fn insert_entry(
    pool: &PgPool,
    username: &str,
    source: &str,
    priority: Priority,
    request_id: &str,
) -> Result<QueueEntry, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO queue (username, source, priority, status, request_id)
        VALUES ($1, $2, $3, 'PENDING', $4)
        RETURNING {QUEUE_COLUMNS}
        "#
    ))
    .bind(username)
    .bind(source)
    .bind(priority.as_ref())
    .bind(request_id)
    .fetch_one(pool)
    .await?;

    entry_from_row(&row)
}

/// Oldest PENDING or PROCESSING row for a username
pub async fn find_active_entry(
    pool: &PgPool,
    username: &str,
) -> Result<Option<QueueEntry>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {QUEUE_COLUMNS}
        FROM queue
        WHERE username = $1 AND status IN ('PENDING', 'PROCESSING')
        ORDER BY timestamp ASC
        LIMIT 1
        "#
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Most recent COMPLETED row updated within the trailing window
pub async fn find_recent_completed(
    pool: &PgPool,
    username: &str,
    window_minutes: i32,
) -> Result<Option<QueueEntry>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {QUEUE_COLUMNS}
        FROM queue
        WHERE username = $1
          AND status = 'COMPLETED'
          AND updated_at > NOW() - ($2::int * INTERVAL '1 minute')
        ORDER BY updated_at DESC
        LIMIT 1
        "#
    ))
    .bind(username)
    .bind(window_minutes)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Most recent row of any status for a username
pub async fn latest_entry(
    pool: &PgPool,
    username: &str,
) -> Result<Option<QueueEntry>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {QUEUE_COLUMNS}
        FROM queue
        WHERE username = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

pub async fn get_by_request_id(
    pool: &PgPool,
    request_id: &str,
) -> Result<Option<QueueEntry>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {QUEUE_COLUMNS} FROM queue WHERE request_id = $1"
    ))
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Estimated 1-based position: active rows of equal or higher priority that
/// were admitted earlier, plus one.
pub async fn estimate_position(pool: &PgPool, entry: &QueueEntry) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS ahead
        FROM queue
        WHERE status IN ('PENDING', 'PROCESSING')
          AND id <> $1
          AND timestamp < $2
          AND (CASE priority WHEN 'HIGH' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END) <= $3
        "#,
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(entry.priority.rank())
    .fetch_one(pool)
    .await?;

    let ahead: i64 = row.try_get("ahead")?;
    Ok(ahead + 1)
}

/// Move a row from PENDING to PROCESSING and count the attempt.
///
/// Returns `None` when the row is gone or another worker already claimed it.
pub async fn claim_entry(pool: &PgPool, id: Uuid) -> Result<Option<QueueEntry>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE queue
        SET status = 'PROCESSING', attempts = attempts + 1
        WHERE id = $1 AND status = 'PENDING'
        RETURNING {QUEUE_COLUMNS}
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

pub async fn complete_entry(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE queue
        SET status = 'COMPLETED', error_message = NULL
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed attempt. The row goes back to PENDING until it has used
/// `max_attempts`, then it is FAILED. Returns the resulting status.
pub async fn fail_attempt(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    max_attempts: i32,
) -> Result<QueueStatus, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE queue
        SET status = CASE WHEN attempts >= $3 THEN 'FAILED' ELSE 'PENDING' END,
            error_message = $2
        WHERE id = $1
        RETURNING status
        "#,
    )
    .bind(id)
    .bind(error)
    .bind(max_attempts)
    .fetch_one(pool)
    .await?;

    let status: String = row.try_get("status")?;
    parse_column("status", &status)
}

/// Release PROCESSING rows whose worker went quiet for longer than the lease.
/// They go back to PENDING, or to FAILED once `max_attempts` is used up.
/// Returns every released row with its new status.
pub async fn release_stale_entries(
    pool: &PgPool,
    lease_secs: i64,
    max_attempts: i32,
) -> Result<Vec<QueueEntry>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        UPDATE queue
        SET status = CASE WHEN attempts >= $2 THEN 'FAILED' ELSE 'PENDING' END,
            error_message = 'Processing lease expired'
        WHERE status = 'PROCESSING'
          AND updated_at < NOW() - ($1::bigint * INTERVAL '1 second')
        RETURNING {QUEUE_COLUMNS}
        "#
    ))
    .bind(lease_secs)
    .bind(max_attempts)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// PENDING rows in dispatch order, used to refill Redis after a restart
pub async fn pending_entries(pool: &PgPool) -> Result<Vec<QueueEntry>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {QUEUE_COLUMNS}
        FROM queue
        WHERE status = 'PENDING'
        ORDER BY (CASE priority WHEN 'HIGH' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END), timestamp
        "#
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Counts by status and active counts by priority
pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
    let mut stats = QueueStats::default();

    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM queue GROUP BY status")
        .fetch_all(pool)
        .await?;
    for row in rows {
        let status: String = row.try_get("status")?;
        let n: i64 = row.try_get("n")?;
        match parse_column::<QueueStatus>("status", &status)? {
            QueueStatus::Pending => stats.pending = n,
            QueueStatus::Processing => stats.processing = n,
            QueueStatus::Completed => stats.completed = n,
            QueueStatus::Failed => stats.failed = n,
        }
    }

    let rows = sqlx::query(
        r#"
        SELECT priority, COUNT(*) AS n
        FROM queue
        WHERE status IN ('PENDING', 'PROCESSING')
        GROUP BY priority
        "#,
    )
    .fetch_all(pool)
    .await?;
    let mut by_priority = PriorityCounts::default();
    for row in rows {
        let priority: String = row.try_get("priority")?;
        by_priority.set(parse_column("priority", &priority)?, row.try_get("n")?);
    }
    stats.active_by_priority = by_priority;

    Ok(stats)
}
