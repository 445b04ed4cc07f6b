use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::models::content::{ContentFilter, ContentItem, FilterOptions, SortBy};

const CONTENT_COLUMNS: &str = "content_id, shortcode, username, description, content_type, url, \
                               thumbnail_url, view_count, like_count, comment_count, \
                               outlier_score, primary_category, secondary_category, \
                               tertiary_category, keywords, date_posted, created_at";

/// Content row produced by the processor.
#[derive(Debug, Clone, Default)]
pub struct ContentUpsert {
    pub content_id: String,
    pub shortcode: Option<String>,
    pub username: String,
    pub description: Option<String>,
    pub content_type: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub outlier_score: f64,
    pub primary_category: Option<String>,
    pub secondary_category: Option<String>,
    pub tertiary_category: Option<String>,
    pub keywords: Vec<String>,
    pub date_posted: Option<DateTime<Utc>>,
}

/// Escape LIKE metacharacters and wrap in `%` for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Append `WHERE ...` predicates for every set filter field.
pub fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ContentFilter) {
    builder.push(" WHERE TRUE");

    if !filter.categories.is_empty() {
        let categories: Vec<String> = filter.categories.iter().map(|c| c.to_lowercase()).collect();
        builder.push(" AND (LOWER(primary_category) = ANY(");
        builder.push_bind(categories.clone());
        builder.push(") OR LOWER(secondary_category) = ANY(");
        builder.push_bind(categories.clone());
        builder.push(") OR LOWER(tertiary_category) = ANY(");
        builder.push_bind(categories);
        builder.push("))");
    }

    if let Some(content_type) = &filter.content_type {
        builder.push(" AND content_type = ");
        builder.push_bind(content_type.clone());
    }

    if !filter.keywords.is_empty() {
        builder.push(" AND keywords && ");
        builder.push_bind(filter.keywords.clone());
    }

    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        builder.push(" AND (description ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR username ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(username) = &filter.username {
        builder.push(" AND username = ");
        builder.push_bind(username.clone());
    }

    if let Some(min) = filter.views.min {
        builder.push(" AND view_count >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.views.max {
        builder.push(" AND view_count <= ");
        builder.push_bind(max);
    }
    if let Some(min) = filter.likes.min {
        builder.push(" AND like_count >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.likes.max {
        builder.push(" AND like_count <= ");
        builder.push_bind(max);
    }
    if let Some(min) = filter.outlier_score.min {
        builder.push(" AND outlier_score >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.outlier_score.max {
        builder.push(" AND outlier_score <= ");
        builder.push_bind(max);
    }
}

/// Build the paged listing query. One extra row is requested so the caller
/// can tell whether another page exists.
pub fn build_list_query(filter: &ContentFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {CONTENT_COLUMNS} FROM content"));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY ");
    builder.push(filter.sort_by.order_clause());
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit + 1);
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset);
    builder
}

/// One page of content plus whether more rows follow.
pub async fn list_content(
    pool: &PgPool,
    filter: &ContentFilter,
) -> Result<(Vec<ContentItem>, bool), sqlx::Error> {
    let mut items = build_list_query(filter)
        .build_query_as::<ContentItem>()
        .fetch_all(pool)
        .await?;

    let has_more = items.len() as i64 > filter.limit;
    items.truncate(filter.limit as usize);
    Ok((items, has_more))
}

/// Candidate query for a randomized page. Ids in `exclude` are filtered out
/// before the cap so a session never runs dry while unseen matches remain.
pub fn build_candidate_query(
    filter: &ContentFilter,
    exclude: &[String],
    cap: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT content_id FROM content");
    push_filters(&mut builder, filter);
    if !exclude.is_empty() {
        builder.push(" AND NOT (content_id = ANY(");
        builder.push_bind(exclude.to_vec());
        builder.push("))");
    }
    builder.push(" ORDER BY ");
    builder.push(SortBy::Popular.order_clause());
    builder.push(" LIMIT ");
    builder.push_bind(cap);
    builder
}

/// Unseen ids matching a filter, capped, in a stable order. Feeds the session shuffle.
pub async fn list_candidate_ids(
    pool: &PgPool,
    filter: &ContentFilter,
    exclude: &[String],
    cap: i64,
) -> Result<Vec<String>, sqlx::Error> {
    build_candidate_query(filter, exclude, cap)
        .build_query_scalar::<String>()
        .fetch_all(pool)
        .await
}

/// Fetch rows by id, returned in the order of `ids`.
pub async fn get_content_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<ContentItem>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ContentItem>(&format!(
        "SELECT {CONTENT_COLUMNS} FROM content WHERE content_id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut ordered = Vec::with_capacity(rows.len());
    let mut rows = rows;
    for id in ids {
        if let Some(pos) = rows.iter().position(|row| &row.content_id == id) {
            ordered.push(rows.swap_remove(pos));
        }
    }
    Ok(ordered)
}

/// Top reels of one profile by outlier score, for viral analysis
pub async fn top_content_for_user(
    pool: &PgPool,
    username: &str,
    limit: i64,
) -> Result<Vec<ContentItem>, sqlx::Error> {
    sqlx::query_as::<_, ContentItem>(&format!(
        r#"
        SELECT {CONTENT_COLUMNS}
        FROM content
        WHERE username = $1
        ORDER BY outlier_score DESC, view_count DESC
        LIMIT $2
        "#
    ))
    .bind(username)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn filter_options(pool: &PgPool) -> Result<FilterOptions, sqlx::Error> {
    let categories = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT category FROM (
            SELECT primary_category AS category FROM content
            UNION SELECT secondary_category FROM content
            UNION SELECT tertiary_category FROM content
        ) c
        WHERE category IS NOT NULL AND category <> ''
        ORDER BY category
        "#,
    )
    .fetch_all(pool)
    .await?;

    let content_types = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT content_type FROM content ORDER BY content_type",
    )
    .fetch_all(pool)
    .await?;

    Ok(FilterOptions {
        categories,
        content_types,
        sort_options: [
            SortBy::Popular,
            SortBy::Views,
            SortBy::Likes,
            SortBy::Comments,
            SortBy::Recent,
            SortBy::Oldest,
            SortBy::Random,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    })
}

/// Insert or refresh a content row
pub async fn upsert_content(
    tx: &mut Transaction<'_, Postgres>,
    item: &ContentUpsert,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO content (
            content_id, shortcode, username, description, content_type, url,
            thumbnail_url, view_count, like_count, comment_count, outlier_score,
            primary_category, secondary_category, tertiary_category, keywords, date_posted
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (content_id) DO UPDATE SET
            description = EXCLUDED.description,
            thumbnail_url = EXCLUDED.thumbnail_url,
            view_count = EXCLUDED.view_count,
            like_count = EXCLUDED.like_count,
            comment_count = EXCLUDED.comment_count,
            outlier_score = EXCLUDED.outlier_score,
            primary_category = COALESCE(EXCLUDED.primary_category, content.primary_category),
            secondary_category = COALESCE(EXCLUDED.secondary_category, content.secondary_category),
            tertiary_category = COALESCE(EXCLUDED.tertiary_category, content.tertiary_category),
            keywords = CASE WHEN cardinality(EXCLUDED.keywords) > 0
                            THEN EXCLUDED.keywords ELSE content.keywords END
        "#,
    )
    .bind(&item.content_id)
    .bind(&item.shortcode)
    .bind(&item.username)
    .bind(&item.description)
    .bind(&item.content_type)
    .bind(&item.url)
    .bind(&item.thumbnail_url)
    .bind(item.view_count)
    .bind(item.like_count)
    .bind(item.comment_count)
    .bind(item.outlier_score)
    .bind(&item.primary_category)
    .bind(&item.secondary_category)
    .bind(&item.tertiary_category)
    .bind(&item.keywords)
    .bind(item.date_posted)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::Range;

    #[test]
    fn empty_filter_has_no_predicates() {
        let filter = ContentFilter {
            limit: 24,
            ..Default::default()
        };
        let query = build_list_query(&filter);
        let sql = query.sql();
        assert!(sql.contains("FROM content WHERE TRUE ORDER BY outlier_score DESC"));
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn every_filter_field_adds_a_bound_predicate() {
        let filter = ContentFilter {
            categories: vec!["Fitness".to_string()],
            content_type: Some("reel".to_string()),
            keywords: vec!["protein".to_string()],
            search: Some("meal".to_string()),
            username: Some("coach".to_string()),
            views: Range {
                min: Some(1000),
                max: Some(5000),
            },
            likes: Range {
                min: Some(10),
                max: None,
            },
            outlier_score: Range {
                min: None,
                max: Some(9.5),
            },
            sort_by: SortBy::Views,
            limit: 10,
            offset: 20,
        };
        let query = build_list_query(&filter);
        let sql = query.sql();

        assert!(sql.contains("LOWER(primary_category) = ANY($1)"));
        assert!(sql.contains("LOWER(tertiary_category) = ANY($3)"));
        assert!(sql.contains("content_type = $4"));
        assert!(sql.contains("keywords && $5"));
        assert!(sql.contains("description ILIKE $6 OR username ILIKE $7"));
        assert!(sql.contains("username = $8"));
        assert!(sql.contains("view_count >= $9 AND view_count <= $10"));
        assert!(sql.contains("like_count >= $11"));
        assert!(!sql.contains("like_count <="));
        assert!(sql.contains("outlier_score <= $12"));
        assert!(sql.contains("ORDER BY view_count DESC"));
        assert!(sql.ends_with("LIMIT $13 OFFSET $14"));
    }

    #[test]
    fn candidate_query_excludes_seen_ids_before_the_cap() {
        let filter = ContentFilter {
            username: Some("coach".to_string()),
            limit: 2,
            ..Default::default()
        };
        let seen = vec!["a".to_string(), "b".to_string()];
        let query = build_candidate_query(&filter, &seen, 3);
        let sql = query.sql();

        let exclusion = sql
            .find("AND NOT (content_id = ANY($2))")
            .expect("seen ids are excluded in SQL");
        let limit = sql.find("LIMIT $3").expect("cap is bound");
        assert!(exclusion < limit);
        assert!(sql.contains("username = $1"));
    }

    #[test]
    fn candidate_query_without_history_has_no_exclusion() {
        let filter = ContentFilter {
            limit: 2,
            ..Default::default()
        };
        let query = build_candidate_query(&filter, &[], 2000);
        let sql = query.sql();
        assert!(!sql.contains("NOT (content_id"));
        assert!(sql.ends_with("LIMIT $1"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }
}
