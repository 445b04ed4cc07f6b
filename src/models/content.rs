use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub const DEFAULT_PAGE_SIZE: i64 = 24;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A scraped reel or post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentItem {
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
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortBy {
    /// Highest outlier score first.
    #[default]
    Popular,
    Views,
    Likes,
    Comments,
    Recent,
    Oldest,
    Random,
}

impl SortBy {
    /// ORDER BY clause. Random ordering is not done in SQL.
    pub fn order_clause(self) -> &'static str {
        match self {
            SortBy::Popular => "outlier_score DESC, view_count DESC, content_id ASC",
            SortBy::Views => "view_count DESC, content_id ASC",
            SortBy::Likes => "like_count DESC, content_id ASC",
            SortBy::Comments => "comment_count DESC, content_id ASC",
            SortBy::Recent => "date_posted DESC NULLS LAST, content_id ASC",
            SortBy::Oldest => "date_posted ASC NULLS LAST, content_id ASC",
            SortBy::Random => "content_id ASC",
        }
    }
}

/// Raw query string of the content listing endpoints.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ContentQuery {
    #[garde(length(max = 500))]
    pub category: Option<String>,

    #[garde(length(min = 1, max = 20))]
    pub content_type: Option<String>,

    #[garde(length(max = 500))]
    pub keywords: Option<String>,

    #[garde(length(max = 200))]
    pub search: Option<String>,

    #[garde(length(min = 1, max = 64))]
    pub username: Option<String>,

    #[garde(range(min = 0))]
    pub min_views: Option<i64>,
    #[garde(range(min = 0))]
    pub max_views: Option<i64>,

    #[garde(range(min = 0))]
    pub min_likes: Option<i64>,
    #[garde(range(min = 0))]
    pub max_likes: Option<i64>,

    #[garde(range(min = 0.0))]
    pub min_outlier_score: Option<f64>,
    #[garde(range(min = 0.0))]
    pub max_outlier_score: Option<f64>,

    #[garde(length(min = 1, max = 20))]
    pub sort_by: Option<String>,

    #[garde(range(min = 1, max = MAX_PAGE_SIZE))]
    pub limit: Option<i64>,

    #[garde(range(min = 0))]
    pub offset: Option<i64>,

    #[garde(length(min = 1, max = 128))]
    pub session_id: Option<String>,
}

/// Inclusive range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Range<T> {
    fn new(min: Option<T>, max: Option<T>) -> Option<Self> {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => None,
            _ => Some(Self { min, max }),
        }
    }
}

/// Parsed, validated filter ready for the query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFilter {
    pub categories: Vec<String>,
    pub content_type: Option<String>,
    pub keywords: Vec<String>,
    pub search: Option<String>,
    pub username: Option<String>,
    pub views: Range<i64>,
    pub likes: Range<i64>,
    pub outlier_score: Range<f64>,
    pub sort_by: SortBy,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("{0}")]
    Invalid(String),

    #[error("min_{0} must not be greater than max_{0}")]
    InvertedRange(&'static str),

    #[error("Unknown sort_by value '{0}'")]
    UnknownSort(String),
}

/// Comma-separated list, trimmed, empties dropped, deduplicated in order.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in raw.unwrap_or_default().split(',') {
        let item = item.trim();
        if !item.is_empty() && !items.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
            items.push(item.to_string());
        }
    }
    items
}

impl ContentFilter {
    pub fn from_query(query: &ContentQuery) -> Result<Self, FilterError> {
        query
            .validate()
            .map_err(|report| FilterError::Invalid(report.to_string()))?;

        let sort_by = match query.sort_by.as_deref() {
            None => SortBy::default(),
            Some(raw) => raw
                .parse::<SortBy>()
                .map_err(|_| FilterError::UnknownSort(raw.to_string()))?,
        };

        Ok(Self {
            categories: split_list(query.category.as_deref()),
            content_type: query
                .content_type
                .as_deref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            keywords: split_list(query.keywords.as_deref())
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            username: query
                .username
                .as_deref()
                .map(|u| u.trim().trim_start_matches('@').to_lowercase())
                .filter(|u| !u.is_empty()),
            views: Range::new(query.min_views, query.max_views)
                .ok_or(FilterError::InvertedRange("views"))?,
            likes: Range::new(query.min_likes, query.max_likes)
                .ok_or(FilterError::InvertedRange("likes"))?,
            outlier_score: Range::new(query.min_outlier_score, query.max_outlier_score)
                .ok_or(FilterError::InvertedRange("outlier_score"))?,
            sort_by,
            limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            offset: query.offset.unwrap_or(0),
        })
    }
}

/// Distinct values available to the filter UI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub content_types: Vec<String>,
    pub sort_options: Vec<String>,
}
