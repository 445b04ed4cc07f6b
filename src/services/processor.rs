use std::collections::HashMap;

use crate::app_state::AppState;
use crate::db::content_queries::{self, ContentUpsert};
use crate::db::profile_queries::{self, PrimaryProfileUpsert, SecondaryProfileUpsert};
use crate::services::ai::{AiError, CaptionInput, ContentTags};
use crate::services::outlier::ViewBaseline;
use crate::services::scraper::{ScrapedProfile, ScrapedReel, ScraperError};

/// Captions per categorisation request.
const CATEGORIZE_BATCH: usize = 25;

/// What a processing run wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSummary {
    pub reels_stored: usize,
    pub similar_linked: usize,
    pub reels_tagged: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Scraper error: {0}")]
    Scraper(#[from] ScraperError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// "clips" is how the platform labels reels.
fn content_type_of(reel: &ScrapedReel) -> &'static str {
    match reel.product_type.as_deref() {
        Some("clips") | Some("reel") | None => "reel",
        Some(_) => "post",
    }
}

pub fn build_profile_upsert(
    profile: &ScrapedProfile,
    username: &str,
    baseline: &ViewBaseline,
) -> PrimaryProfileUpsert {
    PrimaryProfileUpsert {
        username: username.to_string(),
        profile_name: profile.full_name.clone(),
        bio: profile.biography.clone(),
        followers: profile.followers_count,
        following: profile.follows_count,
        posts_count: profile.posts_count,
        is_verified: profile.verified,
        is_business_account: profile.is_business_account,
        profile_image_url: profile.profile_pic_url.clone(),
        account_type: profile.business_category_name.clone(),
        total_reels: baseline.count as i32,
        median_views: baseline.median,
        mean_views: baseline.mean,
    }
}

/// Content rows with outlier scores against the profile's own baseline and
/// whatever tags the AI service produced.
pub fn build_content_rows(
    username: &str,
    reels: &[ScrapedReel],
    tags: &HashMap<String, ContentTags>,
    baseline: &ViewBaseline,
) -> Vec<ContentUpsert> {
    reels
        .iter()
        .map(|reel| {
            let tag = tags.get(&reel.id);
            ContentUpsert {
                content_id: reel.id.clone(),
                shortcode: reel.shortcode.clone(),
                username: username.to_string(),
                description: reel.caption.clone(),
                content_type: content_type_of(reel).to_string(),
                url: reel.url.clone(),
                thumbnail_url: reel.display_url.clone(),
                view_count: reel.video_view_count,
                like_count: reel.likes_count,
                comment_count: reel.comments_count,
                outlier_score: baseline.outlier_score(reel.video_view_count),
                primary_category: tag.and_then(|t| t.primary_category.clone()),
                secondary_category: tag.and_then(|t| t.secondary_category.clone()),
                tertiary_category: tag.and_then(|t| t.tertiary_category.clone()),
                keywords: tag.map(|t| t.keywords.clone()).unwrap_or_default(),
                date_posted: reel.timestamp,
            }
        })
        .collect()
}

/// Tag captions in batches. A failed batch leaves its reels untagged.
async fn tag_reels(
    state: &AppState,
    username: &str,
    reels: &[ScrapedReel],
) -> HashMap<String, ContentTags> {
    let mut tags = HashMap::new();

    let captioned: Vec<CaptionInput<'_>> = reels
        .iter()
        .filter_map(|r| {
            r.caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(|caption| CaptionInput {
                    content_id: &r.id,
                    caption,
                })
        })
        .collect();

    for batch in captioned.chunks(CATEGORIZE_BATCH) {
        match state.ai.categorize(batch).await {
            Ok(items) => {
                for item in items {
                    tags.insert(item.content_id.clone(), item);
                }
            }
            Err(e) => {
                tracing::warn!(
                    username,
                    error = %e,
                    batch = batch.len(),
                    "Categorisation failed, storing reels untagged"
                );
            }
        }
    }

    tags
}

/// Scrape, score, tag and store one profile, then discover similar accounts.
pub async fn process_profile(
    state: &AppState,
    username: &str,
) -> Result<ProcessSummary, ProcessError> {
    let settings = &state.settings;

    tracing::debug!(username, "Fetching profile");
    let profile = state.scraper.fetch_profile(username).await?;

    tracing::debug!(username, limit = settings.reels_per_profile, "Fetching reels");
    let reels = state
        .scraper
        .fetch_reels(username, settings.reels_per_profile)
        .await?;

    let views: Vec<i64> = reels.iter().map(|r| r.video_view_count).collect();
    let baseline = ViewBaseline::from_views(&views);

    let tags = tag_reels(state, username, &reels).await;
    let rows = build_content_rows(username, &reels, &tags, &baseline);

    let similar = match state
        .scraper
        .fetch_similar(username, settings.similar_profiles_limit)
        .await
    {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(username, error = %e, "Similar profile lookup failed");
            Vec::new()
        }
    };
    let similar: Vec<SecondaryProfileUpsert> = similar
        .into_iter()
        .filter_map(|p| {
            let candidate = crate::models::profile::normalize_username(&p.username).ok()?;
            Some(SecondaryProfileUpsert {
                username: candidate,
                full_name: p.full_name,
                biography: p.biography,
                followers_count: p.followers_count,
                is_verified: p.verified,
                profile_pic_url: p.profile_pic_url,
            })
        })
        .collect();

    let mut tx = state.db.begin().await?;
    let upsert = build_profile_upsert(&profile, username, &baseline);
    profile_queries::upsert_primary_profile(&mut tx, &upsert).await?;
    for row in &rows {
        content_queries::upsert_content(&mut tx, row).await?;
    }
    let similar_linked =
        profile_queries::replace_similar_profiles(&mut tx, username, &similar).await?;
    tx.commit().await?;

    let summary = ProcessSummary {
        reels_stored: rows.len(),
        similar_linked,
        reels_tagged: tags.len(),
    };

    tracing::info!(
        username,
        reels = summary.reels_stored,
        tagged = summary.reels_tagged,
        similar = summary.similar_linked,
        mean_views = baseline.mean,
        "Profile stored"
    );

    Ok(summary)
}
