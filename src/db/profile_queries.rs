use sqlx::{PgPool, Postgres, Transaction};

use crate::models::profile::{PrimaryProfile, SecondaryProfile, SimilarProfile};

const PRIMARY_COLUMNS: &str = "username, profile_name, bio, followers, following, posts_count, \
                               is_verified, is_business_account, profile_image_url, account_type, \
                               total_reels, median_views, mean_views, last_full_scrape, \
                               created_at, updated_at";

/// Scraped profile fields written by the processor.
#[derive(Debug, Clone, Default)]
pub struct PrimaryProfileUpsert {
    pub username: String,
    pub profile_name: Option<String>,
    pub bio: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub posts_count: i64,
    pub is_verified: bool,
    pub is_business_account: bool,
    pub profile_image_url: Option<String>,
    pub account_type: Option<String>,
    pub total_reels: i32,
    pub median_views: i64,
    pub mean_views: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SecondaryProfileUpsert {
    pub username: String,
    pub full_name: Option<String>,
    pub biography: Option<String>,
    pub followers_count: i64,
    pub is_verified: bool,
    pub profile_pic_url: Option<String>,
}

pub async fn primary_profile_exists(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM primary_profiles WHERE username = $1)",
    )
    .bind(username)
    .fetch_one(pool)
    .await
}

pub async fn get_primary_profile(
    pool: &PgPool,
    username: &str,
) -> Result<Option<PrimaryProfile>, sqlx::Error> {
    sqlx::query_as::<_, PrimaryProfile>(&format!(
        "SELECT {PRIMARY_COLUMNS} FROM primary_profiles WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn get_secondary_profile(
    pool: &PgPool,
    username: &str,
) -> Result<Option<SecondaryProfile>, sqlx::Error> {
    sqlx::query_as::<_, SecondaryProfile>(
        r#"
        SELECT username, full_name, biography, followers_count, is_verified,
               profile_pic_url, discovered_by, created_at
        FROM secondary_profiles
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Similar accounts linked to a primary profile, best rank first. A linked
/// account that has since been processed is read from `primary_profiles`.
pub async fn list_similar_profiles(
    pool: &PgPool,
    primary_username: &str,
    limit: i64,
) -> Result<Vec<SimilarProfile>, sqlx::Error> {
    sqlx::query_as::<_, SimilarProfile>(
        r#"
        SELECT sp.similar_username AS username,
               COALESCE(p.profile_name, s.full_name) AS full_name,
               COALESCE(p.followers, s.followers_count, 0) AS followers_count,
               COALESCE(p.is_verified, s.is_verified, FALSE) AS is_verified,
               COALESCE(p.profile_image_url, s.profile_pic_url) AS profile_pic_url,
               (p.username IS NOT NULL) AS is_processed,
               sp.rank
        FROM similar_profiles sp
        LEFT JOIN primary_profiles p ON p.username = sp.similar_username
        LEFT JOIN secondary_profiles s ON s.username = sp.similar_username
        WHERE sp.primary_username = $1
          AND (p.username IS NOT NULL OR s.username IS NOT NULL)
        ORDER BY sp.rank ASC
        LIMIT $2
        "#,
    )
    .bind(primary_username)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Insert or refresh a primary profile and stamp the full scrape time
pub async fn upsert_primary_profile(
    tx: &mut Transaction<'_, Postgres>,
    profile: &PrimaryProfileUpsert,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO primary_profiles (
            username, profile_name, bio, followers, following, posts_count,
            is_verified, is_business_account, profile_image_url, account_type,
            total_reels, median_views, mean_views, last_full_scrape
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
        ON CONFLICT (username) DO UPDATE SET
            profile_name = EXCLUDED.profile_name,
            bio = EXCLUDED.bio,
            followers = EXCLUDED.followers,
            following = EXCLUDED.following,
            posts_count = EXCLUDED.posts_count,
            is_verified = EXCLUDED.is_verified,
            is_business_account = EXCLUDED.is_business_account,
            profile_image_url = EXCLUDED.profile_image_url,
            account_type = EXCLUDED.account_type,
            total_reels = EXCLUDED.total_reels,
            median_views = EXCLUDED.median_views,
            mean_views = EXCLUDED.mean_views,
            last_full_scrape = NOW()
        "#,
    )
    .bind(&profile.username)
    .bind(&profile.profile_name)
    .bind(&profile.bio)
    .bind(profile.followers)
    .bind(profile.following)
    .bind(profile.posts_count)
    .bind(profile.is_verified)
    .bind(profile.is_business_account)
    .bind(&profile.profile_image_url)
    .bind(&profile.account_type)
    .bind(profile.total_reels)
    .bind(profile.median_views)
    .bind(profile.mean_views)
    .execute(&mut **tx)
    .await?;

    // A processed profile is no longer a stub. Links to it stay in place.
    sqlx::query("DELETE FROM secondary_profiles WHERE username = $1")
        .bind(&profile.username)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Record similar accounts for a primary profile. A stub is written only for
/// accounts that are not processed yet; every account is linked.
pub async fn replace_similar_profiles(
    tx: &mut Transaction<'_, Postgres>,
    primary_username: &str,
    similar: &[SecondaryProfileUpsert],
) -> Result<usize, sqlx::Error> {
    sqlx::query("DELETE FROM similar_profiles WHERE primary_username = $1")
        .bind(primary_username)
        .execute(&mut **tx)
        .await?;

    let mut linked = 0;
    for (rank, profile) in similar.iter().enumerate() {
        if profile.username == primary_username {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO secondary_profiles (
                username, full_name, biography, followers_count, is_verified,
                profile_pic_url, discovered_by
            )
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM primary_profiles WHERE username = $1)
            ON CONFLICT (username) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                biography = EXCLUDED.biography,
                followers_count = EXCLUDED.followers_count,
                is_verified = EXCLUDED.is_verified,
                profile_pic_url = EXCLUDED.profile_pic_url
            "#,
        )
        .bind(&profile.username)
        .bind(&profile.full_name)
        .bind(&profile.biography)
        .bind(profile.followers_count)
        .bind(profile.is_verified)
        .bind(&profile.profile_pic_url)
        .bind(primary_username)
        .execute(&mut **tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO similar_profiles (primary_username, similar_username, rank)
            VALUES ($1, $2, $3)
            ON CONFLICT (primary_username, similar_username) DO UPDATE SET rank = EXCLUDED.rank
            "#,
        )
        .bind(primary_username)
        .bind(&profile.username)
        .bind(rank as i32 + 1)
        .execute(&mut **tx)
        .await?;

        linked += result.rows_affected() as usize;
    }

    Ok(linked)
}
