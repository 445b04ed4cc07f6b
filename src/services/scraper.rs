use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Counts may be missing or `null` (photo posts carry no view count).
fn nullable_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

/// Profile metadata returned by the scraping service.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedProfile {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub followers_count: i64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub follows_count: i64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub posts_count: i64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub is_business_account: bool,
    #[serde(default)]
    pub business_category_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedReel {
    pub id: String,
    #[serde(default)]
    pub shortcode: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub video_view_count: i64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub likes_count: i64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub comments_count: i64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub product_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    items: Vec<T>,
}

/// HTTP client for the profile scraping service.
pub struct ScraperClient {
    http: Client,
    base_url: String,
    api_token: String,
}

impl ScraperClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, ScraperError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ScraperError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ScraperError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScraperError::Status(status.as_u16(), body));
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn fetch_profile(&self, username: &str) -> Result<ScrapedProfile, ScraperError> {
        self.get(&format!("/profiles/{username}"), &[]).await
    }

    /// Most recent reels of a profile, newest first.
    pub async fn fetch_reels(
        &self,
        username: &str,
        limit: u32,
    ) -> Result<Vec<ScrapedReel>, ScraperError> {
        let envelope: ListEnvelope<ScrapedReel> = self
            .get(
                &format!("/profiles/{username}/reels"),
                &[("limit", limit.to_string())],
            )
            .await?;
        Ok(envelope.items)
    }

    /// Accounts the platform suggests as related to `username`.
    pub async fn fetch_similar(
        &self,
        username: &str,
        limit: u32,
    ) -> Result<Vec<ScrapedProfile>, ScraperError> {
        let envelope: ListEnvelope<ScrapedProfile> = self
            .get(
                &format!("/profiles/{username}/related"),
                &[("limit", limit.to_string())],
            )
            .await?;
        Ok(envelope.items)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scraping service returned {0}: {1}")]
    Status(u16, String),

    #[error("Scraping service has no data for {0}")]
    NotFound(String),
}
