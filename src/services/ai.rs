use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::analysis::ViralAnalysis;
use crate::models::content::ContentItem;

/// Category tags assigned to one reel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentTags {
    pub content_id: String,
    #[serde(default)]
    pub primary_category: Option<String>,
    #[serde(default)]
    pub secondary_category: Option<String>,
    #[serde(default)]
    pub tertiary_category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagBatch {
    items: Vec<ContentTags>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct AiClient {
    http: Client,
    base_url: String,
    api_token: String,
    model: String,
}

/// Caption sent for categorisation.
#[derive(Debug, Clone, Serialize)]
pub struct CaptionInput<'a> {
    pub content_id: &'a str,
    pub caption: &'a str,
}

impl AiClient {
    pub fn new(base_url: &str, api_token: &str, model: &str) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(AiError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
        })
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: String,
    ) -> Result<T, AiError> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "temperature": 0.4,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::Status(status.as_u16(), text));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyCompletion)?;

        parse_json_content(&content)
    }

    /// Tag a batch of captions with up to three categories and keywords each.
    /// Captions the model skips come back untagged.
    pub async fn categorize(
        &self,
        captions: &[CaptionInput<'_>],
    ) -> Result<Vec<ContentTags>, AiError> {
        if captions.is_empty() {
            return Ok(Vec::new());
        }

        let system = concat!(
            "You classify short-form social media videos. For every item return ",
            "primary_category, secondary_category, tertiary_category (broad niches such as ",
            "Fitness, Cooking, Finance, Comedy) and up to 5 lowercase keywords. ",
            "Respond with JSON: {\"items\": [{\"content_id\", \"primary_category\", ",
            "\"secondary_category\", \"tertiary_category\", \"keywords\"}]}."
        );
        let user = serde_json::to_string(&json!({ "items": captions }))?;

        let batch: TagBatch = self.complete_json(system, user).await?;
        Ok(batch
            .items
            .into_iter()
            .map(|mut tags| {
                tags.keywords = tags
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                tags
            })
            .collect())
    }

    /// Hooks, scripts and a summary drawn from the best reels of a profile and
    /// its competitors.
    pub async fn analyze_viral(
        &self,
        primary_username: &str,
        content_strategy: &Value,
        primary_reels: &[ContentItem],
        competitor_reels: &[ContentItem],
    ) -> Result<ViralAnalysis, AiError> {
        let system = concat!(
            "You are a short-form video strategist. Study the creator's reels and the ",
            "competitor reels, then write new ideas for the creator. Respond with JSON: ",
            "{\"hooks\": [{\"text\", \"source_content_id\", \"why_it_works\"}], ",
            "\"scripts\": [{\"title\", \"hook\", \"body\", \"call_to_action\"}], ",
            "\"summary\": string, \"patterns\": [string]}."
        );

        let describe = |reels: &[ContentItem]| -> Vec<Value> {
            reels
                .iter()
                .map(|r| {
                    json!({
                        "content_id": r.content_id,
                        "username": r.username,
                        "caption": r.description,
                        "views": r.view_count,
                        "likes": r.like_count,
                        "comments": r.comment_count,
                        "outlier_score": r.outlier_score,
                    })
                })
                .collect()
        };

        let user = serde_json::to_string(&json!({
            "creator": primary_username,
            "content_strategy": content_strategy,
            "creator_reels": describe(primary_reels),
            "competitor_reels": describe(competitor_reels),
        }))?;

        self.complete_json(system, user).await
    }
}

/// Parse model output as JSON, accepting a fenced ```json block.
fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T, AiError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim()).map_err(AiError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned {0}: {1}")]
    Status(u16, String),

    #[error("AI service returned no completion")]
    EmptyCompletion,

    #[error("Failed to parse AI response as JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain: TagBatch =
            parse_json_content(r#"{"items": [{"content_id": "a", "keywords": ["gym"]}]}"#).unwrap();
        assert_eq!(plain.items[0].keywords, vec!["gym"]);

        let fenced: ViralAnalysis = parse_json_content(
            "```json\n{\"hooks\": [{\"text\": \"Nobody tells you this\"}], \"summary\": \"ok\"}\n```",
        )
        .unwrap();
        assert_eq!(fenced.hooks[0].text, "Nobody tells you this");
        assert_eq!(fenced.summary.as_deref(), Some("ok"));
        assert!(fenced.scripts.is_empty());
    }

    #[test]
    fn rejects_prose() {
        let result: Result<ViralAnalysis, _> = parse_json_content("Here are some ideas!");
        assert!(matches!(result, Err(AiError::Parse(_))));
    }
}
