use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::content::ContentItem;

/// Upper bound on competitors per viral analysis request.
pub const MAX_COMPETITORS: usize = 10;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TryFrom<String> for AnalysisStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A row of `viral_ideas_queue`.
#[derive(Debug, Clone, Serialize)]
pub struct ViralIdeasRequest {
    pub id: Uuid,
    pub session_id: String,
    pub primary_username: String,
    pub selected_competitors: Vec<String>,
    pub content_strategy: Value,
    pub status: AnalysisStatus,
    pub progress_percentage: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/viral-ideas/queue`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateViralIdeasRequest {
    #[garde(length(min = 1, max = 128))]
    pub session_id: String,

    #[garde(length(min = 1, max = 64))]
    pub primary_username: String,

    #[garde(length(max = MAX_COMPETITORS))]
    #[serde(default)]
    pub selected_competitors: Vec<String>,

    #[garde(skip)]
    #[serde(default)]
    pub content_strategy: Option<Value>,
}

/// A row of `viral_analysis_results`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ViralAnalysisRun {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub analysis_run: i32,
    pub analysis_data: Value,
    pub total_reels_analyzed: i32,
    pub primary_reels_count: i32,
    pub competitor_reels_count: i32,
    #[sqlx(try_from = "String")]
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
}

/// What the AI service returns for a viral analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViralAnalysis {
    #[serde(default)]
    pub hooks: Vec<Hook>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Hook {
    pub text: String,
    #[serde(default)]
    pub source_content_id: Option<String>,
    #[serde(default)]
    pub why_it_works: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Script {
    pub title: String,
    #[serde(default)]
    pub hook: Option<String>,
    pub body: String,
    #[serde(default)]
    pub call_to_action: Option<String>,
}

/// Reel of a run joined with its content row.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedReel {
    pub rank_in_selection: i32,
    #[serde(flatten)]
    pub content: ContentItem,
}

/// Analysis part of the aggregated results response.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSection {
    pub run_id: Uuid,
    pub analysis_run: i32,
    pub status: AnalysisStatus,
    pub hooks: Vec<Hook>,
    pub scripts: Vec<Script>,
    pub summary: Option<String>,
    pub patterns: Vec<String>,
    pub total_reels_analyzed: i32,
    pub primary_reels_count: i32,
    pub competitor_reels_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Body of `GET /api/viral-analysis/{queue_id}/results`.
#[derive(Debug, Clone, Serialize)]
pub struct ViralResults {
    pub queue: ViralIdeasRequest,
    pub analysis: Option<AnalysisSection>,
    pub primary_reels: Vec<AnalyzedReel>,
    pub competitor_reels: Vec<AnalyzedReel>,
}

impl AnalysisSection {
    /// Lift the stored blob into typed fields. Keys that are missing or do not
    /// have the expected shape come back empty instead of failing the request.
    pub fn from_run(run: &ViralAnalysisRun) -> Self {
        let field = |key: &str| run.analysis_data.get(key).cloned();

        let hooks = field("hooks")
            .and_then(|v| serde_json::from_value::<Vec<Hook>>(v).ok())
            .unwrap_or_default();
        let scripts = field("scripts")
            .and_then(|v| serde_json::from_value::<Vec<Script>>(v).ok())
            .unwrap_or_default();
        let patterns = field("patterns")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
            .unwrap_or_default();
        let summary = field("summary").and_then(|v| v.as_str().map(str::to_string));

        Self {
            run_id: run.id,
            analysis_run: run.analysis_run,
            status: run.status,
            hooks,
            scripts,
            summary,
            patterns,
            total_reels_analyzed: run.total_reels_analyzed,
            primary_reels_count: run.primary_reels_count,
            competitor_reels_count: run.competitor_reels_count,
            created_at: run.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_with(data: Value) -> ViralAnalysisRun {
        ViralAnalysisRun {
            id: Uuid::new_v4(),
            queue_id: Uuid::new_v4(),
            analysis_run: 2,
            analysis_data: data,
            total_reels_analyzed: 15,
            primary_reels_count: 5,
            competitor_reels_count: 10,
            status: AnalysisStatus::Completed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lifts_hooks_scripts_and_summary() {
        let run = run_with(json!({
            "hooks": [{"text": "Stop scrolling if you cook", "source_content_id": "c1"}],
            "scripts": [{"title": "5 minute pasta", "body": "Boil water..."}],
            "summary": "Short recipes outperform",
            "patterns": ["direct address"]
        }));
        let section = AnalysisSection::from_run(&run);
        assert_eq!(section.analysis_run, 2);
        assert_eq!(section.status, AnalysisStatus::Completed);
        assert_eq!(section.hooks.len(), 1);
        assert_eq!(section.hooks[0].source_content_id.as_deref(), Some("c1"));
        assert_eq!(section.scripts[0].title, "5 minute pasta");
        assert_eq!(section.summary.as_deref(), Some("Short recipes outperform"));
        assert_eq!(section.patterns, vec!["direct address"]);
    }

    #[test]
    fn tolerates_missing_and_malformed_keys() {
        let run = run_with(json!({ "hooks": "not a list", "summary": 42 }));
        let section = AnalysisSection::from_run(&run);
        assert!(section.hooks.is_empty());
        assert!(section.scripts.is_empty());
        assert!(section.summary.is_none());
        assert_eq!(section.total_reels_analyzed, 15);
    }

    #[test]
    fn run_status_decodes_from_column_text() {
        assert_eq!(
            AnalysisStatus::try_from("completed".to_string()).unwrap(),
            AnalysisStatus::Completed
        );
        assert!(AnalysisStatus::try_from("done".to_string()).is_err());
    }

    #[test]
    fn create_request_limits_competitors() {
        let body = CreateViralIdeasRequest {
            session_id: "s".to_string(),
            primary_username: "chef".to_string(),
            selected_competitors: (0..=MAX_COMPETITORS).map(|i| format!("c{i}")).collect(),
            content_strategy: None,
        };
        assert!(body.validate().is_err());
    }
}
