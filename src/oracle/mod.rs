//! Oracle boundary: the three language-model collaborators (scoring,
//! keyword refinement, drafting), their wire shapes, and the factory that
//! picks a concrete provider.

pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, RunConfig};

/// Failure kinds an oracle call can produce. Both `Parse` and `Transport`
/// are retryable; callers degrade to a fallback instead of propagating.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("malformed oracle output: {0}")]
    Parse(String),

    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("oracle call cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Transport(err.to_string())
    }
}

// ------------------------------------------------------------
// Wire shapes
// ------------------------------------------------------------

/// One post as sent to the scoring oracle. `snippet` is capped at 300 chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoringRequestItem {
    pub id: usize,
    pub source: String,
    pub title: String,
    pub snippet: String,
}

/// One item of the scoring oracle's reply. Everything is optional; the
/// scorer fills gaps with fallback values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoringResponseItem {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub topic_label: Option<String>,
    #[serde(default)]
    pub intent_score: Option<f64>,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default)]
    pub suggested_response: Option<String>,
    #[serde(default)]
    pub why_this_matters: Option<String>,
}

impl ScoringResponseItem {
    /// Batch-local id if the oracle echoed one as a number or numeric string.
    pub fn batch_id(&self) -> Option<usize> {
        match self.id.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Compact post summary fed to the refinement oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub title: String,
    pub topic: String,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementRequest {
    pub original_keywords: Vec<String>,
    pub high_scoring_posts: Vec<PostSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftRequest {
    pub action_type: String,
    pub platform: String,
    pub post_title: String,
    pub post_snippet: String,
    pub topic: String,
    pub intent_score: u8,
    pub why_this_matters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DraftReply {
    #[serde(default)]
    pub draft_message: String,
    #[serde(default)]
    pub reason_for_outreach: String,
}

// ------------------------------------------------------------
// Oracle traits
// ------------------------------------------------------------

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score_batch(
        &self,
        items: &[ScoringRequestItem],
        model: &str,
    ) -> Result<Vec<ScoringResponseItem>, OracleError>;
}

#[async_trait]
pub trait RefinementOracle: Send + Sync {
    async fn suggest_keywords(
        &self,
        request: &RefinementRequest,
        model: &str,
    ) -> Result<Vec<String>, OracleError>;
}

#[async_trait]
pub trait DraftingOracle: Send + Sync {
    async fn draft(&self, request: &DraftRequest, model: &str) -> Result<DraftReply, OracleError>;
}

/// The three oracles a run needs. One provider usually backs all of them.
#[derive(Clone)]
pub struct Oracles {
    pub scoring: Arc<dyn ScoringOracle>,
    pub refinement: Arc<dyn RefinementOracle>,
    pub drafting: Arc<dyn DraftingOracle>,
    pub provider: &'static str,
}

impl Oracles {
    /// Back all three roles with one provider.
    pub fn from_provider<P>(provider: P, name: &'static str) -> Self
    where
        P: ScoringOracle + RefinementOracle + DraftingOracle + 'static,
    {
        let shared = Arc::new(provider);
        Self {
            scoring: shared.clone(),
            refinement: shared.clone(),
            drafting: shared,
            provider: name,
        }
    }
}

/// Factory: pick the oracle provider from the environment.
///
/// * `AI_TEST_MODE=mock` → deterministic `MockOracle`.
/// * otherwise → OpenAI chat completions; a missing `OPENAI_API_KEY` is a
///   configuration error.
pub fn build_oracles(config: &RunConfig) -> Result<Oracles, ConfigError> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Oracles::from_provider(mock::MockOracle, "mock"));
    }

    let api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty() && !k.starts_with("your_"))
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let provider = openai::OpenAiOracle::new(api_key, config.openai_base_url.clone())?;
    Ok(Oracles::from_provider(provider, "openai"))
}
