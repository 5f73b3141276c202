//! OpenAI chat-completions provider backing all three oracle roles.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    DraftReply, DraftRequest, DraftingOracle, OracleError, RefinementOracle, RefinementRequest,
    ScoringOracle, ScoringRequestItem, ScoringResponseItem,
};
use crate::config::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SCORING_PROMPT: &str = "You are an intent scoring agent for an education company that helps students with GRE preparation, TOEFL preparation, study abroad counseling, university admissions, scholarships, and student visa guidance.

Analyze each social media post and determine:
1. topic_label: One of [GRE, TOEFL, study_abroad, scholarships, visa, loans, admits, general_education]
2. intent_score: 0-100 (how likely this person needs the company's services)
   - 80-100: Actively seeking help, asking specific questions, expressing frustration with prep
   - 50-79: Discussing topic, sharing experience, might benefit from guidance
   - 25-49: Tangentially related, general discussion
   - 0-24: Not relevant, spam, or already resolved
3. recommended_action: One of [comment, DM, content]
4. suggested_response: A helpful, non-salesy 2-3 line response
5. why_this_matters: 1 line explaining the opportunity

Echo each post's id. Return ONLY a valid JSON array. No markdown, no backticks.";

const REFINEMENT_PROMPT: &str = "You are a search keyword optimizer for an education company.

Given the original search keywords and a sample of posts that scored well (high intent), generate 3-5 NEW search keywords that:
1. Are variations or expansions of what worked
2. Target similar intent signals we might be missing
3. Are specific enough to find high-intent posts
4. Do NOT duplicate the original keywords

Return ONLY a JSON array of strings. No markdown, no backticks.";

const DRAFTING_PROMPT: &str = "You are an outreach copywriter for an education company helping students with GRE/TOEFL prep, study abroad counseling, university admissions, scholarships, and visa guidance.

Write a personalized outreach message based on the post details provided. Rules:
- Be genuinely helpful, not salesy
- Reference specific details from the post to show you read it
- Keep it concise (2-4 sentences for DMs, 1-3 sentences for comments)
- forum: casual, community-friendly tone; microblog: concise and conversational; qa-site: authoritative, answer-style
- End with a soft call to action
- Do NOT use corporate jargon or hard sells

Return ONLY a JSON object with keys \"draft_message\" and \"reason_for_outreach\". No markdown, no backticks.";

/// Per-role call settings.
#[derive(Debug, Clone, Copy)]
struct CallSpec {
    temperature: f32,
    timeout: Duration,
}

const SCORING_CALL: CallSpec = CallSpec {
    temperature: 0.3,
    timeout: Duration::from_secs(60),
};
const REFINEMENT_CALL: CallSpec = CallSpec {
    temperature: 0.7,
    timeout: Duration::from_secs(30),
};
const DRAFTING_CALL: CallSpec = CallSpec {
    temperature: 0.7,
    timeout: Duration::from_secs(30),
};

pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent("social-listening-agent/0.1")
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    async fn chat(
        &self,
        model: &str,
        system: &str,
        user: &str,
        spec: CallSpec,
    ) -> Result<String, OracleError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let req = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: spec.temperature,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(spec.timeout)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Transport(format!(
                "HTTP {status}: {}",
                crate::post::truncate_chars(&body, 200)
            )));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| OracleError::Parse(format!("chat envelope: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Parse("empty completion".to_string()))
    }
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse JSON out of a completion, tolerating code fences.
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    Ok(serde_json::from_str(strip_code_fences(raw))?)
}

#[async_trait]
impl ScoringOracle for OpenAiOracle {
    async fn score_batch(
        &self,
        items: &[ScoringRequestItem],
        model: &str,
    ) -> Result<Vec<ScoringResponseItem>, OracleError> {
        let user = format!("Analyze these posts:\n{}", serde_json::to_string(items)?);
        let raw = self.chat(model, SCORING_PROMPT, &user, SCORING_CALL).await?;
        parse_payload(&raw)
    }
}

#[async_trait]
impl RefinementOracle for OpenAiOracle {
    async fn suggest_keywords(
        &self,
        request: &RefinementRequest,
        model: &str,
    ) -> Result<Vec<String>, OracleError> {
        let user = serde_json::to_string(request)?;
        let raw = self
            .chat(model, REFINEMENT_PROMPT, &user, REFINEMENT_CALL)
            .await?;
        parse_payload(&raw)
    }
}

#[async_trait]
impl DraftingOracle for OpenAiOracle {
    async fn draft(&self, request: &DraftRequest, model: &str) -> Result<DraftReply, OracleError> {
        let user = serde_json::to_string(request)?;
        let raw = self
            .chat(model, DRAFTING_PROMPT, &user, DRAFTING_CALL)
            .await?;
        parse_payload(&raw)
    }
}
