//! Deterministic offline oracle (`AI_TEST_MODE=mock`).
//!
//! Scores by counting help-seeking cues and topic words, so a fixture run
//! produces stable, plausible output without network access.

use async_trait::async_trait;

use super::{
    DraftReply, DraftRequest, DraftingOracle, OracleError, RefinementOracle, RefinementRequest,
    ScoringOracle, ScoringRequestItem, ScoringResponseItem,
};

const HELP_CUES: &[&str] = &[
    "help", "advice", "how do i", "how to", "should i", "anyone", "struggling", "confused",
    "recommend", "?",
];

const TOPICS: &[(&str, &[&str])] = &[
    ("GRE", &["gre", "quant", "verbal"]),
    ("TOEFL", &["toefl", "ielts"]),
    ("visa", &["visa", "f-1", "f1 "]),
    ("scholarships", &["scholarship", "funding", "stipend"]),
    ("loans", &["loan"]),
    ("admits", &["admit", "admission", "sop", "lor"]),
    ("study_abroad", &["study abroad", "masters in", "ms in"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MockOracle;

fn topic_for(text: &str) -> &'static str {
    TOPICS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(label, _)| *label)
        .unwrap_or(crate::post::FALLBACK_TOPIC)
}

fn score_for(text: &str, topic: &str) -> u8 {
    let cues = HELP_CUES.iter().filter(|c| text.contains(*c)).count() as u32;
    let base: u32 = if topic == crate::post::FALLBACK_TOPIC { 10 } else { 40 };
    (base + cues * 15).min(100) as u8
}

fn action_for(score: u8) -> &'static str {
    match score {
        80..=100 => "DM",
        60..=79 => "comment",
        _ => "content",
    }
}

#[async_trait]
impl ScoringOracle for MockOracle {
    async fn score_batch(
        &self,
        items: &[ScoringRequestItem],
        _model: &str,
    ) -> Result<Vec<ScoringResponseItem>, OracleError> {
        Ok(items
            .iter()
            .map(|it| {
                let text = format!("{} {}", it.title, it.snippet).to_lowercase();
                let topic = topic_for(&text);
                let score = score_for(&text, topic);
                ScoringResponseItem {
                    id: Some(serde_json::Value::from(it.id)),
                    topic_label: Some(topic.to_string()),
                    intent_score: Some(f64::from(score)),
                    recommended_action: Some(action_for(score).to_string()),
                    suggested_response: Some(format!(
                        "Happy to share what worked for other {topic} students if useful."
                    )),
                    why_this_matters: Some(format!("{topic} question with intent {score}")),
                }
            })
            .collect())
    }
}

#[async_trait]
impl RefinementOracle for MockOracle {
    async fn suggest_keywords(
        &self,
        request: &RefinementRequest,
        _model: &str,
    ) -> Result<Vec<String>, OracleError> {
        let mut topics: Vec<&str> = request
            .high_scoring_posts
            .iter()
            .map(|p| p.topic.as_str())
            .collect();
        topics.dedup();
        Ok(topics
            .into_iter()
            .take(3)
            .map(|t| format!("{} help", t.replace('_', " ")))
            .collect())
    }
}

#[async_trait]
impl DraftingOracle for MockOracle {
    async fn draft(&self, request: &DraftRequest, _model: &str) -> Result<DraftReply, OracleError> {
        Ok(DraftReply {
            draft_message: format!(
                "Saw your post \"{}\". We help students with {} and are happy to share more if helpful.",
                request.post_title, request.topic
            ),
            reason_for_outreach: request.why_this_matters.clone(),
        })
    }
}
