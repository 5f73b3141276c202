//! Intent scorer: batches new posts through the scoring oracle and attaches
//! the five scoring fields to every one of them.
//!
//! Output has the same length and order as the input. Nothing escapes this
//! boundary: a batch whose oracle calls all fail is fallback-scored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::oracle::{ScoringOracle, ScoringRequestItem, ScoringResponseItem};
use crate::post::{truncate_chars, Post, RecommendedAction, Scoring, FALLBACK_TOPIC};
use crate::retry::RetryPolicy;

pub const BATCH_SIZE: usize = 5;
/// Snippet length sent to the oracle.
pub const REQUEST_SNIPPET_CHARS: usize = 300;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "listening_scoring_batches_total",
            "Scoring batches sent to the oracle."
        );
        describe_counter!(
            "listening_scoring_fallback_total",
            "Posts that received fallback scoring."
        );
    });
}

pub struct IntentScorer {
    oracle: Arc<dyn ScoringOracle>,
    retry: RetryPolicy,
    batch_pause: Duration,
}

impl IntentScorer {
    pub fn new(oracle: Arc<dyn ScoringOracle>) -> Self {
        Self {
            oracle,
            retry: RetryPolicy::scoring(),
            batch_pause: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub async fn score(
        &self,
        posts: Vec<Post>,
        model: &str,
        cancel: &CancellationToken,
    ) -> Vec<Post> {
        ensure_metrics_described();

        let total_batches = posts.len().div_ceil(BATCH_SIZE);
        let mut scored = Vec::with_capacity(posts.len());
        let mut remaining = posts.into_iter().peekable();
        let mut batch_no = 0;

        while remaining.peek().is_some() {
            batch_no += 1;
            let batch: Vec<Post> = remaining.by_ref().take(BATCH_SIZE).collect();
            debug!(target: "scorer", batch = batch_no, total_batches, size = batch.len(), "scoring batch");
            counter!("listening_scoring_batches_total").increment(1);

            let items = request_items(&batch);
            let label = format!("scoring batch {batch_no}/{total_batches}");
            let reply = self
                .retry
                .run(&label, cancel, |_| self.oracle.score_batch(&items, model))
                .await;

            match reply {
                Ok(reply) => scored.extend(merge_batch(batch, reply)),
                Err(e) => {
                    warn!(target: "scorer", batch = batch_no, error = %e, "batch fallback-scored");
                    counter!("listening_scoring_fallback_total").increment(batch.len() as u64);
                    scored.extend(batch.into_iter().map(|p| p.scored(Scoring::fallback())));
                }
            }

            if remaining.peek().is_some() && !self.batch_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.batch_pause) => {}
                }
            }
        }

        info!(target: "scorer", posts = scored.len(), batches = total_batches, "scoring finished");
        scored
    }
}

fn request_items(batch: &[Post]) -> Vec<ScoringRequestItem> {
    batch
        .iter()
        .enumerate()
        .map(|(id, p)| ScoringRequestItem {
            id,
            source: p.source.as_str().to_string(),
            title: p.title.clone(),
            snippet: truncate_chars(&p.snippet, REQUEST_SNIPPET_CHARS).to_string(),
        })
        .collect()
}

/// Correlate reply items with batch positions: by `id` when every item
/// carries a usable one, otherwise by position.
fn correlate(reply: Vec<ScoringResponseItem>) -> HashMap<usize, ScoringResponseItem> {
    let ids: Option<Vec<usize>> = reply.iter().map(|it| it.batch_id()).collect();
    match ids {
        Some(ids) if !reply.is_empty() => {
            let mut by_id = HashMap::with_capacity(reply.len());
            for (id, item) in ids.into_iter().zip(reply) {
                by_id.entry(id).or_insert(item);
            }
            by_id
        }
        _ => reply.into_iter().enumerate().collect(),
    }
}

fn merge_batch(batch: Vec<Post>, reply: Vec<ScoringResponseItem>) -> Vec<Post> {
    let mut by_pos = correlate(reply);
    let mut missing = 0u64;
    let out = batch
        .into_iter()
        .enumerate()
        .map(|(i, post)| match by_pos.remove(&i) {
            Some(item) => post.scored(scoring_from_item(item)),
            None => {
                missing += 1;
                post.scored(Scoring::fallback())
            }
        })
        .collect();
    if missing > 0 {
        warn!(target: "scorer", missing, "oracle reply had no entry for some posts");
        counter!("listening_scoring_fallback_total").increment(missing);
    }
    out
}

/// Round and clamp a raw score into 0..=100. NaN counts as zero.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn scoring_from_item(item: ScoringResponseItem) -> Scoring {
    let topic = item
        .topic_label
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TOPIC.to_string());
    let action = item
        .recommended_action
        .as_deref()
        .map(RecommendedAction::parse_lenient)
        .unwrap_or(RecommendedAction::Content);
    Scoring::new(
        topic,
        item.intent_score.map(clamp_score).unwrap_or(0),
        action,
        item.suggested_response.unwrap_or_default(),
        item.why_this_matters.unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::Source;

    fn item(id: Option<serde_json::Value>, score: f64) -> ScoringResponseItem {
        ScoringResponseItem {
            id,
            intent_score: Some(score),
            ..Default::default()
        }
    }

    fn posts(n: usize) -> Vec<Post> {
        (0..n)
            .map(|i| Post::new(Source::Forum, format!("u{i}"), format!("t{i}"), ""))
            .collect()
    }

    #[test]
    fn clamp_rounds_and_bounds() {
        assert_eq!(clamp_score(72.6), 73);
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(180.0), 100);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn ids_reorder_reply() {
        let reply = vec![
            item(Some(serde_json::json!(1)), 40.0),
            item(Some(serde_json::json!(0)), 90.0),
        ];
        let out = merge_batch(posts(2), reply);
        assert_eq!(out[0].intent_score(), Some(90));
        assert_eq!(out[1].intent_score(), Some(40));
    }

    #[test]
    fn one_missing_id_switches_to_position() {
        let reply = vec![item(Some(serde_json::json!(1)), 40.0), item(None, 90.0)];
        let out = merge_batch(posts(2), reply);
        assert_eq!(out[0].intent_score(), Some(40));
        assert_eq!(out[1].intent_score(), Some(90));
    }

    #[test]
    fn short_reply_fallbacks_only_the_uncovered_post() {
        let out = merge_batch(posts(3), vec![item(None, 70.0), item(None, 65.0)]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].scoring(), Some(&Scoring::fallback()));
        assert_eq!(out[0].intent_score(), Some(70));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let s = scoring_from_item(ScoringResponseItem {
            recommended_action: Some("Shout".into()),
            ..Default::default()
        });
        assert_eq!(s.topic_label, FALLBACK_TOPIC);
        assert_eq!(s.intent_score, 0);
        assert_eq!(s.recommended_action, RecommendedAction::Content);
    }

    #[test]
    fn request_snippet_is_capped() {
        let p = Post::new(Source::Web, "u", "t", "x".repeat(400));
        let items = request_items(&[p]);
        assert_eq!(items[0].snippet.chars().count(), REQUEST_SNIPPET_CHARS);
        assert_eq!(items[0].id, 0);
        assert_eq!(items[0].source, "web");
    }
}
