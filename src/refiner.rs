//! Keyword refiner: asks the refinement oracle for fresh search terms based
//! on what scored well. A failure here only means "no new keywords".

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::oracle::{PostSummary, RefinementOracle, RefinementRequest};
use crate::post::{truncate_chars, Post};
use crate::retry::RetryPolicy;

/// Posts summarized for the oracle.
pub const MAX_SUMMARIES: usize = 10;
pub const TITLE_PREFIX_CHARS: usize = 100;

pub struct KeywordRefiner {
    oracle: Arc<dyn RefinementOracle>,
    retry: RetryPolicy,
}

impl KeywordRefiner {
    pub fn new(oracle: Arc<dyn RefinementOracle>) -> Self {
        Self {
            oracle,
            retry: RetryPolicy::single_shot(),
        }
    }

    /// `high_scoring` is expected best-first; only the first ten are sent.
    /// The result never contains one of `original_keywords`
    /// (case-insensitive), an empty string, or a repeated term.
    pub async fn refine(
        &self,
        original_keywords: &[String],
        high_scoring: &[Post],
        model: &str,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let request = RefinementRequest {
            original_keywords: original_keywords.to_vec(),
            high_scoring_posts: summarize(high_scoring),
        };

        let candidates = match self
            .retry
            .run("keyword refinement", cancel, |_| {
                self.oracle.suggest_keywords(&request, model)
            })
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "refiner", error = %e, "keyword refinement failed");
                counter!("listening_refinement_failures_total").increment(1);
                return Vec::new();
            }
        };

        let refined = filter_candidates(original_keywords, candidates);
        info!(target: "refiner", keywords = ?refined, "refined keywords");
        refined
    }
}

fn summarize(posts: &[Post]) -> Vec<PostSummary> {
    posts
        .iter()
        .filter_map(|p| p.scoring().map(|s| (p, s)))
        .take(MAX_SUMMARIES)
        .map(|(p, s)| PostSummary {
            title: truncate_chars(&p.title, TITLE_PREFIX_CHARS).to_string(),
            topic: s.topic_label.clone(),
            score: s.intent_score,
        })
        .collect()
}

/// Drop originals (case-insensitive), blanks and repeats. Keeps oracle order.
pub fn filter_candidates(original: &[String], candidates: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = original.iter().map(|k| k.trim().to_lowercase()).collect();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.to_lowercase()))
        .collect()
}
