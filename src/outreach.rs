//! outreach.rs: classifies final opportunities into outreach tiers and
//! drafts one message per classified post.
//!
//! The classifier and platform detection are pure. Only `dm` and `comment`
//! tiers reach the drafting oracle; `content_idea` drafts are built locally.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::oracle::{DraftRequest, DraftingOracle};
use crate::post::{
    host_is, truncate_chars, ActionType, OutreachDraft, Platform, Post, RecommendedAction, Scoring,
    Source,
};
use crate::retry::RetryPolicy;

pub const DM_MIN_SCORE: u8 = 80;
pub const COMMENT_MIN_SCORE: u8 = 70;
pub const CONTENT_IDEA_MIN_SCORE: u8 = 60;

pub const DRAFT_FAILED_MESSAGE: &str = "[Draft generation failed]";
pub const DRAFT_FAILED_REASON: &str = "Draft generation failed";

const DRAFT_SNIPPET_CHARS: usize = 300;

/// Outreach tier for a scored post, if any.
///
/// | condition                     | tier           |
/// |-------------------------------|----------------|
/// | score ≥ 80 and action DM      | `dm`           |
/// | score ≥ 70 and action comment | `comment`      |
/// | score ≥ 60 and action content | `content_idea` |
pub fn classify(intent_score: u8, action: RecommendedAction) -> Option<ActionType> {
    match action {
        RecommendedAction::Dm if intent_score >= DM_MIN_SCORE => Some(ActionType::Dm),
        RecommendedAction::Comment if intent_score >= COMMENT_MIN_SCORE => {
            Some(ActionType::Comment)
        }
        RecommendedAction::Content if intent_score >= CONTENT_IDEA_MIN_SCORE => {
            Some(ActionType::ContentIdea)
        }
        _ => None,
    }
}

/// Forum beats microblog beats Q&A; anything else is plain web.
/// A typed `source` is trusted first, then the URL host.
pub fn detect_platform(source: Source, url: &str) -> Platform {
    if source == Source::Forum || host_is(url, "reddit.com") {
        Platform::Forum
    } else if source == Source::Microblog || host_is(url, "twitter.com") || host_is(url, "x.com")
    {
        Platform::Microblog
    } else if source == Source::QaSite || host_is(url, "quora.com") {
        Platform::QaSite
    } else {
        Platform::Web
    }
}

fn content_idea_draft(post: &Post, scoring: &Scoring, platform: Platform) -> OutreachDraft {
    OutreachDraft {
        platform,
        url: post.url.clone(),
        post_title: post.title.clone(),
        action_type: ActionType::ContentIdea,
        draft_message: String::new(),
        intent_score: scoring.intent_score,
        reason_for_outreach: format!("Content idea: {}", scoring.why_this_matters),
    }
}

pub struct OutreachDrafter {
    oracle: Arc<dyn DraftingOracle>,
    retry: RetryPolicy,
    pause: Duration,
}

impl OutreachDrafter {
    pub fn new(oracle: Arc<dyn DraftingOracle>) -> Self {
        Self {
            oracle,
            retry: RetryPolicy::drafting(),
            pause: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// One draft per classified post, in input order. Unscored or
    /// unclassified posts are skipped.
    pub async fn draft_all(
        &self,
        posts: &[Post],
        model: &str,
        cancel: &CancellationToken,
    ) -> Vec<OutreachDraft> {
        let mut drafts = Vec::new();
        let mut oracle_calls = 0usize;

        for post in posts {
            let Some(scoring) = post.scoring() else {
                continue;
            };
            let Some(action) = classify(scoring.intent_score, scoring.recommended_action) else {
                continue;
            };
            let platform = detect_platform(post.source, &post.url);
            debug!(
                target: "outreach",
                score = scoring.intent_score,
                action = %action,
                %platform,
                title = truncate_chars(&post.title, 50),
                "outreach decision"
            );

            let draft = match action {
                ActionType::ContentIdea => content_idea_draft(post, scoring, platform),
                ActionType::Dm | ActionType::Comment => {
                    if oracle_calls > 0 && !self.pause.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(self.pause) => {}
                        }
                    }
                    oracle_calls += 1;
                    self.draft_one(post, scoring, action, platform, model, cancel)
                        .await
                }
            };
            counter!("listening_drafts_total", "action" => action.as_str()).increment(1);
            drafts.push(draft);
        }

        info!(target: "outreach", drafts = drafts.len(), oracle_calls, "outreach drafting finished");
        drafts
    }

    async fn draft_one(
        &self,
        post: &Post,
        scoring: &Scoring,
        action: ActionType,
        platform: Platform,
        model: &str,
        cancel: &CancellationToken,
    ) -> OutreachDraft {
        let request = DraftRequest {
            action_type: action.as_str().to_string(),
            platform: platform.as_str().to_string(),
            post_title: post.title.clone(),
            post_snippet: truncate_chars(&post.snippet, DRAFT_SNIPPET_CHARS).to_string(),
            topic: scoring.topic_label.clone(),
            intent_score: scoring.intent_score,
            why_this_matters: scoring.why_this_matters.clone(),
        };

        let (draft_message, reason_for_outreach) = match self
            .retry
            .run("outreach draft", cancel, |_| self.oracle.draft(&request, model))
            .await
        {
            Ok(reply) => (reply.draft_message, reply.reason_for_outreach),
            Err(e) => {
                warn!(target: "outreach", url = %post.url, error = %e, "draft generation failed");
                (
                    DRAFT_FAILED_MESSAGE.to_string(),
                    DRAFT_FAILED_REASON.to_string(),
                )
            }
        };

        OutreachDraft {
            platform,
            url: post.url.clone(),
            post_title: post.title.clone(),
            action_type: action,
            draft_message,
            intent_score: scoring.intent_score,
            reason_for_outreach,
        }
    }
}
