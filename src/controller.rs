//! Refinement loop controller.
//!
//! Explicit four-state machine: `Searching → Scoring → Refining → Searching`
//! until one of the stop checks fires. The checks run in a fixed order after
//! each step:
//!
//! * no new posts after dedup → stop before scoring
//! * accumulated qualified posts reach `max_results` → stop
//! * this was the last allowed iteration → stop without refining
//! * the refiner offers no keywords → stop
//!
//! All mutable run state (ledger, keyword set, qualified list) lives in a
//! `RunContext` owned by a single `run` call.

use std::fmt;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::ingest::SourceAggregator;
use crate::ledger::PostLedger;
use crate::post::Post;
use crate::refiner::{KeywordRefiner, MAX_SUMMARIES};
use crate::scorer::IntentScorer;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "listening_iterations_total",
            "Search iterations started by the refinement loop."
        );
        describe_counter!(
            "listening_raw_posts_total",
            "Posts returned by sources, duplicates included."
        );
        describe_counter!(
            "listening_new_posts_total",
            "Posts admitted by the fingerprint ledger."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoNewPosts,
    TargetReached,
    IterationLimit,
    NoRefinedKeywords,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::NoNewPosts => "no new posts found",
            StopReason::TargetReached => "target result count reached",
            StopReason::IterationLimit => "iteration limit reached",
            StopReason::NoRefinedKeywords => "no refined keywords generated",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum LoopState {
    Searching,
    /// Carries the posts that passed dedup in this iteration.
    Scoring(Vec<Post>),
    Refining,
    Terminated(StopReason),
}

/// The subset of `RunConfig` the loop reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub keywords: Vec<String>,
    pub forums: Vec<String>,
    pub min_intent_score: u8,
    pub max_results: usize,
    pub max_iterations: u32,
    pub model: String,
}

impl From<&RunConfig> for RunSettings {
    fn from(cfg: &RunConfig) -> Self {
        Self {
            keywords: cfg.keywords.clone(),
            forums: cfg.forums.clone(),
            min_intent_score: cfg.min_intent_score,
            max_results: cfg.max_results,
            max_iterations: cfg.max_iterations.max(1),
            model: cfg.model.clone(),
        }
    }
}

/// Per-run mutable state.
#[derive(Debug)]
struct RunContext {
    ledger: PostLedger,
    keywords: Vec<String>,
    keyword_history: Vec<Vec<String>>,
    qualified: Vec<Post>,
    iteration: u32,
}

impl RunContext {
    fn new(initial_keywords: &[String]) -> Self {
        Self {
            ledger: PostLedger::new(),
            keywords: initial_keywords.to_vec(),
            keyword_history: vec![initial_keywords.to_vec()],
            qualified: Vec::new(),
            iteration: 0,
        }
    }

    /// Qualified posts best-first. Stable: equal scores keep discovery order.
    fn ranked(&self) -> Vec<Post> {
        let mut ranked = self.qualified.clone();
        sort_by_score_desc(&mut ranked);
        ranked
    }
}

pub fn sort_by_score_desc(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.intent_score().cmp(&a.intent_score()));
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Final opportunities: sorted by score, truncated to `max_results`.
    pub opportunities: Vec<Post>,
    pub total_raw: usize,
    pub after_dedup: usize,
    /// Qualified posts accumulated before truncation.
    pub qualified_total: usize,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub keyword_history: Vec<Vec<String>>,
}

pub struct RefinementLoop {
    aggregator: SourceAggregator,
    scorer: IntentScorer,
    refiner: KeywordRefiner,
    settings: RunSettings,
}

impl RefinementLoop {
    pub fn new(
        aggregator: SourceAggregator,
        scorer: IntentScorer,
        refiner: KeywordRefiner,
        settings: RunSettings,
    ) -> Self {
        Self {
            aggregator,
            scorer,
            refiner,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub async fn run(&self, cancel: &CancellationToken) -> RunReport {
        ensure_metrics_described();
        info!(
            target: "controller",
            keywords = ?self.settings.keywords,
            sources = ?self.aggregator.source_names(),
            min_score = self.settings.min_intent_score,
            max_results = self.settings.max_results,
            max_iterations = self.settings.max_iterations,
            "refinement loop starting"
        );

        let mut ctx = RunContext::new(&self.settings.keywords);
        let mut state = LoopState::Searching;
        let reason = loop {
            state = match state {
                LoopState::Searching => self.search(&mut ctx, cancel).await,
                LoopState::Scoring(fresh) => self.score(&mut ctx, fresh, cancel).await,
                LoopState::Refining => self.refine(&mut ctx, cancel).await,
                LoopState::Terminated(reason) => break reason,
            };
        };

        let qualified_total = ctx.qualified.len();
        let mut opportunities = ctx.ranked();
        opportunities.truncate(self.settings.max_results);

        info!(
            target: "controller",
            %reason,
            iterations = ctx.iteration,
            total_raw = ctx.ledger.raw_observed(),
            after_dedup = ctx.ledger.unique_admitted(),
            qualified = qualified_total,
            returned = opportunities.len(),
            "refinement loop finished"
        );

        RunReport {
            opportunities,
            total_raw: ctx.ledger.raw_observed(),
            after_dedup: ctx.ledger.unique_admitted(),
            qualified_total,
            iterations: ctx.iteration,
            stop_reason: reason,
            keyword_history: ctx.keyword_history,
        }
    }

    async fn search(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> LoopState {
        if cancel.is_cancelled() {
            return LoopState::Terminated(StopReason::Cancelled);
        }
        ctx.iteration += 1;
        counter!("listening_iterations_total").increment(1);
        info!(
            target: "controller",
            iteration = ctx.iteration,
            max_iterations = self.settings.max_iterations,
            qualified = ctx.qualified.len(),
            keywords = ?ctx.keywords,
            "search iteration"
        );

        let raw = tokio::select! {
            _ = cancel.cancelled() => return LoopState::Terminated(StopReason::Cancelled),
            raw = self.aggregator.collect(&ctx.keywords, &self.settings.forums) => raw,
        };
        let raw_count = raw.len();
        let fresh = ctx.ledger.filter_new(raw);
        info!(
            target: "controller",
            iteration = ctx.iteration,
            raw = raw_count,
            new = fresh.len(),
            "dedup finished"
        );

        if fresh.is_empty() {
            LoopState::Terminated(StopReason::NoNewPosts)
        } else {
            LoopState::Scoring(fresh)
        }
    }

    async fn score(
        &self,
        ctx: &mut RunContext,
        fresh: Vec<Post>,
        cancel: &CancellationToken,
    ) -> LoopState {
        let scored = self.scorer.score(fresh, &self.settings.model, cancel).await;
        if cancel.is_cancelled() {
            // Batches skipped by cancellation carry fallback scores; keep them out.
            return LoopState::Terminated(StopReason::Cancelled);
        }

        let min = self.settings.min_intent_score;
        let before = ctx.qualified.len();
        ctx.qualified.extend(
            scored
                .into_iter()
                .filter(|p| p.intent_score().is_some_and(|s| s >= min)),
        );
        info!(
            target: "controller",
            iteration = ctx.iteration,
            new_qualified = ctx.qualified.len() - before,
            qualified = ctx.qualified.len(),
            "scoring pass finished"
        );

        if ctx.qualified.len() >= self.settings.max_results {
            LoopState::Terminated(StopReason::TargetReached)
        } else if ctx.iteration >= self.settings.max_iterations {
            LoopState::Terminated(StopReason::IterationLimit)
        } else {
            LoopState::Refining
        }
    }

    async fn refine(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> LoopState {
        let mut top = ctx.ranked();
        top.truncate(MAX_SUMMARIES);

        let refined = self
            .refiner
            .refine(&self.settings.keywords, &top, &self.settings.model, cancel)
            .await;
        if cancel.is_cancelled() {
            return LoopState::Terminated(StopReason::Cancelled);
        }
        if refined.is_empty() {
            warn!(target: "controller", iteration = ctx.iteration, "no refined keywords; stopping");
            return LoopState::Terminated(StopReason::NoRefinedKeywords);
        }

        ctx.keyword_history.push(refined.clone());
        ctx.keywords = refined;
        LoopState::Searching
    }
}
