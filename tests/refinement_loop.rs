// tests/refinement_loop.rs
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use social_listening::controller::{RefinementLoop, RunSettings, StopReason};
use social_listening::ingest::types::{CollectionError, SourceCollaborator};
use social_listening::ingest::SourceAggregator;
use social_listening::oracle::{
    OracleError, RefinementOracle, RefinementRequest, ScoringOracle, ScoringRequestItem,
    ScoringResponseItem,
};
use social_listening::post::{Post, Source};
use social_listening::refiner::KeywordRefiner;
use social_listening::retry::RetryPolicy;
use social_listening::scorer::IntentScorer;
use tokio_util::sync::CancellationToken;

/// Hands out one scripted batch per call, then nothing.
struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<Post>>>,
    seen_keywords: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<Post>>) -> (Self, Arc<Mutex<Vec<Vec<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                batches: Mutex::new(batches.into()),
                seen_keywords: seen.clone(),
            },
            seen,
        )
    }
}

#[async_trait]
impl SourceCollaborator for ScriptedSource {
    async fn search(
        &self,
        keywords: &[String],
        _forums: &[String],
    ) -> Result<Vec<Post>, CollectionError> {
        self.seen_keywords.lock().unwrap().push(keywords.to_vec());
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct BrokenSource;

#[async_trait]
impl SourceCollaborator for BrokenSource {
    async fn search(&self, _: &[String], _: &[String]) -> Result<Vec<Post>, CollectionError> {
        Err(CollectionError::Transport {
            source_name: "broken",
            message: "connection reset".into(),
        })
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Scores by URL lookup; unknown URLs get 0.
struct TableScorer {
    scores: HashMap<String, u8>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ScoringOracle for TableScorer {
    async fn score_batch(
        &self,
        items: &[ScoringRequestItem],
        _model: &str,
    ) -> Result<Vec<ScoringResponseItem>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(items
            .iter()
            .map(|it| ScoringResponseItem {
                id: Some(serde_json::json!(it.id)),
                topic_label: Some("GRE".into()),
                intent_score: Some(f64::from(
                    *self.scores.get(&it.title).unwrap_or(&0),
                )),
                recommended_action: Some("comment".into()),
                suggested_response: Some("happy to help".into()),
                why_this_matters: Some("asks for help".into()),
            })
            .collect())
    }
}

struct ScriptedRefiner {
    replies: Mutex<VecDeque<Vec<String>>>,
    requests: Arc<Mutex<Vec<RefinementRequest>>>,
}

#[async_trait]
impl RefinementOracle for ScriptedRefiner {
    async fn suggest_keywords(
        &self,
        request: &RefinementRequest,
        _model: &str,
    ) -> Result<Vec<String>, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// Title doubles as the scoring key.
fn post(id: &str) -> Post {
    Post::new(Source::Forum, format!("https://forum.test/{id}"), id, "")
}

fn settings(max_results: usize, max_iterations: u32) -> RunSettings {
    RunSettings {
        keywords: vec!["GRE prep".into()],
        forums: vec!["GRE".into()],
        min_intent_score: 60,
        max_results,
        max_iterations,
        model: "test-model".into(),
    }
}

struct Harness {
    run_loop: RefinementLoop,
    scorer_calls: Arc<AtomicUsize>,
    refine_requests: Arc<Mutex<Vec<RefinementRequest>>>,
    source_keywords: Arc<Mutex<Vec<Vec<String>>>>,
}

fn harness(
    batches: Vec<Vec<Post>>,
    scores: &[(&str, u8)],
    refinements: Vec<Vec<String>>,
    settings: RunSettings,
    extra_sources: Vec<Box<dyn SourceCollaborator>>,
) -> Harness {
    let (source, source_keywords) = ScriptedSource::new(batches);
    let mut sources = extra_sources;
    sources.push(Box::new(source));

    let scorer_calls = Arc::new(AtomicUsize::new(0));
    let scorer = TableScorer {
        scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        calls: scorer_calls.clone(),
    };
    let refine_requests = Arc::new(Mutex::new(Vec::new()));
    let refiner = ScriptedRefiner {
        replies: Mutex::new(refinements.into()),
        requests: refine_requests.clone(),
    };

    let run_loop = RefinementLoop::new(
        SourceAggregator::new(sources),
        IntentScorer::new(Arc::new(scorer))
            .with_retry(RetryPolicy::scoring().without_delays())
            .with_batch_pause(Duration::ZERO),
        KeywordRefiner::new(Arc::new(refiner)),
        settings,
    );
    Harness {
        run_loop,
        scorer_calls,
        refine_requests,
        source_keywords,
    }
}

fn scores_of(posts: &[Post]) -> Vec<u8> {
    posts.iter().filter_map(Post::intent_score).collect()
}

#[tokio::test]
async fn two_iterations_dedup_and_rank() {
    let iter1: Vec<Post> = ["a", "b", "c", "d", "e", "f", "g", "h"]
        .iter()
        .map(|id| post(id))
        .collect();
    // "a" comes back as a duplicate.
    let iter2 = vec![post("a"), post("i"), post("j"), post("k")];
    let scores = [
        ("a", 90),
        ("b", 75),
        ("c", 60),
        ("d", 50),
        ("e", 40),
        ("f", 30),
        ("g", 20),
        ("h", 10),
        ("i", 95),
        ("j", 50),
        ("k", 10),
    ];
    let h = harness(
        vec![iter1, iter2],
        &scores,
        vec![vec!["TOEFL tips".into()], vec![]],
        settings(5, 3),
        vec![],
    );

    let report = h.run_loop.run(&CancellationToken::new()).await;

    // Four qualified, under the cap of five: nothing truncated.
    assert_eq!(scores_of(&report.opportunities), vec![95, 90, 75, 60]);
    assert_eq!(report.total_raw, 12);
    assert_eq!(report.after_dedup, 11);
    assert_eq!(report.qualified_total, 4);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.stop_reason, StopReason::NoRefinedKeywords);

    // 8 posts → 2 batches, 3 new posts → 1 batch.
    assert_eq!(h.scorer_calls.load(Ordering::SeqCst), 3);

    let searched = h.source_keywords.lock().unwrap().clone();
    assert_eq!(
        searched,
        vec![vec!["GRE prep".to_string()], vec!["TOEFL tips".to_string()]]
    );

    // The refiner always sees the original keyword set.
    let reqs = h.refine_requests.lock().unwrap();
    assert_eq!(reqs.len(), 2);
    assert!(reqs
        .iter()
        .all(|r| r.original_keywords == vec!["GRE prep".to_string()]));
    assert_eq!(reqs[0].high_scoring_posts[0].score, 90);
    assert_eq!(reqs[1].high_scoring_posts[0].score, 95);
}

#[tokio::test]
async fn equal_scores_keep_discovery_order_across_iterations() {
    let h = harness(
        vec![
            vec![post("i1a"), post("i1b")],
            vec![post("i2a"), post("i2b")],
        ],
        &[("i1a", 80), ("i1b", 70), ("i2a", 80), ("i2b", 70)],
        vec![vec!["TOEFL tips".into()], vec![]],
        settings(10, 3),
        vec![],
    );

    let report = h.run_loop.run(&CancellationToken::new()).await;

    assert_eq!(report.iterations, 2);
    let titles: Vec<_> = report
        .opportunities
        .iter()
        .map(|p| p.title.as_str())
        .collect();
    assert_eq!(titles, vec!["i1a", "i2a", "i1b", "i2b"]);
}

#[tokio::test]
async fn no_new_posts_stops_before_scoring() {
    let h = harness(vec![], &[], vec![], settings(10, 3), vec![]);
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(report.stop_reason, StopReason::NoNewPosts);
    assert_eq!(report.iterations, 1);
    assert_eq!(h.scorer_calls.load(Ordering::SeqCst), 0);
    assert!(report.opportunities.is_empty());
}

#[tokio::test]
async fn only_duplicates_counts_as_no_new_posts() {
    let h = harness(
        vec![vec![post("a")], vec![post("a"), post("a")]],
        &[("a", 90)],
        vec![vec!["more".into()]],
        settings(10, 3),
        vec![],
    );
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(report.stop_reason, StopReason::NoNewPosts);
    assert_eq!(report.total_raw, 3);
    assert_eq!(report.after_dedup, 1);
    assert_eq!(report.iterations, 2);
}

#[tokio::test]
async fn target_reached_skips_refinement_and_truncates() {
    let h = harness(
        vec![vec![post("a"), post("b"), post("c")]],
        &[("a", 70), ("b", 95), ("c", 80)],
        vec![vec!["never used".into()]],
        settings(2, 3),
        vec![],
    );
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(report.stop_reason, StopReason::TargetReached);
    assert_eq!(scores_of(&report.opportunities), vec![95, 80]);
    assert_eq!(report.qualified_total, 3);
    assert!(h.refine_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn last_iteration_does_not_refine() {
    let h = harness(
        vec![vec![post("a")]],
        &[("a", 70)],
        vec![vec!["never used".into()]],
        settings(10, 1),
        vec![],
    );
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(report.stop_reason, StopReason::IterationLimit);
    assert_eq!(report.iterations, 1);
    assert!(h.refine_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn iteration_ceiling_is_hard() {
    let batches = (0..5).map(|i| vec![post(&format!("p{i}"))]).collect();
    let refinements = (0..5).map(|i| vec![format!("kw{i}")]).collect();
    let h = harness(batches, &[], refinements, settings(10, 3), vec![]);
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(report.stop_reason, StopReason::IterationLimit);
    assert_eq!(report.iterations, 3);
    assert_eq!(h.refine_requests.lock().unwrap().len(), 2);
    assert_eq!(report.keyword_history.len(), 3);
}

#[tokio::test]
async fn failing_source_is_tolerated() {
    let h = harness(
        vec![vec![post("a")]],
        &[("a", 88)],
        vec![],
        settings(10, 2),
        vec![Box::new(BrokenSource)],
    );
    let report = h.run_loop.run(&CancellationToken::new()).await;
    assert_eq!(scores_of(&report.opportunities), vec![88]);
    assert_eq!(report.stop_reason, StopReason::NoRefinedKeywords);
}

#[tokio::test]
async fn cancelled_run_stops_at_iteration_boundary() {
    let h = harness(
        vec![vec![post("a")]],
        &[("a", 88)],
        vec![],
        settings(10, 3),
        vec![],
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h.run_loop.run(&cancel).await;
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.iterations, 0);
    assert!(report.opportunities.is_empty());
    assert_eq!(h.scorer_calls.load(Ordering::SeqCst), 0);
}
