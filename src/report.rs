//! End-of-run evaluation summary and the human-readable top listing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::controller::{RunReport, StopReason};
use crate::post::{truncate_chars, ActionType, OutreachDraft, Post};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_raw: usize,
    pub after_dedup: usize,
    pub qualified: usize,
    pub returned: usize,
    pub iterations: u32,
    pub stop_reason: StopReason,
    /// Mean score of the returned opportunities, `None` when there are none.
    pub top_avg_score: Option<f64>,
    pub topics: BTreeMap<String, usize>,
    pub actions: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn from_report(report: &RunReport) -> Self {
        let top = &report.opportunities;
        let mut topics = BTreeMap::new();
        let mut actions = BTreeMap::new();
        let mut sum = 0u64;
        for s in top.iter().filter_map(Post::scoring) {
            *topics.entry(s.topic_label.clone()).or_insert(0) += 1;
            *actions
                .entry(s.recommended_action.as_str().to_string())
                .or_insert(0) += 1;
            sum += u64::from(s.intent_score);
        }
        let top_avg_score = (!top.is_empty()).then(|| sum as f64 / top.len() as f64);

        Self {
            total_raw: report.total_raw,
            after_dedup: report.after_dedup,
            qualified: report.qualified_total,
            returned: top.len(),
            iterations: report.iterations,
            stop_reason: report.stop_reason,
            top_avg_score,
            topics,
            actions,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Evaluation summary");
        let _ = writeln!(out, "  total posts collected:   {}", self.total_raw);
        let _ = writeln!(out, "  after dedup:             {}", self.after_dedup);
        let _ = writeln!(out, "  above intent threshold:  {}", self.qualified);
        let _ = writeln!(out, "  iterations:              {} ({})", self.iterations, self.stop_reason);
        if let Some(avg) = self.top_avg_score {
            let _ = writeln!(out, "  top {} avg intent score: {avg:.1}", self.returned);
            let _ = writeln!(out, "  topics:  {}", join_counts(&self.topics));
            let _ = writeln!(out, "  actions: {}", join_counts(&self.actions));
        }
        out
    }
}

fn join_counts(m: &BTreeMap<String, usize>) -> String {
    m.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Numbered listing of the best `n` opportunities.
pub fn render_top(posts: &[Post], n: usize) -> String {
    if posts.is_empty() {
        return "No opportunities found.\n".to_string();
    }
    let mut out = format!("Top {} opportunities\n", n.min(posts.len()));
    for (i, p) in posts.iter().take(n).enumerate() {
        let Some(s) = p.scoring() else { continue };
        let _ = writeln!(out, "{}. [{}] {}", i + 1, s.intent_score, truncate_chars(&p.title, 50));
        let _ = writeln!(
            out,
            "   source: {} | topic: {} | action: {}",
            p.source, s.topic_label, s.recommended_action
        );
        let _ = writeln!(out, "   {}", p.url);
        if !s.why_this_matters.is_empty() {
            let _ = writeln!(out, "   why: {}", s.why_this_matters);
        }
    }
    out
}

/// "3 drafts (1 dm, 1 comment, 1 content_idea)".
pub fn draft_breakdown(drafts: &[OutreachDraft]) -> String {
    let count = |a: ActionType| drafts.iter().filter(|d| d.action_type == a).count();
    format!(
        "{} drafts ({} dm, {} comment, {} content_idea)",
        drafts.len(),
        count(ActionType::Dm),
        count(ActionType::Comment),
        count(ActionType::ContentIdea)
    )
}
