//! post.rs: discovered posts, their scoring stage, and outreach drafts.
//!
//! A `Post` always carries its raw subset (source, url, title, snippet,
//! optional forum metadata). The scoring subset lives inside `Stage::Scored`
//! so "unscored" is a state you can match on instead of guessing from
//! empty fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic assigned when scoring fails or the oracle says nothing useful.
pub const FALLBACK_TOPIC: &str = "general_education";
/// Explanation attached to fallback-scored posts.
pub const SCORING_FAILED_REASON: &str = "Scoring failed";

/// Where a post was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Forum,
    Microblog,
    #[serde(rename = "qa-site", alias = "qa_site")]
    QaSite,
    Web,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Forum => "forum",
            Source::Microblog => "microblog",
            Source::QaSite => "qa-site",
            Source::Web => "web",
        }
    }

    /// Classify a URL returned by a general web search.
    pub fn from_url(url: &str) -> Self {
        if host_is(url, "twitter.com") || host_is(url, "x.com") {
            Source::Microblog
        } else if host_is(url, "quora.com") {
            Source::QaSite
        } else if host_is(url, "reddit.com") {
            Source::Forum
        } else {
            Source::Web
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scoring oracle suggests doing with a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Comment,
    #[serde(rename = "DM", alias = "dm")]
    Dm,
    Content,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Comment => "comment",
            RecommendedAction::Dm => "DM",
            RecommendedAction::Content => "content",
        }
    }

    /// Lenient parse used on oracle output. Unknown labels become `Content`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(RecommendedAction::Content)
    }
}

impl FromStr for RecommendedAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comment" => Ok(RecommendedAction::Comment),
            "dm" | "direct_message" => Ok(RecommendedAction::Dm),
            "content" => Ok(RecommendedAction::Content),
            other => Err(format!("unknown recommended action: {other}")),
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata only forum-capable sources can fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForumMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// The five fields the Intent Scorer attaches to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoring {
    pub topic_label: String,
    /// Always within 0..=100 (see `Scoring::new`).
    pub intent_score: u8,
    pub recommended_action: RecommendedAction,
    pub suggested_response: String,
    pub why_this_matters: String,
}

impl Scoring {
    /// Build a scoring record, clamping the score into 0..=100.
    pub fn new(
        topic_label: impl Into<String>,
        intent_score: u8,
        recommended_action: RecommendedAction,
        suggested_response: impl Into<String>,
        why_this_matters: impl Into<String>,
    ) -> Self {
        Self {
            topic_label: topic_label.into(),
            intent_score: intent_score.min(100),
            recommended_action,
            suggested_response: suggested_response.into(),
            why_this_matters: why_this_matters.into(),
        }
    }

    /// Deterministic classification used when the oracle cannot be reached
    /// or gave nothing for a post.
    pub fn fallback() -> Self {
        Self::new(
            FALLBACK_TOPIC,
            0,
            RecommendedAction::Content,
            "",
            SCORING_FAILED_REASON,
        )
    }
}

/// Processing stage of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Raw,
    Scored(Scoring),
}

/// A discovered item. `url` is its global fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub source: Source,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub meta: ForumMeta,
    #[serde(flatten)]
    pub stage: Stage,
}

impl Post {
    pub fn new(
        source: Source,
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            source,
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            meta: ForumMeta::default(),
            stage: Stage::Raw,
        }
    }

    pub fn with_meta(mut self, meta: ForumMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn scoring(&self) -> Option<&Scoring> {
        match &self.stage {
            Stage::Scored(s) => Some(s),
            Stage::Raw => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.scoring().is_some()
    }

    /// Intent score, or `None` while the post is still raw.
    pub fn intent_score(&self) -> Option<u8> {
        self.scoring().map(|s| s.intent_score)
    }

    /// Attach scoring fields. A post is scored exactly once.
    pub fn scored(mut self, scoring: Scoring) -> Self {
        debug_assert!(!self.is_scored(), "post {} scored twice", self.url);
        self.stage = Stage::Scored(scoring);
        self
    }
}

/// Outreach tier chosen by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Dm,
    Comment,
    ContentIdea,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Dm => "dm",
            ActionType::Comment => "comment",
            ActionType::ContentIdea => "content_idea",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform an outreach draft is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Forum,
    Microblog,
    #[serde(rename = "qa-site", alias = "qa_site")]
    QaSite,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Forum => "forum",
            Platform::Microblog => "microblog",
            Platform::QaSite => "qa-site",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outreach record per classified post. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachDraft {
    pub platform: Platform,
    pub url: String,
    pub post_title: String,
    pub action_type: ActionType,
    pub draft_message: String,
    pub intent_score: u8,
    pub reason_for_outreach: String,
}

/// True when the URL's host is `domain` or one of its subdomains.
pub fn host_is(url: &str, domain: &str) -> bool {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority
        .rsplit_once('@')
        .map(|(_, h)| h)
        .unwrap_or(authority)
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
