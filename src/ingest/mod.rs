// src/ingest/mod.rs
pub mod pacing;
pub mod providers;
pub mod types;

use crate::ingest::types::SourceCollaborator;
use crate::post::Post;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

/// Longest snippet kept from any source.
pub const SNIPPET_MAX_CHARS: usize = 500;

/// One-time metrics registration so series carry descriptions.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "listening_source_posts_total",
            "Posts returned by source collaborators, before dedup."
        );
        describe_counter!(
            "listening_source_errors_total",
            "Source collaborator calls that failed and were treated as empty."
        );
    });
}

/// Normalize scraped text: decode entities, strip tags, fold fancy quotes,
/// collapse whitespace, cap length. Question marks are kept; they carry intent.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// Fans one iteration's keyword set out to every enabled collaborator.
pub struct SourceAggregator {
    sources: Vec<Box<dyn SourceCollaborator>>,
}

impl SourceAggregator {
    pub fn new(sources: Vec<Box<dyn SourceCollaborator>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Query each source in order and concatenate. A failing source
    /// contributes zero posts for this call.
    pub async fn collect(&self, keywords: &[String], forums: &[String]) -> Vec<Post> {
        ensure_metrics_described();

        let mut raw = Vec::new();
        for src in &self.sources {
            match src.search(keywords, forums).await {
                Ok(mut posts) => {
                    tracing::info!(
                        target: "ingest",
                        source = src.name(),
                        posts = posts.len(),
                        "source search finished"
                    );
                    counter!("listening_source_posts_total", "source" => src.name())
                        .increment(posts.len() as u64);
                    raw.append(&mut posts);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, source = src.name(), "source error");
                    counter!("listening_source_errors_total", "source" => src.name())
                        .increment(1);
                }
            }
        }
        raw
    }
}
