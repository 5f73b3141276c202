// src/ingest/providers/forum_search.rs
//! Forum search over the public listing JSON (`/r/{forum}/search.json`).
//! One query per forum × keyword, newest first, past week, five hits each,
//! plus the forum's `hot` and `new` listings (ten each) once per call.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::pacing::RequestPacing;
use crate::ingest::types::{CollectionError, SourceCollaborator};
use crate::ingest::SNIPPET_MAX_CHARS;
use crate::post::{ForumMeta, Post, Source};

const NAME: &str = "forum";
pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const PER_QUERY_LIMIT: u32 = 5;
const LISTING_LIMIT: u32 = 10;
const LISTINGS: [&str; 2] = ["hot", "new"];
const MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}
#[derive(Debug, Deserialize)]
struct Child {
    data: Submission,
}
#[derive(Debug, Deserialize)]
struct Submission {
    title: String,
    #[serde(default)]
    selftext: Option<String>,
    permalink: String,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    subreddit: Option<String>,
}

pub struct ForumSearchSource {
    client: reqwest::Client,
    base_url: String,
    pacing: RequestPacing,
}

impl ForumSearchSource {
    pub fn new(timeout: Duration, pacing: RequestPacing) -> Result<Self, CollectionError> {
        let client = reqwest::Client::builder()
            .user_agent("social-listening-agent/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| CollectionError::Transport {
                source_name: NAME,
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            pacing,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_one(&self, forum: &str, keyword: &str) -> Result<Listing, CollectionError> {
        let limit = PER_QUERY_LIMIT.to_string();
        self.fetch(
            format!("{}/r/{}/search.json", self.base_url, forum),
            &[
                ("q", keyword),
                ("restrict_sr", "1"),
                ("sort", "new"),
                ("t", "week"),
                ("limit", limit.as_str()),
            ],
        )
        .await
    }

    async fn listing(&self, forum: &str, kind: &str) -> Result<Listing, CollectionError> {
        let limit = LISTING_LIMIT.to_string();
        self.fetch(
            format!("{}/r/{}/{}.json", self.base_url, forum, kind),
            &[("limit", limit.as_str())],
        )
        .await
    }

    async fn fetch(&self, url: String, query: &[(&str, &str)]) -> Result<Listing, CollectionError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CollectionError::Transport {
                source_name: NAME,
                message: e.to_string(),
            })?;
        resp.json::<Listing>()
            .await
            .map_err(|e| CollectionError::Decode {
                source_name: NAME,
                message: e.to_string(),
            })
    }

    fn admit(
        &self,
        listing: Listing,
        now: DateTime<Utc>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Post>,
    ) {
        for child in listing.data.children {
            let post = to_post(&self.base_url, child.data);
            if is_recent(post.meta.created_at, now) && seen.insert(post.url.clone()) {
                out.push(post);
            }
        }
    }
}

fn to_post(base_url: &str, s: Submission) -> Post {
    let created_at = s
        .created_utc
        .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single());
    Post::new(
        Source::Forum,
        format!("{}{}", base_url, s.permalink),
        normalize_text(&s.title, SNIPPET_MAX_CHARS),
        normalize_text(s.selftext.as_deref().unwrap_or_default(), SNIPPET_MAX_CHARS),
    )
    .with_meta(ForumMeta {
        community: s.subreddit,
        engagement: s.score,
        reply_count: s.num_comments,
        created_at,
        author: s.author,
    })
}

fn is_recent(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    // Posts without a timestamp are kept; the listing already asked for the past week.
    created_at.map_or(true, |ts| (now - ts).num_days() <= MAX_AGE_DAYS)
}

#[async_trait]
impl SourceCollaborator for ForumSearchSource {
    async fn search(
        &self,
        keywords: &[String],
        forums: &[String],
    ) -> Result<Vec<Post>, CollectionError> {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_err = None;

        for forum in forums {
            for kw in keywords {
                attempted += 1;
                match self.search_one(forum, kw).await {
                    Ok(listing) => self.admit(listing, now, &mut seen, &mut out),
                    Err(e) => {
                        tracing::warn!(target: "ingest", %forum, keyword = %kw, error = %e, "forum query failed");
                        failed += 1;
                        last_err = Some(e);
                    }
                }
                self.pacing.wait().await;
            }

            for kind in LISTINGS {
                attempted += 1;
                match self.listing(forum, kind).await {
                    Ok(listing) => self.admit(listing, now, &mut seen, &mut out),
                    Err(e) => {
                        tracing::warn!(target: "ingest", %forum, listing = kind, error = %e, "forum listing failed");
                        failed += 1;
                        last_err = Some(e);
                    }
                }
                self.pacing.wait().await;
            }
        }

        // Every single request failed: surface it so the aggregator counts it.
        match last_err {
            Some(e) if failed == attempted => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_maps_to_forum_post() {
        let raw = r#"{"data":{"children":[{"data":{
            "title":"GRE in 3 weeks &amp; no plan?",
            "selftext":"Need  help",
            "permalink":"/r/GRE/comments/abc/gre/",
            "score":12,"num_comments":4,"created_utc":1700000000.0,
            "author":"someone","subreddit":"GRE"}}]}}"#;
        let listing: Listing = serde_json::from_str(raw).unwrap();
        let sub = listing.data.children.into_iter().next().unwrap().data;
        let p = to_post("https://www.reddit.com", sub);
        assert_eq!(p.url, "https://www.reddit.com/r/GRE/comments/abc/gre/");
        assert_eq!(p.title, "GRE in 3 weeks & no plan?");
        assert_eq!(p.snippet, "Need help");
        assert_eq!(p.meta.reply_count, Some(4));
        assert_eq!(p.meta.community.as_deref(), Some("GRE"));
        assert!(p.meta.created_at.is_some());
    }

    #[test]
    fn week_old_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let fresh = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap();
        assert!(is_recent(Some(fresh), now));
        assert!(!is_recent(Some(stale), now));
        assert!(is_recent(None, now));
    }
}
