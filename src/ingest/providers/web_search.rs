// src/ingest/providers/web_search.rs
//! General web search through a JSON search endpoint (SearXNG-compatible:
//! `GET {base}?q=...&format=json` → `{"results":[{url,title,content}]}`).
//! Each keyword expands into three queries aimed at microblogs, Q&A sites
//! and discussion boards; the post source is classified from the hit URL.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::pacing::RequestPacing;
use crate::ingest::types::{CollectionError, SourceCollaborator};
use crate::ingest::SNIPPET_MAX_CHARS;
use crate::post::{Post, Source};

const NAME: &str = "web";
const RESULTS_PER_QUERY: usize = 10;
const ATTEMPTS_PER_QUERY: u32 = 2;
const RETRY_PAUSE: Duration = Duration::from_secs(3);

pub const QUERY_TEMPLATES: [&str; 3] = [
    "{kw} site:twitter.com OR site:x.com",
    "{kw} site:quora.com",
    "{kw} forum OR discussion",
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
}

pub struct WebSearchSource {
    client: reqwest::Client,
    endpoint: String,
    pacing: RequestPacing,
    retry_pause: Duration,
}

impl WebSearchSource {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        pacing: RequestPacing,
    ) -> Result<Self, CollectionError> {
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
            endpoint: endpoint.into(),
            pacing,
            retry_pause: RETRY_PAUSE,
        })
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    async fn query_once(&self, q: &str) -> Result<Vec<Hit>, CollectionError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q), ("format", "json")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CollectionError::Transport {
                source_name: NAME,
                message: e.to_string(),
            })?;
        let body: SearchResponse = resp.json().await.map_err(|e| CollectionError::Decode {
            source_name: NAME,
            message: e.to_string(),
        })?;
        Ok(body.results.into_iter().take(RESULTS_PER_QUERY).collect())
    }

    /// Two attempts per query; a query that keeps failing yields nothing.
    async fn query(&self, q: &str) -> Result<Vec<Hit>, CollectionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.query_once(q).await {
                Ok(hits) => return Ok(hits),
                Err(e) if attempt < ATTEMPTS_PER_QUERY => {
                    tracing::debug!(target: "ingest", query = q, attempt, error = %e, "web query retry");
                    tokio::time::sleep(self.retry_pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn expand_queries(keyword: &str) -> Vec<String> {
    QUERY_TEMPLATES
        .iter()
        .map(|t| t.replace("{kw}", keyword))
        .collect()
}

fn to_post(hit: Hit) -> Post {
    Post::new(
        Source::from_url(&hit.url),
        hit.url,
        normalize_text(&hit.title, SNIPPET_MAX_CHARS),
        normalize_text(hit.content.as_deref().unwrap_or_default(), SNIPPET_MAX_CHARS),
    )
}

#[async_trait]
impl SourceCollaborator for WebSearchSource {
    async fn search(
        &self,
        keywords: &[String],
        _forums: &[String],
    ) -> Result<Vec<Post>, CollectionError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_err = None;

        for kw in keywords {
            for q in expand_queries(kw) {
                attempted += 1;
                match self.query(&q).await {
                    Ok(hits) => {
                        tracing::debug!(target: "ingest", query = %q, hits = hits.len(), "web query");
                        for hit in hits {
                            if seen.insert(hit.url.clone()) {
                                out.push(to_post(hit));
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "ingest", query = %q, error = %e, "web query failed");
                        failed += 1;
                        last_err = Some(e);
                    }
                }
                self.pacing.wait().await;
            }
        }

        match last_err {
            Some(e) if failed == attempted => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
