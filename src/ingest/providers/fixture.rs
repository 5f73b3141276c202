// src/ingest/providers/fixture.rs
//! Posts served from a JSON file, for offline runs and demos. A post is
//! returned when every word of at least one keyword appears in its title or
//! snippet (case-insensitive).

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::types::{CollectionError, SourceCollaborator};
use crate::ingest::SNIPPET_MAX_CHARS;
use crate::post::{ForumMeta, Post, Source};

#[derive(Debug, Deserialize)]
struct FixturePost {
    #[serde(default)]
    source: Option<Source>,
    url: String,
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    meta: ForumMeta,
}

pub struct FixtureSource {
    posts: Vec<Post>,
}

impl FixtureSource {
    pub fn from_fixture_str(s: &str) -> Result<Self> {
        let raw: Vec<FixturePost> = serde_json::from_str(s).context("parsing fixture posts")?;
        let posts = raw
            .into_iter()
            .map(|fp| {
                let source = fp.source.unwrap_or_else(|| Source::from_url(&fp.url));
                Post::new(
                    source,
                    fp.url,
                    normalize_text(&fp.title, SNIPPET_MAX_CHARS),
                    normalize_text(&fp.snippet, SNIPPET_MAX_CHARS),
                )
                .with_meta(fp.meta)
            })
            .collect();
        Ok(Self { posts })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture posts from {}", path.display()))?;
        Self::from_fixture_str(&s)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

fn matches_keyword(post: &Post, keyword: &str) -> bool {
    let text = format!("{} {}", post.title, post.snippet).to_lowercase();
    let mut words = keyword.split_whitespace().peekable();
    words.peek().is_some() && words.all(|w| text.contains(&w.to_lowercase()))
}

#[async_trait]
impl SourceCollaborator for FixtureSource {
    async fn search(
        &self,
        keywords: &[String],
        _forums: &[String],
    ) -> Result<Vec<Post>, CollectionError> {
        Ok(self
            .posts
            .iter()
            .filter(|p| keywords.iter().any(|k| matches_keyword(p, k)))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
