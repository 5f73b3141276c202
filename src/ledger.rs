//! Post ledger: the run-wide fingerprint set and the raw/unique counters.
//!
//! A post is "new" iff its URL is absent from the set at the moment it is
//! ingested. The set only grows; there is no removal operation.

use std::collections::HashSet;

use metrics::counter;

use crate::post::Post;

#[derive(Debug, Default)]
pub struct PostLedger {
    seen: HashSet<String>,
    raw_observed: usize,
}

impl PostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, url: &str) -> bool {
        !self.seen.contains(url)
    }

    /// Record a fingerprint. Returns `true` if it was not seen before.
    pub fn record(&mut self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string())
    }

    /// Check-then-record per post, in input order. Every input post counts
    /// towards the raw counter, duplicates within `posts` included.
    pub fn filter_new(&mut self, posts: Vec<Post>) -> Vec<Post> {
        self.raw_observed += posts.len();
        counter!("listening_raw_posts_total").increment(posts.len() as u64);

        let mut fresh = Vec::with_capacity(posts.len());
        for post in posts {
            if self.record(&post.url) {
                fresh.push(post);
            }
        }
        counter!("listening_new_posts_total").increment(fresh.len() as u64);
        fresh
    }

    /// Total posts ever offered to `filter_new`, duplicates included.
    pub fn raw_observed(&self) -> usize {
        self.raw_observed
    }

    /// Total distinct fingerprints admitted.
    pub fn unique_admitted(&self) -> usize {
        self.seen.len()
    }
}
