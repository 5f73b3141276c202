// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod controller;
pub mod export;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod oracle;
pub mod outreach;
pub mod post;
pub mod refiner;
pub mod report;
pub mod retry;
pub mod scorer;

// ---- Re-exports for stable public API ----
pub use crate::config::{ConfigError, RunConfig};
pub use crate::controller::{RefinementLoop, RunReport, RunSettings, StopReason};
pub use crate::ingest::SourceAggregator;
pub use crate::oracle::{build_oracles, OracleError, Oracles};
pub use crate::outreach::OutreachDrafter;
pub use crate::post::{OutreachDraft, Post, Scoring, Source};
pub use crate::refiner::KeywordRefiner;
pub use crate::scorer::IntentScorer;
