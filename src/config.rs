// src/config.rs
//! Run configuration: what to search, where, and when to stop.
//!
//! Loaded from TOML or JSON (picked by extension). Path resolution:
//! 1) explicit path (CLI `--config`)
//! 2) $LISTENING_CONFIG_PATH
//! 3) config/listening.toml
//! 4) config/listening.json
//!
//! Any problem here is fatal and happens before the loop starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ingest::types::SourceKind;

pub const ENV_CONFIG_PATH: &str = "LISTENING_CONFIG_PATH";
pub const ENV_WEB_SEARCH_URL: &str = "WEB_SEARCH_URL";
pub const DEFAULT_CONFIG_TOML: &str = "config/listening.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/listening.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("no run configuration found (set LISTENING_CONFIG_PATH or create config/listening.toml)")]
    NotFound,

    #[error("reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("building http client: {0}")]
    HttpClient(String),
}

fn default_max_iterations() -> u32 {
    3
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_sources() -> Vec<SourceKind> {
    vec![SourceKind::Forum, SourceKind::Web]
}

/// Outbound request pacing for source collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    20
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            jitter_ms: default_jitter_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    pub keywords: Vec<String>,
    #[serde(default, alias = "subreddits")]
    pub forums: Vec<String>,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceKind>,
    pub min_intent_score: u8,
    pub max_results: usize,
    #[serde(default = "default_max_iterations", alias = "max_refinement_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_model", alias = "openai_model")]
    pub model: String,
    /// JSON search endpoint for the web collaborator (`$WEB_SEARCH_URL` wins).
    #[serde(default)]
    pub web_search_url: Option<String>,
    /// Base URL of the chat-completions API; defaults to OpenAI.
    #[serde(default)]
    pub openai_base_url: Option<String>,
    /// Posts file for the `fixture` source.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl RunConfig {
    /// Load from an explicit path, then validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, &ext).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the path (explicit → env → fallbacks) and load.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(&resolve_path(explicit)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_WEB_SEARCH_URL) {
            if !url.trim().is_empty() {
                self.web_search_url = Some(url.trim().to_string());
            }
        }
    }

    /// Normalize lists and reject settings the loop cannot run with.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.keywords = clean_list(std::mem::take(&mut self.keywords));
        self.forums = clean_list(std::mem::take(&mut self.forums));
        let mut seen = HashSet::new();
        self.sources.retain(|kind| seen.insert(*kind));

        if self.keywords.is_empty() {
            return Err(ConfigError::Missing("keywords"));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Missing("sources"));
        }
        if self.min_intent_score > 100 {
            return Err(ConfigError::Invalid {
                field: "min_intent_score",
                reason: format!("{} is outside 0..=100", self.min_intent_score),
            });
        }
        if self.max_results == 0 {
            return Err(ConfigError::Invalid {
                field: "max_results",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("model"));
        }
        if self.sources.contains(&SourceKind::Forum) && self.forums.is_empty() {
            return Err(ConfigError::Missing("forums"));
        }
        if self.sources.contains(&SourceKind::Web) && self.web_search_url.is_none() {
            return Err(ConfigError::Missing("web_search_url"));
        }
        if self.sources.contains(&SourceKind::Fixture) && self.fixture_path.is_none() {
            return Err(ConfigError::Missing("fixture_path"));
        }
        Ok(())
    }
}

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(p));
    }
    [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or(ConfigError::NotFound)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<RunConfig, String> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str(s) {
        Ok(cfg) => Ok(cfg),
        // Unknown extension: give JSON a chance before reporting the TOML error.
        Err(toml_err) if hint_ext != "toml" => {
            serde_json::from_str(s).map_err(|_| toml_err.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Trim, drop empties, remove case-insensitive duplicates, keep order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|it| it.trim().to_string())
        .filter(|it| !it.is_empty() && seen.insert(it.to_lowercase()))
        .collect()
}
