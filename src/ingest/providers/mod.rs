pub mod fixture;
pub mod forum_search;
pub mod web_search;

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::RunConfig;
use crate::ingest::pacing::RequestPacing;
use crate::ingest::types::{SourceCollaborator, SourceKind};

/// Build one collaborator per enabled source kind, in config order.
pub fn build_sources(cfg: &RunConfig) -> Result<Vec<Box<dyn SourceCollaborator>>> {
    let pacing = RequestPacing::from(&cfg.pacing);
    let timeout = Duration::from_secs(cfg.pacing.timeout_secs);

    let mut out: Vec<Box<dyn SourceCollaborator>> = Vec::with_capacity(cfg.sources.len());
    for kind in &cfg.sources {
        match kind {
            SourceKind::Forum => {
                out.push(Box::new(forum_search::ForumSearchSource::new(timeout, pacing)?));
            }
            SourceKind::Web => {
                let endpoint = cfg
                    .web_search_url
                    .as_deref()
                    .context("web source enabled without web_search_url")?;
                out.push(Box::new(web_search::WebSearchSource::new(
                    endpoint, timeout, pacing,
                )?));
            }
            SourceKind::Fixture => {
                let path = cfg
                    .fixture_path
                    .as_deref()
                    .context("fixture source enabled without fixture_path")?;
                out.push(Box::new(fixture::FixtureSource::from_path(path)?));
            }
        }
    }
    Ok(out)
}
