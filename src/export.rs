//! Export of the final opportunity list and outreach drafts.
//!
//! Files are timestamped (`opportunities_%Y%m%d_%H%M%S.csv` and friends).
//! Empty inputs still produce files carrying just the CSV header or `[]`.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::post::{truncate_chars, OutreachDraft, Post};

pub const OPPORTUNITY_COLUMNS: [&str; 8] = [
    "source_platform",
    "url",
    "title_snippet",
    "topic_label",
    "intent_score",
    "recommended_action",
    "suggested_response",
    "why_this_matters",
];

pub const DRAFT_COLUMNS: [&str; 7] = [
    "platform",
    "url",
    "post_title",
    "action_type",
    "draft_message",
    "intent_score",
    "reason_for_outreach",
];

const TITLE_SNIPPET_CHARS: usize = 100;

#[derive(Debug, Serialize)]
struct OpportunityRow<'a> {
    source_platform: &'a str,
    url: &'a str,
    title_snippet: String,
    topic_label: &'a str,
    intent_score: u8,
    recommended_action: &'a str,
    suggested_response: &'a str,
    why_this_matters: &'a str,
}

impl<'a> From<&'a Post> for OpportunityRow<'a> {
    fn from(p: &'a Post) -> Self {
        let title_snippet = format!(
            "{} {}",
            p.title,
            truncate_chars(&p.snippet, TITLE_SNIPPET_CHARS)
        )
        .trim()
        .to_string();
        let scoring = p.scoring();
        Self {
            source_platform: p.source.as_str(),
            url: &p.url,
            title_snippet,
            topic_label: scoring.map(|s| s.topic_label.as_str()).unwrap_or_default(),
            intent_score: scoring.map(|s| s.intent_score).unwrap_or(0),
            recommended_action: scoring
                .map(|s| s.recommended_action.as_str())
                .unwrap_or_default(),
            suggested_response: scoring
                .map(|s| s.suggested_response.as_str())
                .unwrap_or_default(),
            why_this_matters: scoring
                .map(|s| s.why_this_matters.as_str())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DraftRow<'a> {
    platform: &'a str,
    url: &'a str,
    post_title: &'a str,
    action_type: &'a str,
    draft_message: &'a str,
    intent_score: u8,
    reason_for_outreach: &'a str,
}

impl<'a> From<&'a OutreachDraft> for DraftRow<'a> {
    fn from(d: &'a OutreachDraft) -> Self {
        Self {
            platform: d.platform.as_str(),
            url: &d.url,
            post_title: &d.post_title,
            action_type: d.action_type.as_str(),
            draft_message: &d.draft_message,
            intent_score: d.intent_score,
            reason_for_outreach: &d.reason_for_outreach,
        }
    }
}

/// Where one run's files went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub opportunities_csv: PathBuf,
    pub opportunities_json: PathBuf,
    pub drafts_csv: PathBuf,
}

impl ExportPaths {
    pub fn new(dir: &Path, stamp: &str) -> Self {
        Self {
            opportunities_csv: dir.join(format!("opportunities_{stamp}.csv")),
            opportunities_json: dir.join(format!("opportunities_{stamp}.json")),
            drafts_csv: dir.join(format!("outreach_drafts_{stamp}.csv")),
        }
    }
}

pub fn timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

pub fn write_opportunities_csv(path: &Path, posts: &[Post]) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    wtr.write_record(OPPORTUNITY_COLUMNS)?;
    for p in posts {
        wtr.serialize(OpportunityRow::from(p))
            .with_context(|| format!("writing row for {}", p.url))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub fn write_opportunities_json(path: &Path, posts: &[Post]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), posts)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_drafts_csv(path: &Path, drafts: &[OutreachDraft]) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    wtr.write_record(DRAFT_COLUMNS)?;
    for d in drafts {
        wtr.serialize(DraftRow::from(d))
            .with_context(|| format!("writing draft for {}", d.url))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

/// Write all three files into `dir` (created if missing).
pub fn export_run(
    dir: &Path,
    stamp: &str,
    opportunities: &[Post],
    drafts: &[OutreachDraft],
) -> Result<ExportPaths> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let paths = ExportPaths::new(dir, stamp);
    write_opportunities_csv(&paths.opportunities_csv, opportunities)?;
    write_opportunities_json(&paths.opportunities_json, opportunities)?;
    write_drafts_csv(&paths.drafts_csv, drafts)?;
    tracing::info!(
        target: "export",
        dir = %dir.display(),
        opportunities = opportunities.len(),
        drafts = drafts.len(),
        "results exported"
    );
    Ok(paths)
}
