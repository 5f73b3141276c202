//! Social listening agent: binary entrypoint.
//! Loads the run configuration, drives the search/score/refine loop, drafts
//! outreach for the final opportunities and exports everything to disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_listening::config::RunConfig;
use social_listening::controller::{RefinementLoop, RunSettings};
use social_listening::export::{export_run, timestamp};
use social_listening::ingest::{providers::build_sources, SourceAggregator};
use social_listening::metrics::Metrics;
use social_listening::oracle::build_oracles;
use social_listening::outreach::OutreachDrafter;
use social_listening::refiner::KeywordRefiner;
use social_listening::report::{draft_breakdown, render_top, RunSummary};
use social_listening::scorer::IntentScorer;

#[derive(Debug, Parser)]
#[command(name = "social-listening", version, about = "Find high-intent posts and draft outreach")]
struct Args {
    /// Run configuration (TOML or JSON). Falls back to $LISTENING_CONFIG_PATH,
    /// then config/listening.toml, then config/listening.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for exported CSV/JSON files and the metrics snapshot.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Override the configured refinement iteration ceiling.
    #[arg(long)]
    max_iterations: Option<u32>,
}

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper_util=warn,reqwest=warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();

    let mut cfg = RunConfig::load(args.config.as_deref()).context("loading run configuration")?;
    if let Some(n) = args.max_iterations {
        cfg.max_iterations = n;
        cfg.validate().context("applying --max-iterations")?;
    }

    let metrics = Metrics::init(cfg.min_intent_score, cfg.max_results)?;
    let oracles = build_oracles(&cfg).context("configuring oracles")?;
    let sources = build_sources(&cfg).context("configuring sources")?;
    info!(provider = oracles.provider, sources = sources.len(), model = %cfg.model, "run configured");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("ctrl-c received; finishing with what we have");
                cancel.cancel();
            }
        });
    }

    let run_loop = RefinementLoop::new(
        SourceAggregator::new(sources),
        IntentScorer::new(oracles.scoring.clone()),
        KeywordRefiner::new(oracles.refinement.clone()),
        RunSettings::from(&cfg),
    );
    let report = run_loop.run(&cancel).await;

    let summary = RunSummary::from_report(&report);
    print!("{}", summary.render());

    let drafts = OutreachDrafter::new(oracles.drafting.clone())
        .draft_all(&report.opportunities, &cfg.model, &cancel)
        .await;

    let stamp = timestamp(&chrono::Local::now());
    let paths = export_run(&args.output_dir, &stamp, &report.opportunities, &drafts)?;
    let snapshot = metrics.write_snapshot(&args.output_dir, &stamp)?;

    println!(
        "Saved {} opportunities:\n  {}\n  {}",
        report.opportunities.len(),
        paths.opportunities_csv.display(),
        paths.opportunities_json.display()
    );
    println!(
        "Saved {}:\n  {}",
        draft_breakdown(&drafts),
        paths.drafts_csv.display()
    );
    println!("Metrics snapshot: {}", snapshot.display());
    print!("\n{}", render_top(&report.opportunities, 5));

    info!(stop_reason = %report.stop_reason, "done");
    Ok(())
}
