use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and record the run's static settings.
    pub fn init(min_intent_score: u8, max_results: usize) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("listening_min_intent_score").set(f64::from(min_intent_score));
        gauge!("listening_max_results").set(max_results as f64);

        Ok(Self { handle })
    }

    /// Prometheus exposition text for everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the snapshot as `metrics_{stamp}.prom` next to the exports.
    pub fn write_snapshot(&self, dir: &Path, stamp: &str) -> Result<PathBuf> {
        let path = dir.join(format!("metrics_{stamp}.prom"));
        std::fs::write(&path, self.render())
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
