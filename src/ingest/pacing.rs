//! Delay between outbound source requests, with random jitter, to stay
//! under external rate limits.

use std::time::Duration;

use rand::Rng;

use crate::config::PacingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacing {
    pub delay: Duration,
    pub jitter: Duration,
}

impl RequestPacing {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra)
    }

    pub async fn wait(&self) {
        let d = self.next_delay();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

impl From<&PacingConfig> for RequestPacing {
    fn from(cfg: &PacingConfig) -> Self {
        Self {
            delay: Duration::from_millis(cfg.delay_ms),
            jitter: Duration::from_millis(cfg.jitter_ms),
        }
    }
}
