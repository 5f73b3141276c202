//! Shared retry policy for oracle calls.
//!
//! Parse failures wait a fixed delay before the next attempt; transport
//! failures back off exponentially from `transport_base`. No sleep happens
//! after the final attempt. Cancellation is checked before every attempt
//! and interrupts a pending sleep.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::oracle::OracleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub parse_delay: Duration,
    pub transport_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, parse_delay: Duration, transport_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            parse_delay,
            transport_base,
        }
    }

    /// Scoring: 3 attempts, 2s after a malformed reply, 3s/6s after transport errors.
    pub fn scoring() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(3))
    }

    /// Drafting: 3 attempts, 2s between them.
    pub fn drafting() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(2))
    }

    /// Refinement is an optimization: one attempt, never retried.
    pub fn single_shot() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Same attempt budget, no waiting. Used by tests and offline runs.
    pub fn without_delays(self) -> Self {
        Self {
            parse_delay: Duration::ZERO,
            transport_base: Duration::ZERO,
            ..self
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32, err: &OracleError) -> Duration {
        match err {
            OracleError::Parse(_) => self.parse_delay,
            OracleError::Transport(_) => {
                let shift = attempt.saturating_sub(1).min(16);
                self.transport_base.saturating_mul(1u32 << shift)
            }
            OracleError::Cancelled => Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    /// Returns the last error on exhaustion.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, OracleError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        let mut last = OracleError::Cancelled;
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(OracleError::Cancelled) => return Err(OracleError::Cancelled),
                Err(e) => {
                    warn!(
                        target: "oracle",
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "oracle attempt failed"
                    );
                    if attempt < self.max_attempts {
                        counter!("listening_oracle_retries_total").increment(1);
                        let delay = self.delay_after(attempt, &e);
                        if !delay.is_zero() {
                            tokio::select! {
                                _ = cancel.cancelled() => return Err(OracleError::Cancelled),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// Like `run`, but never fails: exhaustion yields `fallback()`.
    pub async fn run_or_else<T, F, Fut, D>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        op: F,
        fallback: D,
    ) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
        D: FnOnce() -> T,
    {
        match self.run(label, cancel, op).await {
            Ok(v) => v,
            Err(_) => fallback(),
        }
    }
}
