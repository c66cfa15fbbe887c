//! Readiness polling policy.

use crate::lifecycle::Container;
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::time::Duration;

/// Engine-specific check that the database inside a container accepts queries.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Must return `false` rather than fail when the engine is unreachable.
    async fn is_ready(&self, runtime: &dyn ContainerRuntime, container: &Container) -> bool;
}

/// Delay between readiness attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Always wait one interval.
    #[default]
    Fixed,
    /// Multiply the interval by `factor` after each attempt, capped at `max`.
    Exponential { factor: u32, max: Duration },
}

impl Backoff {
    /// Delay after the zero-based `attempt`.
    pub fn delay(&self, attempt: u32, interval: Duration) -> Duration {
        match self {
            Backoff::Fixed => interval,
            Backoff::Exponential { factor, max } => {
                let multiplier = factor.checked_pow(attempt).unwrap_or(u32::MAX);
                interval.saturating_mul(multiplier).min(*max)
            }
        }
    }
}

/// How often and how long to poll a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: Backoff::Fixed,
        }
    }
}

impl ReadinessPolicy {
    pub fn new(interval: Duration, backoff: Backoff) -> Self {
        Self { interval, backoff }
    }

    /// Number of probe attempts for `timeout`: `ceil(timeout / interval)`, at least one.
    pub fn max_attempts(&self, timeout: Duration) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let attempts = timeout.as_nanos().div_ceil(self.interval.as_nanos());
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// Suspends the readiness loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
