//! Pacing between acquisitions.
//!
//! Spreads requests to the upstream services out with a randomized pause
//! after each successful or re-queued job.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PacingSettings;

/// Trait for pauses between jobs.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Sleeps for the next pause, returning early if `cancel` fires.
    async fn pause(&self, cancel: &CancellationToken);
}

/// Uniformly random pause between `min` and `max`, inclusive.
#[derive(Debug, Clone)]
pub struct RandomPacer {
    min: Duration,
    max: Duration,
}

impl RandomPacer {
    pub fn new(settings: &PacingSettings) -> Self {
        Self {
            min: settings.min_pause,
            max: settings.max_pause.max(settings.min_pause),
        }
    }

    pub fn next_pause(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min >= max {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

#[async_trait]
impl Pacer for RandomPacer {
    async fn pause(&self, cancel: &CancellationToken) {
        let pause = self.next_pause();
        debug!("Pausing {:.1}s before the next job", pause.as_secs_f64());
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// No-op pacer that never waits.
pub struct NoOpPacer;

#[async_trait]
impl Pacer for NoOpPacer {
    async fn pause(&self, _cancel: &CancellationToken) {}
}
