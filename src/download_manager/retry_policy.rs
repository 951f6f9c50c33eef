//! Quality-fallback retry policy.
//!
//! Tries a song at the requested tier, then at each lower supported tier,
//! until one attempt succeeds. Also decides whether a failed queue job earns
//! another trip through the queue.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::acquirer::SongAcquirer;
use super::events::{EventSink, PipelineEvent};
use super::models::{AcquiredSong, DownloadError, LyricsOptions, SongDescriptor};
use super::quality::{QualityLadder, QualityTier};
use crate::config::RetrySettings;

/// Result of walking the quality ladder for one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    Acquired(AcquiredSong),
    /// Every tier failed, or a non-retryable error stopped the walk.
    Exhausted {
        last_error: Option<DownloadError>,
        attempts: usize,
    },
    /// The cancel token was set before an attempt.
    Cancelled,
}

impl FallbackOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, FallbackOutcome::Acquired(_))
    }
}

/// Quality fallback plus the queue-level retry ceiling.
#[derive(Clone)]
pub struct QualityFallbackPolicy {
    /// When false, exactly one attempt at the requested tier.
    pub auto_retry: bool,
    /// Number of re-publishes a queue job gets before dead-lettering.
    pub max_retries: u32,
    events: Arc<dyn EventSink>,
}

impl QualityFallbackPolicy {
    /// Create a new policy from configuration settings.
    pub fn new(settings: &RetrySettings, events: Arc<dyn EventSink>) -> Self {
        Self {
            auto_retry: settings.auto_retry,
            max_retries: settings.max_retries,
            events,
        }
    }

    /// Tiers to try for a request, best first.
    pub fn ladder_for(&self, requested: QualityTier) -> QualityLadder {
        if self.auto_retry {
            QualityLadder::from_requested(requested)
        } else {
            QualityLadder::single(requested)
        }
    }

    /// Walks the ladder until an attempt succeeds.
    ///
    /// `cancel` is checked before every attempt, never during one.
    pub async fn acquire_with_fallback(
        &self,
        descriptor: &SongDescriptor,
        requested: QualityTier,
        lyrics: LyricsOptions,
        acquirer: &dyn SongAcquirer,
        cancel: &CancellationToken,
    ) -> FallbackOutcome {
        let ladder = self.ladder_for(requested);
        let mut last_error = None;
        let mut attempts = 0;

        for tier in ladder.iter() {
            if cancel.is_cancelled() {
                self.events.emit(PipelineEvent::Cancelled { descriptor });
                return FallbackOutcome::Cancelled;
            }

            attempts += 1;
            self.events.emit(PipelineEvent::AttemptStarted {
                descriptor,
                tier,
                attempt: attempts,
                of: ladder.len(),
            });

            match acquirer.acquire(descriptor, tier, lyrics).await {
                Ok(song) => {
                    self.events.emit(PipelineEvent::Acquired {
                        descriptor,
                        tier,
                        path: &song.path,
                    });
                    return FallbackOutcome::Acquired(song);
                }
                Err(error) => {
                    self.events.emit(PipelineEvent::AttemptFailed {
                        descriptor,
                        tier,
                        error: &error,
                    });
                    let retryable = error.is_retryable();
                    last_error = Some(error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        self.events
            .emit(PipelineEvent::Exhausted { descriptor, attempts });
        FallbackOutcome::Exhausted {
            last_error,
            attempts,
        }
    }

    /// Whether a job that exhausted its ladder goes back on the queue.
    ///
    /// Returns true if:
    /// - The last error is retryable (or unknown)
    /// - The job has been re-published fewer than `max_retries` times
    pub fn should_requeue(&self, last_error: Option<&DownloadError>, retry_count: u32) -> bool {
        last_error.map_or(true, DownloadError::is_retryable) && retry_count < self.max_retries
    }
}

impl Default for QualityFallbackPolicy {
    fn default() -> Self {
        Self::new(
            &RetrySettings::default(),
            Arc::new(super::events::TracingEventSink),
        )
    }
}
