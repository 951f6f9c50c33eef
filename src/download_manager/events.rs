//! Pipeline decisions as structured events.
//!
//! Every component reports its skip/attempt/success/retry/dead-letter
//! decisions through an [`EventSink`] handed to it at construction.

use std::path::Path;

use tracing::{debug, info, warn};

use super::models::{DownloadError, SongDescriptor};
use super::quality::QualityTier;
use super::transfer::TransferProgress;

#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    Skipped {
        descriptor: &'a SongDescriptor,
    },
    AttemptStarted {
        descriptor: &'a SongDescriptor,
        tier: QualityTier,
        attempt: usize,
        of: usize,
    },
    AttemptFailed {
        descriptor: &'a SongDescriptor,
        tier: QualityTier,
        error: &'a DownloadError,
    },
    Acquired {
        descriptor: &'a SongDescriptor,
        tier: QualityTier,
        path: &'a Path,
    },
    Exhausted {
        descriptor: &'a SongDescriptor,
        attempts: usize,
    },
    Cancelled {
        descriptor: &'a SongDescriptor,
    },
    Progress {
        descriptor: &'a SongDescriptor,
        progress: TransferProgress,
    },
    Requeued {
        descriptor: &'a SongDescriptor,
        retry_count: u32,
    },
    DeadLettered {
        song_name: Option<&'a str>,
        reason: &'a str,
    },
}

/// Receiver of pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent<'_>);
}

/// Default sink, renders every event as a `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Skipped { descriptor } => {
                info!(key = %descriptor.display_key, "Already downloaded, skipping {}", descriptor)
            }
            PipelineEvent::AttemptStarted {
                descriptor,
                tier,
                attempt,
                of,
            } => info!(
                tier = tier.value(),
                "Attempt {}/{} for {} at quality {}", attempt, of, descriptor, tier
            ),
            PipelineEvent::AttemptFailed {
                descriptor,
                tier,
                error,
            } => warn!(
                tier = tier.value(),
                error_type = error.error_type.as_str(),
                "Quality {} failed for {}: {}",
                tier,
                descriptor,
                error.message
            ),
            PipelineEvent::Acquired {
                descriptor,
                tier,
                path,
            } => info!(
                tier = tier.value(),
                "Downloaded {} to {:?}", descriptor, path
            ),
            PipelineEvent::Exhausted {
                descriptor,
                attempts,
            } => warn!("Giving up on {} after {} attempts", descriptor, attempts),
            PipelineEvent::Cancelled { descriptor } => {
                info!("Stopped before acquiring {}", descriptor)
            }
            PipelineEvent::Progress {
                descriptor,
                progress,
            } => debug!("{}: {}", descriptor, progress),
            PipelineEvent::Requeued {
                descriptor,
                retry_count,
            } => info!(
                retry_count,
                "Re-queued {} (retry {})", descriptor, retry_count
            ),
            PipelineEvent::DeadLettered { song_name, reason } => warn!(
                "Dead-lettered {}: {}",
                song_name.unwrap_or("<undecodable job>"),
                reason
            ),
        }
    }
}
