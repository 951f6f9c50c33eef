//! Sequential batch runs over an in-process song list.
//!
//! Same skip / fallback decisions as the queue worker, without a broker.
//! Every run ends with a report on disk, whether it completed or was stopped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::acquirer::SongAcquirer;
use super::events::{EventSink, PipelineEvent};
use super::fingerprint::FingerprintSet;
use super::models::{LyricsOptions, SongDescriptor};
use super::quality::QualityTier;
use super::report::{BatchReport, ReportWriter};
use super::retry_policy::{FallbackOutcome, QualityFallbackPolicy};

/// Per-run options shared by every song in the list.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub quality_tier: QualityTier,
    pub lyrics: LyricsOptions,
    /// Names the report file when the list came from a playlist
    pub playlist_name: Option<String>,
}

pub struct BatchOrchestrator {
    acquirer: Arc<dyn SongAcquirer>,
    policy: QualityFallbackPolicy,
    events: Arc<dyn EventSink>,
    reports: ReportWriter,
    fingerprints: FingerprintSet,
}

impl BatchOrchestrator {
    pub fn new(
        acquirer: Arc<dyn SongAcquirer>,
        policy: QualityFallbackPolicy,
        events: Arc<dyn EventSink>,
        reports: ReportWriter,
        fingerprints: FingerprintSet,
    ) -> Self {
        Self {
            acquirer,
            policy,
            events,
            reports,
            fingerprints,
        }
    }

    pub fn fingerprints(&self) -> &FingerprintSet {
        &self.fingerprints
    }

    /// Processes `songs` one at a time. `stop` is checked before each entry
    /// and between quality attempts; an entry interrupted by it is left out
    /// of the report.
    pub async fn run(
        &mut self,
        songs: &[String],
        options: &BatchOptions,
        stop: &CancellationToken,
    ) -> BatchReport {
        let total = songs.len();
        let mut report = BatchReport::new(
            total,
            options.quality_tier,
            options.lyrics,
            options.playlist_name.clone(),
        );
        info!("Batch of {} songs at quality {}", total, options.quality_tier);

        for (index, song) in songs.iter().enumerate() {
            if stop.is_cancelled() {
                info!("Batch stopped after {} of {} entries", index, total);
                report.stopped_early = true;
                break;
            }

            let song = song.trim();
            if song.is_empty() {
                continue;
            }

            let descriptor = SongDescriptor::new(song, options.quality_tier);
            if self.fingerprints.contains(&descriptor.display_key) {
                self.events.emit(PipelineEvent::Skipped {
                    descriptor: &descriptor,
                });
                report.skipped.push(song.to_string());
                continue;
            }

            info!("[{}/{}] Processing {}", index + 1, total, song);
            let outcome = self
                .policy
                .acquire_with_fallback(
                    &descriptor,
                    options.quality_tier,
                    options.lyrics,
                    self.acquirer.as_ref(),
                    stop,
                )
                .await;

            match outcome {
                FallbackOutcome::Acquired(_) => {
                    self.fingerprints.insert(descriptor.display_key.clone());
                    report.succeeded.push(song.to_string());
                }
                FallbackOutcome::Exhausted { .. } => report.failed.push(song.to_string()),
                FallbackOutcome::Cancelled => {
                    info!("Batch stopped during {}", song);
                    report.stopped_early = true;
                    break;
                }
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len()
        );
        if let Err(e) = self.reports.write(&report) {
            error!("Failed to save download report: {:#}", e);
        }
        report
    }
}
