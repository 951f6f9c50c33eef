//! Download Manager module
//!
//! Queue-backed and batch acquisition of songs: dedup against the output
//! store, quality fallback, chunked transfers and dead-lettering.

mod acquirer;
mod batch;
mod broker;
mod events;
pub mod fingerprint;
mod job_processor;
mod models;
mod quality;
mod report;
mod retry_policy;
mod throttle;
mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

pub use acquirer::{audio_extension, sanitize_filename, unique_path, ResolvingAcquirer, SongAcquirer};
pub use batch::{BatchOptions, BatchOrchestrator};
pub use broker::{AmqpBroker, BrokerError, BrokerSession, Delivery, JobBroker, QueueTopology};
pub use events::{EventSink, PipelineEvent, TracingEventSink};
pub use fingerprint::FingerprintSet;
pub use job_processor::{QueueWorker, WorkerState, WorkerStats};
pub use models::*;
pub use quality::{InvalidQualityTier, QualityLadder, QualityTier, SUPPORTED_TIERS};
pub use report::{BatchReport, ReportWriter};
pub use retry_policy::{FallbackOutcome, QualityFallbackPolicy};
pub use throttle::{NoOpPacer, Pacer, RandomPacer};
pub use transfer::{ChunkedTransfer, ProgressReporter, TransferError, TransferProgress};
