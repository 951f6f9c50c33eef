//! Streaming HTTP download to a local file with throttled progress reports.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use byte_unit::{Byte, UnitType};
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::TransferSettings;

/// Snapshot of an in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub bytes_done: u64,
    /// Zero when the server did not announce a length
    pub bytes_total: u64,
    pub elapsed: Duration,
}

impl TransferProgress {
    /// Completion percentage, `None` when the total is unknown.
    pub fn percentage(&self) -> Option<f64> {
        if self.bytes_total == 0 {
            return None;
        }
        Some(self.bytes_done as f64 * 100.0 / self.bytes_total as f64)
    }

    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let done = Byte::from_u64(self.bytes_done).get_appropriate_unit(UnitType::Binary);
        let speed =
            Byte::from_u64(self.bytes_per_sec() as u64).get_appropriate_unit(UnitType::Binary);
        match self.percentage() {
            Some(pct) => write!(f, "{:.1}% of {:.1} | {:.1}/s", pct, total_of(self), speed),
            None => write!(f, "{:.1} | {:.1}/s", done, speed),
        }
    }
}

fn total_of(progress: &TransferProgress) -> byte_unit::AdjustedByte {
    Byte::from_u64(progress.bytes_total).get_appropriate_unit(UnitType::Binary)
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("connection lost after {bytes_done} bytes: {source}")]
    Stream {
        bytes_done: u64,
        source: reqwest::Error,
    },

    #[error("cannot write {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Decides when a progress report is due.
///
/// A report goes out when at least `interval` has elapsed since the previous
/// one (or since the start), plus exactly one final report from
/// [`ProgressReporter::finish`]. Over a transfer lasting `T` this yields at
/// most `ceil(T / interval) + 1` reports.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    bytes_total: u64,
    started: Instant,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(interval: Duration, bytes_total: u64, started: Instant) -> Self {
        Self {
            interval,
            bytes_total,
            started,
            last_report: started,
        }
    }

    pub fn observe(&mut self, bytes_done: u64) -> Option<TransferProgress> {
        self.observe_at(bytes_done, Instant::now())
    }

    pub fn observe_at(&mut self, bytes_done: u64, now: Instant) -> Option<TransferProgress> {
        if now.saturating_duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(self.snapshot(bytes_done, now))
    }

    pub fn finish(&mut self, bytes_done: u64) -> TransferProgress {
        self.finish_at(bytes_done, Instant::now())
    }

    pub fn finish_at(&mut self, bytes_done: u64, now: Instant) -> TransferProgress {
        self.last_report = now;
        self.snapshot(bytes_done, now)
    }

    fn snapshot(&self, bytes_done: u64, now: Instant) -> TransferProgress {
        TransferProgress {
            bytes_done,
            bytes_total: self.bytes_total,
            elapsed: now.saturating_duration_since(self.started),
        }
    }
}

/// Downloads a URL to a file, chunk by chunk.
///
/// No resume: every call starts from byte zero and truncates `dest`. On
/// failure the partial file is left in place for the caller to clean up.
#[derive(Clone)]
pub struct ChunkedTransfer {
    client: reqwest::Client,
    settings: TransferSettings,
}

impl ChunkedTransfer {
    pub fn new(client: reqwest::Client, settings: TransferSettings) -> Self {
        Self { client, settings }
    }

    /// Streams `source_url` into `dest_path`, returning the number of bytes
    /// written.
    pub async fn transfer(
        &self,
        source_url: &str,
        dest_path: &Path,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<u64, TransferError> {
        let started = Instant::now();
        let response = self.client.get(source_url).send().await?;
        if !response.status().is_success() {
            return Err(TransferError::Status(response.status()));
        }

        let bytes_total = response.content_length().unwrap_or(0);
        debug!(
            bytes_total,
            "Streaming {} to {:?}", source_url, dest_path
        );

        let io_error = |source| TransferError::Io {
            path: dest_path.to_path_buf(),
            source,
        };
        let file = File::create(dest_path).await.map_err(io_error)?;
        let mut writer = BufWriter::with_capacity(self.settings.chunk_size, file);
        let mut reporter =
            ProgressReporter::new(self.settings.progress_interval, bytes_total, started);

        let mut bytes_done = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| TransferError::Stream { bytes_done, source })?;
            writer.write_all(&chunk).await.map_err(io_error)?;
            bytes_done += chunk.len() as u64;
            if let Some(progress) = reporter.observe(bytes_done) {
                on_progress(progress);
            }
        }
        writer.flush().await.map_err(io_error)?;

        on_progress(reporter.finish(bytes_done));
        Ok(bytes_done)
    }
}
