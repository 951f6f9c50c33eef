//! Human-readable summary of one batch run.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::info;

use super::acquirer::sanitize_filename;
use super::models::LyricsOptions;
use super::quality::QualityTier;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DEFAULT_REPORT_PREFIX: &str = "download_report";

/// Outcome lists of a batch run, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Entries in the input, blanks included
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub quality_tier: QualityTier,
    pub lyrics: LyricsOptions,
    pub playlist_name: Option<String>,
    /// The stop signal ended the run before the last entry
    pub stopped_early: bool,
    pub started_at: DateTime<Local>,
}

impl BatchReport {
    pub fn new(
        total: usize,
        quality_tier: QualityTier,
        lyrics: LyricsOptions,
        playlist_name: Option<String>,
    ) -> Self {
        Self {
            total,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            quality_tier,
            lyrics,
            playlist_name,
            stopped_early: false,
            started_at: Local::now(),
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// File name for this report, derived from the playlist name when known.
    pub fn file_name(&self) -> String {
        let timestamp = self.started_at.format(TIMESTAMP_FORMAT);
        match &self.playlist_name {
            Some(name) => format!("{}_{}.txt", sanitize_filename(name), timestamp),
            None => format!("{}_{}.txt", DEFAULT_REPORT_PREFIX, timestamp),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Download time: {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(name) = &self.playlist_name {
            let _ = writeln!(out, "Playlist: {}", name);
        }
        let _ = writeln!(out, "Total: {}", self.total);
        let _ = writeln!(out, "Succeeded: {}", self.succeeded.len());
        let _ = writeln!(out, "Failed: {}", self.failed.len());
        let _ = writeln!(out, "Skipped: {}", self.skipped.len());
        let _ = writeln!(
            out,
            "Quality: {} | lyrics file: {} | embedded lyrics: {} | lyrics only: {}",
            self.quality_tier,
            yes_no(self.lyrics.write_file),
            yes_no(self.lyrics.embed),
            yes_no(self.lyrics.only_file)
        );
        if self.stopped_early {
            let _ = writeln!(out, "Stopped before the end of the list");
        }

        for (title, songs) in [
            ("Downloaded songs:", &self.succeeded),
            ("Failed songs:", &self.failed),
            ("Skipped songs:", &self.skipped),
        ] {
            if songs.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{}", title);
            for song in songs {
                let _ = writeln!(out, "- {}", song);
            }
        }
        out
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Writes reports into one directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, report: &BatchReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create reports directory {:?}", self.dir))?;
        let path = self.dir.join(report.file_name());
        std::fs::write(&path, report.render())
            .with_context(|| format!("Failed to write report {:?}", path))?;
        info!("Download report saved to {:?}", path);
        Ok(path)
    }
}
