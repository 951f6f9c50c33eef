//! Data models for the download pipeline.
//!
//! Defines song descriptors, download jobs and their wire format, the error
//! taxonomy and per-message outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::quality::{QualityTier, DEFAULT_TIER};

/// Separator between the title and artist parts of a song name.
pub const DISPLAY_KEY_SEPARATOR: &str = " - ";

/// Derives the dedup identity of a song name: everything before the first
/// `" - "`, trimmed.
///
/// Lossy on purpose. "Intro - Band A" and "Intro - Band B" share the key
/// `"Intro"`, so the second one is treated as already downloaded.
pub fn display_key(name: &str) -> &str {
    match name.split_once(DISPLAY_KEY_SEPARATOR) {
        Some((head, _)) => head.trim(),
        None => name.trim(),
    }
}

/// One song to acquire, as named by a user, playlist or job producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongDescriptor {
    /// Dedup identity derived from `search_term`
    pub display_key: String,
    /// Keyword sent to the resolver, usually `"{title} - {artist}"`
    pub search_term: String,
    /// 1-based position in the resolver's search results
    pub result_index: u32,
    /// Tier requested by whoever created the descriptor
    pub quality_tier: QualityTier,
}

impl SongDescriptor {
    pub fn new(search_term: impl Into<String>, quality_tier: QualityTier) -> Self {
        let search_term = search_term.into().trim().to_string();
        Self {
            display_key: display_key(&search_term).to_string(),
            search_term,
            result_index: 1,
            quality_tier,
        }
    }

    pub fn with_result_index(mut self, result_index: u32) -> Self {
        self.result_index = result_index.max(1);
        self
    }
}

impl fmt::Display for SongDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.search_term)
    }
}

/// What to do with lyrics once the audio file is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LyricsOptions {
    /// Write a `.lrc` file next to the audio file
    pub write_file: bool,
    /// Embed the lyrics into the audio container's tags
    pub embed: bool,
    /// Skip the audio entirely and only write the `.lrc` file
    pub only_file: bool,
}

impl LyricsOptions {
    /// Lyrics-only mode: no audio transfer, just `<title> - <artist>.lrc`.
    pub fn only_file() -> Self {
        Self {
            write_file: true,
            embed: false,
            only_file: true,
        }
    }

    pub fn wanted(&self) -> bool {
        self.write_file || self.embed || self.only_file
    }
}

/// A download job, validated and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub descriptor: SongDescriptor,
    /// Number of times this job has already been re-published after failing
    pub retry_count: u32,
    pub lyrics: LyricsOptions,
}

/// Raw JSON message exchanged on the broker queue.
///
/// Field names and defaults are part of the producer contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub song_name: String,
    #[serde(default = "default_quality")]
    pub quality: i64,
    #[serde(default = "default_true")]
    pub download_lyrics: bool,
    #[serde(default = "default_true")]
    pub embed_lyrics: bool,
    #[serde(default)]
    pub only_lyrics: bool,
    /// 1-based pick among the resolver's search results
    #[serde(default = "default_index")]
    pub index: u32,
    #[serde(default)]
    pub retry_count: u32,
}

fn default_quality() -> i64 {
    DEFAULT_TIER as i64
}

fn default_index() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl JobMessage {
    /// A fresh job with the producer defaults.
    pub fn for_song(song_name: impl Into<String>) -> Self {
        Self {
            song_name: song_name.into(),
            quality: default_quality(),
            download_lyrics: true,
            embed_lyrics: true,
            only_lyrics: false,
            index: default_index(),
            retry_count: 0,
        }
    }
}

/// Reasons a queue payload cannot become a [`DownloadJob`].
#[derive(Debug, thiserror::Error)]
pub enum JobDecodeError {
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("job payload has an empty song_name")]
    EmptySongName,

    #[error("invalid quality: {0}")]
    InvalidQuality(#[from] super::quality::InvalidQualityTier),
}

impl DownloadJob {
    pub fn new(descriptor: SongDescriptor, lyrics: LyricsOptions) -> Self {
        Self {
            descriptor,
            retry_count: 0,
            lyrics,
        }
    }

    /// Validates a broker payload. Anything rejected here is a
    /// configuration error and never consumes a retry.
    pub fn decode(body: &[u8]) -> Result<Self, JobDecodeError> {
        let message: JobMessage = serde_json::from_slice(body)?;
        Self::try_from(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        // A JobMessage only holds strings, integers and booleans
        serde_json::to_vec(&self.to_message()).unwrap_or_default()
    }

    pub fn to_message(&self) -> JobMessage {
        JobMessage {
            song_name: self.descriptor.search_term.clone(),
            quality: self.descriptor.quality_tier.into(),
            download_lyrics: self.lyrics.write_file,
            embed_lyrics: self.lyrics.embed,
            only_lyrics: self.lyrics.only_file,
            index: self.descriptor.result_index,
            retry_count: self.retry_count,
        }
    }

    /// The job to re-publish after this attempt failed.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

impl TryFrom<JobMessage> for DownloadJob {
    type Error = JobDecodeError;

    fn try_from(message: JobMessage) -> Result<Self, Self::Error> {
        if message.song_name.trim().is_empty() {
            return Err(JobDecodeError::EmptySongName);
        }
        let tier = QualityTier::new(message.quality)?;
        Ok(Self {
            descriptor: SongDescriptor::new(message.song_name, tier)
                .with_result_index(message.index),
            retry_count: message.retry_count,
            lyrics: LyricsOptions {
                write_file: message.download_lyrics,
                embed: message.embed_lyrics,
                only_file: message.only_lyrics,
            },
        })
    }
}

/// Body published to the dead-letter queue: the job's fields plus a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The job as it was last seen, when the payload could be decoded
    #[serde(flatten)]
    pub job: Option<JobMessage>,
    pub reason: String,
    /// Original body for payloads that failed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl DeadLetter {
    pub fn exhausted(job: &DownloadJob, reason: impl Into<String>) -> Self {
        Self {
            job: Some(job.to_message()),
            reason: reason.into(),
            raw_body: None,
        }
    }

    pub fn rejected(body: &[u8], error: &JobDecodeError) -> Self {
        Self {
            job: None,
            reason: error.to_string(),
            raw_body: Some(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn song_name(&self) -> Option<&str> {
        self.job.as_ref().map(|job| job.song_name.as_str())
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Type of error encountered while acquiring a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorType {
    TransientNetwork, // connection reset, non-2xx, broker hiccup - retry
    ResolutionMiss,   // resolver had no result or no URL - next tier
    LocalIo,          // disk full, permission denied - surfaced as failure
    Configuration,    // invalid tier or payload - NO retry
}

impl DownloadErrorType {
    /// Returns true if this error type should consume a retry rather than
    /// going straight to the dead-letter queue.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadErrorType::Configuration)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadErrorType::TransientNetwork => "transient_network",
            DownloadErrorType::ResolutionMiss => "resolution_miss",
            DownloadErrorType::LocalIo => "local_io",
            DownloadErrorType::Configuration => "configuration",
        }
    }
}

impl fmt::Display for DownloadErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error_type}: {message}")]
pub struct DownloadError {
    pub error_type: DownloadErrorType,
    pub message: String,
}

impl DownloadError {
    pub fn new(error_type: DownloadErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DownloadErrorType::TransientNetwork, message)
    }

    pub fn miss(message: impl Into<String>) -> Self {
        Self::new(DownloadErrorType::ResolutionMiss, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(DownloadErrorType::LocalIo, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.error_type.is_retryable()
    }
}

/// A song that made it to its final place in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSong {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub tier: QualityTier,
    pub bytes: u64,
}

/// Terminal state of one broker message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Acquired,
    Skipped,
    Requeued,
    DeadLettered,
    /// Shutdown interrupted the attempt; the message went back to the broker
    Returned,
}
