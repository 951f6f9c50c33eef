//! Acquisition of a single song at a single quality tier.
//!
//! The default [`ResolvingAcquirer`] resolves the song, streams it to a
//! temporary file, embeds cover and lyrics on a best-effort basis, then moves
//! the file to a collision-free final name in the output directory. In
//! lyrics-only mode it stops after resolution and writes just the `.lrc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::events::{EventSink, PipelineEvent};
use super::fingerprint::{try_record_in_ledger, AUDIO_EXTENSIONS};
use super::models::{AcquiredSong, DownloadError, LyricsOptions, SongDescriptor};
use super::quality::QualityTier;
use super::transfer::{ChunkedTransfer, TransferError, TransferProgress};
use crate::config::StorageSettings;
use crate::downloader::{LyricsSource, ResolveError, ResolvedSong, SongResolver, TagWriter};

const DEFAULT_EXTENSION: &str = "mp3";
const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_FILENAME: &str = "untitled";

/// Performs one acquisition attempt.
#[async_trait]
pub trait SongAcquirer: Send + Sync {
    async fn acquire(
        &self,
        descriptor: &SongDescriptor,
        tier: QualityTier,
        lyrics: LyricsOptions,
    ) -> Result<AcquiredSong, DownloadError>;
}

/// Container extension for a media URL.
///
/// Uses the URL path's extension when it has one: a known audio container
/// is kept, anything else becomes `mp3`. Only extensionless paths sniff the
/// whole URL for a container name.
pub fn audio_extension(media_url: &str) -> &'static str {
    let path_extension = reqwest::Url::parse(media_url).ok().and_then(|url| {
        let file_name = url.path_segments()?.next_back()?.to_string();
        let (_, ext) = file_name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    });

    if let Some(ext) = path_extension {
        return AUDIO_EXTENSIONS
            .iter()
            .find(|known| **known == ext)
            .copied()
            .unwrap_or(DEFAULT_EXTENSION);
    }

    let lowered = media_url.to_ascii_lowercase();
    ["flac", "m4a", "mp3"]
        .into_iter()
        .find(|candidate| lowered.contains(candidate))
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Replaces characters that are invalid in file names with spaces.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// First free path among `stem.ext`, `stem (1).ext`, `stem (2).ext`, ...
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| dir.join(format!("{} ({}).{}", stem, n, ext)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

fn classify_resolve_error(descriptor: &SongDescriptor, error: ResolveError) -> DownloadError {
    match error {
        ResolveError::NotFound(_) => DownloadError::miss(format!("no result for '{}'", descriptor)),
        other => DownloadError::network(other.to_string()),
    }
}

fn classify_transfer_error(error: TransferError) -> DownloadError {
    match error {
        TransferError::Io { .. } => DownloadError::io(error.to_string()),
        other => DownloadError::network(other.to_string()),
    }
}

/// Resolver + transfer + tagging, writing into one flat output directory.
pub struct ResolvingAcquirer {
    resolver: Arc<dyn SongResolver>,
    lyrics_source: Option<Arc<dyn LyricsSource>>,
    tag_writer: Arc<dyn TagWriter>,
    transfer: ChunkedTransfer,
    events: Arc<dyn EventSink>,
    output_dir: PathBuf,
    ledger: Option<PathBuf>,
}

impl ResolvingAcquirer {
    pub fn new(
        resolver: Arc<dyn SongResolver>,
        tag_writer: Arc<dyn TagWriter>,
        transfer: ChunkedTransfer,
        storage: &StorageSettings,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            resolver,
            lyrics_source: None,
            tag_writer,
            transfer,
            events,
            output_dir: storage.output_dir.clone(),
            ledger: storage.ledger.clone(),
        }
    }

    pub fn with_lyrics_source(mut self, lyrics_source: Arc<dyn LyricsSource>) -> Self {
        self.lyrics_source = Some(lyrics_source);
        self
    }

    async fn download_to_temp(
        &self,
        descriptor: &SongDescriptor,
        resolved: &ResolvedSong,
        ext: &str,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let temp_path = self.output_dir.join(format!(
            "temp_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            ext
        ));

        let events = self.events.clone();
        let mut on_progress = |progress: TransferProgress| {
            events.emit(PipelineEvent::Progress {
                descriptor,
                progress,
            })
        };

        match self
            .transfer
            .transfer(&resolved.media_url, &temp_path, &mut on_progress)
            .await
        {
            Ok(0) => {
                remove_quietly(&temp_path).await;
                Err(DownloadError::miss(format!(
                    "empty media body for '{}'",
                    descriptor
                )))
            }
            Ok(bytes) => Ok((temp_path, bytes)),
            Err(e) => {
                remove_quietly(&temp_path).await;
                Err(classify_transfer_error(e))
            }
        }
    }

    async fn write_lyrics_only(
        &self,
        descriptor: &SongDescriptor,
        resolved: ResolvedSong,
        tier: QualityTier,
        lyrics: LyricsOptions,
    ) -> Result<AcquiredSong, DownloadError> {
        let Some(text) = self.fetch_lyrics(&resolved, lyrics).await else {
            return Err(DownloadError::miss(format!("no lyrics for '{}'", descriptor)));
        };

        // Same stem the audio file would get; an existing .lrc is replaced
        let stem = sanitize_filename(&format!("{} - {}", resolved.title, resolved.artist));
        let lrc_path = self.output_dir.join(format!("{}.lrc", stem));
        tokio::fs::write(&lrc_path, &text)
            .await
            .map_err(|e| DownloadError::io(format!("cannot write {:?}: {}", lrc_path, e)))?;

        Ok(AcquiredSong {
            path: lrc_path,
            title: resolved.title,
            artist: resolved.artist,
            tier,
            bytes: text.len() as u64,
        })
    }

    async fn embed_cover(&self, path: &Path, resolved: &ResolvedSong) {
        let Some(cover_url) = &resolved.cover_url else {
            return;
        };
        let result = match self.resolver.fetch_cover(cover_url).await {
            Ok(image) => self.tag_writer.embed_cover(path, &image).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Cover not embedded for {:?}: {:#}", path, e);
        }
    }

    async fn fetch_lyrics(&self, resolved: &ResolvedSong, lyrics: LyricsOptions) -> Option<String> {
        if !lyrics.wanted() {
            return None;
        }
        let source = self.lyrics_source.as_ref()?;
        let track_id = resolved.track_id.as_deref()?;
        match source.fetch_lyrics(track_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Lyrics unavailable for {}: {:#}", resolved.title, e);
                None
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Could not remove {:?}: {}", path, e);
    }
}

#[async_trait]
impl SongAcquirer for ResolvingAcquirer {
    async fn acquire(
        &self,
        descriptor: &SongDescriptor,
        tier: QualityTier,
        lyrics: LyricsOptions,
    ) -> Result<AcquiredSong, DownloadError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                DownloadError::io(format!("cannot create {:?}: {}", self.output_dir, e))
            })?;

        let resolved = self
            .resolver
            .resolve(&descriptor.search_term, descriptor.result_index, tier)
            .await
            .map_err(|e| classify_resolve_error(descriptor, e))?;
        debug!(
            "Resolved {} to '{} - {}'",
            descriptor, resolved.title, resolved.artist
        );

        if lyrics.only_file {
            return self
                .write_lyrics_only(descriptor, resolved, tier, lyrics)
                .await;
        }

        let ext = audio_extension(&resolved.media_url);
        let (temp_path, bytes) = self.download_to_temp(descriptor, &resolved, ext).await?;

        self.embed_cover(&temp_path, &resolved).await;
        let lyrics_text = self.fetch_lyrics(&resolved, lyrics).await;
        if let (Some(text), true) = (&lyrics_text, lyrics.embed) {
            if let Err(e) = self.tag_writer.embed_lyrics(&temp_path, text).await {
                warn!("Lyrics not embedded for {}: {:#}", descriptor, e);
            }
        }

        let stem = sanitize_filename(&format!("{} - {}", resolved.title, resolved.artist));
        let final_path = unique_path(&self.output_dir, &stem, ext);
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            remove_quietly(&temp_path).await;
            return Err(DownloadError::io(format!(
                "cannot move download to {:?}: {}",
                final_path, e
            )));
        }

        if let (Some(text), true) = (&lyrics_text, lyrics.write_file) {
            let lrc_path = final_path.with_extension("lrc");
            if let Err(e) = tokio::fs::write(&lrc_path, text).await {
                warn!("Could not write {:?}: {}", lrc_path, e);
            }
        }

        if let Some(file_name) = final_path.file_name().and_then(|n| n.to_str()) {
            try_record_in_ledger(self.ledger.as_deref(), file_name);
        }

        Ok(AcquiredSong {
            path: final_path,
            title: resolved.title,
            artist: resolved.artist,
            tier,
            bytes,
        })
    }
}
