//! Collaborators that talk to the outside world on behalf of the pipeline:
//! song resolution, lyrics, playlists and audio tag writing.

mod client;
mod lyrics;
pub mod models;
mod playlist;
mod tagging;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::download_manager::QualityTier;

pub use client::{HttpLyricsSource, HttpPlaylistResolver, SongApiClient};
pub use lyrics::{merge_translated_lyrics, strip_jsonp};
pub use playlist::{
    is_playlist_link, load_playlist, normalize_entries, read_playlist_file, save_playlist, Playlist,
};
pub use tagging::LoftyTagWriter;

/// A song the resolver found, with a direct media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSong {
    pub title: String,
    pub artist: String,
    pub media_url: String,
    pub cover_url: Option<String>,
    /// Upstream identifier used to fetch lyrics
    pub track_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no result for '{0}'")]
    NotFound(String),

    #[error("resolver request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected resolver response: {0}")]
    InvalidResponse(String),
}

/// Turns a keyword into a downloadable song at a given quality.
#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(
        &self,
        keyword: &str,
        result_index: u32,
        tier: QualityTier,
    ) -> Result<ResolvedSong, ResolveError>;

    /// Raw bytes of a cover image.
    async fn fetch_cover(&self, url: &str) -> Result<Vec<u8>>;
}

/// Source of time-tagged lyrics, keyed by the resolver's track id.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// `Ok(None)` when the track simply has no lyrics.
    async fn fetch_lyrics(&self, track_id: &str) -> Result<Option<String>>;
}

/// Writes metadata into a downloaded audio file.
///
/// Callers treat every failure as non-fatal.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn embed_cover(&self, path: &Path, image: &[u8]) -> Result<()>;
    async fn embed_lyrics(&self, path: &Path, lyrics: &str) -> Result<()>;
}

/// Expands a remote playlist link into song names.
#[async_trait]
pub trait PlaylistResolver: Send + Sync {
    async fn fetch_playlist(&self, link: &str) -> Result<Playlist>;
}
