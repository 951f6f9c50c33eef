//! HTTP clients for the song, lyrics and playlist services.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::REFERER;
use tracing::debug;

use super::lyrics::{merge_translated_lyrics, strip_jsonp, unescape_lyrics};
use super::models::{
    LyricsResponse, PlaylistApiResponse, SongApiResponse, PLAYLIST_API_OK, SONG_API_OK,
};
use super::playlist::{normalize_entries, Playlist};
use super::{LyricsSource, PlaylistResolver, ResolveError, ResolvedSong, SongResolver};
use crate::download_manager::{display_key, QualityTier};

const LYRICS_REFERER: &str = "https://y.qq.com/";
const PLAYLIST_REFERER: &str = "https://music.unmeta.cn/";
const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Client for the keyword-search song API.
pub struct SongApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl SongApiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SongResolver for SongApiClient {
    async fn resolve(
        &self,
        keyword: &str,
        result_index: u32,
        tier: QualityTier,
    ) -> Result<ResolvedSong, ResolveError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("word", keyword.to_string()),
                ("n", result_index.to_string()),
                ("q", tier.value().to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SongApiResponse = response.json().await?;
        if body.code != SONG_API_OK {
            debug!(
                code = body.code,
                "Song API miss for '{}': {}",
                keyword,
                body.msg.as_deref().unwrap_or("no message")
            );
            return Err(ResolveError::NotFound(keyword.to_string()));
        }

        let data = body
            .data
            .ok_or_else(|| ResolveError::InvalidResponse("success without data".to_string()))?;
        if data.url.trim().is_empty() {
            return Err(ResolveError::NotFound(keyword.to_string()));
        }

        let title = match data.song.trim() {
            "" => display_key(keyword).to_string(),
            song => song.to_string(),
        };
        let artist = match data.singer.trim() {
            "" => UNKNOWN_ARTIST.to_string(),
            singer => singer.to_string(),
        };

        Ok(ResolvedSong {
            title,
            artist,
            media_url: data.url.trim().to_string(),
            cover_url: Some(data.cover.trim().to_string()).filter(|c| !c.is_empty()),
            track_id: data.songmid(),
        })
    }

    async fn fetch_cover(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch cover image")?;

        if !response.status().is_success() {
            bail!("Cover download failed with status: {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read cover image")?;
        Ok(bytes.to_vec())
    }
}

/// Lyrics endpoint returning JSONP with original and translated LRC text.
pub struct HttpLyricsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpLyricsSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LyricsSource for HttpLyricsSource {
    async fn fetch_lyrics(&self, track_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("nobase64", "1"),
                ("songmid", track_id),
                ("platform", "yqq"),
                ("inCharset", "utf8"),
                ("outCharset", "utf-8"),
                ("g_tk", "5381"),
            ])
            .header(REFERER, LYRICS_REFERER)
            .send()
            .await
            .context("Failed to connect to lyrics service")?;

        if !response.status().is_success() {
            bail!("Lyrics request failed with status: {}", response.status());
        }

        let text = response
            .text()
            .await
            .context("Failed to read lyrics response")?;
        let payload: LyricsResponse =
            serde_json::from_str(strip_jsonp(&text)).context("Failed to parse lyrics response")?;
        if payload.retcode != 0 {
            bail!("Lyrics service answered retcode {}", payload.retcode);
        }

        let original = unescape_lyrics(&payload.lyric);
        let translation = unescape_lyrics(&payload.trans);
        let merged = merge_translated_lyrics(&original, &translation);
        Ok(Some(merged).filter(|lyrics| !lyrics.is_empty()))
    }
}

/// Playlist expansion service: POST a share link, get back song names.
pub struct HttpPlaylistResolver {
    client: reqwest::Client,
    url: String,
}

impl HttpPlaylistResolver {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PlaylistResolver for HttpPlaylistResolver {
    async fn fetch_playlist(&self, link: &str) -> Result<Playlist> {
        let response = self
            .client
            .post(&self.url)
            .header(REFERER, PLAYLIST_REFERER)
            .form(&[("url", link)])
            .send()
            .await
            .context("Failed to connect to playlist service")?;

        if !response.status().is_success() {
            bail!("Playlist request failed with status: {}", response.status());
        }

        let body: PlaylistApiResponse = response
            .json()
            .await
            .context("Failed to parse playlist response")?;
        if body.code != PLAYLIST_API_OK {
            bail!(
                "Playlist service rejected {}: {}",
                link,
                body.msg.unwrap_or_default()
            );
        }

        let data = body.data.context("Playlist response has no data")?;
        if let Some(count) = data.songs_count {
            debug!("Playlist '{}' announces {} songs", data.name, count);
        }

        Ok(Playlist {
            name: Some(data.name.trim().to_string()).filter(|name| !name.is_empty()),
            songs: normalize_entries(data.songs),
        })
    }
}
