//! Song lists for batch runs: local text files or remote playlist links.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::PlaylistResolver;
use crate::download_manager::sanitize_filename;

const BULLET_PREFIX: &str = "- ";
const UTF8_BOM: char = '\u{feff}';
const DEFAULT_PLAYLIST_NAME: &str = "playlist";

/// Song names to download, with the playlist's name when it has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub name: Option<String>,
    pub songs: Vec<String>,
}

/// Trims entries, strips a leading `"- "` bullet and drops blanks.
pub fn normalize_entries<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| {
            let entry = entry.as_ref().trim();
            entry
                .strip_prefix(BULLET_PREFIX)
                .unwrap_or(entry)
                .trim()
                .to_string()
        })
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Decodes playlist bytes as UTF-8, falling back to GBK (a superset of
/// GB2312) for lists saved by Chinese Windows editors.
fn decode_playlist(bytes: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches(UTF8_BOM).to_string());
    }

    let (text, had_errors) = encoding_rs::GBK.decode_without_bom_handling(bytes);
    if had_errors {
        bail!("playlist is neither UTF-8 nor GBK text");
    }
    debug!("Playlist decoded as GBK");
    Ok(text.into_owned())
}

/// Reads a playlist text file, one song per line.
pub fn read_playlist_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read playlist file: {:?}", path))?;
    let content =
        decode_playlist(&content).with_context(|| format!("Cannot decode {:?}", path))?;
    Ok(normalize_entries(content.lines()))
}

/// Whether a batch source is a remote playlist link rather than a file.
pub fn is_playlist_link(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Writes `playlist` to `<dir>/<name>.txt` as UTF-8, one song per line, so a
/// link-driven run can be repeated from the file. Replaces an existing file.
pub fn save_playlist(dir: &Path, playlist: &Playlist) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create playlist directory {:?}", dir))?;

    let name = playlist.name.as_deref().unwrap_or(DEFAULT_PLAYLIST_NAME);
    let path = dir.join(format!("{}.txt", sanitize_filename(name)));
    let content: String = playlist
        .songs
        .iter()
        .map(|song| format!("{}\n", song))
        .collect();
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write playlist {:?}", path))?;

    info!("Playlist saved to {:?}", path);
    Ok(path)
}

/// Loads a playlist from a share link (through `resolver`) or a local file.
pub async fn load_playlist(source: &str, resolver: &dyn PlaylistResolver) -> Result<Playlist> {
    if is_playlist_link(source) {
        let playlist = resolver.fetch_playlist(source).await?;
        info!(
            "Playlist {} has {} songs",
            playlist.name.as_deref().unwrap_or("<unnamed>"),
            playlist.songs.len()
        );
        return Ok(playlist);
    }

    let songs = read_playlist_file(Path::new(source))?;
    info!("Read {} songs from {}", songs.len(), source);
    Ok(Playlist { name: None, songs })
}
