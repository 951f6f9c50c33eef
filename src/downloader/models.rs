//! Response shapes of the resolver, lyrics and playlist HTTP APIs.

use serde::Deserialize;

/// Success code of the song API envelope.
pub const SONG_API_OK: i64 = 200;
/// Success code of the playlist API envelope.
pub const PLAYLIST_API_OK: i64 = 1;

#[derive(Clone, Debug, Deserialize)]
pub struct SongApiResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<SongApiData>,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct SongApiData {
    pub song: String,
    pub singer: String,
    pub url: String,
    pub cover: String,
    pub link: String,
}

impl SongApiData {
    /// Track id carried by the share link's `songmid` query parameter.
    pub fn songmid(&self) -> Option<String> {
        let link = reqwest::Url::parse(&self.link).ok()?;
        link.query_pairs()
            .find(|(key, _)| key == "songmid")
            .map(|(_, id)| id.into_owned())
            .filter(|id| !id.is_empty())
    }
}

/// Lyrics payload once the JSONP wrapper is removed.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct LyricsResponse {
    pub retcode: i64,
    pub lyric: String,
    pub trans: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaylistApiResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<PlaylistApiData>,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct PlaylistApiData {
    pub name: String,
    pub songs: Vec<String>,
    pub songs_count: Option<u64>,
}
