//! Fake upstream services
//!
//! One axum server plays the song API, the lyrics endpoint, the playlist
//! service and the media CDN. Each test gets its own instance on a random
//! port; dropping it shuts the server down.

use super::constants::*;
use axum::body::Body;
use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone)]
struct UpstreamState {
    base_url: String,
    available_tiers: Arc<Mutex<Vec<u8>>>,
    media_file: Arc<Mutex<String>>,
    song_requests: Arc<Mutex<Vec<(String, u8)>>>,
    media_requests: Arc<Mutex<Vec<String>>>,
}

#[derive(Deserialize)]
struct SongQuery {
    word: String,
    #[allow(dead_code)]
    n: u32,
    q: u8,
}

#[derive(Deserialize)]
struct LyricsQuery {
    songmid: String,
}

pub fn sized_body() -> Vec<u8> {
    (0..SIZED_BODY_LEN).map(|i| (i % 251) as u8).collect()
}

fn chunk_stream(delay: Option<Duration>) -> Body {
    let stream = futures::stream::unfold(0usize, move |sent| async move {
        if sent == CHUNK_COUNT {
            return None;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Some((Ok::<_, std::io::Error>(vec![b'x'; CHUNK_LEN]), sent + 1))
    });
    Body::from_stream(stream)
}

async fn song_api(
    State(state): State<UpstreamState>,
    Query(query): Query<SongQuery>,
) -> Json<serde_json::Value> {
    state
        .song_requests
        .lock()
        .unwrap()
        .push((query.word.clone(), query.q));

    let available = state.available_tiers.lock().unwrap().contains(&query.q);
    if query.word == UNKNOWN_SONG || !available {
        return Json(json!({ "code": 201, "msg": "no result" }));
    }

    let (song, singer) = query.word.split_once(" - ").unwrap_or((query.word.as_str(), ""));
    let media_file = state.media_file.lock().unwrap().clone();
    Json(json!({
        "code": 200,
        "msg": "ok",
        "data": {
            "song": song.trim(),
            "singer": singer.trim(),
            "url": format!("{}/media/{}", state.base_url, media_file),
            "cover": format!("{}/cover.jpg", state.base_url),
            "link": format!("https://i.y.qq.com/v8/playsong.html?songmid={}&type=0", TRACK_ID),
        }
    }))
}

async fn media(State(state): State<UpstreamState>, Path(name): Path<String>) -> Response {
    state.media_requests.lock().unwrap().push(name.clone());
    match name.as_str() {
        "song.mp3" | "song.flac" => sized_body().into_response(),
        "chunked.mp3" => chunk_stream(None).into_response(),
        "slow.mp3" => chunk_stream(Some(Duration::from_millis(SLOW_CHUNK_DELAY_MS))).into_response(),
        "empty.mp3" => Vec::<u8>::new().into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cover() -> Vec<u8> {
    b"not really a jpeg".to_vec()
}

async fn lyrics(Query(query): Query<LyricsQuery>) -> String {
    let payload = if query.songmid == TRACK_ID {
        json!({ "retcode": 0, "lyric": ESCAPED_LYRIC, "trans": ESCAPED_TRANSLATION })
    } else {
        json!({ "retcode": -1901 })
    };
    format!("MusicJsonCallback({})", payload)
}

async fn playlist(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    if form.get("url").map(String::as_str) != Some(PLAYLIST_LINK) {
        return Json(json!({ "code": 0, "msg": "invalid link" }));
    }
    Json(json!({
        "code": 1,
        "msg": "ok",
        "data": {
            "name": PLAYLIST_NAME,
            "songs": ["- Song A - Artist X", "", "Song B - Artist Y"],
            "songs_count": 2,
        }
    }))
}

/// Fake upstream server instance
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    state: UpstreamState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new server on a random port. Songs resolve at every tier
    /// until [`TestServer::set_available_tiers`] says otherwise.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = UpstreamState {
            base_url: base_url.clone(),
            available_tiers: Arc::new(Mutex::new((1..=14).collect())),
            media_file: Arc::new(Mutex::new("song.mp3".to_string())),
            song_requests: Arc::new(Mutex::new(Vec::new())),
            media_requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/api/song", get(song_api))
            .route("/media/{name}", get(media))
            .route("/cover.jpg", get(cover))
            .route("/lyrics", get(lyrics))
            .route("/playlist", post(playlist))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(SERVER_READY_TIMEOUT_MS) {
            if client.get(self.url("/cover.jpg")).send().await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Test server did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn song_api_url(&self) -> String {
        self.url("/api/song")
    }

    pub fn lyrics_url(&self) -> String {
        self.url("/lyrics")
    }

    pub fn playlist_url(&self) -> String {
        self.url("/playlist")
    }

    /// Tiers at which the song API answers with a media URL.
    pub fn set_available_tiers(&self, tiers: &[u8]) {
        *self.state.available_tiers.lock().unwrap() = tiers.to_vec();
    }

    /// Media file name (under `/media/`) the song API points to.
    pub fn set_media_file(&self, name: &str) {
        *self.state.media_file.lock().unwrap() = name.to_string();
    }

    /// Quality tiers requested from the song API, in order.
    pub fn requested_tiers(&self) -> Vec<u8> {
        self.state
            .song_requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, tier)| *tier)
            .collect()
    }

    /// Media file names requested from the CDN, in order.
    pub fn requested_media(&self) -> Vec<String> {
        self.state.media_requests.lock().unwrap().clone()
    }

    /// Keywords searched on the song API, in order.
    pub fn requested_songs(&self) -> Vec<String> {
        self.state
            .song_requests
            .lock()
            .unwrap()
            .iter()
            .map(|(word, _)| word.clone())
            .collect()
    }
}
