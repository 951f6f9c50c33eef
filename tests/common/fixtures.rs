//! Test fixtures
//!
//! Temporary storage layouts and acquirers wired to a [`TestServer`].

use super::server::TestServer;
use song_pipeline::config::{StorageSettings, TransferSettings};
use song_pipeline::download_manager::{ChunkedTransfer, EventSink, ResolvingAcquirer, TracingEventSink};
use song_pipeline::downloader::{HttpLyricsSource, LoftyTagWriter, SongApiClient};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Output directory, ledger, reports and playlists directories under one
/// temp dir.
pub struct Workspace {
    pub storage: StorageSettings,
    _dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let storage = StorageSettings {
            output_dir: dir.path().join("downloads"),
            ledger: Some(dir.path().join("ledger.txt")),
            reports_dir: dir.path().join("reports"),
            playlists_dir: dir.path().join("playlists"),
        };
        Self { storage, _dir: dir }
    }

    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.storage.output_dir) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn ledger_lines(&self) -> Vec<String> {
        let ledger = self.storage.ledger.as_ref().unwrap();
        std::fs::read_to_string(ledger)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn reports(&self) -> Vec<String> {
        match std::fs::read_dir(&self.storage.reports_dir) {
            Ok(entries) => entries
                .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Transfer settings with a short progress interval.
pub fn transfer_settings() -> TransferSettings {
    TransferSettings {
        progress_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

/// The HTTP-backed acquirer pointed at `server`.
pub fn http_acquirer(
    server: &TestServer,
    storage: &StorageSettings,
    events: Option<Arc<dyn EventSink>>,
) -> ResolvingAcquirer {
    let client = reqwest::Client::new();
    let events = events.unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);
    ResolvingAcquirer::new(
        Arc::new(SongApiClient::new(client.clone(), server.song_api_url())),
        Arc::new(LoftyTagWriter::new()),
        ChunkedTransfer::new(client.clone(), transfer_settings()),
        storage,
        events,
    )
    .with_lyrics_source(Arc::new(HttpLyricsSource::new(client, server.lyrics_url())))
}
