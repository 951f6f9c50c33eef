//! Startup plumbing shared by the binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{self, AppConfig, CliConfig};
use crate::download_manager::{ChunkedTransfer, EventSink, ResolvingAcquirer};
use crate::downloader::{
    is_playlist_link, load_playlist, save_playlist, HttpLyricsSource, HttpPlaylistResolver,
    LoftyTagWriter, Playlist, SongApiClient,
};

pub const VERSION: &str = env!("PIPELINE_VERSION");

pub fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

/// Installs the fmt subscriber, filtered by `LOG_LEVEL` (default INFO).
pub fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialise logging")
}

/// Loads the optional TOML file and resolves it against the CLI values.
pub fn load_config(config_path: Option<&Path>, cli_config: &CliConfig) -> Result<AppConfig> {
    let file_config = match config_path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let app_config = AppConfig::resolve(cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  output_dir: {:?}", app_config.storage.output_dir);
    info!("  ledger: {:?}", app_config.storage.ledger);
    info!("  reports_dir: {:?}", app_config.storage.reports_dir);
    info!("  playlists_dir: {:?}", app_config.storage.playlists_dir);
    info!(
        "  auto_retry: {}, max_retries: {}",
        app_config.retry.auto_retry, app_config.retry.max_retries
    );
    info!("  api_url: {}", app_config.resolver.api_url);
    Ok(app_config)
}

/// The HTTP-backed acquirer: song API, lyrics endpoint, lofty tags.
pub fn build_acquirer(app_config: &AppConfig, events: Arc<dyn EventSink>) -> Result<ResolvingAcquirer> {
    let client = app_config.http_client()?;
    let resolver = Arc::new(SongApiClient::new(
        client.clone(),
        app_config.resolver.api_url.clone(),
    ));
    let lyrics = Arc::new(HttpLyricsSource::new(
        client.clone(),
        app_config.resolver.lyrics_url.clone(),
    ));
    let transfer = ChunkedTransfer::new(client, app_config.transfer.clone());

    Ok(ResolvingAcquirer::new(
        resolver,
        Arc::new(LoftyTagWriter::new()),
        transfer,
        &app_config.storage,
        events,
    )
    .with_lyrics_source(lyrics))
}

/// Loads the song list of a batch source. Remote playlists are also saved
/// under `playlists_dir`; a failed save is only logged.
pub async fn load_song_list(app_config: &AppConfig, source: &str) -> Result<Playlist> {
    let resolver = HttpPlaylistResolver::new(
        app_config.http_client()?,
        app_config.resolver.playlist_url.clone(),
    );
    let playlist = load_playlist(source, &resolver).await?;

    if is_playlist_link(source) {
        if let Err(e) = save_playlist(&app_config.storage.playlists_dir, &playlist) {
            warn!("Could not save playlist: {:#}", e);
        }
    }
    Ok(playlist)
}
