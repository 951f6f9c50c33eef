use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use song_pipeline::cli_common::{self, parse_path, VERSION};
use song_pipeline::cli_style;
use song_pipeline::config;
use song_pipeline::download_manager::{
    fingerprint, BatchOptions, BatchOrchestrator, EventSink, LyricsOptions,
    QualityFallbackPolicy, QualityTier, ReportWriter, TracingEventSink,
};

fn parse_quality(s: &str) -> Result<QualityTier, String> {
    let value: i64 = s.parse().map_err(|e| format!("'{}' is not a number: {}", s, e))?;
    QualityTier::new(value).map_err(|e| e.to_string())
}

/// Downloads every song of a playlist file or playlist link, one at a time.
#[derive(Parser, Debug)]
#[command(version = VERSION, styles = cli_style::get_styles())]
struct CliArgs {
    /// Playlist text file (one "Song - Artist" per line) or playlist link.
    pub source: String,

    /// Requested quality tier, 1 to 14. Lower supported tiers are tried on failure.
    #[clap(short, long, default_value = "11", value_parser = parse_quality)]
    pub quality: QualityTier,

    /// Write a .lrc file next to each song.
    #[clap(long)]
    pub lyrics: bool,

    /// Embed lyrics into the audio file tags.
    #[clap(long)]
    pub embed_lyrics: bool,

    /// Skip the audio and only write a .lrc file per song.
    #[clap(long, conflicts_with_all = ["lyrics", "embed_lyrics"])]
    pub only_lyrics: bool,

    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory downloaded songs are written to.
    #[clap(long, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// Text file listing already downloaded files, one per line.
    #[clap(long, value_parser = parse_path)]
    pub ledger: Option<PathBuf>,

    /// Directory for run reports. Defaults to `<output_dir>/download_reports`.
    #[clap(long, value_parser = parse_path)]
    pub reports_dir: Option<PathBuf>,

    /// Only try the requested quality, never fall back to lower ones.
    #[clap(long)]
    pub no_auto_retry: bool,

    /// Timeout in seconds for HTTP requests. 0 disables it.
    #[clap(long)]
    pub http_timeout_sec: Option<u64>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            output_dir: args.output_dir.clone(),
            ledger: args.ledger.clone(),
            reports_dir: args.reports_dir.clone(),
            no_auto_retry: args.no_auto_retry,
            http_timeout_sec: args.http_timeout_sec,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    cli_common::init_logging()?;
    info!("song-batch {}", VERSION);

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = cli_common::load_config(cli_args.config.as_deref(), &cli_config)?;

    let playlist = match cli_common::load_song_list(&app_config, &cli_args.source).await {
        Ok(playlist) => playlist,
        Err(e) => {
            cli_style::print_error(&format!("Cannot load {}: {:#}", cli_args.source, e));
            return Err(e);
        }
    };
    if playlist.songs.is_empty() {
        warn!("No songs found in {}", cli_args.source);
        return Ok(());
    }

    let fingerprints = fingerprint::scan(
        &app_config.storage.output_dir,
        app_config.storage.ledger.as_deref(),
    );
    info!("{} songs already downloaded", fingerprints.len());

    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let acquirer = Arc::new(cli_common::build_acquirer(&app_config, events.clone())?);
    let mut orchestrator = BatchOrchestrator::new(
        acquirer,
        QualityFallbackPolicy::new(&app_config.retry, events.clone()),
        events,
        ReportWriter::new(app_config.storage.reports_dir.clone()),
        fingerprints,
    );

    let stop = CancellationToken::new();
    let signal_token = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current song");
            signal_token.cancel();
        }
    });

    let lyrics = if cli_args.only_lyrics {
        LyricsOptions::only_file()
    } else {
        LyricsOptions {
            write_file: cli_args.lyrics,
            embed: cli_args.embed_lyrics,
            only_file: false,
        }
    };
    let options = BatchOptions {
        quality_tier: cli_args.quality,
        lyrics,
        playlist_name: playlist.name,
    };
    let report = orchestrator.run(&playlist.songs, &options, &stop).await;

    cli_style::print_batch_summary(&report, &app_config.storage.reports_dir);
    Ok(())
}
