use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use song_pipeline::cli_common::{self, parse_path, VERSION};
use song_pipeline::cli_style;
use song_pipeline::config;
use song_pipeline::download_manager::{
    AmqpBroker, DownloadJob, LyricsOptions, QualityTier, QueueTopology, SongDescriptor,
};

fn parse_quality(s: &str) -> Result<QualityTier, String> {
    let value: i64 = s.parse().map_err(|e| format!("'{}' is not a number: {}", s, e))?;
    QualityTier::new(value).map_err(|e| e.to_string())
}

/// Publishes one download job per playlist entry to the work queue.
#[derive(Parser, Debug)]
#[command(version = VERSION, styles = cli_style::get_styles())]
struct CliArgs {
    /// Playlist text file (one "Song - Artist" per line) or playlist link.
    pub source: String,

    /// Quality tier requested for every job.
    #[clap(short, long, default_value = "11", value_parser = parse_quality)]
    pub quality: QualityTier,

    /// Ask workers not to write .lrc files.
    #[clap(long)]
    pub no_lyrics_file: bool,

    /// Ask workers not to embed lyrics into the audio tags.
    #[clap(long)]
    pub no_embedded_lyrics: bool,

    /// Ask workers to skip the audio and only write .lrc files.
    #[clap(long)]
    pub only_lyrics: bool,

    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// AMQP URL of the broker.
    #[clap(long)]
    pub amqp_url: Option<String>,

    /// Name of the work queue.
    #[clap(long)]
    pub queue: Option<String>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            amqp_url: args.amqp_url.clone(),
            queue: args.queue.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    cli_common::init_logging()?;
    info!("song-enqueue {}", VERSION);

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = cli_common::load_config(cli_args.config.as_deref(), &cli_config)?;

    let playlist = cli_common::load_song_list(&app_config, &cli_args.source)
        .await
        .with_context(|| format!("Cannot load {}", cli_args.source))?;
    if playlist.songs.is_empty() {
        warn!("No songs found in {}", cli_args.source);
        return Ok(());
    }

    let lyrics = if cli_args.only_lyrics {
        LyricsOptions::only_file()
    } else {
        LyricsOptions {
            write_file: !cli_args.no_lyrics_file,
            embed: !cli_args.no_embedded_lyrics,
            only_file: false,
        }
    };
    let bodies: Vec<Vec<u8>> = playlist
        .songs
        .iter()
        .map(|song| DownloadJob::new(SongDescriptor::new(song.as_str(), cli_args.quality), lyrics).encode())
        .collect();

    let topology = QueueTopology::from_settings(&app_config.broker);
    let broker = AmqpBroker::new(app_config.broker.url.clone());
    let published = broker
        .publish_all(&topology, &bodies)
        .await
        .with_context(|| format!("Failed to publish to {}", topology.work_queue))?;

    cli_style::print_enqueue_summary(&topology.work_queue, published, &cli_args.source);
    Ok(())
}
