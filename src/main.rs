use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use song_pipeline::cli_common::{self, parse_path, VERSION};
use song_pipeline::config;
use song_pipeline::download_manager::{
    fingerprint, AmqpBroker, EventSink, QualityFallbackPolicy, QueueWorker, RandomPacer,
    TracingEventSink,
};

/// Consumes download jobs from the durable queue until interrupted.
#[derive(Parser, Debug)]
#[command(version = VERSION, styles = song_pipeline::cli_style::get_styles())]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory downloaded songs are written to.
    #[clap(long, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// Text file listing already downloaded files, one per line.
    #[clap(long, value_parser = parse_path)]
    pub ledger: Option<PathBuf>,

    /// Only try the requested quality, never fall back to lower ones.
    #[clap(long)]
    pub no_auto_retry: bool,

    /// Times a failed job is re-published before it is dead-lettered.
    #[clap(long)]
    pub max_retries: Option<u32>,

    /// AMQP URL of the broker.
    #[clap(long)]
    pub amqp_url: Option<String>,

    /// Name of the work queue; dead letters go to `<queue>_failed`.
    #[clap(long)]
    pub queue: Option<String>,

    /// Timeout in seconds for HTTP requests. 0 disables it.
    #[clap(long)]
    pub http_timeout_sec: Option<u64>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            output_dir: args.output_dir.clone(),
            ledger: args.ledger.clone(),
            reports_dir: None,
            no_auto_retry: args.no_auto_retry,
            max_retries: args.max_retries,
            amqp_url: args.amqp_url.clone(),
            queue: args.queue.clone(),
            http_timeout_sec: args.http_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    cli_common::init_logging()?;
    info!("song-worker {}", VERSION);

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = cli_common::load_config(cli_args.config.as_deref(), &cli_config)?;

    let fingerprints = fingerprint::scan(
        &app_config.storage.output_dir,
        app_config.storage.ledger.as_deref(),
    );
    info!("{} songs already downloaded", fingerprints.len());

    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let acquirer = Arc::new(cli_common::build_acquirer(&app_config, events.clone())?);
    let policy = QualityFallbackPolicy::new(&app_config.retry, events.clone());
    let broker = Arc::new(AmqpBroker::new(app_config.broker.url.clone()));

    let mut worker = QueueWorker::new(
        broker,
        acquirer,
        policy,
        Arc::new(RandomPacer::new(&app_config.pacing)),
        events,
        &app_config.broker,
        fingerprints,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating graceful shutdown");
            signal_token.cancel();
        }
    });

    let stats = worker.run(shutdown).await;
    info!(
        "Processed: {} acquired, {} skipped, {} re-queued, {} dead-lettered, {} redelivered",
        stats.acquired, stats.skipped, stats.requeued, stats.dead_lettered, stats.redelivered
    );
    Ok(())
}
