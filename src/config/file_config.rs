use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Storage (can override CLI)
    pub output_dir: Option<String>,
    pub ledger: Option<String>,
    pub reports_dir: Option<String>,
    pub playlists_dir: Option<String>,

    // Component configs
    pub transfer: Option<TransferConfig>,
    pub retry: Option<RetryConfig>,
    pub broker: Option<BrokerConfig>,
    pub pacing: Option<PacingConfig>,
    pub resolver: Option<ResolverConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size: Option<usize>,
    pub progress_interval_ms: Option<u64>,
    /// 0 disables the timeout
    pub http_timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub auto_retry: Option<bool>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: Option<String>,
    pub queue: Option<String>,
    pub prefetch: Option<u16>,
    pub reconnect_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub min_pause_ms: Option<u64>,
    pub max_pause_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub api_url: Option<String>,
    pub lyrics_url: Option<String>,
    pub playlist_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
