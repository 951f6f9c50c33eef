//! Song download pipeline library
//!
//! Exposes the queue worker, batch orchestrator and their collaborators to
//! the binaries and integration tests.

pub mod cli_common;
pub mod cli_style;
pub mod config;
pub mod download_manager;
pub mod downloader;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use download_manager::{BatchOrchestrator, QueueWorker, ResolvingAcquirer};
