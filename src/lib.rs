#![allow(clippy::const_is_empty)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]

// Core modules
pub mod config;
pub mod data;
pub mod domain;
pub mod models;
pub mod utils;

// Engines
pub mod optimization;
pub mod pricing;

// Job lifecycle, dispatch and the worker pool
pub mod engine;

// Re-export commonly used types
pub use data::{
    BlobStore, DocumentStore, FsBlobStore, MarketDataProvider, MemoryBlobStore, MemoryDocumentStore,
    PathArtifactStore, StaticMarketData, demo_market,
};
pub use engine::{JobError, JobResult, QuantEngine};
pub use models::{Job, JobRequest, JobStats, JobStatus, JobType, PathSubset};
pub use utils::{Payload, sanitize};

use std::path::PathBuf;

// CLI argument parsing
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Runs option pricing and portfolio optimization jobs", long_about = None)]
pub struct Cli {
    /// Worker threads pulling from the task queue
    #[arg(long)]
    pub workers: Option<usize>,

    /// Keep path artifacts in this directory instead of in memory
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Market data fixture (JSON). Defaults to the synthetic demo market.
    #[arg(long)]
    pub market: Option<PathBuf>,

    /// JSON array of job submissions. Defaults to a built-in demo batch.
    #[arg(long)]
    pub jobs: Option<PathBuf>,

    /// Market data cache time-to-live in seconds
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Size of the recent/running lists in the printed statistics
    #[arg(long)]
    pub recent: Option<usize>,

    /// Give up waiting for the batch after this many seconds
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,
}

impl Cli {
    /// Engine settings with the flags that were given applied over the defaults
    pub fn engine_settings(&self) -> config::EngineSettings {
        let mut settings = config::EngineSettings::default();
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(ttl) = self.cache_ttl_secs {
            settings.market_cache_ttl = std::time::Duration::from_secs(ttl);
        }
        if let Some(recent) = self.recent {
            settings.stats_limit = recent;
        }
        settings.artifact_dir = self.artifact_dir.clone();
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["quant-jobs", "--workers", "0", "--cache-ttl-secs", "5", "--artifact-dir", "out"]);
        let settings = cli.engine_settings();
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.market_cache_ttl.as_secs(), 5);
        assert_eq!(settings.artifact_dir, Some(PathBuf::from("out")));
        assert_eq!(settings.stats_limit, config::PERSISTENCE.stats_limit);
    }
}
