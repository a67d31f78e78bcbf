//! Worker pool and pricing defaults

use std::path::PathBuf;
use std::time::Duration;

use super::{MARKET, PERSISTENCE};

/// Defaults applied when a pricing job leaves a field out
pub struct PricingDefaults {
    /// Monte Carlo trajectories per job (or per leg)
    pub num_paths: usize,
    /// Monte Carlo time steps (daily steps over a one-year tenor)
    pub num_steps: usize,
    /// Lattice depth for the binomial pricer
    pub lattice_steps: usize,
    /// Risk-free rate when the job does not supply `r`
    pub rate: f64,
    /// Tenor in years when neither `T` nor `expiry` is supplied
    pub tenor_years: f64,
    /// Smallest tenor produced from an expiry date that is today or in the past
    pub min_tenor_years: f64,
    /// Upper bounds on requested work, checked before anything is allocated
    pub max_num_paths: usize,
    pub max_num_steps: usize,
    pub max_lattice_steps: usize,
    /// Largest trajectory matrix (paths x time points) kept for `save_paths`
    pub max_saved_values: usize,
}

/// Settings for the Monte Carlo kernel
pub struct SimulationSettings {
    /// Paths simulated per rayon task. Each chunk owns one RNG stream.
    pub paths_per_chunk: usize,
}

/// The Master Engine Configuration
pub struct EngineConfig {
    /// Worker threads pulling from the task queue
    pub workers: usize,
    /// How often the CLI polls for job completion (milliseconds)
    pub poll_interval_ms: u64,
    pub pricing: PricingDefaults,
    pub simulation: SimulationSettings,
}

pub const ENGINE: EngineConfig = EngineConfig {
    workers: 4,
    poll_interval_ms: 50,

    pricing: PricingDefaults {
        num_paths: 50_000,
        num_steps: 252,
        lattice_steps: 200,
        rate: 0.01,
        tenor_years: 0.5,
        min_tenor_years: 1e-6,
        max_num_paths: 2_000_000,
        max_num_steps: 10_000,
        max_lattice_steps: 20_000,
        max_saved_values: 50_000_000,
    },

    simulation: SimulationSettings {
        paths_per_chunk: 1024,
    },
};

/// Runtime settings for one engine instance.
/// Defaults come from the const configuration; the CLI overrides individual fields.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workers: usize,
    pub market_cache_ttl: Duration,
    /// `None` keeps artifacts in memory
    pub artifact_dir: Option<PathBuf>,
    /// Size of the `recent`/`running` lists in job statistics
    pub stats_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: ENGINE.workers,
            market_cache_ttl: Duration::from_secs(MARKET.cache_ttl_secs),
            artifact_dir: None,
            stats_limit: PERSISTENCE.stats_limit,
        }
    }
}
