use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use quant_jobs::config::PERSISTENCE;
use quant_jobs::{FsBlobStore, PathArtifactStore, sanitize};

#[derive(Parser, Debug)]
#[command(author, version, about = "Prints a subset of a saved Monte Carlo path artifact", long_about = None)]
struct Args {
    /// Job whose paths to read
    job_id: String,

    /// Directory the artifacts were written to
    #[arg(long, default_value = PERSISTENCE.artifacts.directory)]
    artifact_dir: PathBuf,

    /// Number of trajectories to print
    #[arg(long, default_value_t = PERSISTENCE.artifacts.default_subset_limit)]
    limit: usize,

    /// Keep every n-th time point
    #[arg(long, default_value_t = 1)]
    stride: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    let blobs = FsBlobStore::new(&args.artifact_dir)?;
    let artifacts = PathArtifactStore::new(Arc::new(blobs));
    let subset = artifacts
        .subset_for_job(&args.job_id, args.limit, args.stride)?
        .context(format!("No artifact for job {} in {:?}", args.job_id, args.artifact_dir))?;

    log::info!(
        "{} of {} paths, {} of {} time points",
        subset.rows.len(),
        subset.total_rows,
        subset.time_axis.len(),
        subset.total_cols
    );
    println!("{}", serde_json::to_string_pretty(&sanitize(&subset.to_payload()))?);
    Ok(())
}
