use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::runtime::Runtime;

use quant_jobs::data::demo_market::demo_expiry;
use quant_jobs::engine::lifecycle::{ASSETS, CLIENTS, PORTFOLIOS};
use quant_jobs::{
    BlobStore, Cli, DocumentStore, FsBlobStore, JobRequest, JobType, MemoryBlobStore, MemoryDocumentStore,
    QuantEngine, StaticMarketData, demo_market,
};

const DEMO_CLIENT: &str = "client-demo";
const DEMO_PORTFOLIO: &str = "portfolio-demo";

/// Reference data the demo batch points at
fn seed_demo_records(store: &dyn DocumentStore) -> Result<()> {
    store.insert(CLIENTS, json!({"id": DEMO_CLIENT, "name": "Demo Client"}))?;
    store.insert(
        PORTFOLIOS,
        json!({"id": DEMO_PORTFOLIO, "clientId": DEMO_CLIENT, "name": "Demo Growth"}),
    )?;
    for ticker in ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA"] {
        store.insert(
            ASSETS,
            json!({"portfolioId": DEMO_PORTFOLIO, "ticker": ticker, "assetClass": "Equity"}),
        )?;
    }
    Ok(())
}

fn demo_batch() -> Vec<JobRequest> {
    let expiry = demo_expiry(90);
    vec![
        JobRequest::new(
            JobType::OptionPricing,
            Some("European"),
            "BlackScholes",
            json!({"ticker": "AAPL", "expiry": expiry, "strike": 190, "use_chain": true}),
        ),
        JobRequest::new(
            JobType::OptionPricing,
            Some("European"),
            "MonteCarlo",
            json!({"ticker": "msft", "expiry": expiry, "strike": 420, "num_paths": 20000,
                   "seed": 42, "save_paths": true}),
        ),
        JobRequest::new(
            JobType::OptionPricing,
            Some("American"),
            "Binomial",
            json!({"spot": 100, "sigma": 0.25, "T": 1, "strike": 105, "option_type": "PUT", "r": 0.03}),
        ),
        JobRequest::new(
            JobType::OptionPricing,
            Some("Barrier"),
            "MonteCarlo",
            json!({"spot": 100, "sigma": 0.3, "T": 0.5, "strike": 100, "barrier": 85,
                   "barrier_type": "down-and-out", "num_paths": 20000, "seed": 7}),
        ),
        JobRequest::new(
            JobType::OptionPricing,
            None,
            "BlackScholes",
            json!({"legs": [
                {"ticker": "NVDA", "expiry": expiry, "strike": 120, "qty": 2},
                {"ticker": "NVDA", "expiry": expiry, "strike": 140, "qty": -1, "option_type": "CALL"}
            ]}),
        )
        .with_client(DEMO_CLIENT),
        JobRequest::new(
            JobType::PortfolioOptimization,
            None,
            "MeanVariance",
            json!({"constraint": "Max weight 40%"}),
        )
        .with_portfolio(DEMO_PORTFOLIO)
        .with_client(DEMO_CLIENT),
        JobRequest::new(
            JobType::PortfolioOptimization,
            None,
            "QUBO",
            json!({"constraint": "Cardinality=2", "seed": 1}),
        )
        .with_portfolio(DEMO_PORTFOLIO)
        .with_client(DEMO_CLIENT),
    ]
}

fn load_jobs(path: &Path) -> Result<Vec<JobRequest>> {
    let text = std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).context(format!("{:?} is not a JSON array of job submissions", path))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Cli::parse();
    #[cfg(debug_assertions)]
    log::info!("Parsed arguments: {:?}", args);
    let settings = args.engine_settings();

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;

    let store = Arc::new(MemoryDocumentStore::new());
    seed_demo_records(store.as_ref())?;
    let blobs: Arc<dyn BlobStore> = match &settings.artifact_dir {
        Some(dir) => Arc::new(FsBlobStore::new(dir)?),
        None => Arc::new(MemoryBlobStore::new()),
    };
    let market = match &args.market {
        Some(path) => StaticMarketData::load_from_path(path)?,
        None => demo_market(),
    };
    let requests = match &args.jobs {
        Some(path) => load_jobs(path)?,
        None => demo_batch(),
    };

    let stats_limit = settings.stats_limit;
    let engine = QuantEngine::new(settings, store, blobs, market, rt.handle().clone())?;

    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        match engine.submit(request) {
            Ok(job) => {
                log::info!("Submitted {} ({} {})", job.id, job.job_type, job.algo);
                ids.push(job.id);
            }
            Err(e) => log::error!("Rejected submission: {:#}", e),
        }
    }

    let jobs = engine.wait_for_terminal(&ids, Duration::from_secs(args.timeout_secs))?;
    for job in &jobs {
        println!("{}", serde_json::to_string_pretty(job)?);
    }
    println!("{}", serde_json::to_string_pretty(&engine.stats(stats_limit)?)?);

    engine.shutdown();
    Ok(())
}
