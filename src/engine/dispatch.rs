//! Turns a queued task into a result document.
//!
//! Params are parsed into a strict [`JobSpec`] first, so nothing is computed
//! for a job with an unsupported combination or bad parameters.

use std::sync::Arc;

use serde_json::Value;

use crate::config::{DEBUG_FLAGS, ENGINE};
use crate::data::artifacts::PathArtifactStore;
use crate::data::market_data::MarketDataProvider;
use crate::data::store::Filter;
use crate::domain::normalize_ticker;
use crate::engine::error::{JobError, JobResult};
use crate::engine::lifecycle::{ASSETS, JobManager, JobUpdate};
use crate::engine::messages::JobTask;
use crate::models::params::{OptimizationSpec, OptionSpec, PricingMethod, SimulationSpec, SolverChoice};
use crate::models::JobSpec;
use crate::optimization::cardinality::{self, SelectionSolver, SimulatedAnnealing, TopKProjection};
use crate::optimization::{mean_variance, returns};
use crate::pricing::legs::price_legs;
use crate::pricing::{PricingContext, Product, price_option};
use crate::utils::Payload;
use crate::utils::time_utils::now_utc;

pub struct Dispatcher {
    jobs: Arc<JobManager>,
    market: Arc<dyn MarketDataProvider>,
    artifacts: Arc<PathArtifactStore>,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<JobManager>,
        market: Arc<dyn MarketDataProvider>,
        artifacts: Arc<PathArtifactStore>,
    ) -> Self {
        Self {
            jobs,
            market,
            artifacts,
        }
    }

    pub async fn execute(&self, task: &JobTask) -> JobResult<Payload> {
        let spec = JobSpec::parse(task.job_type, task.product.as_deref(), &task.algo, &task.params)?;
        if DEBUG_FLAGS.print_dispatch {
            log::info!("[job {}] dispatching {} via {}", task.job_id, spec.label(), self.market.signature());
        }

        let ctx = PricingContext {
            market: self.market.as_ref(),
            artifacts: &self.artifacts,
            job_id: &task.job_id,
            now: now_utc(),
        };
        match spec {
            JobSpec::Vanilla {
                method,
                option,
                simulation,
            } => self.single(&ctx, task, Product::Vanilla(method), &option, &simulation).await,
            JobSpec::Binomial { option, steps } => {
                let simulation = SimulationSpec {
                    num_paths: ENGINE.pricing.num_paths,
                    num_steps: ENGINE.pricing.num_steps,
                    seed: None,
                    save_paths: false,
                };
                self.single(&ctx, task, Product::American { steps }, &option, &simulation)
                    .await
            }
            JobSpec::Asian { option, simulation } => {
                self.single(&ctx, task, Product::Asian, &option, &simulation).await
            }
            JobSpec::Barrier {
                option,
                simulation,
                barrier,
            } => {
                self.single(&ctx, task, Product::Barrier(barrier), &option, &simulation)
                    .await
            }
            JobSpec::MultiLeg { method, legs } => {
                let report = |done: usize, total: usize| {
                    let progress = Payload::object()
                        .with("legsDone", done)
                        .with("legsTotal", total);
                    if let Err(e) = self.jobs.transition(&task.job_id, JobUpdate::progress(progress)) {
                        log::warn!("[job {}] progress not recorded: {:#}", task.job_id, e);
                    }
                };
                price_legs(&ctx, method, &legs, &report).await
            }
            JobSpec::MeanVariance(spec) => self.optimize(task, &spec, false).await,
            JobSpec::Cardinality(spec) => self.optimize(task, &spec, true).await,
        }
    }

    async fn single(
        &self,
        ctx: &PricingContext<'_>,
        task: &JobTask,
        product: Product,
        option: &OptionSpec,
        simulation: &SimulationSpec,
    ) -> JobResult<Payload> {
        let priced = price_option(ctx, product, option, simulation, simulation.save_paths).await?;
        let label = task
            .product
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("European");

        let mut result = Payload::object()
            .with("source", priced.underlying.source.as_str())
            .with("ticker", priced.underlying.ticker.clone())
            .with("expiry", option.underlying.expiry.clone())
            .with("strike", option.strike)
            .with("optionType", option.kind.as_str())
            .with("inferred", priced.underlying.inferred(option.rate, option.dividend_yield))
            .with("price", priced.quote.price)
            .with("stderr", priced.quote.stderr)
            .with("paths", priced.quote.paths.as_ref().map(|h| h.to_payload()))
            .with("product", label)
            .with("algo", task.algo.as_str());
        match product {
            Product::American { steps } => result.insert("steps", steps),
            Product::Barrier(barrier) => result.insert(
                "barrier",
                Payload::object()
                    .with("level", barrier.level)
                    .with("type", barrier.label()),
            ),
            Product::Vanilla(PricingMethod::MonteCarlo) | Product::Asian => {
                result.insert("numPaths", simulation.num_paths);
                result.insert("numSteps", simulation.num_steps);
            }
            Product::Vanilla(PricingMethod::BlackScholes) => {}
        }
        Ok(result)
    }

    /// Assets of the portfolio named in the params, or else on the job
    fn portfolio_tickers(&self, task: &JobTask, spec: &OptimizationSpec) -> JobResult<Vec<String>> {
        let portfolio_id = match &spec.portfolio_id {
            Some(id) => Some(id.clone()),
            None => self.jobs.get(&task.job_id)?.and_then(|job| job.portfolio_id),
        }
        .ok_or_else(|| JobError::validation("portfolioId required"))?;

        let assets = self.jobs.store().find(
            ASSETS,
            &Filter::new().eq("portfolioId", portfolio_id.as_str()),
            None,
            None,
        )?;
        let tickers: Vec<String> = assets
            .iter()
            .filter_map(|doc| doc.get("ticker").and_then(Value::as_str))
            .map(normalize_ticker)
            .filter(|t| !t.is_empty())
            .collect();
        if tickers.is_empty() {
            return Err(JobError::validation("No assets in portfolio"));
        }
        Ok(tickers)
    }

    async fn optimize(&self, task: &JobTask, spec: &OptimizationSpec, select: bool) -> JobResult<Payload> {
        let tickers = match &spec.tickers {
            Some(tickers) if !tickers.is_empty() => tickers.clone(),
            _ => self.portfolio_tickers(task, spec)?,
        };

        let mut histories = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            // A failed download reads as missing data, reported per ticker below
            let closes = self.market.history(ticker, &spec.period).await.unwrap_or_else(|e| {
                log::warn!("[job {}] history for {} failed: {:#}", task.job_id, ticker, e);
                Vec::new()
            });
            histories.push((ticker.clone(), closes));
        }
        let stats = returns::estimate(&histories)?;

        let (allocation, k) = if select {
            let solver: Box<dyn SelectionSolver> = match spec.solver {
                SolverChoice::TopKProjection => Box::new(TopKProjection),
                SolverChoice::SimulatedAnnealing => Box::new(SimulatedAnnealing::new(spec.seed)),
            };
            let (allocation, k) =
                cardinality::select(&stats.mu, &stats.sigma, spec.constraint.cardinality, solver.as_ref())?;
            (allocation, Some(k))
        } else {
            let allocation = mean_variance::optimize(&stats.mu, &stats.sigma, spec.target, &spec.constraint)?;
            (allocation, None)
        };
        if !allocation.ok {
            log::warn!("[job {}] optimizer: {}", task.job_id, allocation.message);
            return Err(JobError::Numerical(allocation.message));
        }

        let insights = Payload::object()
            .with("Assets", stats.tickers.len())
            .with("Period", spec.period.as_str())
            .with("Observations", stats.observations)
            .with("Ok", allocation.ok)
            .with("Message", allocation.message.as_str());
        let mut result = allocation
            .to_payload(&stats.tickers)
            .with("algo", task.algo.as_str())
            .with("constraint", spec.constraint_label.as_str())
            .with("target", spec.target)
            .with("insights", insights);
        if let Some(k) = k {
            result.insert("cardinality", k);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::blob::MemoryBlobStore;
    use crate::data::demo_market::demo_market;
    use crate::data::market_data::{StaticMarketData, UnavailableMarketData};
    use crate::data::store::{DocumentStore, MemoryDocumentStore};
    use crate::models::{JobRequest, JobType};
    use crate::utils::sanitize;
    use serde_json::json;

    fn dispatcher(market: Arc<dyn MarketDataProvider>) -> Dispatcher {
        let jobs = Arc::new(JobManager::new(Arc::new(MemoryDocumentStore::new())));
        let artifacts = Arc::new(PathArtifactStore::new(Arc::new(MemoryBlobStore::new())));
        Dispatcher::new(jobs, market, artifacts)
    }

    fn task(dispatcher: &Dispatcher, job_type: JobType, product: Option<&str>, algo: &str, params: Value) -> JobTask {
        let job = dispatcher
            .jobs
            .create(JobRequest::new(job_type, product, algo, params))
            .unwrap();
        JobTask::for_job(&job)
    }

    #[tokio::test]
    async fn black_scholes_with_explicit_inputs() {
        let d = dispatcher(Arc::new(StaticMarketData::new()));
        let t = task(
            &d,
            JobType::OptionPricing,
            None,
            "BlackScholes",
            json!({"spot": 100, "sigma": 0.2, "T": 1.0, "strike": 100, "r": 0.05}),
        );
        let result = sanitize(&d.execute(&t).await.unwrap());
        assert_eq!(result["source"], "explicit");
        assert_eq!(result["product"], "European");
        assert_eq!(result["optionType"], "CALL");
        assert_eq!(result["stderr"], 0.0);
        assert!((result["price"].as_f64().unwrap() - 10.4506).abs() < 1e-3);
        assert_eq!(result["inferred"]["S0"], 100.0);
        assert!(result["paths"].is_null());
    }

    #[tokio::test]
    async fn barrier_result_echoes_the_barrier() {
        let d = dispatcher(Arc::new(StaticMarketData::new()));
        let t = task(
            &d,
            JobType::OptionPricing,
            Some("Barrier"),
            "MonteCarlo",
            json!({"spot": 100, "sigma": 0.2, "T": 0.5, "strike": 100, "barrier": 90,
                   "barrier_type": "down-and-out", "num_paths": 2000, "num_steps": 50,
                   "seed": 3, "save_paths": true}),
        );
        let result = sanitize(&d.execute(&t).await.unwrap());
        assert_eq!(result["barrier"]["level"], 90.0);
        assert_eq!(result["barrier"]["type"], "down-and-out");
        assert_eq!(result["paths"]["nTotal"], 2000);
        assert_eq!(result["paths"]["stepsTotal"], 51);
    }

    #[tokio::test]
    async fn unsupported_combination_fails_before_pricing() {
        let d = dispatcher(Arc::new(UnavailableMarketData));
        let t = task(&d, JobType::OptionPricing, Some("European"), "QAE", json!({}));
        let err = d.execute(&t).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported combination: type=OptionPricing, product=European, algo=QAE"
        );
    }

    #[tokio::test]
    async fn legs_write_progress_while_running() {
        let d = dispatcher(Arc::new(StaticMarketData::new()));
        let t = task(
            &d,
            JobType::OptionPricing,
            None,
            "BlackScholes",
            json!({"legs": [
                {"spot": 100, "sigma": 0.2, "T": 1, "strike": 95, "qty": 1},
                {"spot": 100, "sigma": 0.2, "T": 1, "strike": 105, "qty": -1}
            ]}),
        );
        d.jobs.mark_running(&t.job_id).unwrap();
        let result = sanitize(&d.execute(&t).await.unwrap());
        assert_eq!(result["legs"].as_array().unwrap().len(), 2);
        assert!(result["totals"]["notional"].as_f64().unwrap() > 0.0);
        assert!(result["totals"]["weightedAvg"].is_null());

        let job = d.jobs.get(&t.job_id).unwrap().unwrap();
        assert_eq!(job.result, Some(json!({"legsDone": 2, "legsTotal": 2})));
    }

    #[tokio::test]
    async fn mean_variance_over_portfolio_assets() {
        let d = dispatcher(Arc::new(demo_market()));
        for ticker in ["aapl", "MSFT", "$nvda"] {
            d.jobs
                .store()
                .insert(ASSETS, json!({"portfolioId": "p1", "ticker": ticker}))
                .unwrap();
        }
        let job = d
            .jobs
            .create(
                JobRequest::new(JobType::PortfolioOptimization, None, "MeanVariance", json!({"constraint": "Long-only"}))
                    .with_portfolio("p1"),
            )
            .unwrap();
        let result = sanitize(&d.execute(&JobTask::for_job(&job)).await.unwrap());
        let weights: Vec<f64> = result["weights"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w.as_f64().unwrap())
            .collect();
        assert_eq!(weights.len(), 3);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(weights.iter().all(|w| *w >= 0.0));
        assert_eq!(result["tickers"], json!(["AAPL", "MSFT", "NVDA"]));
        assert_eq!(result["insights"]["Assets"], 3);
        assert_eq!(result["insights"]["Period"], "3y");
        assert_eq!(result["constraint"], "Long-only");
        assert!(result["target"].is_null());
        assert!(result.get("cardinality").is_none());
    }

    #[tokio::test]
    async fn cardinality_with_explicit_tickers() {
        let d = dispatcher(Arc::new(demo_market()));
        let t = task(
            &d,
            JobType::PortfolioOptimization,
            None,
            "QUBO",
            json!({"tickers": ["AAPL", "MSFT", "GOOG", "AMZN"], "constraint": "Cardinality=2", "solver": "projection"}),
        );
        let result = sanitize(&d.execute(&t).await.unwrap());
        assert_eq!(result["cardinality"], 2);
        let picked = result["weights"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|w| w.as_f64().unwrap() > 0.0)
            .count();
        assert_eq!(picked, 2);
        assert_eq!(result["message"], "TopKProjection ok");
    }

    #[tokio::test]
    async fn optimization_needs_a_universe() {
        let d = dispatcher(Arc::new(demo_market()));
        let t = task(&d, JobType::PortfolioOptimization, None, "MeanVariance", json!({}));
        assert_eq!(d.execute(&t).await.unwrap_err().to_string(), "portfolioId required");

        let t = task(&d, JobType::PortfolioOptimization, None, "MeanVariance", json!({"portfolioId": "empty"}));
        assert_eq!(d.execute(&t).await.unwrap_err().to_string(), "No assets in portfolio");
    }

    #[tokio::test]
    async fn unreachable_history_names_the_tickers() {
        let d = dispatcher(Arc::new(UnavailableMarketData));
        let t = task(
            &d,
            JobType::PortfolioOptimization,
            None,
            "MeanVariance",
            json!({"tickers": ["AAPL", "ZZZZ"]}),
        );
        let err = d.execute(&t).await.unwrap_err();
        assert!(matches!(err, JobError::MarketData { .. }));
        assert_eq!(err.to_string(), "AAPL, ZZZZ: missing price data (check symbols)");
    }

    #[tokio::test]
    async fn solver_failure_fails_with_its_own_message() {
        let d = dispatcher(Arc::new(demo_market()));
        let t = task(
            &d,
            JobType::PortfolioOptimization,
            None,
            "MeanVariance",
            json!({"tickers": ["AAPL", "MSFT", "GOOG"], "constraint": "Long-only", "target": 50.0}),
        );
        let err = d.execute(&t).await.unwrap_err();
        assert!(matches!(err, JobError::Numerical(_)));
        assert_eq!(err.to_string(), mean_variance::MSG_TARGET_UNATTAINABLE);
    }
}
