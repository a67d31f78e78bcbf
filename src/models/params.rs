//! Strict job specifications.
//!
//! Submitted `params` are an open JSON mapping. [`JobSpec::parse`] reads them
//! once, at the dispatch boundary, into a typed variant so engines never look
//! at raw JSON. Numbers may arrive as JSON numbers or numeric strings; flags
//! accept booleans, numbers and "1"/"true"/"yes"/"on".

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::{ENGINE, MARKET, OPTIMIZATION};
use crate::domain::{BarrierKind, OptionKind, normalize_ticker};
use crate::engine::error::{JobError, JobResult};
use crate::models::JobType;
use crate::utils::time_utils::parse_iso;

mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: &Value) -> Result<Option<f64>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(Some(x)),
                Ok(_) => Err(format!("expected a finite number, got '{}'", s)),
                Err(_) => Err(format!("expected a number, got '{}'", s)),
            },
            other => Err(format!("expected a number, got {}", other)),
        }
    }

    fn whole(x: f64) -> Result<u64, String> {
        if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
            Ok(x as u64)
        } else {
            Err(format!("expected a non-negative integer, got {}", x))
        }
    }

    pub fn f64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(d)?;
        number(&value).map_err(D::Error::custom)
    }

    pub fn u64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let value = Value::deserialize(d)?;
        match number(&value).map_err(D::Error::custom)? {
            Some(x) => whole(x).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }

    pub fn usize_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        Ok(u64_opt(d)?.map(|x| x as usize))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::Null => None,
            Value::Bool(b) => Some(b),
            Value::Number(n) => Some(n.as_f64().is_some_and(|x| x != 0.0)),
            Value::String(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
            _ => Some(false),
        })
    }

    /// Strings and numbers read as text; empty strings read as absent
    pub fn text_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(d)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s.trim().to_string())),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(D::Error::custom(format!("expected a string, got {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawLeg {
    #[serde(deserialize_with = "lenient::text_opt")]
    ticker: Option<String>,
    #[serde(deserialize_with = "lenient::text_opt")]
    expiry: Option<String>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    strike: Option<f64>,
    #[serde(alias = "optionType", deserialize_with = "lenient::text_opt")]
    option_type: Option<String>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    qty: Option<f64>,
    #[serde(deserialize_with = "lenient::usize_opt")]
    num_paths: Option<usize>,
    #[serde(deserialize_with = "lenient::usize_opt")]
    num_steps: Option<usize>,
    #[serde(deserialize_with = "lenient::flag")]
    save_paths: Option<bool>,
    #[serde(alias = "S0", deserialize_with = "lenient::f64_opt")]
    spot: Option<f64>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    sigma: Option<f64>,
    #[serde(rename = "T", alias = "tenor", deserialize_with = "lenient::f64_opt")]
    tenor: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawOptionParams {
    #[serde(alias = "optionType", deserialize_with = "lenient::text_opt")]
    option_type: Option<String>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    strike: Option<f64>,
    #[serde(alias = "S0", deserialize_with = "lenient::f64_opt")]
    spot: Option<f64>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    sigma: Option<f64>,
    #[serde(rename = "T", alias = "tenor", deserialize_with = "lenient::f64_opt")]
    tenor: Option<f64>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    r: Option<f64>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    q: Option<f64>,
    #[serde(deserialize_with = "lenient::text_opt")]
    ticker: Option<String>,
    #[serde(deserialize_with = "lenient::text_opt")]
    expiry: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    use_chain: Option<bool>,
    #[serde(deserialize_with = "lenient::usize_opt")]
    num_paths: Option<usize>,
    #[serde(deserialize_with = "lenient::usize_opt")]
    num_steps: Option<usize>,
    #[serde(deserialize_with = "lenient::flag")]
    save_paths: Option<bool>,
    #[serde(deserialize_with = "lenient::u64_opt")]
    seed: Option<u64>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    barrier: Option<f64>,
    #[serde(deserialize_with = "lenient::text_opt")]
    barrier_type: Option<String>,
    legs: Option<Vec<RawLeg>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawOptimizationParams {
    #[serde(alias = "portfolioId", deserialize_with = "lenient::text_opt")]
    portfolio_id: Option<String>,
    tickers: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient::text_opt")]
    constraint: Option<String>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    target: Option<f64>,
    #[serde(deserialize_with = "lenient::text_opt")]
    period: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    long_only: Option<bool>,
    #[serde(deserialize_with = "lenient::f64_opt")]
    w_max: Option<f64>,
    #[serde(deserialize_with = "lenient::usize_opt")]
    cardinality: Option<usize>,
    #[serde(deserialize_with = "lenient::text_opt")]
    solver: Option<String>,
    #[serde(deserialize_with = "lenient::u64_opt")]
    seed: Option<u64>,
}

fn decode<T: DeserializeOwned>(params: &Value) -> JobResult<T> {
    let value = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| JobError::validation(format!("invalid parameters: {}", e)))
}

/// Where an option's spot, volatility and tenor come from
#[derive(Debug, Clone, PartialEq)]
pub struct UnderlyingSpec {
    /// Normalized ticker
    pub ticker: Option<String>,
    pub spot: Option<f64>,
    pub sigma: Option<f64>,
    pub tenor: Option<f64>,
    /// "YYYY-MM-DD", already checked to parse
    pub expiry: Option<String>,
    /// Volatility from the option chain rather than from history
    pub use_chain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub underlying: UnderlyingSpec,
    pub strike: f64,
    pub kind: OptionKind,
    pub rate: f64,
    pub dividend_yield: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSpec {
    pub num_paths: usize,
    pub num_steps: usize,
    pub seed: Option<u64>,
    pub save_paths: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegSpec {
    /// 1-based, as reported back in results and errors
    pub number: usize,
    pub option: OptionSpec,
    pub qty: f64,
    pub simulation: SimulationSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingMethod {
    BlackScholes,
    MonteCarlo,
}

impl PricingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PricingMethod::BlackScholes => "BlackScholes",
            PricingMethod::MonteCarlo => "MonteCarlo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverChoice {
    TopKProjection,
    SimulatedAnnealing,
}

/// Allocation constraints decoded from the constraint label plus overrides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioConstraint {
    pub long_only: bool,
    pub gross_capped: bool,
    pub w_max: Option<f64>,
    /// `None` means "use the default for the universe size"
    pub cardinality: Option<usize>,
}

impl PortfolioConstraint {
    /// "None", "Long-only", "Gross<=1", "Max weight 20%" (any percentage),
    /// "Cardinality=k". Every preset keeps long-only weights under a unit budget.
    /// Unknown labels read as "None".
    pub fn from_label(label: &str) -> Self {
        let mut constraint = Self {
            long_only: true,
            gross_capped: true,
            w_max: None,
            cardinality: None,
        };
        let trimmed = label.trim();
        if let Some(rest) = trimmed.strip_prefix("Cardinality") {
            constraint.cardinality = rest
                .trim_start()
                .strip_prefix('=')
                .and_then(|k| k.trim().parse::<usize>().ok());
        } else if let Some(rest) = trimmed.strip_prefix("Max weight") {
            let pct = rest.trim().trim_end_matches('%').trim().parse::<f64>().ok();
            constraint.w_max = Some(pct.map_or(OPTIMIZATION.max_weight_preset, |p| p / 100.0));
        } else if !matches!(trimmed, "" | "None" | "Long-only" | "Gross<=1") {
            log::warn!("Unknown constraint '{}', treating as None", label);
        }
        constraint
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSpec {
    pub portfolio_id: Option<String>,
    /// Explicit universe; otherwise the portfolio's assets
    pub tickers: Option<Vec<String>>,
    /// Label as submitted, echoed in the result
    pub constraint_label: String,
    pub constraint: PortfolioConstraint,
    pub target: Option<f64>,
    pub period: String,
    pub solver: SolverChoice,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobSpec {
    Vanilla {
        method: PricingMethod,
        option: OptionSpec,
        simulation: SimulationSpec,
    },
    Binomial {
        option: OptionSpec,
        steps: usize,
    },
    Asian {
        option: OptionSpec,
        simulation: SimulationSpec,
    },
    Barrier {
        option: OptionSpec,
        simulation: SimulationSpec,
        barrier: BarrierKind,
    },
    MultiLeg {
        method: PricingMethod,
        legs: Vec<LegSpec>,
    },
    MeanVariance(OptimizationSpec),
    Cardinality(OptimizationSpec),
}

impl JobSpec {
    pub fn parse(
        job_type: JobType,
        product: Option<&str>,
        algo: &str,
        params: &Value,
    ) -> JobResult<JobSpec> {
        let product = product.map(str::trim).filter(|p| !p.is_empty());
        let unsupported = || JobError::Unsupported {
            job_type: job_type.to_string(),
            product: product.unwrap_or("").to_string(),
            algo: algo.to_string(),
        };
        let algo_is = |names: &[&str]| names.iter().any(|n| algo.trim().eq_ignore_ascii_case(n));

        match job_type {
            JobType::OptionPricing => {
                let kind = product.unwrap_or("European").to_ascii_lowercase();
                let method = if algo_is(&["BlackScholes"]) {
                    Some(PricingMethod::BlackScholes)
                } else if algo_is(&["MonteCarlo"]) {
                    Some(PricingMethod::MonteCarlo)
                } else {
                    None
                };
                match kind.as_str() {
                    "european" => {
                        let method = method.ok_or_else(unsupported)?;
                        let raw: RawOptionParams = decode(params)?;
                        match &raw.legs {
                            Some(legs) if !legs.is_empty() => Ok(JobSpec::MultiLeg {
                                method,
                                legs: parse_legs(&raw, legs)?,
                            }),
                            _ => Ok(JobSpec::Vanilla {
                                method,
                                option: option_spec(&raw)?,
                                simulation: simulation_spec(&raw)?,
                            }),
                        }
                    }
                    "american" if algo_is(&["Binomial", "Lattice", "CRR"]) => {
                        let raw: RawOptionParams = decode(params)?;
                        let steps = raw.num_steps.unwrap_or(ENGINE.pricing.lattice_steps);
                        if steps < 1 {
                            return Err(JobError::validation("num_steps must be at least 1"));
                        }
                        if steps > ENGINE.pricing.max_lattice_steps {
                            return Err(JobError::validation(format!(
                                "num_steps must be at most {} for the lattice, got {}",
                                ENGINE.pricing.max_lattice_steps, steps
                            )));
                        }
                        Ok(JobSpec::Binomial {
                            option: option_spec(&raw)?,
                            steps,
                        })
                    }
                    "asian" if method == Some(PricingMethod::MonteCarlo) => {
                        let raw: RawOptionParams = decode(params)?;
                        Ok(JobSpec::Asian {
                            option: option_spec(&raw)?,
                            simulation: simulation_spec(&raw)?,
                        })
                    }
                    "barrier" if method == Some(PricingMethod::MonteCarlo) => {
                        let raw: RawOptionParams = decode(params)?;
                        let level = raw
                            .barrier
                            .ok_or_else(|| JobError::validation("barrier level is required for Barrier options"))?;
                        let barrier_type = raw.barrier_type.as_deref().unwrap_or("down-and-out");
                        let barrier = BarrierKind::parse(level, barrier_type)
                            .map_err(|e| JobError::validation(e.to_string()))?;
                        Ok(JobSpec::Barrier {
                            option: option_spec(&raw)?,
                            simulation: simulation_spec(&raw)?,
                            barrier,
                        })
                    }
                    _ => Err(unsupported()),
                }
            }
            JobType::PortfolioOptimization => {
                if algo_is(&["MeanVariance"]) {
                    Ok(JobSpec::MeanVariance(optimization_spec(params)?))
                } else if algo_is(&["QAOA", "QUBO", "Cardinality"]) {
                    Ok(JobSpec::Cardinality(optimization_spec(params)?))
                } else {
                    Err(unsupported())
                }
            }
        }
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            JobSpec::Vanilla { method: PricingMethod::BlackScholes, .. } => "vanilla/black-scholes",
            JobSpec::Vanilla { method: PricingMethod::MonteCarlo, .. } => "vanilla/monte-carlo",
            JobSpec::Binomial { .. } => "american/binomial",
            JobSpec::Asian { .. } => "asian/monte-carlo",
            JobSpec::Barrier { .. } => "barrier/monte-carlo",
            JobSpec::MultiLeg { .. } => "multi-leg",
            JobSpec::MeanVariance(_) => "mean-variance",
            JobSpec::Cardinality(_) => "cardinality",
        }
    }
}

fn parse_kind(raw: Option<&str>) -> JobResult<OptionKind> {
    match raw {
        Some(text) => text.parse().map_err(|e: anyhow::Error| JobError::validation(e.to_string())),
        None => Ok(OptionKind::Call),
    }
}

fn checked_expiry(expiry: Option<&String>) -> JobResult<Option<String>> {
    match expiry {
        Some(text) if parse_iso(text).is_none() => Err(JobError::validation(format!(
            "malformed expiry '{}', expected YYYY-MM-DD",
            text
        ))),
        other => Ok(other.cloned()),
    }
}

fn normalized(ticker: Option<&String>) -> Option<String> {
    ticker.map(|t| normalize_ticker(t)).filter(|t| !t.is_empty())
}

/// Supplied spot and volatility must be positive; a supplied tenor must not be negative
fn checked_inputs(spot: Option<f64>, sigma: Option<f64>, tenor: Option<f64>) -> JobResult<()> {
    for (name, value) in [("spot", spot), ("sigma", sigma)] {
        if let Some(x) = value.filter(|x| !(x.is_finite() && *x > 0.0)) {
            return Err(JobError::validation(format!("{} must be positive, got {}", name, x)));
        }
    }
    if let Some(t) = tenor.filter(|t| !(t.is_finite() && *t >= 0.0)) {
        return Err(JobError::validation(format!("T must not be negative, got {}", t)));
    }
    Ok(())
}

fn option_spec(raw: &RawOptionParams) -> JobResult<OptionSpec> {
    let use_chain = raw.use_chain.unwrap_or(false);
    let ticker = normalized(raw.ticker.as_ref());

    if use_chain && (ticker.is_none() || raw.expiry.is_none() || raw.strike.is_none()) {
        return Err(JobError::validation(
            "ticker, expiry and strike are required when use_chain=true",
        ));
    }
    let strike = raw
        .strike
        .ok_or_else(|| JobError::validation("strike is required"))?;
    if !(strike.is_finite() && strike > 0.0) {
        return Err(JobError::validation(format!("strike must be positive, got {}", strike)));
    }
    if ticker.is_none() && (raw.spot.is_none() || raw.sigma.is_none()) {
        return Err(JobError::validation("spot and sigma, or a ticker, are required"));
    }
    checked_inputs(raw.spot, raw.sigma, raw.tenor)?;

    Ok(OptionSpec {
        underlying: UnderlyingSpec {
            ticker,
            spot: raw.spot,
            sigma: raw.sigma,
            tenor: raw.tenor,
            expiry: checked_expiry(raw.expiry.as_ref())?,
            use_chain,
        },
        strike,
        kind: parse_kind(raw.option_type.as_deref())?,
        rate: raw.r.unwrap_or(ENGINE.pricing.rate),
        dividend_yield: raw.q.unwrap_or(0.0),
    })
}

fn validated_simulation(
    num_paths: usize,
    num_steps: usize,
    seed: Option<u64>,
    save_paths: bool,
) -> JobResult<SimulationSpec> {
    if num_paths < 2 {
        return Err(JobError::validation(format!("num_paths must be at least 2, got {}", num_paths)));
    }
    if num_steps < 1 {
        return Err(JobError::validation("num_steps must be at least 1"));
    }
    let limits = &ENGINE.pricing;
    if num_paths > limits.max_num_paths {
        return Err(JobError::validation(format!(
            "num_paths must be at most {}, got {}",
            limits.max_num_paths, num_paths
        )));
    }
    if num_steps > limits.max_num_steps {
        return Err(JobError::validation(format!(
            "num_steps must be at most {}, got {}",
            limits.max_num_steps, num_steps
        )));
    }
    if save_paths && num_paths.saturating_mul(num_steps + 1) > limits.max_saved_values {
        return Err(JobError::validation(format!(
            "save_paths supports at most {} stored values, got {} paths x {} time points",
            limits.max_saved_values,
            num_paths,
            num_steps + 1
        )));
    }
    Ok(SimulationSpec {
        num_paths,
        num_steps,
        seed,
        save_paths,
    })
}

fn simulation_spec(raw: &RawOptionParams) -> JobResult<SimulationSpec> {
    validated_simulation(
        raw.num_paths.unwrap_or(ENGINE.pricing.num_paths),
        raw.num_steps.unwrap_or(ENGINE.pricing.num_steps),
        raw.seed,
        raw.save_paths.unwrap_or(false),
    )
}

fn parse_legs(raw: &RawOptionParams, legs: &[RawLeg]) -> JobResult<Vec<LegSpec>> {
    legs.iter()
        .enumerate()
        .map(|(i, leg)| {
            let number = i + 1;
            let ticker = normalized(leg.ticker.as_ref());
            let has_underlying = ticker.is_some() || (leg.spot.is_some() && leg.sigma.is_some());
            let has_tenor = leg.expiry.is_some() || leg.tenor.is_some();
            let strike = leg.strike.filter(|k| k.is_finite() && *k > 0.0);
            let Some(strike) = strike.filter(|_| has_underlying && has_tenor) else {
                return Err(JobError::validation(format!(
                    "Leg {}: ticker, expiry, strike required",
                    number
                )));
            };
            let simulation = validated_simulation(
                leg.num_paths
                    .or(raw.num_paths)
                    .unwrap_or(ENGINE.pricing.num_paths),
                leg.num_steps
                    .or(raw.num_steps)
                    .unwrap_or(ENGINE.pricing.num_steps),
                raw.seed.map(|s| s.wrapping_add(i as u64)),
                leg.save_paths.or(raw.save_paths).unwrap_or(false),
            )
            .map_err(|e| JobError::validation(format!("Leg {}: {}", number, e)))?;
            checked_inputs(leg.spot, leg.sigma, leg.tenor)
                .map_err(|e| JobError::validation(format!("Leg {}: {}", number, e)))?;

            Ok(LegSpec {
                number,
                option: OptionSpec {
                    underlying: UnderlyingSpec {
                        ticker,
                        spot: leg.spot,
                        sigma: leg.sigma,
                        tenor: leg.tenor,
                        expiry: checked_expiry(leg.expiry.as_ref())
                            .map_err(|e| JobError::validation(format!("Leg {}: {}", number, e)))?,
                        use_chain: true,
                    },
                    strike,
                    kind: parse_kind(leg.option_type.as_deref())?,
                    rate: raw.r.unwrap_or(ENGINE.pricing.rate),
                    dividend_yield: raw.q.unwrap_or(0.0),
                },
                qty: leg.qty.unwrap_or(1.0),
                simulation,
            })
        })
        .collect()
}

fn optimization_spec(params: &Value) -> JobResult<OptimizationSpec> {
    let raw: RawOptimizationParams = decode(params)?;
    let constraint_label = raw.constraint.clone().unwrap_or_else(|| "None".to_string());
    let mut constraint = PortfolioConstraint::from_label(&constraint_label);
    if let Some(long_only) = raw.long_only {
        constraint.long_only = long_only;
    }
    if let Some(w_max) = raw.w_max {
        if !(w_max.is_finite() && w_max > 0.0) {
            return Err(JobError::validation(format!("w_max must be positive, got {}", w_max)));
        }
        constraint.w_max = Some(w_max);
    }
    if raw.cardinality.is_some() {
        constraint.cardinality = raw.cardinality;
    }

    let solver = match raw.solver.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("annealing") | Some("anneal") | Some("sa") => SolverChoice::SimulatedAnnealing,
        Some("projection") | Some("topk") | Some("top-k") => SolverChoice::TopKProjection,
        Some(other) => {
            return Err(JobError::validation(format!(
                "unknown solver '{}', expected annealing or projection",
                other
            )));
        }
    };

    let tickers = raw.tickers.map(|list| {
        list.iter()
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
    });

    Ok(OptimizationSpec {
        portfolio_id: raw.portfolio_id,
        tickers,
        constraint_label,
        constraint,
        target: raw.target,
        period: raw.period.unwrap_or_else(|| MARKET.optimization_period.to_string()),
        solver,
        seed: raw.seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn option_job(product: Option<&str>, algo: &str, params: Value) -> JobResult<JobSpec> {
        JobSpec::parse(JobType::OptionPricing, product, algo, &params)
    }

    #[test]
    fn numeric_strings_and_flag_words_are_accepted() {
        let spec = option_job(
            Some("European"),
            "MonteCarlo",
            json!({"spot": "100", "sigma": 0.2, "strike": "105", "T": "1",
                   "num_paths": "1000", "num_steps": 12, "save_paths": "yes", "option_type": "put"}),
        )
        .unwrap();
        let JobSpec::Vanilla { method, option, simulation } = spec else {
            panic!("expected vanilla spec");
        };
        assert_eq!(method, PricingMethod::MonteCarlo);
        assert_eq!(option.strike, 105.0);
        assert_eq!(option.kind, OptionKind::Put);
        assert_eq!(option.underlying.spot, Some(100.0));
        assert_eq!(option.underlying.tenor, Some(1.0));
        assert_eq!(option.rate, ENGINE.pricing.rate);
        assert_eq!(simulation.num_paths, 1000);
        assert!(simulation.save_paths);
    }

    #[test]
    fn empty_product_means_european() {
        let spec = option_job(Some("  "), "BlackScholes", json!({"S0": 100, "sigma": 0.2, "strike": 100})).unwrap();
        assert!(matches!(spec, JobSpec::Vanilla { method: PricingMethod::BlackScholes, .. }));
    }

    #[test]
    fn unsupported_combinations_are_rejected_before_params() {
        let err = option_job(None, "QAE", json!({})).unwrap_err();
        assert!(matches!(err, JobError::Unsupported { .. }));
        let err = option_job(Some("Asian"), "BlackScholes", json!({})).unwrap_err();
        assert!(matches!(err, JobError::Unsupported { .. }));
        let err = JobSpec::parse(JobType::PortfolioOptimization, None, "Genetic", &json!({})).unwrap_err();
        assert!(matches!(err, JobError::Unsupported { .. }));
    }

    #[test]
    fn american_accepts_lattice_aliases() {
        for algo in ["Binomial", "Lattice", "CRR"] {
            let spec = option_job(Some("American"), algo, json!({"spot": 100, "sigma": 0.3, "strike": 95})).unwrap();
            assert!(matches!(spec, JobSpec::Binomial { steps: 200, .. }));
        }
    }

    #[test]
    fn chain_mode_requires_ticker_expiry_strike() {
        let err = option_job(None, "BlackScholes", json!({"use_chain": "true", "ticker": "AAPL"})).unwrap_err();
        assert_eq!(err.to_string(), "ticker, expiry and strike are required when use_chain=true");
    }

    #[test]
    fn malformed_expiry_is_a_validation_error() {
        let err = option_job(None, "BlackScholes", json!({"ticker": "AAPL", "strike": 100, "expiry": "next friday"}))
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
    }

    #[test]
    fn barrier_requires_level_and_known_type() {
        let base = json!({"spot": 100, "sigma": 0.2, "strike": 100});
        let err = option_job(Some("Barrier"), "MonteCarlo", base.clone()).unwrap_err();
        assert_eq!(err.to_string(), "barrier level is required for Barrier options");

        let mut params = base;
        params["barrier"] = json!(80);
        params["barrier_type"] = json!("up_and_in");
        let JobSpec::Barrier { barrier, .. } = option_job(Some("Barrier"), "MonteCarlo", params).unwrap() else {
            panic!("expected barrier spec");
        };
        assert_eq!(barrier.label(), "up-and-in");
    }

    #[test]
    fn legs_report_the_offending_leg() {
        let params = json!({"legs": [
            {"ticker": "$aapl", "expiry": "2030-01-17", "strike": 150},
            {"ticker": "MSFT", "strike": 300}
        ]});
        let err = option_job(Some("European"), "BlackScholes", params).unwrap_err();
        assert_eq!(err.to_string(), "Leg 2: ticker, expiry, strike required");
    }

    #[test]
    fn legs_inherit_job_level_settings() {
        let params = json!({"r": 0.03, "num_paths": 500, "save_paths": true, "legs": [
            {"ticker": "appl", "expiry": "2030-01-17", "strike": 150, "qty": "2"},
            {"spot": 50, "sigma": 0.4, "T": 0.25, "strike": 55, "option_type": "PUT", "num_paths": 64}
        ]});
        let JobSpec::MultiLeg { legs, .. } = option_job(None, "MonteCarlo", params).unwrap() else {
            panic!("expected multi-leg spec");
        };
        assert_eq!(legs[0].option.underlying.ticker.as_deref(), Some("AAPL"));
        assert_eq!(legs[0].qty, 2.0);
        assert_eq!(legs[0].simulation.num_paths, 500);
        assert_eq!(legs[1].simulation.num_paths, 64);
        assert_eq!(legs[1].option.rate, 0.03);
        assert!(legs[1].simulation.save_paths);
    }

    #[test]
    fn too_few_paths_is_rejected() {
        let err = option_job(None, "MonteCarlo", json!({"spot": 100, "sigma": 0.2, "strike": 100, "num_paths": 1}))
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
    }

    #[test]
    fn constraint_labels() {
        let max = PortfolioConstraint::from_label("Max weight 20%");
        assert_eq!(max.w_max, Some(0.2));
        assert!(max.long_only && max.gross_capped);
        assert_eq!(PortfolioConstraint::from_label("Cardinality=3").cardinality, Some(3));
        assert_eq!(PortfolioConstraint::from_label("Cardinality=x").cardinality, None);
        assert_eq!(PortfolioConstraint::from_label("Long-only").w_max, None);
    }

    #[test]
    fn optimization_spec_defaults() {
        let spec = JobSpec::parse(
            JobType::PortfolioOptimization,
            None,
            "QAOA",
            &json!({"tickers": ["aapl", " msft"], "target": "", "constraint": "Cardinality=1", "solver": "projection"}),
        )
        .unwrap();
        let JobSpec::Cardinality(opt) = spec else {
            panic!("expected cardinality spec");
        };
        assert_eq!(opt.tickers, Some(vec!["AAPL".to_string(), "MSFT".to_string()]));
        assert_eq!(opt.target, None);
        assert_eq!(opt.period, "3y");
        assert_eq!(opt.solver, SolverChoice::TopKProjection);
        assert_eq!(opt.constraint.cardinality, Some(1));
    }

    #[test]
    fn contract_inputs_must_be_usable() {
        let err = option_job(None, "MonteCarlo", json!({"spot": 100, "sigma": 0.2, "T": -1.0, "strike": 100}))
            .unwrap_err();
        assert_eq!(err.to_string(), "T must not be negative, got -1");

        let err = option_job(None, "BlackScholes", json!({"spot": "NaN", "sigma": 0.2, "strike": 100})).unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert!(err.to_string().contains("finite"));

        let err = option_job(None, "BlackScholes", json!({"spot": 100, "sigma": 0, "strike": 100})).unwrap_err();
        assert_eq!(err.to_string(), "sigma must be positive, got 0");

        let err = option_job(None, "BlackScholes", json!({"ticker": "AAPL", "spot": -5, "strike": 100})).unwrap_err();
        assert_eq!(err.to_string(), "spot must be positive, got -5");

        // expiry today still prices
        assert!(option_job(None, "BlackScholes", json!({"spot": 100, "sigma": 0.2, "T": 0, "strike": 100})).is_ok());
    }

    #[test]
    fn leg_inputs_are_checked_too() {
        let params = json!({"legs": [
            {"spot": 50, "sigma": 0.4, "T": 0.25, "strike": 55},
            {"spot": 50, "sigma": -0.4, "T": 0.25, "strike": 55}
        ]});
        let err = option_job(None, "BlackScholes", params).unwrap_err();
        assert_eq!(err.to_string(), "Leg 2: sigma must be positive, got -0.4");
    }

    #[test]
    fn oversized_work_is_rejected() {
        let base = json!({"spot": 100, "sigma": 0.2, "strike": 100});

        let mut params = base.clone();
        params["num_paths"] = json!(1e12);
        let err = option_job(None, "MonteCarlo", params).unwrap_err();
        assert!(err.to_string().starts_with("num_paths must be at most"));

        let mut params = base.clone();
        params["num_steps"] = json!(ENGINE.pricing.max_num_steps + 1);
        assert!(matches!(option_job(Some("Asian"), "MonteCarlo", params), Err(JobError::Validation(_))));

        let mut params = base.clone();
        params["num_paths"] = json!(1_000_000);
        params["save_paths"] = json!(true);
        let err = option_job(None, "MonteCarlo", params.clone()).unwrap_err();
        assert!(err.to_string().starts_with("save_paths supports at most"));
        params["save_paths"] = json!(false);
        assert!(option_job(None, "MonteCarlo", params).is_ok());

        let mut params = base;
        params["num_steps"] = json!(ENGINE.pricing.max_lattice_steps + 1);
        let err = option_job(Some("American"), "Binomial", params).unwrap_err();
        assert!(err.to_string().contains("for the lattice"));
    }
}
