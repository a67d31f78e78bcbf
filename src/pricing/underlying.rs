//! Resolves spot, volatility and tenor for an option, asking the market-data
//! provider for whatever the job did not supply.

use chrono::{DateTime, Utc};

use crate::config::{ENGINE, MARKET};
use crate::data::market_data::MarketDataProvider;
use crate::engine::error::{JobError, JobResult};
use crate::models::MarketSnapshot;
use crate::models::params::{OptionSpec, UnderlyingSpec};
use crate::utils::Payload;
use crate::utils::maths_utils::annualized_volatility;
use crate::utils::time_utils::years_until;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolSource {
    /// Volatility supplied in the job parameters
    Explicit,
    OptionChain,
    /// Realized volatility, also used when the chain has no usable IV
    Historical,
}

impl VolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            VolSource::Explicit => "explicit",
            VolSource::OptionChain => "option_chain",
            VolSource::Historical => "historical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnderlying {
    pub ticker: Option<String>,
    pub spot: f64,
    pub sigma: f64,
    pub tenor: f64,
    pub source: VolSource,
    /// Present when a ticker was consulted
    pub snapshot: Option<MarketSnapshot>,
}

impl ResolvedUnderlying {
    /// `{S0, T, sigma, r, q}` as reported under `inferred`
    pub fn inferred(&self, rate: f64, dividend_yield: f64) -> Payload {
        let mut inferred = Payload::object()
            .with("S0", self.spot)
            .with("T", self.tenor)
            .with("sigma", self.sigma)
            .with("r", rate)
            .with("q", dividend_yield);
        if let Some(snapshot) = &self.snapshot {
            inferred.insert("currency", snapshot.currency.as_str());
            inferred.insert("impliedVol", snapshot.implied_vol);
            inferred.insert("historicalVol", snapshot.historical_vol);
            inferred.insert("asOf", snapshot.as_of);
        }
        inferred
    }
}

/// Tenor from explicit `T`, else whole days until `expiry`, else the default
pub fn resolve_tenor(spec: &UnderlyingSpec, now: DateTime<Utc>) -> JobResult<f64> {
    if let Some(tenor) = spec.tenor {
        return Ok(tenor);
    }
    match &spec.expiry {
        Some(expiry) => years_until(expiry, now, ENGINE.pricing.min_tenor_years)
            .map_err(|e| JobError::validation(e.to_string())),
        None => Ok(ENGINE.pricing.tenor_years),
    }
}

fn market_err(ticker: &str, err: anyhow::Error) -> JobError {
    JobError::market(ticker, err.to_string())
}

async fn historical_vol(
    market: &dyn MarketDataProvider,
    ticker: &str,
    missing_reason: &str,
) -> JobResult<f64> {
    let closes = market
        .history(ticker, MARKET.vol_fallback_period)
        .await
        .map_err(|e| market_err(ticker, e))?;
    annualized_volatility(&closes, MARKET.trading_days_per_year)
        .ok_or_else(|| JobError::market(ticker, missing_reason))
}

pub async fn resolve(
    market: &dyn MarketDataProvider,
    option: &OptionSpec,
    now: DateTime<Utc>,
) -> JobResult<ResolvedUnderlying> {
    let spec = &option.underlying;
    let tenor = resolve_tenor(spec, now)?;

    let ticker = match (&spec.ticker, spec.spot, spec.sigma) {
        (_, Some(spot), Some(sigma)) => {
            return Ok(ResolvedUnderlying {
                ticker: spec.ticker.clone(),
                spot,
                sigma,
                tenor,
                source: VolSource::Explicit,
                snapshot: None,
            });
        }
        (Some(ticker), _, _) => ticker.as_str(),
        (None, _, _) => {
            return Err(JobError::validation("spot and sigma, or a ticker, are required"));
        }
    };

    let (spot, currency) = match spec.spot {
        Some(spot) => (spot, MARKET.default_currency.to_string()),
        None => {
            let quote = market.spot(ticker).await.map_err(|e| market_err(ticker, e))?;
            let spot = match quote.price.filter(|p| p.is_finite() && *p > 0.0) {
                Some(price) => price,
                None => market
                    .history(ticker, MARKET.spot_fallback_period)
                    .await
                    .map_err(|e| market_err(ticker, e))?
                    .last()
                    .copied()
                    .filter(|p| p.is_finite() && *p > 0.0)
                    .ok_or_else(|| JobError::market(ticker, "no spot price available"))?,
            };
            (spot, quote.currency)
        }
    };

    let mut implied_vol = None;
    let mut historical = None;
    let (sigma, source) = match (spec.sigma, spec.use_chain, &spec.expiry) {
        (Some(sigma), _, _) => (sigma, VolSource::Explicit),
        (None, true, Some(expiry)) => {
            let chain = market
                .option_chain(ticker, expiry)
                .await
                .map_err(|e| market_err(ticker, e))?;
            let row = chain
                .nearest(option.kind, option.strike)
                .ok_or_else(|| JobError::market(&format!("{} {}", ticker, expiry), "empty option chain"))?;
            implied_vol = row.implied_vol;
            match row.implied_vol.filter(|iv| iv.is_finite() && *iv > 0.0) {
                Some(iv) => (iv, VolSource::OptionChain),
                None => {
                    let hv = historical_vol(market, ticker, "no historical data for IV fallback").await?;
                    historical = Some(hv);
                    (hv, VolSource::Historical)
                }
            }
        }
        (None, _, _) => {
            let hv = historical_vol(market, ticker, "no historical data for sigma").await?;
            historical = Some(hv);
            (hv, VolSource::Historical)
        }
    };

    Ok(ResolvedUnderlying {
        ticker: Some(ticker.to_string()),
        spot,
        sigma,
        tenor,
        source,
        snapshot: Some(MarketSnapshot {
            ticker: ticker.to_string(),
            spot,
            currency,
            implied_vol,
            historical_vol: historical,
            dividend_yield: Some(option.dividend_yield),
            as_of: now,
        }),
    })
}
