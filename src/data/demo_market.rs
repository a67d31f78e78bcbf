//! Deterministic synthetic market used by the CLI when no fixture is given.

use chrono::{Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::{DEMO, MARKET};
use crate::config::demo::DemoTicker;
use crate::data::market_data::{StaticMarketData, TickerFixture};
use crate::models::{OptionChain, OptionChainRow};
use crate::utils::maths_utils::linspace_f32;
use crate::utils::time_utils::TimeUtils;

fn simulate_closes(ticker: &DemoTicker, rng: &mut StdRng) -> Vec<f64> {
    let dt = 1.0 / MARKET.trading_days_per_year;
    let drift = (ticker.drift - 0.5 * ticker.vol * ticker.vol) * dt;
    let shock = ticker.vol * dt.sqrt();
    let mut price = ticker.start_price;
    let mut closes = Vec::with_capacity(DEMO.history_days + 1);
    closes.push(price);
    for _ in 0..DEMO.history_days {
        let z: f64 = StandardNormal.sample(rng);
        price *= (drift + shock * z).exp();
        closes.push(price);
    }
    closes
}

fn chain_rows(spot: f64, base_vol: f64, tenor: f64, call: bool) -> Vec<OptionChainRow> {
    let strikes = linspace_f32(
        spot * (1.0 - DEMO.strike_band),
        spot * (1.0 + DEMO.strike_band),
        DEMO.strikes_per_chain,
    );
    strikes
        .into_iter()
        .map(|k| {
            let strike = (f64::from(k) * 2.0).round() / 2.0;
            let moneyness = (strike / spot).ln();
            let vol = base_vol + DEMO.smile * moneyness * moneyness;
            let intrinsic = (if call { spot - strike } else { strike - spot }).max(0.0);
            // Rough time value so quotes look plausible; pricing uses only the vol
            let last = intrinsic + 0.4 * spot * vol * tenor.sqrt();
            OptionChainRow {
                strike,
                implied_vol: Some(vol),
                last_price: Some(last),
                bid: Some(last * 0.98),
                ask: Some(last * 1.02),
            }
        })
        .collect()
}

/// Five tickers with about three years of daily closes and four listed expiries
pub fn demo_market() -> StaticMarketData {
    let mut rng = StdRng::seed_from_u64(DEMO.seed);

    DEMO.tickers.iter().fold(StaticMarketData::new(), |market, ticker| {
        let history = simulate_closes(ticker, &mut rng);
        let spot = history.last().copied().unwrap_or(ticker.start_price);
        let chains = DEMO
            .expiry_offsets_days
            .iter()
            .map(|&days| {
                let expiry = demo_expiry(days);
                let tenor = days as f64 / TimeUtils::DAYS_IN_YEAR;
                let chain = OptionChain {
                    calls: chain_rows(spot, ticker.vol, tenor, true),
                    puts: chain_rows(spot, ticker.vol, tenor, false),
                };
                (expiry, chain)
            })
            .collect();
        market.with_ticker(
            ticker.symbol,
            TickerFixture {
                spot: Some(spot),
                currency: Some(MARKET.default_currency.to_string()),
                history,
                chains,
            },
        )
    })
}

/// Expiry listed `days` calendar days from today, in the demo chain format
pub fn demo_expiry(days: i64) -> String {
    (Utc::now().date_naive() + Duration::days(days))
        .format(TimeUtils::EXPIRY_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::market_data::MarketDataProvider;

    #[tokio::test]
    async fn demo_market_is_reproducible_and_complete() {
        let a = demo_market();
        let b = demo_market();
        for ticker in DEMO.tickers {
            let fa = &a.tickers[ticker.symbol];
            let fb = &b.tickers[ticker.symbol];
            assert_eq!(fa.history, fb.history);
            assert_eq!(fa.history.len(), DEMO.history_days + 1);
            assert!(fa.history.iter().all(|p| *p > 0.0));
        }
        let chain = a.option_chain("AAPL", &demo_expiry(90)).await.unwrap();
        assert_eq!(chain.calls.len(), DEMO.strikes_per_chain);
        assert!(chain.puts.iter().all(|row| row.implied_vol.unwrap() > 0.0));
    }
}
