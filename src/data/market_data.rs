//! Market-data collaborator: spot quotes, option chains and close histories.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEBUG_FLAGS, MARKET};
use crate::models::{OptionChain, SpotQuote};

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest quote. A quote without a price is not an error.
    async fn spot(&self, ticker: &str) -> Result<SpotQuote>;

    /// Listed chain for one expiry ("YYYY-MM-DD"); empty when nothing is listed
    async fn option_chain(&self, ticker: &str, expiry: &str) -> Result<OptionChain>;

    /// Daily closes over `period` ("5d", "1y", "3y", ...), oldest first
    async fn history(&self, ticker: &str, period: &str) -> Result<Vec<f64>>;

    /// A unique identifier for this implementation
    fn signature(&self) -> &'static str;
}

/// Trading days covered by a period string such as "5d", "6mo", "1y".
/// `None` for "max" or anything unrecognised.
pub fn period_observations(period: &str) -> Option<usize> {
    let period = period.trim().to_ascii_lowercase();
    let split = period.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = period.split_at(split);
    let count: usize = count.parse().ok()?;
    let days_per_year = MARKET.trading_days_per_year as usize;
    match unit {
        "d" => Some(count),
        "wk" | "w" => Some(count * 5),
        "mo" => Some(count * days_per_year / 12),
        "y" => Some(count * days_per_year),
        _ => None,
    }
}

/// Wraps any provider with a time-to-live cache keyed by request.
/// Failed lookups are not cached.
pub struct CachedMarketData<P> {
    inner: P,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl<P: MarketDataProvider> CachedMarketData<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().ok()?;
        let (stored_at, value) = entries.get(key)?;
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    fn store<T: Serialize>(&self, key: String, data: &T) {
        let Ok(value) = serde_json::to_value(data) else {
            return;
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now(), value));
        }
    }

    async fn cached<T, Fut>(&self, key: String, fetch: impl FnOnce() -> Fut) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        if let Some(hit) = self.lookup::<T>(&key) {
            if DEBUG_FLAGS.print_market_cache {
                log::info!("market cache hit: {}", key);
            }
            return Ok(hit);
        }
        if DEBUG_FLAGS.print_market_cache {
            log::info!("market cache miss: {}", key);
        }
        let data = fetch().await?;
        self.store(key, &data);
        Ok(data)
    }
}

#[async_trait]
impl<P: MarketDataProvider> MarketDataProvider for CachedMarketData<P> {
    async fn spot(&self, ticker: &str) -> Result<SpotQuote> {
        self.cached(format!("lk:{}", ticker), || self.inner.spot(ticker)).await
    }

    async fn option_chain(&self, ticker: &str, expiry: &str) -> Result<OptionChain> {
        self.cached(format!("chain:{}:{}", ticker, expiry), || {
            self.inner.option_chain(ticker, expiry)
        })
        .await
    }

    async fn history(&self, ticker: &str, period: &str) -> Result<Vec<f64>> {
        self.cached(format!("hist:{}:{}", ticker, period), || {
            self.inner.history(ticker, period)
        })
        .await
    }

    fn signature(&self) -> &'static str {
        self.inner.signature()
    }
}

/// Fixture data for one ticker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerFixture {
    #[serde(default)]
    pub spot: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Daily closes, oldest first
    #[serde(default)]
    pub history: Vec<f64>,
    /// Chains keyed by expiry
    #[serde(default)]
    pub chains: HashMap<String, OptionChain>,
}

/// Serves market data from memory. Loaded from JSON or built in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticMarketData {
    #[serde(default)]
    pub tickers: HashMap<String, TickerFixture>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, ticker: &str, fixture: TickerFixture) -> Self {
        self.tickers.insert(ticker.to_ascii_uppercase(), fixture);
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut data: StaticMarketData =
            serde_json::from_str(text).context("Failed to parse market fixture")?;
        data.tickers = data
            .tickers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        Ok(data)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to open market fixture: {:?}", path))?;
        Self::from_json_str(&text)
    }

    fn fixture(&self, ticker: &str) -> Option<&TickerFixture> {
        self.tickers.get(&ticker.to_ascii_uppercase())
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn spot(&self, ticker: &str) -> Result<SpotQuote> {
        Ok(match self.fixture(ticker) {
            Some(f) => SpotQuote {
                price: f.spot,
                currency: f
                    .currency
                    .clone()
                    .unwrap_or_else(|| MARKET.default_currency.to_string()),
            },
            None => SpotQuote {
                price: None,
                currency: MARKET.default_currency.to_string(),
            },
        })
    }

    async fn option_chain(&self, ticker: &str, expiry: &str) -> Result<OptionChain> {
        Ok(self
            .fixture(ticker)
            .and_then(|f| f.chains.get(expiry))
            .cloned()
            .unwrap_or_default())
    }

    async fn history(&self, ticker: &str, period: &str) -> Result<Vec<f64>> {
        let Some(fixture) = self.fixture(ticker) else {
            return Ok(Vec::new());
        };
        let closes = &fixture.history;
        let keep = period_observations(period)
            // n returns need n + 1 closes
            .map(|n| (n + 1).min(closes.len()))
            .unwrap_or(closes.len());
        Ok(closes[closes.len() - keep..].to_vec())
    }

    fn signature(&self) -> &'static str {
        "Static Market Data"
    }
}

/// A provider that always fails. Stands in for an unreachable upstream.
pub struct UnavailableMarketData;

#[async_trait]
impl MarketDataProvider for UnavailableMarketData {
    async fn spot(&self, ticker: &str) -> Result<SpotQuote> {
        Err(anyhow!("{}: market data unavailable", ticker))
    }

    async fn option_chain(&self, ticker: &str, _expiry: &str) -> Result<OptionChain> {
        Err(anyhow!("{}: market data unavailable", ticker))
    }

    async fn history(&self, ticker: &str, _period: &str) -> Result<Vec<f64>> {
        Err(anyhow!("{}: market data unavailable", ticker))
    }

    fn signature(&self) -> &'static str {
        "Unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn spot(&self, _ticker: &str) -> Result<SpotQuote> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SpotQuote {
                price: Some(100.0 + n as f64),
                currency: "USD".into(),
            })
        }

        async fn option_chain(&self, _ticker: &str, _expiry: &str) -> Result<OptionChain> {
            Ok(OptionChain::default())
        }

        async fn history(&self, _ticker: &str, _period: &str) -> Result<Vec<f64>> {
            Err(anyhow!("boom"))
        }

        fn signature(&self) -> &'static str {
            "Counting"
        }
    }

    #[test]
    fn period_strings() {
        assert_eq!(period_observations("5d"), Some(5));
        assert_eq!(period_observations("1y"), Some(252));
        assert_eq!(period_observations("6mo"), Some(126));
        assert_eq!(period_observations("max"), None);
    }

    #[tokio::test]
    async fn cache_serves_repeats_until_ttl_expires() {
        let cached = CachedMarketData::new(
            CountingProvider { calls: AtomicUsize::new(0) },
            Duration::from_secs(900),
        );
        assert_eq!(cached.spot("AAPL").await.unwrap().price, Some(100.0));
        assert_eq!(cached.spot("AAPL").await.unwrap().price, Some(100.0));
        assert_eq!(cached.spot("MSFT").await.unwrap().price, Some(101.0));
        assert!(cached.history("AAPL", "1y").await.is_err());

        let expired = CachedMarketData::new(CountingProvider { calls: AtomicUsize::new(0) }, Duration::ZERO);
        expired.spot("AAPL").await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(expired.spot("AAPL").await.unwrap().price, Some(101.0));
    }

    #[tokio::test]
    async fn static_data_trims_history_to_period() {
        let market = StaticMarketData::from_json_str(
            r#"{"tickers": {"aapl": {"spot": 190.5, "history": [1, 2, 3, 4, 5, 6, 7, 8]}}}"#,
        )
        .unwrap();
        assert_eq!(market.spot("AAPL").await.unwrap().price, Some(190.5));
        assert_eq!(market.history("AAPL", "5d").await.unwrap(), vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(market.history("AAPL", "1y").await.unwrap().len(), 8);
        assert!(market.history("ZZZZ", "1y").await.unwrap().is_empty());
        assert_eq!(market.spot("ZZZZ").await.unwrap().price, None);
        assert!(market.option_chain("AAPL", "2030-01-17").await.unwrap().calls.is_empty());
    }
}
