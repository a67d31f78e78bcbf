//! Market-data configuration

pub struct MarketConfig {
    /// Time-to-live of cached provider responses (seconds)
    pub cache_ttl_secs: u64,
    /// Annualization factor for daily observations
    pub trading_days_per_year: f64,
    /// History window used when implied volatility is unusable
    pub vol_fallback_period: &'static str,
    /// History window used to recover a spot price when the quote has none
    pub spot_fallback_period: &'static str,
    /// History window for portfolio optimization inputs
    pub optimization_period: &'static str,
    /// Currency reported when the provider does not send one
    pub default_currency: &'static str,
    /// Frequent ticker typos and their corrections
    pub ticker_fixes: &'static [(&'static str, &'static str)],
}

pub const MARKET: MarketConfig = MarketConfig {
    // 15 minutes
    cache_ttl_secs: 900,
    trading_days_per_year: 252.0,
    vol_fallback_period: "1y",
    spot_fallback_period: "5d",
    optimization_period: "3y",
    default_currency: "USD",
    ticker_fixes: &[("APPL", "AAPL")],
};
