//! Synthetic demo market.
//!
//! Used when no market fixture is supplied. Everything is generated from a
//! fixed seed so demo runs are reproducible.

/// One synthetic underlying
pub struct DemoTicker {
    pub symbol: &'static str,
    pub start_price: f64,
    /// Annualized drift of the generated history
    pub drift: f64,
    /// Annualized volatility of the generated history and base implied vol
    pub vol: f64,
}

/// The Master Demo Configuration
pub struct DemoConfig {
    pub seed: u64,
    /// Daily closes generated per ticker (about three trading years)
    pub history_days: usize,
    /// Listed expiries, in calendar days from today
    pub expiry_offsets_days: &'static [i64],
    /// Strikes span `spot × (1 ± strike_band)`
    pub strike_band: f64,
    pub strikes_per_chain: usize,
    /// Curvature of the implied vol smile in log-moneyness
    pub smile: f64,
    pub tickers: &'static [DemoTicker],
}

pub const DEMO: DemoConfig = DemoConfig {
    seed: 42,
    history_days: 756,
    expiry_offsets_days: &[30, 90, 180, 365],
    strike_band: 0.3,
    strikes_per_chain: 13,
    smile: 0.4,

    tickers: &[
        DemoTicker { symbol: "AAPL", start_price: 150.0, drift: 0.12, vol: 0.25 },
        DemoTicker { symbol: "MSFT", start_price: 280.0, drift: 0.14, vol: 0.23 },
        DemoTicker { symbol: "GOOG", start_price: 110.0, drift: 0.10, vol: 0.28 },
        DemoTicker { symbol: "AMZN", start_price: 120.0, drift: 0.11, vol: 0.32 },
        DemoTicker { symbol: "NVDA", start_price: 220.0, drift: 0.30, vol: 0.50 },
    ],
};
