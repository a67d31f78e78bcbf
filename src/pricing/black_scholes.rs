use std::f64::consts::SQRT_2;

use statrs::function::erf::erfc;

use crate::domain::{Contract, OptionKind};

/// Standard normal CDF. `erfc` keeps precision in the far left tail.
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Black-Scholes-Merton price with continuous dividend yield.
/// Zero for non-positive tenor, volatility, spot or strike.
pub fn price(c: &Contract) -> f64 {
    if c.tenor <= 0.0 || c.sigma <= 0.0 || c.spot <= 0.0 || c.strike <= 0.0 {
        return 0.0;
    }
    let vol_sqrt_t = c.sigma * c.tenor.sqrt();
    let d1 = ((c.spot / c.strike).ln() + (c.rate - c.dividend_yield + 0.5 * c.sigma * c.sigma) * c.tenor)
        / vol_sqrt_t;
    let d2 = d1 - vol_sqrt_t;
    let spot_pv = c.spot * (-c.dividend_yield * c.tenor).exp();
    let strike_pv = c.strike * c.discount();

    match c.kind {
        OptionKind::Call => spot_pv * norm_cdf(d1) - strike_pv * norm_cdf(d2),
        OptionKind::Put => strike_pv * norm_cdf(-d2) - spot_pv * norm_cdf(-d1),
    }
}
