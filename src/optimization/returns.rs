use statrs::statistics::Statistics;

use crate::config::MARKET;
use crate::engine::error::{JobError, JobResult};
use crate::utils::maths_utils::sample_covariance;

/// Annualized return statistics of a universe
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStats {
    pub tickers: Vec<String>,
    pub mu: Vec<f64>,
    pub sigma: Vec<Vec<f64>>,
    /// Daily observations used
    pub observations: usize,
}

/// Aligns the close series on their common trailing length, takes daily simple
/// returns (dropping days where any asset's return is undefined) and
/// annualizes mean and sample covariance.
pub fn estimate(histories: &[(String, Vec<f64>)]) -> JobResult<ReturnStats> {
    let missing: Vec<&str> = histories
        .iter()
        .filter(|(_, closes)| closes.is_empty())
        .map(|(ticker, _)| ticker.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(JobError::market(&missing.join(", "), "missing price data (check symbols)"));
    }
    if histories.is_empty() {
        return Err(JobError::validation("No assets to optimize"));
    }

    let common = histories.iter().map(|(_, c)| c.len()).min().unwrap_or(0);
    let aligned: Vec<&[f64]> = histories
        .iter()
        .map(|(_, closes)| &closes[closes.len() - common..])
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(common); histories.len()];
    for t in 1..common {
        let day: Vec<f64> = aligned.iter().map(|c| c[t] / c[t - 1] - 1.0).collect();
        if day.iter().all(|r| r.is_finite()) {
            for (column, r) in columns.iter_mut().zip(day) {
                column.push(r);
            }
        }
    }

    let observations = columns.first().map_or(0, Vec::len);
    if observations < 2 {
        let tickers: Vec<&str> = histories.iter().map(|(t, _)| t.as_str()).collect();
        return Err(JobError::market(
            &tickers.join(", "),
            "not enough overlapping price history",
        ));
    }

    let days = MARKET.trading_days_per_year;
    let mu = columns.iter().map(|c| c.iter().mean() * days).collect();
    let sigma = sample_covariance(&columns)
        .into_iter()
        .map(|row| row.into_iter().map(|x| x * days).collect())
        .collect();

    Ok(ReturnStats {
        tickers: histories.iter().map(|(t, _)| t.clone()).collect(),
        mu,
        sigma,
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_on_trailing_window() {
        let histories = vec![
            ("A".to_string(), vec![1.0, 50.0, 100.0, 101.0, 102.01]),
            ("B".to_string(), vec![10.0, 10.0, 10.5]),
        ];
        let stats = estimate(&histories).unwrap();
        assert_eq!(stats.observations, 2);
        // A's trailing returns are both 1%
        assert!((stats.mu[0] - 0.01 * 252.0).abs() < 1e-9);
        assert!(stats.sigma[0][0].abs() < 1e-12);
        assert!((stats.sigma[0][1] - stats.sigma[1][0]).abs() < 1e-15);
    }

    #[test]
    fn missing_history_lists_the_symbols() {
        let histories = vec![
            ("A".to_string(), vec![1.0, 2.0, 3.0]),
            ("X".to_string(), vec![]),
            ("Y".to_string(), vec![]),
        ];
        let err = estimate(&histories).unwrap_err();
        assert_eq!(err.to_string(), "X, Y: missing price data (check symbols)");
    }
}
