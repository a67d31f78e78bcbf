use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OptionKind;
use crate::utils::maths_utils::nearest_index;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    crate::config::MARKET.default_currency.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChainRow {
    pub strike: f64,
    #[serde(default)]
    pub implied_vol: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    #[serde(default)]
    pub calls: Vec<OptionChainRow>,
    #[serde(default)]
    pub puts: Vec<OptionChainRow>,
}

impl OptionChain {
    pub fn side(&self, kind: OptionKind) -> &[OptionChainRow] {
        match kind {
            OptionKind::Call => &self.calls,
            OptionKind::Put => &self.puts,
        }
    }

    /// The row of the requested side whose strike is closest to `strike`
    pub fn nearest(&self, kind: OptionKind, strike: f64) -> Option<&OptionChainRow> {
        let rows = self.side(kind);
        let strikes: Vec<f64> = rows.iter().map(|r| r.strike).collect();
        nearest_index(&strikes, strike).map(|i| &rows[i])
    }
}

/// What the pricer learned about an underlying. Reported back under `inferred`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub spot: f64,
    pub currency: String,
    pub implied_vol: Option<f64>,
    pub historical_vol: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub as_of: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_row_picks_closest_strike() {
        let chain = OptionChain {
            calls: [90.0, 100.0, 110.0]
                .iter()
                .map(|&strike| OptionChainRow {
                    strike,
                    implied_vol: Some(strike / 500.0),
                    ..Default::default()
                })
                .collect(),
            puts: Vec::new(),
        };
        let row = chain.nearest(OptionKind::Call, 104.0).unwrap();
        assert_eq!(row.strike, 100.0);
        assert!(chain.nearest(OptionKind::Put, 100.0).is_none());
    }

    #[test]
    fn chain_rows_use_camel_case() {
        let row: OptionChainRow =
            serde_json::from_str(r#"{"strike": 50, "impliedVol": 0.3, "lastPrice": 2.5}"#).unwrap();
        assert_eq!(row.implied_vol, Some(0.3));
        assert_eq!(row.last_price, Some(2.5));
        assert_eq!(row.bid, None);
    }
}
