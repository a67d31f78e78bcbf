pub mod cardinality;
pub mod mean_variance;
pub mod returns;

pub use cardinality::{SelectionProblem, SelectionSolver, SimulatedAnnealing, TopKProjection};
pub use returns::{ReturnStats, estimate};

use crate::utils::Payload;
use crate::utils::maths_utils::{dot, quad_form};

/// Weights plus the portfolio statistics reported to clients
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when volatility is zero
    pub sharpe: Option<f64>,
    pub ok: bool,
    pub message: String,
}

impl Allocation {
    pub fn evaluate(weights: Vec<f64>, mu: &[f64], sigma: &[Vec<f64>], ok: bool, message: &str) -> Self {
        let expected_return = dot(mu, &weights);
        let volatility = quad_form(sigma, &weights).max(0.0).sqrt();
        let sharpe = (volatility > 0.0).then(|| expected_return / volatility);
        Self {
            weights,
            expected_return,
            volatility,
            sharpe,
            ok,
            message: message.to_string(),
        }
    }

    /// Fields shared by every optimization result document
    pub fn to_payload(&self, tickers: &[String]) -> Payload {
        Payload::object()
            .with("weights", self.weights.clone())
            .with("tickers", tickers.to_vec())
            .with("expectedReturn", self.expected_return)
            .with("volatility", self.volatility)
            .with("sharpe", self.sharpe)
            .with("ok", self.ok)
            .with("message", self.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_volatility_has_no_sharpe() {
        let a = Allocation::evaluate(vec![1.0], &[0.05], &[vec![0.0]], true, "ok");
        assert_eq!(a.sharpe, None);
        assert_eq!(a.expected_return, 0.05);
        let json = crate::utils::sanitize(&a.to_payload(&["CASH".to_string()]));
        assert!(json["sharpe"].is_null());
        assert_eq!(json["tickers"][0], "CASH");
    }
}
