use crate::domain::Contract;
use crate::engine::error::{JobError, JobResult};

/// Cox-Ross-Rubinstein lattice with early exercise at every node.
/// Degenerate inputs (no time or no volatility) return the intrinsic value.
pub fn price_american(c: &Contract, steps: usize) -> JobResult<f64> {
    if steps < 1 {
        return Err(JobError::validation("num_steps must be at least 1"));
    }
    if c.tenor <= 0.0 || c.sigma <= 0.0 {
        return Ok(c.intrinsic(c.spot));
    }

    let dt = c.tenor / steps as f64;
    let u = (c.sigma * dt.sqrt()).exp();
    let d = 1.0 / u;
    let p = (((c.rate - c.dividend_yield) * dt).exp() - d) / (u - d);
    if !(0.0..=1.0).contains(&p) {
        return Err(JobError::Numerical(format!(
            "risk-neutral probability {:.4} outside [0, 1]; increase num_steps",
            p
        )));
    }
    let disc = (-c.rate * dt).exp();

    // Node j at step i has spot S·u^(2j - i)
    let node_spot = |i: usize, j: usize| c.spot * u.powi(2 * j as i32 - i as i32);
    let mut values: Vec<f64> = (0..=steps).map(|j| c.intrinsic(node_spot(steps, j))).collect();

    for i in (0..steps).rev() {
        for j in 0..=i {
            let hold = disc * (p * values[j + 1] + (1.0 - p) * values[j]);
            values[j] = hold.max(c.intrinsic(node_spot(i, j)));
        }
    }
    Ok(values[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OptionKind;
    use crate::pricing::black_scholes;

    fn contract(kind: OptionKind) -> Contract {
        Contract {
            spot: 100.0,
            strike: 100.0,
            tenor: 1.0,
            rate: 0.05,
            sigma: 0.2,
            dividend_yield: 0.0,
            kind,
        }
    }

    #[test]
    fn american_call_without_dividends_matches_black_scholes() {
        let c = contract(OptionKind::Call);
        let lattice = price_american(&c, 2000).unwrap();
        assert!((lattice - black_scholes::price(&c)).abs() < 0.02, "{lattice}");
    }

    #[test]
    fn american_put_carries_early_exercise_premium() {
        let p = contract(OptionKind::Put);
        let american = price_american(&p, 500).unwrap();
        let european = black_scholes::price(&p);
        assert!(american > european, "{american} <= {european}");
        // Deep in the money: worth at least immediate exercise
        let deep = Contract { spot: 60.0, ..p };
        assert!(price_american(&deep, 200).unwrap() >= 40.0);
    }

    #[test]
    fn degenerate_inputs_return_intrinsic() {
        let c = Contract { spot: 120.0, tenor: 0.0, ..contract(OptionKind::Call) };
        assert_eq!(price_american(&c, 200).unwrap(), 20.0);
        assert!(matches!(price_american(&c, 0), Err(JobError::Validation(_))));
    }
}
