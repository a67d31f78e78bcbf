//! Mean-variance allocation.
//!
//! Minimizes `½wᵀΣw − λμᵀw` over the box ∩ budget set by accelerated projected
//! gradient descent. A minimum target return `μᵀw ≥ target` is handled by an
//! augmented Lagrangian outer loop.

use crate::config::OPTIMIZATION;
use crate::engine::error::{JobError, JobResult};
use crate::models::params::PortfolioConstraint;
use crate::optimization::Allocation;
use crate::utils::maths_utils::{dot, get_max, get_min, mat_vec, max_abs_row_sum, normalize_sum};

pub const MSG_SUCCESS: &str = "Optimization terminated successfully";
pub const MSG_ITERATION_LIMIT: &str = "Iteration limit reached";
pub const MSG_INFEASIBLE_BOUNDS: &str = "Positive weights cannot satisfy budget under bounds";
pub const MSG_TARGET_UNATTAINABLE: &str = "Target return cannot be met under constraints";

/// Box bounds plus an optional `Σw = 1` budget
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeasibleSet {
    lo: f64,
    hi: f64,
    budget: bool,
}

impl FeasibleSet {
    fn from_constraint(c: &PortfolioConstraint) -> Self {
        let bounded = c.long_only || c.w_max.is_some();
        let (lo, hi) = if bounded {
            let lo = if c.long_only { 0.0 } else { -1.0 };
            let hi = c.w_max.unwrap_or(if c.gross_capped {
                1.0
            } else {
                OPTIMIZATION.mean_variance.uncapped_upper_bound
            });
            (lo, hi)
        } else {
            (f64::NEG_INFINITY, f64::INFINITY)
        };
        Self {
            lo,
            hi,
            budget: c.gross_capped,
        }
    }

    fn is_empty(&self, n: usize) -> bool {
        let n = n as f64;
        self.budget && (n * self.lo > 1.0 || n * self.hi < 1.0)
    }

    fn clamp_shifted(&self, v: &[f64], shift: f64) -> Vec<f64> {
        v.iter().map(|x| (x - shift).clamp(self.lo, self.hi)).collect()
    }

    /// Euclidean projection. With a budget, bisects on the common shift `τ`
    /// so that `Σ clamp(v − τ, lo, hi) = 1`.
    fn project(&self, v: &[f64]) -> Vec<f64> {
        if !self.budget {
            return self.clamp_shifted(v, 0.0);
        }
        let n = v.len() as f64;
        if self.lo.is_infinite() && self.hi.is_infinite() {
            let shift = (v.iter().sum::<f64>() - 1.0) / n;
            return v.iter().map(|x| x - shift).collect();
        }

        let (v_min, v_max) = (get_min(v), get_max(v));
        // At `low` every weight sits on `hi`, at `high` every weight sits on `lo`
        let (mut low, mut high) = (v_min - self.hi - 1.0, v_max - self.lo + 1.0);
        for _ in 0..200 {
            let mid = 0.5 * (low + high);
            let total: f64 = self.clamp_shifted(v, mid).iter().sum();
            if total > 1.0 {
                low = mid;
            } else {
                high = mid;
            }
            if high - low < 1e-15 {
                break;
            }
        }
        self.clamp_shifted(v, 0.5 * (low + high))
    }
}

struct Problem<'a> {
    mu: &'a [f64],
    sigma: &'a [Vec<f64>],
    lambda: f64,
}

impl Problem<'_> {
    /// Gradient of the objective plus the augmented Lagrangian term for
    /// `μᵀw ≥ target` with multiplier `y` and penalty `rho`.
    fn gradient(&self, w: &[f64], target: Option<(f64, f64, f64)>) -> Vec<f64> {
        let mut grad = mat_vec(self.sigma, w);
        let mut return_weight = self.lambda;
        if let Some((target, y, rho)) = target {
            let slack = dot(self.mu, w) - target;
            return_weight += (y - rho * slack).max(0.0);
        }
        for (g, m) in grad.iter_mut().zip(self.mu) {
            *g -= return_weight * m;
        }
        grad
    }
}

/// FISTA from `start`. Returns the final iterate and whether it converged.
fn descend(
    problem: &Problem<'_>,
    set: &FeasibleSet,
    start: Vec<f64>,
    step: f64,
    target: Option<(f64, f64, f64)>,
) -> (Vec<f64>, bool) {
    let settings = &OPTIMIZATION.mean_variance;
    let mut w = start;
    let mut z = w.clone();
    let mut t = 1.0_f64;

    for _ in 0..settings.max_iterations {
        let grad = problem.gradient(&z, target);
        let moved: Vec<f64> = z.iter().zip(&grad).map(|(zi, gi)| zi - step * gi).collect();
        let next = set.project(&moved);

        let delta = next
            .iter()
            .zip(&w)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let momentum = (t - 1.0) / t_next;
        z = next
            .iter()
            .zip(&w)
            .map(|(n, prev)| n + momentum * (n - prev))
            .collect();
        w = next;
        t = t_next;

        if delta < settings.step_tolerance {
            return (w, true);
        }
    }
    (w, false)
}

/// Solves the allocation and reports success the way the solver saw it.
/// Weights are renormalized to sum to 1 afterwards.
pub fn optimize(
    mu: &[f64],
    sigma: &[Vec<f64>],
    target: Option<f64>,
    constraint: &PortfolioConstraint,
) -> JobResult<Allocation> {
    let n = mu.len();
    if n == 0 {
        return Err(JobError::validation("No assets to optimize"));
    }
    if sigma.len() != n || sigma.iter().any(|row| row.len() != n) {
        return Err(JobError::Numerical(format!(
            "covariance matrix is not {}x{}",
            n, n
        )));
    }
    if mu.iter().chain(sigma.iter().flatten()).any(|x| !x.is_finite()) {
        return Err(JobError::Numerical("non-finite return statistics".to_string()));
    }

    let settings = &OPTIMIZATION.mean_variance;
    let set = FeasibleSet::from_constraint(constraint);
    let equal = vec![1.0 / n as f64; n];
    if set.is_empty(n) {
        return Ok(Allocation::evaluate(equal, mu, sigma, false, MSG_INFEASIBLE_BOUNDS));
    }

    let problem = Problem {
        mu,
        sigma,
        lambda: if target.is_some() { 0.0 } else { settings.lambda },
    };
    let curvature = max_abs_row_sum(sigma);
    let step_for = |penalty: f64| {
        let lipschitz = curvature + penalty * dot(mu, mu);
        if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 }
    };

    let start = set.project(&equal);
    let (weights, ok, message) = match target {
        None => {
            let (w, converged) = descend(&problem, &set, start, step_for(0.0), None);
            let message = if converged { MSG_SUCCESS } else { MSG_ITERATION_LIMIT };
            (w, converged, message)
        }
        Some(target) => {
            let mut w = start;
            let mut multiplier = 0.0;
            let mut rho = settings.initial_penalty;
            let mut outcome = None;
            for _ in 0..settings.max_outer_rounds {
                let (next, converged) =
                    descend(&problem, &set, w, step_for(rho), Some((target, multiplier, rho)));
                w = next;
                if !converged {
                    outcome = Some((false, MSG_ITERATION_LIMIT));
                    break;
                }
                let slack = dot(mu, &w) - target;
                if slack >= -settings.constraint_tolerance {
                    outcome = Some((true, MSG_SUCCESS));
                    break;
                }
                multiplier = (multiplier - rho * slack).max(0.0);
                rho = (rho * 10.0).min(1e8);
            }
            let (ok, message) = outcome.unwrap_or((false, MSG_TARGET_UNATTAINABLE));
            (w, ok, message)
        }
    };

    Ok(Allocation::evaluate(normalize_sum(&weights), mu, sigma, ok, message))
}
