//! Cardinality-constrained asset selection.
//!
//! Picks `k` of `n` assets by minimizing the penalized binary energy
//! `xᵀΣx − γμᵀx + P(Σx − k)²` and weights the selection equally.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::OPTIMIZATION;
use crate::engine::error::{JobError, JobResult};
use crate::optimization::Allocation;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionProblem<'a> {
    pub mu: &'a [f64],
    pub sigma: &'a [Vec<f64>],
    pub k: usize,
    pub gamma: f64,
    pub penalty: f64,
}

impl SelectionProblem<'_> {
    pub fn len(&self) -> usize {
        self.mu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mu.is_empty()
    }

    pub fn energy(&self, x: &[bool]) -> f64 {
        let mut risk = 0.0;
        let mut reward = 0.0;
        let mut count = 0.0;
        for (i, _) in x.iter().enumerate().filter(|(_, on)| **on) {
            reward += self.mu[i];
            count += 1.0;
            for (j, _) in x.iter().enumerate().filter(|(_, on)| **on) {
                risk += self.sigma[i][j];
            }
        }
        let excess = count - self.k as f64;
        risk - self.gamma * reward + self.penalty * excess * excess
    }

    /// Energy change from flipping bit `i`, given the current selection size
    fn flip_delta(&self, x: &[bool], i: usize, count: usize) -> f64 {
        let sign = if x[i] { -1.0 } else { 1.0 };
        let cross: f64 = x
            .iter()
            .enumerate()
            .filter(|(j, on)| **on && *j != i)
            .map(|(j, _)| self.sigma[i][j])
            .sum();
        let before = count as f64 - self.k as f64;
        let after = before + sign;
        sign * (self.sigma[i][i] + 2.0 * cross - self.gamma * self.mu[i])
            + self.penalty * (after * after - before * before)
    }
}

pub trait SelectionSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// One flag per asset. The caller repairs selections of the wrong size.
    fn solve(&self, problem: &SelectionProblem<'_>) -> anyhow::Result<Vec<bool>>;
}

/// Keeps the `k` assets with the lowest `−γμᵢ + Σᵢᵢ`
#[derive(Debug, Clone, Copy, Default)]
pub struct TopKProjection;

impl TopKProjection {
    fn project(problem: &SelectionProblem<'_>) -> Vec<bool> {
        let mut order: Vec<usize> = (0..problem.len()).collect();
        let score = |i: usize| -problem.gamma * problem.mu[i] + problem.sigma[i][i];
        order.sort_by(|a, b| score(*a).total_cmp(&score(*b)));
        let mut x = vec![false; problem.len()];
        for i in order.into_iter().take(problem.k) {
            x[i] = true;
        }
        x
    }
}

impl SelectionSolver for TopKProjection {
    fn name(&self) -> &'static str {
        "TopKProjection"
    }

    fn solve(&self, problem: &SelectionProblem<'_>) -> anyhow::Result<Vec<bool>> {
        Ok(Self::project(problem))
    }
}

/// Metropolis bit-flip annealing with a geometric temperature schedule
#[derive(Debug, Clone, Copy)]
pub struct SimulatedAnnealing {
    pub sweeps: usize,
    pub start_temperature: f64,
    pub end_temperature: f64,
    pub seed: Option<u64>,
}

impl SimulatedAnnealing {
    pub fn new(seed: Option<u64>) -> Self {
        let cfg = &OPTIMIZATION.cardinality;
        Self {
            sweeps: cfg.anneal_sweeps,
            start_temperature: cfg.anneal_start_temperature,
            end_temperature: cfg.anneal_end_temperature,
            seed,
        }
    }
}

impl SelectionSolver for SimulatedAnnealing {
    fn name(&self) -> &'static str {
        "SimulatedAnnealing"
    }

    fn solve(&self, problem: &SelectionProblem<'_>) -> anyhow::Result<Vec<bool>> {
        if !(self.start_temperature > 0.0 && self.end_temperature > 0.0) {
            anyhow::bail!("temperatures must be positive");
        }
        let n = problem.len();
        let mut rng = StdRng::seed_from_u64(self.seed.unwrap_or_else(rand::random));

        // Start from the projection so an early stop is still a sane answer
        let mut x = TopKProjection::project(problem);
        let mut count = x.iter().filter(|on| **on).count();
        let mut energy = problem.energy(&x);
        let mut best = (x.clone(), energy);

        let sweeps = self.sweeps.max(1);
        let ratio = (self.end_temperature / self.start_temperature).powf(1.0 / sweeps as f64);
        let mut temperature = self.start_temperature;
        for _ in 0..sweeps {
            for _ in 0..n {
                let i = rng.gen_range(0..n);
                let delta = problem.flip_delta(&x, i, count);
                if delta <= 0.0 || rng.r#gen::<f64>() < (-delta / temperature).exp() {
                    if x[i] {
                        count -= 1;
                    } else {
                        count += 1;
                    }
                    x[i] = !x[i];
                    energy += delta;
                    if energy < best.1 {
                        best = (x.clone(), energy);
                    }
                }
            }
            temperature *= ratio;
        }

        if !best.1.is_finite() {
            anyhow::bail!("energy diverged");
        }
        Ok(best.0)
    }
}

/// Resolves `k`, runs `solver` and weights the chosen assets `1/k`.
/// `k` defaults to `max(1, ⌊√n⌋)`.
pub fn select(
    mu: &[f64],
    sigma: &[Vec<f64>],
    k: Option<usize>,
    solver: &dyn SelectionSolver,
) -> JobResult<(Allocation, usize)> {
    let n = mu.len();
    if n == 0 {
        return Err(JobError::validation("No assets to optimize"));
    }
    let k = k.unwrap_or_else(|| ((n as f64).sqrt().floor() as usize).max(1));
    if k == 0 || k > n {
        return Err(JobError::validation(format!(
            "cardinality must be between 1 and {}, got {}",
            n, k
        )));
    }

    let cfg = &OPTIMIZATION.cardinality;
    let problem = SelectionProblem {
        mu,
        sigma,
        k,
        gamma: cfg.gamma,
        penalty: cfg.penalty,
    };
    let mut chosen = solver
        .solve(&problem)
        .map_err(|e| JobError::Numerical(format!("{} failed: {}", solver.name(), e)))?;
    let selected = chosen.iter().filter(|on| **on).count();
    if chosen.len() != n || selected != k {
        log::warn!(
            "{} returned {} of {} assets, expected {}; using top-{} projection",
            solver.name(),
            selected,
            chosen.len(),
            k,
            k
        );
        chosen = TopKProjection::project(&problem);
    }

    let weights: Vec<f64> = chosen
        .iter()
        .map(|on| if *on { 1.0 / k as f64 } else { 0.0 })
        .collect();
    let message = format!("{} ok", solver.name());
    Ok((Allocation::evaluate(weights, mu, sigma, true, &message), k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> (Vec<f64>, Vec<Vec<f64>>) {
        let mu = vec![0.05, 0.20, 0.10, 0.30, 0.02];
        let sigma = (0..5)
            .map(|i| (0..5).map(|j| if i == j { 0.02 * (i + 1) as f64 } else { 0.001 }).collect())
            .collect();
        (mu, sigma)
    }

    struct Everything;

    impl SelectionSolver for Everything {
        fn name(&self) -> &'static str {
            "Everything"
        }

        fn solve(&self, problem: &SelectionProblem<'_>) -> anyhow::Result<Vec<bool>> {
            Ok(vec![true; problem.len()])
        }
    }

    struct Broken;

    impl SelectionSolver for Broken {
        fn name(&self) -> &'static str {
            "Broken"
        }

        fn solve(&self, _problem: &SelectionProblem<'_>) -> anyhow::Result<Vec<bool>> {
            anyhow::bail!("device offline")
        }
    }

    #[test]
    fn wrong_size_selection_falls_back_to_top_k() {
        let (mu, sigma) = universe();
        let (allocation, k) = select(&mu, &sigma, Some(2), &Everything).unwrap();
        assert_eq!(k, 2);
        let picked: Vec<f64> = allocation.weights.iter().copied().filter(|w| *w > 0.0).collect();
        assert_eq!(picked, vec![0.5, 0.5]);
        // lowest scores are assets 3 and 1
        assert_eq!(allocation.weights, vec![0.0, 0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn projection_prefers_return_over_variance() {
        let (mu, sigma) = universe();
        let (allocation, _) = select(&mu, &sigma, Some(1), &TopKProjection).unwrap();
        // scores: -0.005, -0.06, 0.01, -0.07, 0.09
        assert_eq!(allocation.weights, vec![0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(allocation.message, "TopKProjection ok");
    }

    #[test]
    fn default_k_is_floor_sqrt_n() {
        let (mu, sigma) = universe();
        let (allocation, k) = select(&mu, &sigma, None, &TopKProjection).unwrap();
        assert_eq!(k, 2);
        assert!((allocation.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_k_is_rejected() {
        let (mu, sigma) = universe();
        assert!(matches!(select(&mu, &sigma, Some(0), &TopKProjection), Err(JobError::Validation(_))));
        assert!(matches!(select(&mu, &sigma, Some(6), &TopKProjection), Err(JobError::Validation(_))));
    }

    #[test]
    fn solver_failure_is_named() {
        let (mu, sigma) = universe();
        let err = select(&mu, &sigma, Some(2), &Broken).unwrap_err();
        assert_eq!(err.to_string(), "Broken failed: device offline");
    }

    #[test]
    fn annealing_returns_k_assets() {
        let (mu, sigma) = universe();
        let solver = SimulatedAnnealing::new(Some(7));
        let (allocation, k) = select(&mu, &sigma, Some(3), &solver).unwrap();
        assert_eq!(allocation.weights.iter().filter(|w| **w > 0.0).count(), k);
        assert_eq!(allocation.message, "SimulatedAnnealing ok");
    }

    #[test]
    fn flip_delta_matches_energy_difference() {
        let (mu, sigma) = universe();
        let problem = SelectionProblem { mu: &mu, sigma: &sigma, k: 2, gamma: 0.5, penalty: 10.0 };
        let x = vec![true, false, true, false, false];
        for i in 0..5 {
            let mut flipped = x.clone();
            flipped[i] = !flipped[i];
            let expected = problem.energy(&flipped) - problem.energy(&x);
            assert!((problem.flip_delta(&x, i, 2) - expected).abs() < 1e-12);
        }
    }
}
