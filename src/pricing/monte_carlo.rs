//! Log-normal path simulation.
//!
//! Paths are split into fixed-size chunks simulated in parallel with rayon.
//! Each chunk owns an RNG stream derived from the base seed and its index, so a
//! seeded run produces the same numbers regardless of thread scheduling.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::config::ENGINE;
use crate::domain::{BarrierKind, BarrierStyle, Contract};
use crate::engine::error::{JobError, JobResult};
use crate::models::PathMatrix;
use crate::utils::maths_utils::mean_and_std;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Payoff {
    /// Terminal price
    Vanilla,
    /// Arithmetic average of the simulated prices, excluding the initial spot
    Asian,
    Barrier(BarrierKind),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Simulation {
    pub num_paths: usize,
    pub num_steps: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct McOutcome {
    pub price: f64,
    pub stderr: f64,
    /// Full trajectory matrix, only when requested
    pub paths: Option<PathMatrix>,
}

struct PathStats {
    last: f64,
    sum: f64,
    min: f64,
    max: f64,
}

fn payoff_of(c: &Contract, payoff: Payoff, stats: &PathStats, steps: usize) -> f64 {
    match payoff {
        Payoff::Vanilla => c.intrinsic(stats.last),
        Payoff::Asian => c.intrinsic(stats.sum / steps as f64),
        Payoff::Barrier(barrier) => {
            let touched = barrier.touched(stats.min, stats.max);
            let alive = match barrier.style {
                BarrierStyle::KnockOut => !touched,
                BarrierStyle::KnockIn => touched,
            };
            if alive { c.intrinsic(stats.last) } else { 0.0 }
        }
    }
}

/// Simulates `rows` paths with one RNG stream. When `out` is given, row-major
/// trajectories (initial spot in column 0) are written into it.
fn run_chunk(
    c: &Contract,
    payoff: Payoff,
    sim: &Simulation,
    seed: u64,
    rows: usize,
    mut out: Option<&mut [f32]>,
) -> Vec<f64> {
    let steps = sim.num_steps;
    let dt = c.tenor / steps as f64;
    let drift = (c.rate - c.dividend_yield - 0.5 * c.sigma * c.sigma) * dt;
    let shock = c.sigma * dt.sqrt();
    let mut rng = StdRng::seed_from_u64(seed);

    (0..rows)
        .map(|row| {
            let mut s = c.spot;
            let mut stats = PathStats {
                last: s,
                sum: 0.0,
                min: s,
                max: s,
            };
            if let Some(buf) = out.as_deref_mut() {
                buf[row * (steps + 1)] = s as f32;
            }
            for step in 1..=steps {
                let z: f64 = StandardNormal.sample(&mut rng);
                s *= (drift + shock * z).exp();
                stats.sum += s;
                stats.min = stats.min.min(s);
                stats.max = stats.max.max(s);
                if let Some(buf) = out.as_deref_mut() {
                    buf[row * (steps + 1) + step] = s as f32;
                }
            }
            stats.last = s;
            payoff_of(c, payoff, &stats, steps)
        })
        .collect()
}

/// Discounted mean payoff and its standard error (ddof = 1)
pub fn simulate(c: &Contract, payoff: Payoff, sim: &Simulation, capture_paths: bool) -> JobResult<McOutcome> {
    if sim.num_paths < 2 {
        return Err(JobError::validation(format!(
            "num_paths must be at least 2, got {}",
            sim.num_paths
        )));
    }
    if sim.num_steps < 1 {
        return Err(JobError::validation("num_steps must be at least 1"));
    }

    let base_seed = sim.seed.unwrap_or_else(rand::random);
    let chunk = ENGINE.simulation.paths_per_chunk.max(1);
    let cols = sim.num_steps + 1;
    let chunk_seed = |i: usize| base_seed.wrapping_add(i as u64);

    let (payoffs, paths): (Vec<f64>, Option<PathMatrix>) = if capture_paths {
        let mut matrix = PathMatrix::zeros(sim.num_paths, cols)?;
        let payoffs = matrix
            .data
            .par_chunks_mut(chunk * cols)
            .enumerate()
            .flat_map_iter(|(i, out)| {
                let rows = out.len() / cols;
                run_chunk(c, payoff, sim, chunk_seed(i), rows, Some(out))
            })
            .collect();
        (payoffs, Some(matrix))
    } else {
        let chunks = sim.num_paths.div_ceil(chunk);
        let payoffs = (0..chunks)
            .into_par_iter()
            .flat_map_iter(|i| {
                let rows = chunk.min(sim.num_paths - i * chunk);
                run_chunk(c, payoff, sim, chunk_seed(i), rows, None)
            })
            .collect();
        (payoffs, None)
    };

    let (mean, sd) = mean_and_std(&payoffs);
    let disc = c.discount();
    Ok(McOutcome {
        price: disc * mean,
        stderr: disc * sd / (sim.num_paths as f64).sqrt(),
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BarrierKind, OptionKind};
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

    fn sim(num_paths: usize, num_steps: usize) -> Simulation {
        Simulation {
            num_paths,
            num_steps,
            seed: Some(7),
        }
    }

    #[test]
    fn vanilla_matches_black_scholes_within_four_stderr() {
        for kind in [OptionKind::Call, OptionKind::Put] {
            let c = contract(kind);
            let mc = simulate(&c, Payoff::Vanilla, &sim(200_000, 1), false).unwrap();
            let bs = black_scholes::price(&c);
            assert!(mc.stderr > 0.0);
            assert!((mc.price - bs).abs() < 4.0 * mc.stderr, "{kind}: mc {} bs {}", mc.price, bs);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible_with_or_without_capture() {
        let c = contract(OptionKind::Call);
        let a = simulate(&c, Payoff::Vanilla, &sim(3_000, 12), false).unwrap();
        let b = simulate(&c, Payoff::Vanilla, &sim(3_000, 12), true).unwrap();
        assert_eq!(a.price, b.price);
        assert_eq!(a.stderr, b.stderr);

        let m = b.paths.unwrap();
        assert_eq!((m.rows, m.cols), (3_000, 13));
        assert!((0..m.rows).all(|r| m.row(r)[0] == 100.0));
        assert!(m.data.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn knock_in_plus_knock_out_equals_vanilla() {
        let c = contract(OptionKind::Call);
        let s = sim(20_000, 50);
        let vanilla = simulate(&c, Payoff::Vanilla, &s, false).unwrap().price;
        let out = BarrierKind::parse(90.0, "down-and-out").unwrap();
        let inn = BarrierKind::parse(90.0, "down-and-in").unwrap();
        let p_out = simulate(&c, Payoff::Barrier(out), &s, false).unwrap().price;
        let p_in = simulate(&c, Payoff::Barrier(inn), &s, false).unwrap().price;
        assert!((p_out + p_in - vanilla).abs() < 1e-9);
        assert!(p_out < vanilla && p_in > 0.0);
    }

    #[test]
    fn barrier_through_spot_is_touched_immediately() {
        let c = contract(OptionKind::Call);
        let s = sim(2_000, 10);
        let knocked = BarrierKind::parse(100.0, "down-and-out").unwrap();
        assert_eq!(simulate(&c, Payoff::Barrier(knocked), &s, false).unwrap().price, 0.0);
    }

    #[test]
    fn asian_call_is_cheaper_than_european() {
        let c = contract(OptionKind::Call);
        let s = sim(20_000, 52);
        let asian = simulate(&c, Payoff::Asian, &s, false).unwrap();
        let european = simulate(&c, Payoff::Vanilla, &s, false).unwrap();
        assert!(asian.price < european.price);
        assert!(asian.price > 0.0);
    }

    #[test]
    fn too_few_paths_is_rejected() {
        let c = contract(OptionKind::Call);
        assert!(simulate(&c, Payoff::Vanilla, &sim(1, 10), false).is_err());
        assert!(simulate(&c, Payoff::Vanilla, &sim(10, 0), false).is_err());
    }
}
