//! Option pricing: closed form, lattice and Monte Carlo kernels, underlying
//! resolution and multi-leg aggregation.

pub mod binomial;
pub mod black_scholes;
pub mod legs;
pub mod monte_carlo;
pub mod underlying;

use chrono::{DateTime, Utc};

use crate::data::artifacts::PathArtifactStore;
use crate::data::market_data::MarketDataProvider;
use crate::domain::{BarrierKind, Contract};
use crate::engine::error::JobResult;
use crate::models::PathsHandle;
use crate::models::params::{OptionSpec, PricingMethod, SimulationSpec};
use crate::utils::maths_utils::linspace_f32;

pub use monte_carlo::{Payoff, Simulation};
pub use underlying::{ResolvedUnderlying, VolSource};

/// What a pricing run may touch besides its inputs
pub struct PricingContext<'a> {
    pub market: &'a dyn MarketDataProvider,
    pub artifacts: &'a PathArtifactStore,
    /// Owner of any persisted path artifact
    pub job_id: &'a str,
    pub now: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Product {
    Vanilla(PricingMethod),
    American { steps: usize },
    Asian,
    Barrier(BarrierKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    /// Zero for deterministic methods
    pub stderr: f64,
    pub paths: Option<PathsHandle>,
}

#[derive(Debug, Clone)]
pub struct PricedOption {
    pub underlying: ResolvedUnderlying,
    pub contract: Contract,
    pub quote: Quote,
}

fn closed_form(price: f64) -> Quote {
    Quote {
        price,
        stderr: 0.0,
        paths: None,
    }
}

fn monte_carlo_quote(
    ctx: &PricingContext<'_>,
    contract: &Contract,
    payoff: Payoff,
    simulation: &SimulationSpec,
    persist: bool,
) -> JobResult<Quote> {
    let sim = Simulation {
        num_paths: simulation.num_paths,
        num_steps: simulation.num_steps,
        seed: simulation.seed,
    };
    let outcome = monte_carlo::simulate(contract, payoff, &sim, persist)?;
    let paths = match outcome.paths {
        Some(matrix) if persist => {
            let time_grid = linspace_f32(0.0, contract.tenor, sim.num_steps + 1);
            Some(ctx.artifacts.put(ctx.job_id, &time_grid, &matrix)?)
        }
        _ => None,
    };
    Ok(Quote {
        price: outcome.price,
        stderr: outcome.stderr,
        paths,
    })
}

/// Resolves the underlying, then prices one option. `persist` stores the
/// simulated trajectories (Monte Carlo products only).
pub async fn price_option(
    ctx: &PricingContext<'_>,
    product: Product,
    option: &OptionSpec,
    simulation: &SimulationSpec,
    persist: bool,
) -> JobResult<PricedOption> {
    let underlying = underlying::resolve(ctx.market, option, ctx.now).await?;
    let contract = Contract {
        spot: underlying.spot,
        strike: option.strike,
        tenor: underlying.tenor,
        rate: option.rate,
        sigma: underlying.sigma,
        dividend_yield: option.dividend_yield,
        kind: option.kind,
    };

    let quote = match product {
        Product::Vanilla(PricingMethod::BlackScholes) => closed_form(black_scholes::price(&contract)),
        Product::American { steps } => closed_form(binomial::price_american(&contract, steps)?),
        Product::Vanilla(PricingMethod::MonteCarlo) => {
            monte_carlo_quote(ctx, &contract, Payoff::Vanilla, simulation, persist)?
        }
        Product::Asian => monte_carlo_quote(ctx, &contract, Payoff::Asian, simulation, persist)?,
        Product::Barrier(barrier) => {
            monte_carlo_quote(ctx, &contract, Payoff::Barrier(barrier), simulation, persist)?
        }
    };

    Ok(PricedOption {
        underlying,
        contract,
        quote,
    })
}
