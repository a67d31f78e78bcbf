use crate::engine::error::JobResult;
use crate::models::params::{LegSpec, PricingMethod};
use crate::pricing::{PricingContext, Product, price_option};
use crate::utils::Payload;

/// Prices each leg independently and aggregates `notional = Σ price·qty` and
/// `weightedAvg = notional / Σ qty`. Only the first leg asking for paths
/// persists an artifact. `on_leg_done(done, total)` runs after every leg.
pub async fn price_legs(
    ctx: &PricingContext<'_>,
    method: PricingMethod,
    legs: &[LegSpec],
    on_leg_done: &(dyn Fn(usize, usize) + Send + Sync),
) -> JobResult<Payload> {
    let mut notional = 0.0;
    let mut total_qty = 0.0;
    let mut persisted = false;
    let mut results = Vec::with_capacity(legs.len());

    for leg in legs {
        let persist = method == PricingMethod::MonteCarlo && leg.simulation.save_paths && !persisted;
        let priced = price_option(ctx, Product::Vanilla(method), &leg.option, &leg.simulation, persist).await?;
        persisted |= priced.quote.paths.is_some();

        notional += priced.quote.price * leg.qty;
        total_qty += leg.qty;

        results.push(
            Payload::object()
                .with("leg", leg.number)
                .with("ticker", priced.underlying.ticker.clone())
                .with("expiry", leg.option.underlying.expiry.clone())
                .with("strike", leg.option.strike)
                .with("otype", leg.option.kind.as_str())
                .with("qty", leg.qty)
                .with("S0", priced.underlying.spot)
                .with("sigma", priced.underlying.sigma)
                .with("T", priced.underlying.tenor)
                .with("source", priced.underlying.source.as_str())
                .with("algo", method.as_str())
                .with("price", priced.quote.price)
                .with("stderr", priced.quote.stderr)
                .with("paths", priced.quote.paths.as_ref().map(|h| h.to_payload())),
        );
        on_leg_done(results.len(), legs.len());
    }

    let weighted_avg = (total_qty > 0.0).then(|| notional / total_qty);
    Ok(Payload::object()
        .with("product", "European")
        .with("algo", method.as_str())
        .with("legs", Payload::List(results))
        .with(
            "totals",
            Payload::object()
                .with("notional", notional)
                .with("weightedAvg", weighted_avg),
        ))
}
