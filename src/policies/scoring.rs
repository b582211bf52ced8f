use serde::Serialize;

use crate::facility::SpotId;
use crate::policies::AssignmentContext;
use crate::vehicle::PreferenceWeights;

/// Normalised cost terms for one vehicle/spot pair; lower is better. Each
/// term is in `[0, 1]` before the condition multipliers apply. Availability
/// is the taken share of the spots around the candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub proximity: f64,
    pub price: f64,
    pub availability: f64,
    pub exit: f64,
    pub total: f64,
}

pub fn score_spot(
    ctx: &AssignmentContext<'_>,
    preferences: &PreferenceWeights,
    spot: SpotId,
    travel: u64,
) -> ScoreBreakdown {
    let pathfinder = ctx.pathfinder;
    let graph = pathfinder.graph();
    let spot = graph.spot(spot);

    let proximity = ratio(travel, pathfinder.max_spot_cost());
    let price = f64::from(spot.price_tier) / f64::from(graph.max_price_tier().max(1))
        * ctx.conditions.price_multiplier;
    let availability =
        ctx.occupancy.local_pressure(graph, spot.id) * ctx.conditions.demand_multiplier;
    let exit = pathfinder
        .exit_cost(spot.node)
        .map_or(1.0, |cost| ratio(cost, pathfinder.max_exit_cost()));

    let total = preferences.proximity * proximity
        + preferences.price * price
        + preferences.availability * availability
        + preferences.exit * exit;

    ScoreBreakdown {
        proximity,
        price,
        availability,
        exit,
        total,
    }
}

pub(crate) fn ratio(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        value as f64 / max as f64
    }
}
