use crate::facility::SpotId;
use crate::models::PolicyKind;
use crate::occupancy::Proximity;
use crate::policies::{
    classify_failure, entry_table, route_first, score_spot, AssignmentContext, AssignmentPolicy,
    ScoreBreakdown,
};
use crate::state::AssignmentResult;
use crate::vehicle::Vehicle;

#[derive(Debug, Default)]
pub struct WeightedPolicy;

impl WeightedPolicy {
    pub(crate) fn ranked(
        ctx: &AssignmentContext<'_>,
        vehicle: &Vehicle,
    ) -> Vec<(SpotId, Option<ScoreBreakdown>)> {
        let graph = ctx.graph();
        let table = entry_table(ctx.pathfinder, vehicle.entry);
        for &spot_type in vehicle.vehicle_type.allowed_spots() {
            let ranked: Vec<(SpotId, Option<ScoreBreakdown>)> = ctx
                .occupancy
                .free_spots_ranked(graph, &table, Proximity::All, &[spot_type], |spot, travel| {
                    score_spot(ctx, &vehicle.preferences, spot, travel).total
                })
                .into_iter()
                .filter(|&spot| ctx.is_available(spot))
                .map(|spot| {
                    let travel = table.cost(graph.spot(spot).node).unwrap_or_default();
                    (spot, Some(score_spot(ctx, &vehicle.preferences, spot, travel)))
                })
                .collect();
            if !ranked.is_empty() {
                return ranked;
            }
        }
        Vec::new()
    }
}

impl AssignmentPolicy for WeightedPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Weighted
    }

    fn assign(&mut self, ctx: &AssignmentContext<'_>, vehicle: &Vehicle) -> AssignmentResult {
        let ranked = Self::ranked(ctx, vehicle);
        if ranked.is_empty() {
            return AssignmentResult::failed(vehicle.id, classify_failure(ctx, vehicle));
        }
        route_first(ctx, vehicle, ranked)
    }
}
