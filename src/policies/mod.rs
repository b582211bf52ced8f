mod batch_optimal;
mod nearest_first;
mod scoring;
mod weighted;

use std::borrow::Cow;
use tracing::debug;

use crate::facility::{FacilityGraph, NodeId, SpotId};
use crate::models::{Conditions, PolicyKind};
use crate::occupancy::OccupancyIndex;
use crate::pathfinder::{DistanceTable, Heuristic, Pathfinder};
use crate::state::{AssignmentFailure, AssignmentResult};
use crate::vehicle::Vehicle;

pub use batch_optimal::BatchOptimalPolicy;
pub use nearest_first::NearestFirstPolicy;
pub use scoring::{score_spot, ScoreBreakdown};
pub use weighted::WeightedPolicy;

pub trait AssignmentPolicy {
    fn kind(&self) -> PolicyKind;

    fn assign(&mut self, ctx: &AssignmentContext<'_>, vehicle: &Vehicle) -> AssignmentResult;

    fn assign_batch(
        &mut self,
        ctx: &AssignmentContext<'_>,
        vehicles: &[Vehicle],
    ) -> Vec<AssignmentResult> {
        let mut excluded = ctx.excluded.to_vec();
        let mut results = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            let local = AssignmentContext {
                excluded: &excluded,
                ..*ctx
            };
            let result = self.assign(&local, vehicle);
            if let Some(spot) = result.spot {
                excluded.push(spot);
            }
            results.push(result);
        }
        results
    }

    fn on_released(&mut self, _ctx: &AssignmentContext<'_>, _spot: SpotId) {}

    fn is_batched(&self) -> bool {
        false
    }

    fn stale_discards(&self) -> u64 {
        0
    }
}

#[derive(Clone, Copy)]
pub struct AssignmentContext<'a> {
    pub pathfinder: &'a Pathfinder,
    pub occupancy: &'a OccupancyIndex,
    pub conditions: Conditions,
    pub time: u64,
    pub excluded: &'a [SpotId],
}

impl<'a> AssignmentContext<'a> {
    pub fn new(pathfinder: &'a Pathfinder, occupancy: &'a OccupancyIndex) -> Self {
        Self {
            pathfinder,
            occupancy,
            conditions: Conditions::default(),
            time: 0,
            excluded: &[],
        }
    }

    pub fn graph(&self) -> &'a FacilityGraph {
        self.pathfinder.graph()
    }

    pub fn is_available(&self, spot: SpotId) -> bool {
        self.occupancy.is_free(spot) && !self.excluded.contains(&spot)
    }
}

pub fn build_policy(kind: PolicyKind) -> Box<dyn AssignmentPolicy> {
    match kind {
        PolicyKind::NearestFirst => Box::new(NearestFirstPolicy::default()),
        PolicyKind::Weighted => Box::new(WeightedPolicy),
        PolicyKind::BatchOptimal => Box::new(BatchOptimalPolicy::default()),
    }
}

pub(crate) fn entry_table(pathfinder: &Pathfinder, entry: NodeId) -> Cow<'_, DistanceTable> {
    match pathfinder.entry_table(entry) {
        Some(table) => Cow::Borrowed(table),
        None => Cow::Owned(pathfinder.distances_from(entry)),
    }
}

pub(crate) fn classify_failure(
    ctx: &AssignmentContext<'_>,
    vehicle: &Vehicle,
) -> AssignmentFailure {
    let graph = ctx.graph();
    let table = entry_table(ctx.pathfinder, vehicle.entry);
    let free: Vec<SpotId> = ctx
        .occupancy
        .free_spots(vehicle.vehicle_type.allowed_spots())
        .into_iter()
        .filter(|&spot| ctx.is_available(spot))
        .collect();
    let unreachable = free
        .iter()
        .all(|&spot| table.cost(graph.spot(spot).node).is_none());
    if !free.is_empty() && unreachable {
        AssignmentFailure::Unreachable
    } else {
        AssignmentFailure::NoFreeSpot
    }
}

pub(crate) fn route_first<I>(
    ctx: &AssignmentContext<'_>,
    vehicle: &Vehicle,
    ranked: I,
) -> AssignmentResult
where
    I: IntoIterator<Item = (SpotId, Option<ScoreBreakdown>)>,
{
    let graph = ctx.graph();
    for (spot, score) in ranked {
        let target = graph.spot(spot);
        match ctx
            .pathfinder
            .route(vehicle.entry, target.node, Heuristic::StraightLine)
        {
            Ok(route) => {
                return AssignmentResult {
                    vehicle: vehicle.id,
                    spot: Some(spot),
                    spot_name: Some(target.name.clone()),
                    route: Some(route),
                    score,
                    failure: None,
                }
            }
            Err(err) => debug!(vehicle = %vehicle.id, spot = %spot, %err, "candidate excluded"),
        }
    }
    AssignmentResult::failed(vehicle.id, classify_failure(ctx, vehicle))
}
