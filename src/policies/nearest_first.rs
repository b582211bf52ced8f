use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::trace;

use crate::facility::{NodeId, SpotId, SpotType};
use crate::models::PolicyKind;
use crate::policies::scoring::ratio;
use crate::policies::{
    classify_failure, entry_table, route_first, AssignmentContext, AssignmentPolicy,
    ScoreBreakdown,
};
use crate::state::AssignmentResult;
use crate::vehicle::Vehicle;

/// Free spots of one type ordered by travel cost from one entry.
///
/// Entries are not removed when a spot is taken elsewhere. A popped head that
/// is no longer free is discarded and counted instead, which keeps occupy and
/// release O(1) for this policy.
#[derive(Debug)]
struct SpotQueue {
    heap: BinaryHeap<Reverse<(u64, SpotId)>>,
    queued: Vec<bool>,
}

#[derive(Debug, Default)]
pub struct NearestFirstPolicy {
    queues: HashMap<(NodeId, SpotType), SpotQueue>,
    stale_discards: u64,
}

impl NearestFirstPolicy {
    fn queue(
        &mut self,
        ctx: &AssignmentContext<'_>,
        entry: NodeId,
        spot_type: SpotType,
    ) -> &mut SpotQueue {
        self.queues.entry((entry, spot_type)).or_insert_with(|| {
            let graph = ctx.graph();
            let table = entry_table(ctx.pathfinder, entry);
            let mut queue = SpotQueue {
                heap: BinaryHeap::new(),
                queued: vec![false; graph.spot_count()],
            };
            for spot in ctx.occupancy.free_spots(&[spot_type]) {
                if let Some(cost) = table.cost(graph.spot(spot).node) {
                    queue.heap.push(Reverse((cost, spot)));
                    queue.queued[spot.index()] = true;
                }
            }
            queue
        })
    }

    fn nearest(
        &mut self,
        ctx: &AssignmentContext<'_>,
        entry: NodeId,
        spot_type: SpotType,
    ) -> Option<(u64, SpotId)> {
        let mut discarded = 0;
        let mut skipped = Vec::new();
        let queue = self.queue(ctx, entry, spot_type);
        let found = loop {
            let Some(&Reverse((cost, spot))) = queue.heap.peek() else {
                break None;
            };
            if !ctx.occupancy.is_free(spot) {
                queue.heap.pop();
                queue.queued[spot.index()] = false;
                discarded += 1;
                trace!(entry = %entry, spot = %spot, "discarded stale queue head");
                continue;
            }
            if ctx.excluded.contains(&spot) {
                if let Some(head) = queue.heap.pop() {
                    skipped.push(head);
                }
                continue;
            }
            break Some((cost, spot));
        };
        queue.heap.extend(skipped);
        self.stale_discards += discarded;
        found
    }
}

impl AssignmentPolicy for NearestFirstPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::NearestFirst
    }

    fn assign(&mut self, ctx: &AssignmentContext<'_>, vehicle: &Vehicle) -> AssignmentResult {
        let max_cost = ctx.pathfinder.max_spot_cost();
        for &spot_type in vehicle.vehicle_type.allowed_spots() {
            if let Some((cost, spot)) = self.nearest(ctx, vehicle.entry, spot_type) {
                let proximity = ratio(cost, max_cost);
                let score = ScoreBreakdown {
                    proximity,
                    total: proximity,
                    ..ScoreBreakdown::default()
                };
                return route_first(ctx, vehicle, [(spot, Some(score))]);
            }
        }
        AssignmentResult::failed(vehicle.id, classify_failure(ctx, vehicle))
    }

    fn on_released(&mut self, ctx: &AssignmentContext<'_>, spot: SpotId) {
        let graph = ctx.graph();
        let released = graph.spot(spot);
        for (&(entry, spot_type), queue) in self.queues.iter_mut() {
            if spot_type != released.spot_type || queue.queued[spot.index()] {
                continue;
            }
            if let Some(cost) = entry_table(ctx.pathfinder, entry).cost(released.node) {
                queue.heap.push(Reverse((cost, spot)));
                queue.queued[spot.index()] = true;
            }
        }
    }

    fn stale_discards(&self) -> u64 {
        self.stale_discards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::testing::Fixture;
    use crate::state::AssignmentFailure;
    use crate::vehicle::{VehicleId, VehicleType};

    #[test]
    fn picks_b_when_a_is_taken() {
        let mut fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let mut policy = NearestFirstPolicy::default();

        let first = Vehicle::test_at(1, VehicleType::Standard, gate, 0);
        {
            let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
            assert_eq!(policy.assign(&ctx, &first).spot_name.as_deref(), Some("A"));
        }
        fixture.occupancy.occupy(SpotId(0), first.id, 0).unwrap();

        let second = Vehicle::test_at(2, VehicleType::Standard, gate, 1);
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        let result = policy.assign(&ctx, &second);
        assert_eq!(result.spot_name.as_deref(), Some("B"));
        assert_eq!(result.route.map(|route| route.cost), Some(2));
    }

    #[test]
    fn lazy_invalidation_discards_stale_heads_once() {
        let mut fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let mut policy = NearestFirstPolicy::default();
        let vehicle = Vehicle::test_at(1, VehicleType::Standard, gate, 0);
        {
            let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
            policy.assign(&ctx, &vehicle);
        }
        // Taken behind the policy's back; the queue still lists A.
        fixture.occupancy.occupy(SpotId(0), VehicleId(7), 0).unwrap();
        {
            let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
            assert_eq!(policy.assign(&ctx, &vehicle).spot, Some(SpotId(1)));
            assert_eq!(policy.assign(&ctx, &vehicle).spot, Some(SpotId(1)));
        }
        assert_eq!(policy.stale_discards(), 1);

        fixture.occupancy.release(SpotId(0)).unwrap();
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        policy.on_released(&ctx, SpotId(0));
        assert_eq!(policy.assign(&ctx, &vehicle).spot, Some(SpotId(0)));
    }

    #[test]
    fn excluded_spots_are_skipped_not_discarded() {
        let fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let mut policy = NearestFirstPolicy::default();
        let vehicle = Vehicle::test_at(1, VehicleType::Standard, gate, 0);
        let excluded = [SpotId(0)];
        let ctx = AssignmentContext {
            excluded: &excluded,
            ..AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy)
        };
        assert_eq!(policy.assign(&ctx, &vehicle).spot, Some(SpotId(1)));
        assert_eq!(policy.stale_discards(), 0);

        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        assert_eq!(policy.assign(&ctx, &vehicle).spot, Some(SpotId(0)));
    }

    #[test]
    fn full_facility_reports_no_free_spot() {
        let mut fixture = Fixture::three_spot();
        for idx in 0..3 {
            fixture
                .occupancy
                .occupy(SpotId(idx), VehicleId(u64::from(idx) + 10), 0)
                .unwrap();
        }
        let gate = fixture.graph.entries()[0];
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        let vehicle = Vehicle::test_at(1, VehicleType::Standard, gate, 0);
        let result = NearestFirstPolicy::default().assign(&ctx, &vehicle);
        assert_eq!(result.failure, Some(AssignmentFailure::NoFreeSpot));
        assert_eq!(result.spot, None);
    }
}
