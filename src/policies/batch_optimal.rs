use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};
use rayon::prelude::*;
use tracing::debug;

use crate::facility::{SpotId, SpotType};
use crate::models::PolicyKind;
use crate::policies::{
    classify_failure, entry_table, route_first, score_spot, AssignmentContext, AssignmentPolicy,
    WeightedPolicy,
};
use crate::state::AssignmentResult;
use crate::vehicle::Vehicle;

const SCALE: f64 = 1_000_000.0;

/// Bound on the magnitude of any matching total, so the solver's potentials
/// and sums cannot overflow.
const WEIGHT_BUDGET: i64 = i64::MAX / 4;

const FALLBACK_PENALTY: f64 = 10.0;

struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |row| row.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|row| row.iter().map(|&x| x.saturating_neg()).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
pub struct BatchOptimalPolicy {
    fallback: WeightedPolicy,
}

impl BatchOptimalPolicy {
    fn cost_matrix(
        ctx: &AssignmentContext<'_>,
        vehicles: &[Vehicle],
        spots: &[SpotId],
    ) -> Vec<Vec<Option<f64>>> {
        let graph = ctx.graph();
        vehicles
            .par_iter()
            .map(|vehicle| {
                let table = entry_table(ctx.pathfinder, vehicle.entry);
                let allowed = vehicle.vehicle_type.allowed_spots();
                spots
                    .iter()
                    .map(|&spot| {
                        let info = graph.spot(spot);
                        let rank = allowed.iter().position(|&t| t == info.spot_type)?;
                        let travel = table.cost(info.node)?;
                        let score = score_spot(ctx, &vehicle.preferences, spot, travel);
                        Some(score.total + rank as f64 * FALLBACK_PENALTY)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Minimum-cost matching; entry `i` is the column matched to row `i`, if any.
pub(crate) fn solve(costs: &[Vec<Option<f64>>]) -> Vec<Option<usize>> {
    let rows = costs.len();
    let columns = costs.first().map_or(0, |row| row.len());
    let mut matched = vec![None; rows];
    if rows == 0 || columns == 0 {
        return matched;
    }

    let (scale, infeasible) = weight_scale(costs, rows.min(columns));
    let weight = |cost: Option<f64>| match cost {
        Some(cost) => -score_to_weight(clamp_cost(cost), scale),
        None => infeasible,
    };

    // kuhn_munkres needs rows <= columns; solve the transpose otherwise.
    if rows <= columns {
        let weights = I64Weights(
            costs
                .iter()
                .map(|row| row.iter().map(|&cost| weight(cost)).collect())
                .collect(),
        );
        let (_, assignment) = kuhn_munkres(&weights);
        for (row, column) in assignment.into_iter().enumerate() {
            if costs[row][column].is_some() {
                matched[row] = Some(column);
            }
        }
    } else {
        let weights = I64Weights(
            (0..columns)
                .map(|column| (0..rows).map(|row| weight(costs[row][column])).collect())
                .collect(),
        );
        let (_, assignment) = kuhn_munkres(&weights);
        for (column, row) in assignment.into_iter().enumerate() {
            if costs[row][column].is_some() {
                matched[row] = Some(column);
            }
        }
    }
    matched
}

/// Scale and infeasible weight for a matrix with `pairs` matches. One
/// infeasible pair must weigh less than `pairs` feasible pairs at the largest
/// cost, so the solver only uses it when a row has no feasible column left.
fn weight_scale(costs: &[Vec<Option<f64>>], pairs: usize) -> (f64, i64) {
    let pairs = pairs as i64;
    let max_cost = costs
        .iter()
        .flatten()
        .flatten()
        .fold(0.0_f64, |acc, &cost| acc.max(clamp_cost(cost)));
    let limit = WEIGHT_BUDGET / ((pairs + 1) * (pairs + 1));
    let scale = if max_cost > 0.0 {
        SCALE.min(limit as f64 / max_cost)
    } else {
        SCALE
    };
    let max_weight = score_to_weight(max_cost, scale).min(limit);
    (scale, -((pairs + 1) * max_weight + 1))
}

fn clamp_cost(cost: f64) -> f64 {
    if cost.is_finite() {
        cost.max(0.0)
    } else {
        f64::MAX
    }
}

fn score_to_weight(score: f64, scale: f64) -> i64 {
    let weight = (score * scale).round();
    if weight >= i64::MAX as f64 {
        i64::MAX
    } else if weight <= i64::MIN as f64 {
        i64::MIN
    } else {
        weight as i64
    }
}

impl AssignmentPolicy for BatchOptimalPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::BatchOptimal
    }

    fn assign(&mut self, ctx: &AssignmentContext<'_>, vehicle: &Vehicle) -> AssignmentResult {
        self.fallback.assign(ctx, vehicle)
    }

    fn assign_batch(
        &mut self,
        ctx: &AssignmentContext<'_>,
        vehicles: &[Vehicle],
    ) -> Vec<AssignmentResult> {
        let spots: Vec<SpotId> = ctx
            .occupancy
            .free_spots(&SpotType::ALL)
            .into_iter()
            .filter(|&spot| ctx.is_available(spot))
            .collect();
        let costs = Self::cost_matrix(ctx, vehicles, &spots);
        let matched = solve(&costs);
        debug!(
            vehicles = vehicles.len(),
            spots = spots.len(),
            matched = matched.iter().flatten().count(),
            "batch solved"
        );

        vehicles
            .iter()
            .zip(matched)
            .map(|(vehicle, column)| match column {
                Some(column) => {
                    let spot = spots[column];
                    let travel = entry_table(ctx.pathfinder, vehicle.entry)
                        .cost(ctx.graph().spot(spot).node)
                        .unwrap_or_default();
                    let score = score_spot(ctx, &vehicle.preferences, spot, travel);
                    route_first(ctx, vehicle, [(spot, Some(score))])
                }
                None => AssignmentResult::failed(vehicle.id, classify_failure(ctx, vehicle)),
            })
            .collect()
    }

    fn is_batched(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::testing::Fixture;
    use crate::state::AssignmentFailure;
    use crate::vehicle::{PreferenceWeights, VehicleType};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for rest in permutations(n - 1) {
            for slot in 0..=rest.len() {
                let mut perm = rest.clone();
                perm.insert(slot, n - 1);
                out.push(perm);
            }
        }
        out
    }

    fn total(costs: &[Vec<Option<f64>>], matched: &[Option<usize>]) -> f64 {
        matched
            .iter()
            .enumerate()
            .filter_map(|(row, column)| column.and_then(|column| costs[row][column]))
            .sum()
    }

    #[test]
    fn hungarian_total_never_exceeds_any_feasible_assignment() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        for _ in 0..50 {
            let costs: Vec<Vec<Option<f64>>> = (0..4)
                .map(|_| (0..4).map(|_| Some(rng.gen_range(0.0..10.0))).collect())
                .collect();
            let matched = solve(&costs);
            assert!(matched.iter().all(Option::is_some));
            let best = total(&costs, &matched);
            for perm in permutations(4) {
                let candidate: f64 = perm
                    .iter()
                    .enumerate()
                    .map(|(row, &col)| costs[row][col].unwrap_or(0.0))
                    .sum();
                assert!(best <= candidate + 1e-5, "{} > {}", best, candidate);
            }
        }
    }

    #[test]
    fn infeasible_pairs_never_match() {
        let costs = vec![
            vec![None, Some(1.0)],
            vec![None, Some(2.0)],
            vec![Some(5.0), None],
        ];
        let matched = solve(&costs);
        assert_eq!(matched[2], Some(0));
        assert_eq!(matched.iter().flatten().count(), 2);
        for (row, column) in matched.iter().enumerate() {
            if let Some(column) = column {
                assert!(costs[row][*column].is_some());
            }
        }
        // row 0 is cheaper on column 1
        assert_eq!(matched[0], Some(1));
    }

    #[test]
    fn more_spots_than_vehicles_and_the_reverse() {
        let wide = vec![vec![Some(3.0), Some(1.0), Some(2.0)]];
        assert_eq!(solve(&wide), vec![Some(1)]);

        let tall = vec![vec![Some(3.0)], vec![Some(1.0)], vec![Some(2.0)]];
        assert_eq!(solve(&tall), vec![None, Some(0), None]);
        assert!(solve(&[]).is_empty());
    }

    #[test]
    fn batch_beats_greedy_order() {
        // Greedy in arrival order would hand A to the first vehicle and leave
        // the price-sensitive second vehicle with B. Matching swaps them.
        let fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let mut indifferent = Vehicle::test_at(1, VehicleType::Standard, gate, 0);
        indifferent.preferences = PreferenceWeights::default();
        let eager = Vehicle::test_at(2, VehicleType::Standard, gate, 0);
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);

        let results = BatchOptimalPolicy::default().assign_batch(&ctx, &[indifferent, eager]);
        assert_eq!(results[1].spot_name.as_deref(), Some("A"));
        assert!(results[0].is_assigned());
        assert_ne!(results[0].spot, results[1].spot);
    }

    #[test]
    fn incompatible_vehicle_in_batch_fails_alone() {
        let fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let vehicles = vec![
            Vehicle::test_at(1, VehicleType::Electric, gate, 0),
            Vehicle::test_at(2, VehicleType::Standard, gate, 0),
        ];
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        let results = BatchOptimalPolicy::default().assign_batch(&ctx, &vehicles);
        assert_eq!(results[0].failure, Some(AssignmentFailure::NoFreeSpot));
        assert_eq!(results[1].spot_name.as_deref(), Some("A"));
    }

    #[test]
    fn expensive_feasible_pairs_still_beat_infeasible_ones() {
        assert_eq!(solve(&[vec![None, Some(2_000_000.0)]]), vec![Some(1)]);

        let costs = vec![
            vec![Some(5.0e6), None],
            vec![Some(1.0), Some(1.0)],
        ];
        assert_eq!(solve(&costs), vec![Some(0), Some(1)]);
        assert_eq!(solve(&[vec![Some(f64::INFINITY), None]]), vec![Some(0)]);
    }

    #[test]
    fn heavy_preferences_do_not_starve_a_compatible_vehicle() {
        let fixture = Fixture::three_spot();
        let gate = fixture.graph.entries()[0];
        let mut heavy = Vehicle::test_at(2, VehicleType::Standard, gate, 0);
        heavy.preferences = PreferenceWeights {
            proximity: 1.0e8,
            price: 0.0,
            availability: 0.0,
            exit: 0.0,
        };
        let vehicles = vec![Vehicle::test_at(1, VehicleType::Electric, gate, 0), heavy];
        let ctx = AssignmentContext::new(&fixture.pathfinder, &fixture.occupancy);
        let results = BatchOptimalPolicy::default().assign_batch(&ctx, &vehicles);
        assert_eq!(results[0].failure, Some(AssignmentFailure::NoFreeSpot));
        assert_eq!(results[1].spot_name.as_deref(), Some("A"));
    }
}
