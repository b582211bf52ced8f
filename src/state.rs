use serde::Serialize;
use std::fmt;

use crate::events::Event;
use crate::facility::{SpotId, SpotType};
use crate::models::PolicyKind;
use crate::occupancy::{OccupancyIndex, OccupancyRecord, StatusCounts};
use crate::pathfinder::Route;
use crate::policies::ScoreBreakdown;
use crate::vehicle::VehicleId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentFailure {
    NoFreeSpot,
    /// Compatible spots are free but none can be reached from the entry.
    Unreachable,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssignmentResult {
    pub vehicle: VehicleId,
    pub spot: Option<SpotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AssignmentFailure>,
}

impl fmt::Display for AssignmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssignmentFailure::NoFreeSpot => "no-free-spot",
            AssignmentFailure::Unreachable => "unreachable",
            AssignmentFailure::Abandoned => "abandoned",
        };
        write!(f, "{}", label)
    }
}

impl AssignmentResult {
    pub fn failed(vehicle: VehicleId, failure: AssignmentFailure) -> Self {
        Self {
            vehicle,
            spot: None,
            spot_name: None,
            route: None,
            score: None,
            failure: Some(failure),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.spot.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Parked,
    Reserved,
    Waiting,
    Rejected,
    Abandoned,
    Released,
    Expired,
    ConditionsUpdated,
    Dispatched,
    Ignored,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Parked => "parked",
            Outcome::Reserved => "reserved",
            Outcome::Waiting => "waiting",
            Outcome::Rejected => "rejected",
            Outcome::Abandoned => "abandoned",
            Outcome::Released => "released",
            Outcome::Expired => "expired",
            Outcome::ConditionsUpdated => "conditions-updated",
            Outcome::Dispatched => "dispatched",
            Outcome::Ignored => "ignored",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub seq: u64,
    pub time: u64,
    pub event: Event,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<AssignmentResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpotTypeSummary {
    pub spot_type: SpotType,
    pub total: usize,
    pub free: usize,
    pub parked: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub arrivals: u64,
    pub assigned: u64,
    pub rejected: u64,
    pub abandoned: u64,
    pub bookings: u64,
    pub no_shows: u64,
    pub utilization_pct: f64,
    pub avg_utilization_pct: f64,
    pub peak_occupancy: usize,
    pub avg_wait: f64,
    pub avg_walking_distance: f64,
    pub avg_route_cost: f64,
    pub stale_discards: u64,
    pub recovered_conflicts: u64,
    pub by_spot_type: Vec<SpotTypeSummary>,
}

#[derive(Clone, Debug, Default)]
pub struct MetricsTracker {
    pub arrivals: u64,
    pub assigned: u64,
    pub rejected: u64,
    pub abandoned: u64,
    pub bookings: u64,
    pub no_shows: u64,
    pub recovered_conflicts: u64,
    parked: u64,
    total_wait: u64,
    total_walking: u64,
    routed: u64,
    total_route_cost: u64,
    parked_by_type: [u64; 3],
    peak_occupancy: usize,
    busy_area: u128,
    last_time: u64,
    last_in_use: usize,
}

impl MetricsTracker {
    /// Integrates spot usage up to `time`; call before mutating occupancy.
    pub fn advance(&mut self, time: u64) {
        let elapsed = time.saturating_sub(self.last_time);
        self.busy_area += u128::from(elapsed) * self.last_in_use as u128;
        self.last_time = self.last_time.max(time);
    }

    pub fn observe(&mut self, counts: StatusCounts) {
        self.last_in_use = counts.in_use();
        self.peak_occupancy = self.peak_occupancy.max(counts.in_use());
    }

    pub fn record_park(&mut self, spot_type: SpotType, wait: u64, walking: u64) {
        self.parked += 1;
        self.total_wait = self.total_wait.saturating_add(wait);
        self.total_walking += walking;
        self.parked_by_type[spot_type.index()] += 1;
    }

    pub fn record_route(&mut self, cost: u64) {
        self.routed += 1;
        self.total_route_cost += cost;
    }

    pub fn report(&self, occupancy: &OccupancyIndex, stale_discards: u64) -> Metrics {
        let counts = occupancy.counts();
        let total = counts.total();
        let utilization_pct = if total == 0 {
            0.0
        } else {
            counts.in_use() as f64 / total as f64 * 100.0
        };
        let avg_utilization_pct = if total == 0 || self.last_time == 0 {
            utilization_pct
        } else {
            self.busy_area as f64 / (total as f64 * self.last_time as f64) * 100.0
        };

        Metrics {
            arrivals: self.arrivals,
            assigned: self.assigned,
            rejected: self.rejected,
            abandoned: self.abandoned,
            bookings: self.bookings,
            no_shows: self.no_shows,
            utilization_pct: round_to(utilization_pct, 2),
            avg_utilization_pct: round_to(avg_utilization_pct, 2),
            peak_occupancy: self.peak_occupancy,
            avg_wait: round_to(mean(self.total_wait, self.parked), 2),
            avg_walking_distance: round_to(mean(self.total_walking, self.parked), 2),
            avg_route_cost: round_to(mean(self.total_route_cost, self.routed), 2),
            stale_discards,
            recovered_conflicts: self.recovered_conflicts,
            by_spot_type: SpotType::ALL
                .iter()
                .filter(|&&spot_type| occupancy.total_of(spot_type) > 0)
                .map(|&spot_type| SpotTypeSummary {
                    spot_type,
                    total: occupancy.total_of(spot_type),
                    free: occupancy.free_of(spot_type),
                    parked: self.parked_by_type[spot_type.index()],
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: u64,
    pub counts: StatusCounts,
    pub waiting: usize,
    pub metrics: Metrics,
    pub spots: Vec<OccupancyRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunMetadata {
    pub policy: PolicyKind,
    pub seed: u64,
    pub facility: String,
    pub spots: usize,
    pub end_time: u64,
    pub events: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    pub metadata: RunMetadata,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogRecord>,
}

fn mean(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    if decimals == 0 {
        return value.round();
    }
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}
