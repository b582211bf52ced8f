use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::OccupancyError;
use crate::facility::{FacilityGraph, SpotId, SpotType};
use crate::pathfinder::DistanceTable;
use crate::vehicle::VehicleId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpotStatus {
    Free,
    Reserved,
    Occupied,
}

impl fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpotStatus::Free => "free",
            SpotStatus::Reserved => "reserved",
            SpotStatus::Occupied => "occupied",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReservationWindow {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OccupancyRecord {
    pub spot: SpotId,
    pub status: SpotStatus,
    pub vehicle: Option<VehicleId>,
    pub window: Option<ReservationWindow>,
    pub since: Option<u64>,
}

impl OccupancyRecord {
    fn free(spot: SpotId) -> Self {
        Self {
            spot,
            status: SpotStatus::Free,
            vehicle: None,
            window: None,
            since: None,
        }
    }

    pub fn is_held_by(&self, vehicle: VehicleId) -> bool {
        self.vehicle == Some(vehicle)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub free: usize,
    pub reserved: usize,
    pub occupied: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.free + self.reserved + self.occupied
    }

    pub fn in_use(&self) -> usize {
        self.reserved + self.occupied
    }

    fn slot(&mut self, status: SpotStatus) -> &mut usize {
        match status {
            SpotStatus::Free => &mut self.free,
            SpotStatus::Reserved => &mut self.reserved,
            SpotStatus::Occupied => &mut self.occupied,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proximity {
    Nearest(usize),
    Within(u64),
    All,
}

#[derive(Clone, Debug)]
pub struct OccupancyIndex {
    records: Vec<OccupancyRecord>,
    spot_types: Vec<SpotType>,
    free_by_type: [BTreeSet<SpotId>; 3],
    totals_by_type: [usize; 3],
    counts: StatusCounts,
}

impl OccupancyIndex {
    pub fn new(graph: &FacilityGraph) -> Self {
        let mut free_by_type: [BTreeSet<SpotId>; 3] = Default::default();
        let mut totals_by_type = [0usize; 3];
        for spot in graph.spots() {
            free_by_type[spot.spot_type.index()].insert(spot.id);
            totals_by_type[spot.spot_type.index()] += 1;
        }
        Self {
            records: graph.spots().iter().map(|spot| OccupancyRecord::free(spot.id)).collect(),
            spot_types: graph.spots().iter().map(|spot| spot.spot_type).collect(),
            free_by_type,
            totals_by_type,
            counts: StatusCounts {
                free: graph.spot_count(),
                ..StatusCounts::default()
            },
        }
    }

    pub fn status_of(&self, spot: SpotId) -> Result<&OccupancyRecord, OccupancyError> {
        self.records
            .get(spot.index())
            .ok_or(OccupancyError::UnknownSpot(spot))
    }

    pub fn is_free(&self, spot: SpotId) -> bool {
        self.records
            .get(spot.index())
            .is_some_and(|record| record.status == SpotStatus::Free)
    }

    pub fn records(&self) -> &[OccupancyRecord] {
        &self.records
    }

    pub fn counts(&self) -> StatusCounts {
        self.counts
    }

    pub fn total_of(&self, spot_type: SpotType) -> usize {
        self.totals_by_type[spot_type.index()]
    }

    pub fn free_of(&self, spot_type: SpotType) -> usize {
        self.free_by_type[spot_type.index()].len()
    }

    pub fn pressure(&self, spot_type: SpotType) -> f64 {
        let total = self.total_of(spot_type);
        if total == 0 {
            return 0.0;
        }
        1.0 - self.free_of(spot_type) as f64 / total as f64
    }

    /// Share of the spots around `spot` that are reserved or occupied. A spot
    /// with no neighbourhood falls back to the pressure on its type.
    pub fn local_pressure(&self, graph: &FacilityGraph, spot: SpotId) -> f64 {
        let nearby = graph.nearby_spots(spot);
        if nearby.is_empty() {
            return self.pressure(graph.spot(spot).spot_type);
        }
        let taken = nearby.iter().filter(|&&other| !self.is_free(other)).count();
        taken as f64 / nearby.len() as f64
    }

    pub fn free_spots(&self, types: &[SpotType]) -> Vec<SpotId> {
        let mut spots: Vec<SpotId> = types
            .iter()
            .flat_map(|spot_type| self.free_by_type[spot_type.index()].iter().copied())
            .collect();
        spots.sort_unstable();
        spots.dedup();
        spots
    }

    pub fn free_spots_near(
        &self,
        graph: &FacilityGraph,
        from: &DistanceTable,
        within: Proximity,
    ) -> Vec<SpotId> {
        self.free_spots_ranked(graph, from, within, &SpotType::ALL, |_, cost| cost as f64)
    }

    pub fn free_spots_ranked<F>(
        &self,
        graph: &FacilityGraph,
        from: &DistanceTable,
        within: Proximity,
        types: &[SpotType],
        score: F,
    ) -> Vec<SpotId>
    where
        F: Fn(SpotId, u64) -> f64,
    {
        let mut ranked: Vec<(f64, SpotId)> = self
            .free_spots(types)
            .into_iter()
            .filter_map(|spot| {
                let cost = from.cost(graph.spot(spot).node)?;
                match within {
                    Proximity::Within(radius) if cost > radius => None,
                    _ => Some((score(spot, cost), spot)),
                }
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        if let Proximity::Nearest(k) = within {
            ranked.truncate(k);
        }
        ranked.into_iter().map(|(_, spot)| spot).collect()
    }

    pub fn reserve(
        &mut self,
        spot: SpotId,
        vehicle: VehicleId,
        window: ReservationWindow,
    ) -> Result<(), OccupancyError> {
        let record = self.status_of(spot)?;
        if record.status != SpotStatus::Free {
            return Err(OccupancyError::AlreadyOccupied {
                spot,
                status: record.status,
            });
        }
        self.transition(spot, SpotStatus::Reserved);
        let record = &mut self.records[spot.index()];
        record.vehicle = Some(vehicle);
        record.window = Some(window);
        record.since = Some(window.start);
        Ok(())
    }

    /// Parks `vehicle`. A Reserved spot only accepts the vehicle it was reserved for.
    pub fn occupy(
        &mut self,
        spot: SpotId,
        vehicle: VehicleId,
        now: u64,
    ) -> Result<(), OccupancyError> {
        let record = self.status_of(spot)?;
        let allowed = match record.status {
            SpotStatus::Free => true,
            SpotStatus::Reserved => record.is_held_by(vehicle),
            SpotStatus::Occupied => false,
        };
        if !allowed {
            return Err(OccupancyError::InvalidTransition {
                spot,
                from: record.status,
                to: SpotStatus::Occupied,
            });
        }
        self.transition(spot, SpotStatus::Occupied);
        let record = &mut self.records[spot.index()];
        record.vehicle = Some(vehicle);
        record.window = None;
        record.since = Some(now);
        Ok(())
    }

    pub fn release(&mut self, spot: SpotId) -> Result<OccupancyRecord, OccupancyError> {
        let previous = self.status_of(spot)?.clone();
        if previous.status == SpotStatus::Free {
            return Err(OccupancyError::NotOccupied(spot));
        }
        self.transition(spot, SpotStatus::Free);
        self.records[spot.index()] = OccupancyRecord::free(spot);
        Ok(previous)
    }

    pub fn expire_reservation(
        &mut self,
        spot: SpotId,
        vehicle: VehicleId,
    ) -> Result<(), OccupancyError> {
        let record = self.status_of(spot)?;
        if record.status != SpotStatus::Reserved || !record.is_held_by(vehicle) {
            return Err(OccupancyError::InvalidTransition {
                spot,
                from: record.status,
                to: SpotStatus::Free,
            });
        }
        self.transition(spot, SpotStatus::Free);
        self.records[spot.index()] = OccupancyRecord::free(spot);
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        let mut counts = StatusCounts::default();
        for (idx, record) in self.records.iter().enumerate() {
            *counts.slot(record.status) += 1;
            let spot_type = self.spot_types[idx];
            let indexed = self.free_by_type[spot_type.index()].contains(&record.spot);
            if indexed != (record.status == SpotStatus::Free) {
                return false;
            }
            if (record.status == SpotStatus::Free) == record.vehicle.is_some() {
                return false;
            }
        }
        counts == self.counts && counts.total() == self.records.len()
    }

    fn transition(&mut self, spot: SpotId, to: SpotStatus) {
        let from = self.records[spot.index()].status;
        let spot_type = self.spot_types[spot.index()];
        *self.counts.slot(from) -= 1;
        *self.counts.slot(to) += 1;
        if from == SpotStatus::Free {
            self.free_by_type[spot_type.index()].remove(&spot);
        }
        if to == SpotStatus::Free {
            self.free_by_type[spot_type.index()].insert(spot);
        }
        self.records[spot.index()].status = to;
    }
}
