use serde::Serialize;
use std::cmp::Ordering;

use crate::facility::SpotId;
use crate::models::Conditions;
use crate::vehicle::{Vehicle, VehicleId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Booking {
    pub vehicle: Vehicle,
    pub shows_up: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    Arrival(Vehicle),
    Departure { vehicle: VehicleId, spot: SpotId },
    ReservationStart(Booking),
    ReservationEnd { vehicle: VehicleId, spot: SpotId },
    ConditionChange(Conditions),
    BatchDispatch,
    WaitTimeout { vehicle: VehicleId },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Arrival(_) => "arrival",
            Event::Departure { .. } => "departure",
            Event::ReservationStart(_) => "reservation-start",
            Event::ReservationEnd { .. } => "reservation-end",
            Event::ConditionChange(_) => "condition-change",
            Event::BatchDispatch => "batch-dispatch",
            Event::WaitTimeout { .. } => "wait-timeout",
        }
    }

    pub fn vehicle(&self) -> Option<VehicleId> {
        match self {
            Event::Arrival(vehicle) => Some(vehicle.id),
            Event::ReservationStart(booking) => Some(booking.vehicle.id),
            Event::Departure { vehicle, .. }
            | Event::ReservationEnd { vehicle, .. }
            | Event::WaitTimeout { vehicle } => Some(*vehicle),
            Event::ConditionChange(_) | Event::BatchDispatch => None,
        }
    }
}

/// Queue entry ordered by `(time, seq)`; `seq` is the insertion counter, so
/// events sharing a timestamp run in the order they were scheduled.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    pub time: u64,
    pub seq: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: u64, seq: u64, event: Event) -> Self {
        Self { time, seq, event }
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    #[test]
    fn pops_by_time_then_insertion_order() {
        let mut queue = BinaryHeap::new();
        queue.push(Reverse(ScheduledEvent::new(5, 0, Event::BatchDispatch)));
        queue.push(Reverse(ScheduledEvent::new(
            3,
            1,
            Event::WaitTimeout {
                vehicle: VehicleId(1),
            },
        )));
        queue.push(Reverse(ScheduledEvent::new(
            3,
            2,
            Event::Departure {
                vehicle: VehicleId(2),
                spot: SpotId(0),
            },
        )));

        let order: Vec<(u64, u64)> = std::iter::from_fn(|| queue.pop())
            .map(|Reverse(scheduled)| (scheduled.time, scheduled.seq))
            .collect();
        assert_eq!(order, vec![(3, 1), (3, 2), (5, 0)]);
    }

    #[test]
    fn kinds_and_vehicles() {
        let event = Event::ReservationEnd {
            vehicle: VehicleId(4),
            spot: SpotId(1),
        };
        assert_eq!(event.kind(), "reservation-end");
        assert_eq!(event.vehicle(), Some(VehicleId(4)));
        assert_eq!(Event::BatchDispatch.vehicle(), None);
    }
}
