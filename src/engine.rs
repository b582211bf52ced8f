use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::distributions::sample_duration;
use crate::error::{Error, Result};
use crate::events::{Booking, Event, ScheduledEvent};
use crate::facility::{FacilityGraph, SpotId};
use crate::generator::DriverGenerator;
use crate::layout::grid_layout;
use crate::models::{
    ArrivalProfile, Conditions, DurationProfile, LayoutSource, PolicyKind, SimConfig,
};
use crate::occupancy::{OccupancyIndex, ReservationWindow};
use crate::pathfinder::{Heuristic, Pathfinder};
use crate::policies::{build_policy, AssignmentContext, AssignmentPolicy};
use crate::state::{
    AssignmentFailure, AssignmentResult, LogRecord, MetricsTracker, Outcome, RunMetadata,
    SimulationResult, Snapshot,
};
use crate::vehicle::{Vehicle, VehicleId};

const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Clone, Copy)]
enum Claim {
    Occupy,
    Reserve(ReservationWindow),
}

#[derive(Clone, Debug)]
struct Waiting {
    vehicle: Vehicle,
    deadline: Option<u64>,
}

pub struct Simulation {
    config: SimConfig,
    graph: Arc<FacilityGraph>,
    pathfinder: Pathfinder,
    occupancy: OccupancyIndex,
    policy: Box<dyn AssignmentPolicy>,
    generator: DriverGenerator,
    queue: BinaryHeap<Reverse<ScheduledEvent>>,
    next_seq: u64,
    clock: u64,
    conditions: Conditions,
    waiting: Vec<Waiting>,
    batch_pending: bool,
    held: HashMap<VehicleId, SpotId>,
    metrics: MetricsTracker,
    log: Vec<LogRecord>,
    store_log: bool,
    duration_rng: ChaCha8Rng,
    processed: u64,
    finished: bool,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self> {
        validate_config(&config)?;
        let graph = Arc::new(load_facility(&config.layout)?);
        Self::with_graph(config, graph)
    }

    pub fn with_graph(config: SimConfig, graph: Arc<FacilityGraph>) -> Result<Self> {
        validate_config(&config)?;
        let pathfinder = Pathfinder::new(Arc::clone(&graph));
        let occupancy = OccupancyIndex::new(&graph);
        let generator = DriverGenerator::new(&config, &graph)?;
        let policy = build_policy(config.policy);
        let mut duration_rng = ChaCha8Rng::seed_from_u64(config.seed);
        duration_rng.set_stream(1);

        let mut simulation = Self {
            graph,
            pathfinder,
            occupancy,
            policy,
            generator,
            queue: BinaryHeap::new(),
            next_seq: 0,
            clock: 0,
            conditions: Conditions::default(),
            waiting: Vec::new(),
            batch_pending: false,
            held: HashMap::new(),
            metrics: MetricsTracker::default(),
            log: Vec::new(),
            store_log: true,
            duration_rng,
            processed: 0,
            finished: false,
            config,
        };
        let changes: Vec<(u64, Conditions)> = simulation
            .config
            .special_conditions
            .iter()
            .map(|condition| (condition.at, condition.conditions()))
            .collect();
        for (at, conditions) in changes {
            simulation.schedule(at, Event::ConditionChange(conditions));
        }
        info!(
            policy = %simulation.config.policy,
            seed = simulation.config.seed,
            facility = simulation.graph.name(),
            spots = simulation.graph.spot_count(),
            "simulation ready"
        );
        Ok(simulation)
    }

    pub fn store_log(mut self, store: bool) -> Self {
        self.store_log = store;
        self
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn graph(&self) -> &FacilityGraph {
        &self.graph
    }

    pub fn occupancy(&self) -> &OccupancyIndex {
        &self.occupancy
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn log(&self) -> &[LogRecord] {
        &self.log
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Processes the next event and returns its log record, or `None` once
    /// the queue is drained or the end time is passed.
    pub fn step(&mut self) -> Option<LogRecord> {
        if self.finished {
            return None;
        }
        self.refill();
        let Some(Reverse(scheduled)) = self.queue.pop() else {
            self.finished = true;
            info!(time = self.clock, events = self.processed, "event queue drained");
            return None;
        };
        if let Some(end) = self.config.end_time {
            if scheduled.time > end {
                self.finished = true;
                self.metrics.advance(end);
                self.clock = self.clock.max(end);
                info!(time = end, events = self.processed, "end time reached");
                return None;
            }
        }

        self.metrics.advance(scheduled.time);
        self.clock = scheduled.time;
        let (outcome, assignments) = self.dispatch(&scheduled.event);
        self.metrics.observe(self.occupancy.counts());
        debug_assert!(self.occupancy.is_consistent());
        debug!(
            time = self.clock,
            seq = scheduled.seq,
            kind = scheduled.event.kind(),
            outcome = ?outcome,
            "event processed"
        );

        let record = LogRecord {
            seq: self.processed,
            time: scheduled.time,
            event: scheduled.event,
            outcome,
            assignments,
        };
        self.processed += 1;
        if self.store_log {
            self.log.push(record.clone());
        }
        Some(record)
    }

    pub fn run_until(&mut self, time: u64) -> Snapshot {
        loop {
            self.refill();
            match self.queue.peek() {
                Some(Reverse(next)) if next.time <= time => {
                    if self.step().is_none() {
                        break;
                    }
                }
                _ => break,
            }
        }
        let target = self.config.end_time.map_or(time, |end| time.min(end));
        if target > self.clock {
            self.metrics.advance(target);
            self.clock = target;
        }
        self.snapshot()
    }

    pub fn run(&mut self) {
        while self.step().is_some() {}
    }

    pub fn run_observed<F>(&mut self, mut observer: F)
    where
        F: FnMut(&Snapshot),
    {
        while self.step().is_some() {
            observer(&self.snapshot());
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.clock,
            counts: self.occupancy.counts(),
            waiting: self.waiting.len(),
            metrics: self
                .metrics
                .report(&self.occupancy, self.policy.stale_discards()),
            spots: self.occupancy.records().to_vec(),
        }
    }

    pub fn finish(mut self) -> SimulationResult {
        self.run();
        let metrics = self
            .metrics
            .report(&self.occupancy, self.policy.stale_discards());
        info!(
            policy = %self.config.policy,
            assigned = metrics.assigned,
            rejected = metrics.rejected,
            time = self.clock,
            "simulation finished"
        );
        SimulationResult {
            metadata: RunMetadata {
                policy: self.config.policy,
                seed: self.config.seed,
                facility: self.graph.name().to_string(),
                spots: self.graph.spot_count(),
                end_time: self.clock,
                events: self.processed,
            },
            metrics,
            log: std::mem::take(&mut self.log),
        }
    }

    fn schedule(&mut self, time: u64, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue
            .push(Reverse(ScheduledEvent::new(time.max(self.clock), seq, event)));
    }

    /// Pulls drivers from the generator until every one whose event could
    /// precede the queue head is scheduled.
    fn refill(&mut self) {
        let lookahead = self.config.reservations.lead_time;
        loop {
            let Some(planned) = self.generator.peek_arrival(&self.graph) else {
                break;
            };
            let due = match self.queue.peek() {
                Some(Reverse(head)) => planned <= head.time.saturating_add(lookahead),
                None => true,
            };
            if !due {
                break;
            }
            match self.generator.next_intent(&self.graph) {
                Some(intent) => self.schedule(intent.at, intent.event),
                None => break,
            }
        }
    }

    fn dispatch(&mut self, event: &Event) -> (Outcome, Vec<AssignmentResult>) {
        match event {
            Event::Arrival(vehicle) => self.on_arrival(vehicle),
            Event::Departure { vehicle, spot } => match self.occupancy.release(*spot) {
                Ok(_) => (Outcome::Released, self.after_release(*spot)),
                Err(err) => {
                    warn!(vehicle = %vehicle, %err, "departure ignored");
                    (Outcome::Ignored, Vec::new())
                }
            },
            Event::ReservationStart(booking) => self.on_booking(booking),
            Event::ReservationEnd { vehicle, spot } => self.on_reservation_end(*vehicle, *spot),
            Event::ConditionChange(conditions) => {
                self.conditions = *conditions;
                (Outcome::ConditionsUpdated, Vec::new())
            }
            Event::BatchDispatch => self.on_batch_dispatch(),
            Event::WaitTimeout { vehicle } => {
                match self.waiting.iter().position(|w| w.vehicle.id == *vehicle) {
                    Some(idx) => {
                        self.waiting.remove(idx);
                        self.metrics.abandoned += 1;
                        let result =
                            AssignmentResult::failed(*vehicle, AssignmentFailure::Abandoned);
                        (Outcome::Abandoned, vec![result])
                    }
                    None => (Outcome::Ignored, Vec::new()),
                }
            }
        }
    }

    fn on_arrival(&mut self, vehicle: &Vehicle) -> (Outcome, Vec<AssignmentResult>) {
        self.metrics.arrivals += 1;

        if let Some(spot) = self.held.remove(&vehicle.id) {
            match self.occupancy.occupy(spot, vehicle.id, self.clock) {
                Ok(()) => {
                    let result = self.routed(vehicle, spot);
                    self.park(vehicle, spot, &result);
                    return (Outcome::Parked, vec![result]);
                }
                Err(err) => {
                    warn!(vehicle = %vehicle.id, %err, "reserved spot unavailable, reassigning");
                    self.metrics.recovered_conflicts += 1;
                }
            }
        }

        if self.policy.is_batched() {
            self.waiting.push(Waiting {
                vehicle: vehicle.clone(),
                deadline: None,
            });
            self.open_batch_window();
            return (Outcome::Waiting, Vec::new());
        }

        let result = self.try_assign(vehicle, Claim::Occupy);
        if let Some(spot) = result.spot {
            self.park(vehicle, spot, &result);
            return (Outcome::Parked, vec![result]);
        }
        if self.config.max_wait > 0 {
            let mut waiting = Waiting {
                vehicle: vehicle.clone(),
                deadline: None,
            };
            self.start_patience(&mut waiting);
            self.waiting.push(waiting);
            (Outcome::Waiting, vec![result])
        } else {
            self.metrics.rejected += 1;
            (Outcome::Rejected, vec![result])
        }
    }

    fn on_booking(&mut self, booking: &Booking) -> (Outcome, Vec<AssignmentResult>) {
        self.metrics.bookings += 1;
        let vehicle = &booking.vehicle;
        let window = ReservationWindow {
            start: self.clock,
            end: vehicle.arrival.saturating_add(self.config.reservations.grace),
        };
        let result = self.try_assign(vehicle, Claim::Reserve(window));
        if booking.shows_up {
            self.schedule(vehicle.arrival, Event::Arrival(vehicle.clone()));
        }
        match result.spot {
            Some(spot) => {
                self.held.insert(vehicle.id, spot);
                self.schedule(
                    window.end,
                    Event::ReservationEnd {
                        vehicle: vehicle.id,
                        spot,
                    },
                );
                (Outcome::Reserved, vec![result])
            }
            None => (Outcome::Rejected, vec![result]),
        }
    }

    fn on_reservation_end(
        &mut self,
        vehicle: VehicleId,
        spot: SpotId,
    ) -> (Outcome, Vec<AssignmentResult>) {
        if self.held.get(&vehicle) != Some(&spot) {
            return (Outcome::Ignored, Vec::new());
        }
        self.held.remove(&vehicle);
        match self.occupancy.expire_reservation(spot, vehicle) {
            Ok(()) => {
                self.metrics.no_shows += 1;
                (Outcome::Expired, self.after_release(spot))
            }
            Err(err) => {
                warn!(vehicle = %vehicle, %err, "reservation expiry ignored");
                (Outcome::Ignored, Vec::new())
            }
        }
    }

    fn on_batch_dispatch(&mut self) -> (Outcome, Vec<AssignmentResult>) {
        self.batch_pending = false;
        if self.waiting.is_empty() {
            return (Outcome::Dispatched, Vec::new());
        }
        let vehicles: Vec<Vehicle> = self.waiting.iter().map(|w| w.vehicle.clone()).collect();
        let results = {
            let ctx = AssignmentContext {
                pathfinder: &self.pathfinder,
                occupancy: &self.occupancy,
                conditions: self.conditions,
                time: self.clock,
                excluded: &[],
            };
            self.policy.assign_batch(&ctx, &vehicles)
        };

        let mut kept = Vec::new();
        let mut out = Vec::with_capacity(results.len());
        let pending = std::mem::take(&mut self.waiting);
        for (mut waiting, mut result) in pending.into_iter().zip(results) {
            if let Some(spot) = result.spot {
                match self.occupancy.occupy(spot, waiting.vehicle.id, self.clock) {
                    Ok(()) => {
                        self.park(&waiting.vehicle, spot, &result);
                        out.push(result);
                        continue;
                    }
                    Err(err) => {
                        warn!(vehicle = %waiting.vehicle.id, %err, "batch match conflicted");
                        self.metrics.recovered_conflicts += 1;
                        result = AssignmentResult::failed(
                            waiting.vehicle.id,
                            AssignmentFailure::NoFreeSpot,
                        );
                    }
                }
            }
            if self.config.max_wait == 0 {
                self.metrics.rejected += 1;
            } else {
                self.start_patience(&mut waiting);
                kept.push(waiting);
            }
            out.push(result);
        }
        self.waiting = kept;
        (Outcome::Dispatched, out)
    }

    fn try_assign(&mut self, vehicle: &Vehicle, claim: Claim) -> AssignmentResult {
        let mut excluded: Vec<SpotId> = Vec::new();
        for _ in 0..=MAX_CONFLICT_RETRIES {
            let result = {
                let ctx = AssignmentContext {
                    pathfinder: &self.pathfinder,
                    occupancy: &self.occupancy,
                    conditions: self.conditions,
                    time: self.clock,
                    excluded: &excluded,
                };
                self.policy.assign(&ctx, vehicle)
            };
            let Some(spot) = result.spot else {
                return result;
            };
            let claimed = match claim {
                Claim::Occupy => self.occupancy.occupy(spot, vehicle.id, self.clock),
                Claim::Reserve(window) => self.occupancy.reserve(spot, vehicle.id, window),
            };
            match claimed {
                Ok(()) => return result,
                Err(err) => {
                    warn!(vehicle = %vehicle.id, %err, "assignment conflicted, retrying");
                    self.metrics.recovered_conflicts += 1;
                    excluded.push(spot);
                }
            }
        }
        AssignmentResult::failed(vehicle.id, AssignmentFailure::NoFreeSpot)
    }

    fn after_release(&mut self, spot: SpotId) -> Vec<AssignmentResult> {
        {
            let ctx = AssignmentContext {
                pathfinder: &self.pathfinder,
                occupancy: &self.occupancy,
                conditions: self.conditions,
                time: self.clock,
                excluded: &[],
            };
            self.policy.on_released(&ctx, spot);
        }
        if self.waiting.is_empty() {
            return Vec::new();
        }
        if self.policy.is_batched() {
            self.open_batch_window();
            return Vec::new();
        }

        let mut results = Vec::new();
        let mut idx = 0;
        while idx < self.waiting.len() {
            let vehicle = self.waiting[idx].vehicle.clone();
            let result = self.try_assign(&vehicle, Claim::Occupy);
            match result.spot {
                Some(spot) => {
                    self.waiting.remove(idx);
                    self.park(&vehicle, spot, &result);
                    results.push(result);
                }
                None => idx += 1,
            }
        }
        results
    }

    fn park(&mut self, vehicle: &Vehicle, spot: SpotId, result: &AssignmentResult) {
        let info = self.graph.spot(spot);
        let (spot_type, node) = (info.spot_type, info.node);
        let wait = self.clock.saturating_sub(vehicle.arrival);
        let walking = self.pathfinder.exit_cost(node).unwrap_or(0);
        self.metrics.record_park(spot_type, wait, walking);
        if let Some(route) = &result.route {
            self.metrics.record_route(route.cost);
        }
        self.metrics.assigned += 1;

        let duration = vehicle
            .duration
            .unwrap_or_else(|| sample_duration(&mut self.duration_rng, &self.config.duration));
        self.schedule(
            self.clock.saturating_add(duration),
            Event::Departure {
                vehicle: vehicle.id,
                spot,
            },
        );
    }

    fn routed(&self, vehicle: &Vehicle, spot: SpotId) -> AssignmentResult {
        let target = self.graph.spot(spot);
        AssignmentResult {
            vehicle: vehicle.id,
            spot: Some(spot),
            spot_name: Some(target.name.clone()),
            route: self
                .pathfinder
                .route(vehicle.entry, target.node, Heuristic::StraightLine)
                .ok(),
            score: None,
            failure: None,
        }
    }

    fn open_batch_window(&mut self) {
        if !self.batch_pending {
            self.batch_pending = true;
            self.schedule(
                self.clock.saturating_add(self.config.batch_window),
                Event::BatchDispatch,
            );
        }
    }

    fn start_patience(&mut self, waiting: &mut Waiting) {
        if waiting.deadline.is_none() {
            let deadline = self.clock.saturating_add(self.config.max_wait);
            waiting.deadline = Some(deadline);
            self.schedule(
                deadline,
                Event::WaitTimeout {
                    vehicle: waiting.vehicle.id,
                },
            );
        }
    }
}

pub fn load_facility(source: &LayoutSource) -> Result<FacilityGraph> {
    match source {
        LayoutSource::File(path) => FacilityGraph::from_path(path),
        LayoutSource::Grid { grid } => Ok(FacilityGraph::load(&grid_layout(grid))?),
    }
}

pub fn run_simulation(config: &SimConfig) -> Result<SimulationResult> {
    run_simulation_with_options(config, true)
}

pub fn run_simulation_summary(config: &SimConfig) -> Result<SimulationResult> {
    run_simulation_with_options(config, false)
}

pub fn run_simulation_with_options(
    config: &SimConfig,
    store_log: bool,
) -> Result<SimulationResult> {
    let simulation = Simulation::new(config.clone())?.store_log(store_log);
    Ok(simulation.finish())
}

pub fn compare_policies(config: &SimConfig) -> Result<Vec<SimulationResult>> {
    validate_config(config)?;
    let graph = Arc::new(load_facility(&config.layout)?);
    PolicyKind::ALL
        .par_iter()
        .map(|&policy| {
            let config = SimConfig {
                policy,
                ..config.clone()
            };
            Simulation::with_graph(config, Arc::clone(&graph))
                .map(|simulation| simulation.store_log(false).finish())
        })
        .collect()
}

pub fn validate_config(config: &SimConfig) -> Result<()> {
    if let ArrivalProfile::Poisson { rate_per_hour, .. } = config.arrivals {
        if !rate_per_hour.is_finite() || rate_per_hour <= 0.0 {
            return Err(Error::InvalidArrivalRate(rate_per_hour));
        }
    }
    if config.end_time.is_none() && !config.arrivals.is_bounded() {
        return Err(Error::UnboundedRun);
    }
    if config.policy == PolicyKind::BatchOptimal && config.batch_window == 0 {
        return Err(Error::InvalidBatchWindow);
    }

    match config.duration {
        DurationProfile::Fixed { minutes } if minutes == 0 => {
            return Err(Error::InvalidDuration("fixed duration must be > 0".to_string()));
        }
        DurationProfile::Normal { mean, std_dev, .. }
            if !mean.is_finite() || mean <= 0.0 || !std_dev.is_finite() || std_dev < 0.0 =>
        {
            return Err(Error::InvalidDuration(format!(
                "normal needs mean > 0 and std_dev >= 0 (got {}, {})",
                mean, std_dev
            )));
        }
        DurationProfile::Exponential { mean, .. } if !mean.is_finite() || mean <= 0.0 => {
            return Err(Error::InvalidDuration(format!(
                "exponential needs mean > 0 (got {})",
                mean
            )));
        }
        _ => {}
    }

    if config.vehicle_types.is_empty() {
        return Err(Error::EmptyVehicleTypes);
    }
    for share in &config.vehicle_types {
        if !share.weight.is_finite() || share.weight < 0.0 {
            return Err(Error::InvalidWeight(format!("vehicle_types.{}", share.vehicle_type)));
        }
    }
    if config.vehicle_types.iter().all(|share| share.weight == 0.0) {
        return Err(Error::ZeroTotalWeight("vehicle_types".to_string()));
    }

    if config.preference_profiles.is_empty() {
        return Err(Error::EmptyPreferenceProfiles);
    }
    for profile in &config.preference_profiles {
        let p = &profile.preferences;
        let weights = [profile.weight, p.proximity, p.price, p.availability, p.exit];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidWeight(profile.name.clone()));
        }
    }
    if config
        .preference_profiles
        .iter()
        .all(|profile| profile.weight == 0.0)
    {
        return Err(Error::ZeroTotalWeight("preference_profiles".to_string()));
    }

    let reservations = &config.reservations;
    for (name, value) in [
        ("reservations.probability", reservations.probability),
        ("reservations.no_show_probability", reservations.no_show_probability),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::InvalidProbability(name.to_string(), value));
        }
    }

    let mut previous: Option<u64> = None;
    for condition in &config.special_conditions {
        let multipliers = [
            condition.price_multiplier,
            condition.demand_multiplier,
            condition.arrival_multiplier,
        ];
        if multipliers.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(Error::InvalidMultiplier(condition.at));
        }
        if let Some(prev) = previous {
            if condition.at < prev {
                return Err(Error::ConditionsOutOfOrder(condition.at, prev));
            }
        }
        previous = Some(condition.at);
    }

    Ok(())
}
