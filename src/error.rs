use thiserror::Error;

use crate::facility::{NodeId, SpotId};
use crate::occupancy::SpotStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Occupancy(#[from] OccupancyError),
    #[error(transparent)]
    NoPath(#[from] NoPathError),
    #[error("arrival rate must be > 0 (got {0})")]
    InvalidArrivalRate(f64),
    #[error("run is unbounded: set end_time, arrivals.horizon or arrivals.max_vehicles")]
    UnboundedRun,
    #[error("batch window must be > 0 for the batch-optimal policy")]
    InvalidBatchWindow,
    #[error("invalid duration distribution: {0}")]
    InvalidDuration(String),
    #[error("vehicle type distribution must not be empty")]
    EmptyVehicleTypes,
    #[error("preference profiles must not be empty")]
    EmptyPreferenceProfiles,
    #[error("weight must be finite and >= 0 in '{0}'")]
    InvalidWeight(String),
    #[error("weights in '{0}' must not all be zero")]
    ZeroTotalWeight(String),
    #[error("probability must be within [0, 1] in '{0}' (got {1})")]
    InvalidProbability(String, f64),
    #[error("multiplier must be finite and >= 0 at condition t={0}")]
    InvalidMultiplier(u64),
    #[error("special conditions must be ordered by time (t={0} after t={1})")]
    ConditionsOutOfOrder(u64, u64),
    #[error("unknown entry node '{0}'")]
    UnknownEntry(String),
    #[error("unknown preference profile '{0}'")]
    UnknownProfile(String),
    #[error("scripted arrivals must be ordered by time (vehicle {0})")]
    ScriptedOutOfOrder(u64),
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Export(String),
    #[error("{0}")]
    Cli(String),
}

/// Malformed facility layout. Fatal: the run never starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("failed to parse layout: {0}")]
    Parse(String),
    #[error("layout has no nodes")]
    EmptyLayout,
    #[error("node id must not be empty (node #{0})")]
    EmptyNodeId(usize),
    #[error("duplicate node '{0}'")]
    DuplicateNode(String),
    #[error("edge #{edge} references unknown node '{node}'")]
    UnknownNode { edge: usize, node: String },
    #[error("edge #{edge} ({from} -> {to}) has negative weight {weight}")]
    NegativeWeight {
        edge: usize,
        from: String,
        to: String,
        weight: i64,
    },
    #[error("node '{0}' has a non-finite coordinate")]
    InvalidCoordinate(String),
    #[error("node '{0}' declares spot attributes but is not a spot")]
    UnexpectedSpotAttributes(String),
    #[error("layout has no entry node")]
    NoEntry,
    #[error("layout has no exit node")]
    NoExit,
    #[error("layout has no spot nodes")]
    NoSpots,
    #[error("spot '{0}' is unreachable from every entry")]
    UnreachableSpot(String),
    #[error("spot '{0}' cannot reach any exit")]
    DeadEndSpot(String),
}

/// Occupancy state conflicts. Recoverable: the scheduler re-assigns or logs a no-op.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyError {
    #[error("spot {spot} is already {status}")]
    AlreadyOccupied { spot: SpotId, status: SpotStatus },
    #[error("spot {spot} cannot move from {from} to {to}")]
    InvalidTransition {
        spot: SpotId,
        from: SpotStatus,
        to: SpotStatus,
    },
    #[error("spot {0} is not occupied")]
    NotOccupied(SpotId),
    #[error("unknown spot {0}")]
    UnknownSpot(SpotId),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no path from node {from} to node {to}")]
pub struct NoPathError {
    pub from: NodeId,
    pub to: NodeId,
}

pub type Result<T> = std::result::Result<T, Error>;
