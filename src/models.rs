use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::layout::GridSpec;
use crate::vehicle::{PreferenceWeights, VehicleType};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub layout: LayoutSource,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_batch_window")]
    pub batch_window: u64,
    #[serde(default)]
    pub max_wait: u64,
    #[serde(default)]
    pub arrivals: ArrivalProfile,
    #[serde(default = "default_vehicle_types")]
    pub vehicle_types: Vec<VehicleTypeShare>,
    #[serde(default)]
    pub duration: DurationProfile,
    #[serde(default = "default_preference_profiles")]
    pub preference_profiles: Vec<PreferenceProfile>,
    #[serde(default)]
    pub reservations: ReservationConfig,
    #[serde(default)]
    pub special_conditions: Vec<SpecialCondition>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            layout: LayoutSource::default(),
            seed: 0,
            end_time: None,
            policy: PolicyKind::default(),
            batch_window: default_batch_window(),
            max_wait: 0,
            arrivals: ArrivalProfile::default(),
            vehicle_types: default_vehicle_types(),
            duration: DurationProfile::default(),
            preference_profiles: default_preference_profiles(),
            reservations: ReservationConfig::default(),
            special_conditions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum LayoutSource {
    File(PathBuf),
    Grid { grid: GridSpec },
}

impl Default for LayoutSource {
    fn default() -> Self {
        LayoutSource::Grid {
            grid: GridSpec::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    NearestFirst,
    Weighted,
    BatchOptimal,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::NearestFirst,
        PolicyKind::Weighted,
        PolicyKind::BatchOptimal,
    ];

    pub fn description(self) -> &'static str {
        match self {
            PolicyKind::NearestFirst => "closest free compatible spot from the vehicle's entry",
            PolicyKind::Weighted => "lowest weighted proximity/price/pressure/exit score",
            PolicyKind::BatchOptimal => "Hungarian matching of the waiting set every batch window",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyKind::NearestFirst => "nearest-first",
            PolicyKind::Weighted => "weighted",
            PolicyKind::BatchOptimal => "batch-optimal",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArrivalProfile {
    Poisson {
        rate_per_hour: f64,
        #[serde(default)]
        horizon: Option<u64>,
        #[serde(default)]
        max_vehicles: Option<u64>,
    },
    Scripted {
        vehicles: Vec<ScriptedVehicle>,
    },
}

impl Default for ArrivalProfile {
    fn default() -> Self {
        ArrivalProfile::Poisson {
            rate_per_hour: 30.0,
            horizon: Some(480),
            max_vehicles: None,
        }
    }
}

impl ArrivalProfile {
    pub fn is_bounded(&self) -> bool {
        match self {
            ArrivalProfile::Poisson {
                horizon,
                max_vehicles,
                ..
            } => horizon.is_some() || max_vehicles.is_some(),
            ArrivalProfile::Scripted { .. } => true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScriptedVehicle {
    pub at: u64,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub booked: bool,
    #[serde(default = "default_true")]
    pub shows_up: bool,
}

impl ScriptedVehicle {
    pub fn at(at: u64, vehicle_type: VehicleType) -> Self {
        Self {
            at,
            vehicle_type,
            profile: None,
            entry: None,
            duration: None,
            booked: false,
            shows_up: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VehicleTypeShare {
    pub vehicle_type: VehicleType,
    pub weight: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DurationProfile {
    Fixed {
        minutes: u64,
    },
    Normal {
        mean: f64,
        std_dev: f64,
        #[serde(default = "default_min_duration")]
        min: u64,
    },
    Exponential {
        mean: f64,
        #[serde(default = "default_min_duration")]
        min: u64,
    },
}

impl Default for DurationProfile {
    fn default() -> Self {
        DurationProfile::Normal {
            mean: 120.0,
            std_dev: 30.0,
            min: default_min_duration(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PreferenceProfile {
    pub name: String,
    #[serde(default = "default_share")]
    pub weight: f64,
    #[serde(flatten)]
    pub preferences: PreferenceWeights,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReservationConfig {
    #[serde(default)]
    pub probability: f64,
    #[serde(default = "default_lead_time")]
    pub lead_time: u64,
    #[serde(default = "default_grace")]
    pub grace: u64,
    #[serde(default)]
    pub no_show_probability: f64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            probability: 0.0,
            lead_time: default_lead_time(),
            grace: default_grace(),
            no_show_probability: 0.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SpecialCondition {
    pub at: u64,
    #[serde(default = "default_multiplier")]
    pub price_multiplier: f64,
    #[serde(default = "default_multiplier")]
    pub demand_multiplier: f64,
    #[serde(default = "default_multiplier")]
    pub arrival_multiplier: f64,
}

impl SpecialCondition {
    pub fn conditions(&self) -> Conditions {
        Conditions {
            price_multiplier: self.price_multiplier,
            demand_multiplier: self.demand_multiplier,
            arrival_multiplier: self.arrival_multiplier,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Conditions {
    pub price_multiplier: f64,
    pub demand_multiplier: f64,
    pub arrival_multiplier: f64,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            price_multiplier: 1.0,
            demand_multiplier: 1.0,
            arrival_multiplier: 1.0,
        }
    }
}

pub fn conditions_at(schedule: &[SpecialCondition], time: u64) -> Conditions {
    schedule
        .iter()
        .take_while(|condition| condition.at <= time)
        .last()
        .map(SpecialCondition::conditions)
        .unwrap_or_default()
}

fn default_batch_window() -> u64 {
    5
}

fn default_vehicle_type() -> VehicleType {
    VehicleType::Standard
}

fn default_vehicle_types() -> Vec<VehicleTypeShare> {
    vec![
        VehicleTypeShare {
            vehicle_type: VehicleType::Standard,
            weight: 0.8,
        },
        VehicleTypeShare {
            vehicle_type: VehicleType::Accessible,
            weight: 0.1,
        },
        VehicleTypeShare {
            vehicle_type: VehicleType::Electric,
            weight: 0.1,
        },
    ]
}

fn default_preference_profiles() -> Vec<PreferenceProfile> {
    vec![
        PreferenceProfile {
            name: "commuter".to_string(),
            weight: 0.6,
            preferences: PreferenceWeights {
                proximity: 1.0,
                price: 0.2,
                availability: 0.0,
                exit: 0.4,
            },
        },
        PreferenceProfile {
            name: "budget".to_string(),
            weight: 0.3,
            preferences: PreferenceWeights {
                proximity: 0.3,
                price: 1.0,
                availability: 0.2,
                exit: 0.0,
            },
        },
        PreferenceProfile {
            name: "any".to_string(),
            weight: 0.1,
            preferences: PreferenceWeights::default(),
        },
    ]
}

fn default_min_duration() -> u64 {
    15
}

fn default_share() -> f64 {
    1.0
}

fn default_lead_time() -> u64 {
    30
}

fn default_grace() -> u64 {
    15
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}
