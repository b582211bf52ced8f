use serde::{Deserialize, Serialize};
use std::fmt;

use crate::facility::{NodeId, SpotType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleType {
    Standard,
    Accessible,
    Electric,
}

impl VehicleType {
    /// Spot types this vehicle may park in, most suitable first.
    pub fn allowed_spots(self) -> &'static [SpotType] {
        match self {
            VehicleType::Standard => &[SpotType::Standard],
            VehicleType::Accessible => &[SpotType::Accessible, SpotType::Standard],
            VehicleType::Electric => &[SpotType::EvCharging],
        }
    }

    pub fn accepts(self, spot_type: SpotType) -> bool {
        self.allowed_spots().contains(&spot_type)
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VehicleType::Standard => "standard",
            VehicleType::Accessible => "accessible",
            VehicleType::Electric => "electric",
        };
        write!(f, "{}", label)
    }
}

/// Scoring weights a driver applies to candidate spots. All zeros means the
/// driver takes any compatible spot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PreferenceWeights {
    #[serde(default)]
    pub proximity: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub availability: f64,
    #[serde(default)]
    pub exit: f64,
}

impl PreferenceWeights {
    pub fn nearest() -> Self {
        Self {
            proximity: 1.0,
            ..Self::default()
        }
    }

    pub fn is_indifferent(&self) -> bool {
        self.proximity == 0.0 && self.price == 0.0 && self.availability == 0.0 && self.exit == 0.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub vehicle_type: VehicleType,
    pub profile: String,
    pub preferences: PreferenceWeights,
    pub entry: NodeId,
    pub arrival: u64,
    pub duration: Option<u64>,
}

#[cfg(test)]
impl Vehicle {
    pub(crate) fn test_at(id: u64, vehicle_type: VehicleType, entry: NodeId, arrival: u64) -> Self {
        Self {
            id: VehicleId(id),
            vehicle_type,
            profile: "test".to_string(),
            preferences: PreferenceWeights::nearest(),
            entry,
            arrival,
            duration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electric_vehicles_require_chargers() {
        assert!(VehicleType::Electric.accepts(SpotType::EvCharging));
        assert!(!VehicleType::Electric.accepts(SpotType::Standard));
    }

    #[test]
    fn accessible_vehicles_fall_back_to_standard() {
        assert_eq!(
            VehicleType::Accessible.allowed_spots(),
            &[SpotType::Accessible, SpotType::Standard]
        );
        assert!(!VehicleType::Standard.accepts(SpotType::Accessible));
    }

    #[test]
    fn zero_weights_are_indifferent() {
        assert!(PreferenceWeights::default().is_indifferent());
        assert!(!PreferenceWeights::nearest().is_indifferent());
    }
}
