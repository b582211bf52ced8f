use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, FormatError, Result};
use crate::facility::{NodeKind, SpotType};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LayoutDescription {
    #[serde(default = "default_name")]
    pub name: String,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NodeDescription {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_type: Option<SpotType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_tier: Option<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EdgeDescription {
    pub from: String,
    pub to: String,
    pub weight: i64,
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
}

impl NodeDescription {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            x: None,
            y: None,
            spot_type: None,
            price_tier: None,
        }
    }

    pub fn spot(id: impl Into<String>, spot_type: SpotType, price_tier: u8) -> Self {
        Self {
            spot_type: Some(spot_type),
            price_tier: Some(price_tier),
            ..Self::new(id, NodeKind::Spot)
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

impl EdgeDescription {
    pub fn lane(from: impl Into<String>, to: impl Into<String>, weight: i64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            bidirectional: true,
        }
    }

    pub fn one_way(from: impl Into<String>, to: impl Into<String>, weight: i64) -> Self {
        Self {
            bidirectional: false,
            ..Self::lane(from, to, weight)
        }
    }
}

impl LayoutDescription {
    pub fn from_json_str(input: &str) -> std::result::Result<Self, FormatError> {
        serde_json::from_str(input).map_err(|err| FormatError::Parse(err.to_string()))
    }

    pub fn from_toml_str(input: &str) -> std::result::Result<Self, FormatError> {
        toml::from_str(input).map_err(|err| FormatError::Parse(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::ConfigIo(format!(
                "failed to read layout '{}': {}",
                path.display(),
                err
            ))
        })?;
        match extension_of(path) {
            "toml" => Ok(Self::from_toml_str(&contents)?),
            "json" => Ok(Self::from_json_str(&contents)?),
            "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
            ext => Err(Error::UnsupportedConfigFormat(ext.to_string())),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Error::Export(format!("failed to encode layout: {}", err)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| Error::Export(format!("failed to encode layout: {}", err)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = match extension_of(path) {
            "toml" => self.to_toml_string()?,
            "json" => self.to_json_string()?,
            "" => return Err(Error::UnsupportedConfigFormat("unknown".to_string())),
            ext => return Err(Error::UnsupportedConfigFormat(ext.to_string())),
        };
        fs::write(path, encoded).map_err(|err| {
            Error::Export(format!(
                "failed to write layout '{}': {}",
                path.display(),
                err
            ))
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GridSpec {
    pub aisles: u32,
    pub aisle_length: u32,
    #[serde(default)]
    pub accessible_every: u32,
    #[serde(default)]
    pub ev_every: u32,
    #[serde(default = "default_floors")]
    pub floors: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            aisles: 3,
            aisle_length: 10,
            accessible_every: 10,
            ev_every: 8,
            floors: 1,
        }
    }
}

const RAMP_COST: i64 = 4;

fn default_floors() -> u32 {
    1
}

/// Builds a lot of stacked floors: horizontal aisles with a spot on each side
/// of every lane cell, joined by a spine on both ends. The entry sits on the
/// left spine and the exit on the right of the ground floor. Upper floors are
/// reached by a ramp between the first left-spine nodes.
pub fn grid_layout(spec: &GridSpec) -> LayoutDescription {
    let aisles = spec.aisles.max(1);
    let length = spec.aisle_length.max(1);
    let floors = spec.floors.max(1);
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut spot_counter = 0u32;

    nodes.push(NodeDescription::new("entry", NodeKind::Entry).at(-2.0, 0.0));
    nodes.push(NodeDescription::new("exit", NodeKind::Exit).at(f64::from(length) + 1.0, 0.0));

    for floor in 0..floors {
        let named = |base: String| {
            if floor == 0 {
                base
            } else {
                format!("F{}:{}", floor, base)
            }
        };
        if floor > 0 {
            let below = if floor == 1 {
                "C0".to_string()
            } else {
                format!("F{}:C0", floor - 1)
            };
            edges.push(EdgeDescription::lane(below, named("C0".to_string()), RAMP_COST));
        }

        for aisle in 0..aisles {
            let y = f64::from(aisle * 3);
            let left = named(format!("C{}", aisle));
            let right = named(format!("R{}", aisle));
            nodes.push(NodeDescription::new(left.clone(), NodeKind::Junction).at(-1.0, y));
            nodes.push(
                NodeDescription::new(right.clone(), NodeKind::Junction).at(f64::from(length), y),
            );
            if aisle > 0 {
                let prev_left = named(format!("C{}", aisle - 1));
                let prev_right = named(format!("R{}", aisle - 1));
                edges.push(EdgeDescription::lane(prev_left, left.clone(), 3));
                edges.push(EdgeDescription::lane(prev_right, right.clone(), 3));
            } else if floor == 0 {
                edges.push(EdgeDescription::lane("entry", left.clone(), 1));
                edges.push(EdgeDescription::lane(right.clone(), "exit", 1));
            }

            for cell in 0..length {
                let lane = named(format!("L{}-{}", aisle, cell));
                let x = f64::from(cell);
                nodes.push(NodeDescription::new(lane.clone(), NodeKind::Junction).at(x, y));
                if cell == 0 {
                    edges.push(EdgeDescription::lane(left.clone(), lane.clone(), 1));
                } else {
                    let prev = named(format!("L{}-{}", aisle, cell - 1));
                    edges.push(EdgeDescription::lane(prev, lane.clone(), 1));
                }
                if cell + 1 == length {
                    edges.push(EdgeDescription::lane(lane.clone(), right.clone(), 1));
                }

                for (side, dy) in [("n", 1.0), ("s", -1.0)] {
                    spot_counter += 1;
                    let spot_type = grid_spot_type(spec, spot_counter);
                    let tier = if floor == 0 && aisle == 0 { 2 } else { 1 };
                    let id = named(format!("S{}-{}-{}", aisle, cell, side));
                    nodes.push(NodeDescription::spot(id.clone(), spot_type, tier).at(x, y + dy));
                    edges.push(EdgeDescription::lane(lane.clone(), id, 1));
                }
            }
        }
    }

    let name = if floors > 1 {
        format!("grid-{}x{}x{}", aisles, length, floors)
    } else {
        format!("grid-{}x{}", aisles, length)
    };
    LayoutDescription { name, nodes, edges }
}

// Counting from 1; chargers win over accessible spots on a shared slot.
fn grid_spot_type(spec: &GridSpec, counter: u32) -> SpotType {
    if spec.ev_every > 0 && counter % spec.ev_every == 0 {
        SpotType::EvCharging
    } else if spec.accessible_every > 0 && (counter - 1) % spec.accessible_every == 0 {
        SpotType::Accessible
    } else {
        SpotType::Standard
    }
}

fn extension_of(path: &Path) -> &str {
    path.extension()
        .and_then(|value| value.to_str())
        .unwrap_or("")
}

fn default_name() -> String {
    "facility".to_string()
}

fn default_bidirectional() -> bool {
    true
}
