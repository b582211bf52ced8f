use pathfinding::prelude::{bfs_reach, dijkstra};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::{FormatError, NoPathError, Result};
use crate::layout::{EdgeDescription, LayoutDescription, NodeDescription};

macro_rules! handle {
    ($name:ident) => {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

const NEARBY_HOPS: u8 = 3;

handle!(NodeId);
handle!(EdgeId);
handle!(SpotId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Entry,
    Exit,
    Junction,
    Spot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpotType {
    Standard,
    Accessible,
    EvCharging,
}

impl SpotType {
    pub const ALL: [SpotType; 3] = [SpotType::Standard, SpotType::Accessible, SpotType::EvCharging];

    pub fn index(self) -> usize {
        match self {
            SpotType::Standard => 0,
            SpotType::Accessible => 1,
            SpotType::EvCharging => 2,
        }
    }
}

impl fmt::Display for SpotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpotType::Standard => "standard",
            SpotType::Accessible => "accessible",
            SpotType::EvCharging => "ev-charging",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: Option<Point>,
    pub spot: Option<SpotId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub weight: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spot {
    pub id: SpotId,
    pub name: String,
    pub node: NodeId,
    pub spot_type: SpotType,
    pub price_tier: u8,
}

#[derive(Clone, Debug)]
pub struct FacilityGraph {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    spots: Vec<Spot>,
    entries: Vec<NodeId>,
    exits: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    nearby: Vec<Vec<SpotId>>,
    // Cost per unit of straight-line length; None unless every node is placed.
    heuristic_scale: Option<f64>,
}

impl FacilityGraph {
    pub fn load(layout: &LayoutDescription) -> std::result::Result<Self, FormatError> {
        if layout.nodes.is_empty() {
            return Err(FormatError::EmptyLayout);
        }

        let mut nodes = Vec::with_capacity(layout.nodes.len());
        let mut spots = Vec::new();
        let mut entries = Vec::new();
        let mut exits = Vec::new();
        let mut by_name = HashMap::with_capacity(layout.nodes.len());

        for (idx, desc) in layout.nodes.iter().enumerate() {
            let name = desc.id.trim();
            if name.is_empty() {
                return Err(FormatError::EmptyNodeId(idx));
            }
            let id = NodeId::from_index(idx);
            if by_name.insert(name.to_string(), id).is_some() {
                return Err(FormatError::DuplicateNode(name.to_string()));
            }
            let position = parse_position(desc)?;

            let spot = match desc.kind {
                NodeKind::Spot => {
                    let spot_id = SpotId::from_index(spots.len());
                    spots.push(Spot {
                        id: spot_id,
                        name: name.to_string(),
                        node: id,
                        spot_type: desc.spot_type.unwrap_or(SpotType::Standard),
                        price_tier: desc.price_tier.unwrap_or(0),
                    });
                    Some(spot_id)
                }
                _ => {
                    if desc.spot_type.is_some() || desc.price_tier.is_some() {
                        return Err(FormatError::UnexpectedSpotAttributes(name.to_string()));
                    }
                    None
                }
            };
            match desc.kind {
                NodeKind::Entry => entries.push(id),
                NodeKind::Exit => exits.push(id),
                _ => {}
            }

            nodes.push(Node {
                id,
                name: name.to_string(),
                kind: desc.kind,
                position,
                spot,
            });
        }

        let mut edges = Vec::with_capacity(layout.edges.len() * 2);
        for (idx, desc) in layout.edges.iter().enumerate() {
            let from = lookup(&by_name, idx, &desc.from)?;
            let to = lookup(&by_name, idx, &desc.to)?;
            if desc.weight < 0 {
                return Err(FormatError::NegativeWeight {
                    edge: idx,
                    from: desc.from.clone(),
                    to: desc.to.clone(),
                    weight: desc.weight,
                });
            }
            let weight = desc.weight as u64;
            edges.push(Edge {
                id: EdgeId::from_index(edges.len()),
                from,
                to,
                weight,
            });
            if desc.bidirectional {
                edges.push(Edge {
                    id: EdgeId::from_index(edges.len()),
                    from: to,
                    to: from,
                    weight,
                });
            }
        }

        if entries.is_empty() {
            return Err(FormatError::NoEntry);
        }
        if exits.is_empty() {
            return Err(FormatError::NoExit);
        }
        if spots.is_empty() {
            return Err(FormatError::NoSpots);
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        for edge in &edges {
            outgoing[edge.from.index()].push(edge.id);
            incoming[edge.to.index()].push(edge.id);
        }

        let heuristic_scale = heuristic_scale(&nodes, &edges);
        let mut graph = Self {
            name: layout.name.clone(),
            nodes,
            edges,
            outgoing,
            incoming,
            spots,
            entries,
            exits,
            by_name,
            nearby: Vec::new(),
            heuristic_scale,
        };
        graph.validate_reachability()?;
        graph.nearby = graph
            .spots
            .iter()
            .map(|spot| graph.collect_nearby(spot))
            .collect();
        Ok(graph)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let layout = LayoutDescription::load(path)?;
        Ok(Self::load(&layout)?)
    }

    /// Describes the graph as loaded: nodes in load order and every directed
    /// edge on its own, so loading the description yields an identical graph.
    pub fn to_description(&self) -> LayoutDescription {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let spot = node.spot.map(|id| &self.spots[id.index()]);
                NodeDescription {
                    id: node.name.clone(),
                    kind: node.kind,
                    x: node.position.map(|p| p.x),
                    y: node.position.map(|p| p.y),
                    spot_type: spot.map(|s| s.spot_type),
                    price_tier: spot.map(|s| s.price_tier),
                }
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|edge| {
                EdgeDescription::one_way(
                    self.nodes[edge.from.index()].name.clone(),
                    self.nodes[edge.to.index()].name.clone(),
                    edge.weight as i64,
                )
            })
            .collect();
        LayoutDescription {
            name: self.name.clone(),
            nodes,
            edges,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub fn spot(&self, id: SpotId) -> &Spot {
        &self.spots[id.index()]
    }

    pub fn spot_count(&self) -> usize {
        self.spots.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn spot_by_name(&self, name: &str) -> Option<SpotId> {
        self.node_by_name(name)
            .and_then(|node| self.nodes[node.index()].spot)
    }

    pub fn max_price_tier(&self) -> u8 {
        self.spots
            .iter()
            .map(|spot| spot.price_tier)
            .max()
            .unwrap_or(0)
    }

    pub fn nearby_spots(&self, spot: SpotId) -> &[SpotId] {
        &self.nearby[spot.index()]
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing[node.index()]
            .iter()
            .map(move |edge| &self.edges[edge.index()])
    }

    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming[node.index()]
            .iter()
            .map(move |edge| &self.edges[edge.index()])
    }

    pub(crate) fn successors(&self, node: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.outgoing[node]
            .iter()
            .map(move |edge| {
                let edge = &self.edges[edge.index()];
                (edge.to.index(), edge.weight)
            })
    }

    pub(crate) fn reverse_successors(
        &self,
        node: usize,
    ) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.incoming[node]
            .iter()
            .map(move |edge| {
                let edge = &self.edges[edge.index()];
                (edge.from.index(), edge.weight)
            })
    }

    pub fn shortest_path(
        &self,
        from: NodeId,
        to: NodeId,
    ) -> std::result::Result<Vec<EdgeId>, NoPathError> {
        let (path, _) = dijkstra(
            &from.index(),
            |&node| self.successors(node),
            |&node| node == to.index(),
        )
        .ok_or(NoPathError { from, to })?;
        Ok(self.edges_along(&path))
    }

    pub(crate) fn edges_along(&self, path: &[usize]) -> Vec<EdgeId> {
        path.windows(2)
            .filter_map(|pair| {
                self.outgoing[pair[0]]
                    .iter()
                    .map(|edge| &self.edges[edge.index()])
                    .filter(|edge| edge.to.index() == pair[1])
                    .min_by_key(|edge| (edge.weight, edge.id))
                    .map(|edge| edge.id)
            })
            .collect()
    }

    /// Lower bound on the travel cost between two nodes, derived from their
    /// straight-line distance. Zero when the layout carries no geometry.
    pub fn straight_line_bound(&self, from: NodeId, to: NodeId) -> u64 {
        let Some(scale) = self.heuristic_scale else {
            return 0;
        };
        match (
            self.nodes[from.index()].position,
            self.nodes[to.index()].position,
        ) {
            (Some(a), Some(b)) => {
                let bound = scale * a.distance(&b) - 1e-9;
                if bound <= 0.0 {
                    0
                } else {
                    bound.floor() as u64
                }
            }
            _ => 0,
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.heuristic_scale.is_some()
    }

    // Walks lanes in either direction, never through another spot.
    fn collect_nearby(&self, spot: &Spot) -> Vec<SpotId> {
        let start = spot.node.index();
        let mut found: Vec<SpotId> = bfs_reach((start, 0u8), |&(node, depth)| {
            let expand =
                depth < NEARBY_HOPS && (node == start || self.nodes[node].spot.is_none());
            let next: Vec<(usize, u8)> = if expand {
                self.successors(node)
                    .chain(self.reverse_successors(node))
                    .map(|(next, _)| (next, depth + 1))
                    .collect()
            } else {
                Vec::new()
            };
            next
        })
        .filter_map(|(node, _)| self.nodes[node].spot)
        .filter(|&id| id != spot.id)
        .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    fn validate_reachability(&self) -> std::result::Result<(), FormatError> {
        let from_entries = self.reachable(&self.entries, false);
        let to_exits = self.reachable(&self.exits, true);
        for spot in &self.spots {
            if !from_entries[spot.node.index()] {
                return Err(FormatError::UnreachableSpot(spot.name.clone()));
            }
            if !to_exits[spot.node.index()] {
                return Err(FormatError::DeadEndSpot(spot.name.clone()));
            }
        }
        Ok(())
    }

    fn reachable(&self, sources: &[NodeId], reverse: bool) -> Vec<bool> {
        // A virtual root fans out to every source so one traversal covers them all.
        let root = self.nodes.len();
        let mut seen = vec![false; self.nodes.len()];
        let reach = bfs_reach(root, |&node| -> Vec<usize> {
            if node == root {
                sources.iter().map(|id| id.index()).collect()
            } else if reverse {
                self.reverse_successors(node).map(|(next, _)| next).collect()
            } else {
                self.successors(node).map(|(next, _)| next).collect()
            }
        });
        for node in reach {
            if node != root {
                seen[node] = true;
            }
        }
        seen
    }
}

fn lookup(
    by_name: &HashMap<String, NodeId>,
    edge: usize,
    name: &str,
) -> std::result::Result<NodeId, FormatError> {
    by_name
        .get(name.trim())
        .copied()
        .ok_or_else(|| FormatError::UnknownNode {
            edge,
            node: name.to_string(),
        })
}

fn parse_position(desc: &NodeDescription) -> std::result::Result<Option<Point>, FormatError> {
    match (desc.x, desc.y) {
        (None, None) => Ok(None),
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Some(Point { x, y })),
        _ => Err(FormatError::InvalidCoordinate(desc.id.clone())),
    }
}

fn heuristic_scale(nodes: &[Node], edges: &[Edge]) -> Option<f64> {
    if nodes.iter().any(|node| node.position.is_none()) {
        return None;
    }
    let mut scale = f64::INFINITY;
    for edge in edges {
        let from = nodes[edge.from.index()].position;
        let (Some(a), Some(b)) = (from, nodes[edge.to.index()].position) else {
            continue;
        };
        let length = a.distance(&b);
        if length > 0.0 {
            scale = scale.min(edge.weight as f64 / length);
        }
    }
    if scale.is_finite() {
        Some(scale)
    } else {
        Some(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::fixtures::three_spot_layout;
    use crate::layout::{grid_layout, GridSpec};

    #[test]
    fn nearby_spots_share_a_stretch_of_lane() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        assert_eq!(graph.nearby_spots(SpotId(1)), &[SpotId(0), SpotId(2)]);

        let grid = FacilityGraph::load(&grid_layout(&GridSpec::default())).unwrap();
        for spot in grid.spots() {
            let nearby = grid.nearby_spots(spot.id);
            assert!(!nearby.is_empty(), "{}", spot.name);
            assert!(!nearby.contains(&spot.id));
            assert!(nearby.len() < grid.spot_count() / 2, "{}", spot.name);
        }
    }

    #[test]
    fn load_builds_arena_in_layout_order() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        assert_eq!(graph.nodes().len(), 5);
        // three bidirectional lanes plus three one-way drains
        assert_eq!(graph.edges().len(), 9);
        assert_eq!(graph.spot_count(), 3);
        let names: Vec<&str> = graph.spots().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(graph.spot_by_name("B"), Some(SpotId(1)));
        assert_eq!(graph.entries(), &[NodeId(0)]);
        assert_eq!(graph.exits(), &[NodeId(4)]);
    }

    #[test]
    fn upper_floor_spots_are_reached_over_the_ramp() {
        let spec = GridSpec {
            floors: 2,
            ..GridSpec::default()
        };
        let graph = FacilityGraph::load(&grid_layout(&spec)).unwrap();
        assert_eq!(graph.spot_count(), 120);
        let entry = graph.entries()[0];
        let upper = graph.spot(graph.spot_by_name("F1:S0-0-n").unwrap()).node;
        let path = graph.shortest_path(entry, upper).unwrap();
        let cost: u64 = path.iter().map(|id| graph.edge(*id).weight).sum();
        assert_eq!(cost, 7);
        assert!(path
            .iter()
            .any(|id| graph.node(graph.edge(*id).to).name == "F1:C0"));
    }

    #[test]
    fn neighbors_lists_outgoing_lanes() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        let gate = graph.node_by_name("gate").unwrap();
        let targets: Vec<&str> = graph
            .neighbors(gate)
            .map(|edge| graph.node(edge.to).name.as_str())
            .collect();
        assert_eq!(targets, vec!["A", "B", "C"]);
    }

    #[test]
    fn shortest_path_returns_edges_in_order() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        let gate = graph.node_by_name("gate").unwrap();
        let out = graph.node_by_name("out").unwrap();
        let path = graph.shortest_path(gate, out).unwrap();
        let hops: Vec<(&str, &str)> = path
            .iter()
            .map(|id| {
                let edge = graph.edge(*id);
                (
                    graph.node(edge.from).name.as_str(),
                    graph.node(edge.to).name.as_str(),
                )
            })
            .collect();
        assert_eq!(hops, vec![("gate", "A"), ("A", "out")]);
    }

    #[test]
    fn shortest_path_reports_missing_route() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        let out = graph.node_by_name("out").unwrap();
        let gate = graph.node_by_name("gate").unwrap();
        let err = graph.shortest_path(out, gate).unwrap_err();
        assert_eq!(err, NoPathError { from: out, to: gate });
    }

    #[test]
    fn rejects_negative_weight_naming_the_edge() {
        let mut layout = three_spot_layout();
        layout.edges[1].weight = -2;
        let err = FacilityGraph::load(&layout).unwrap_err();
        assert_eq!(
            err,
            FormatError::NegativeWeight {
                edge: 1,
                from: "gate".to_string(),
                to: "B".to_string(),
                weight: -2,
            }
        );
    }

    #[test]
    fn rejects_spot_unreachable_from_entries() {
        let mut layout = three_spot_layout();
        layout.edges.remove(2);
        layout
            .edges
            .push(EdgeDescription::one_way("C", "gate", 5));
        let err = FacilityGraph::load(&layout).unwrap_err();
        assert_eq!(err, FormatError::UnreachableSpot("C".to_string()));
    }

    #[test]
    fn rejects_spot_without_exit() {
        let mut layout = three_spot_layout();
        layout.edges.retain(|edge| !(edge.from == "C" && edge.to == "out"));
        layout.edges[2].bidirectional = false;
        let err = FacilityGraph::load(&layout).unwrap_err();
        assert_eq!(err, FormatError::DeadEndSpot("C".to_string()));
    }

    #[test]
    fn rejects_unknown_and_duplicate_nodes() {
        let mut layout = three_spot_layout();
        layout.edges.push(EdgeDescription::lane("gate", "Z", 1));
        let err = FacilityGraph::load(&layout).unwrap_err();
        assert_eq!(
            err,
            FormatError::UnknownNode {
                edge: 6,
                node: "Z".to_string()
            }
        );

        let mut layout = three_spot_layout();
        layout.nodes.push(NodeDescription::new("A", NodeKind::Junction));
        let err = FacilityGraph::load(&layout).unwrap_err();
        assert_eq!(err, FormatError::DuplicateNode("A".to_string()));
    }

    #[test]
    fn rejects_layouts_without_entry_or_exit() {
        let mut layout = three_spot_layout();
        layout.nodes[0].kind = NodeKind::Junction;
        assert_eq!(FacilityGraph::load(&layout).unwrap_err(), FormatError::NoEntry);

        let mut layout = three_spot_layout();
        layout.nodes[4].kind = NodeKind::Junction;
        assert_eq!(FacilityGraph::load(&layout).unwrap_err(), FormatError::NoExit);
    }

    #[test]
    fn rejects_half_specified_coordinates() {
        let mut layout = three_spot_layout();
        layout.nodes[1].x = Some(1.0);
        assert_eq!(
            FacilityGraph::load(&layout).unwrap_err(),
            FormatError::InvalidCoordinate("A".to_string())
        );
    }

    #[test]
    fn export_then_import_preserves_nodes_edges_and_weights() {
        let graph = FacilityGraph::load(&grid_layout(&GridSpec::default())).unwrap();
        let encoded = graph.to_description().to_json_string().unwrap();
        let reloaded =
            FacilityGraph::load(&LayoutDescription::from_json_str(&encoded).unwrap()).unwrap();

        assert_eq!(reloaded.nodes(), graph.nodes());
        assert_eq!(reloaded.edges(), graph.edges());
        assert_eq!(reloaded.spots(), graph.spots());
    }

    #[test]
    fn straight_line_bound_never_exceeds_lane_cost() {
        let graph = FacilityGraph::load(&grid_layout(&GridSpec::default())).unwrap();
        assert!(graph.has_geometry());
        for edge in graph.edges() {
            assert!(graph.straight_line_bound(edge.from, edge.to) <= edge.weight);
        }
    }

    #[test]
    fn straight_line_bound_is_zero_without_geometry() {
        let graph = FacilityGraph::load(&three_spot_layout()).unwrap();
        let gate = graph.node_by_name("gate").unwrap();
        let c = graph.node_by_name("C").unwrap();
        assert!(!graph.has_geometry());
        assert_eq!(graph.straight_line_bound(gate, c), 0);
    }
}
