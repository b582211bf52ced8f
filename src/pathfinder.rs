use pathfinding::prelude::{astar, dijkstra, dijkstra_all};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::Arc;

use crate::error::NoPathError;
use crate::facility::{EdgeId, FacilityGraph, NodeId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Heuristic {
    Zero,
    /// Scaled straight-line distance; admissible for every validated layout.
    #[default]
    StraightLine,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Route {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: u64,
    #[serde(skip)]
    pub expanded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistanceTable {
    origin: Option<NodeId>,
    costs: Vec<Option<u64>>,
}

impl DistanceTable {
    pub fn origin(&self) -> Option<NodeId> {
        self.origin
    }

    pub fn cost(&self, node: NodeId) -> Option<u64> {
        self.costs.get(node.index()).copied().flatten()
    }

    pub fn reachable_count(&self) -> usize {
        self.costs.iter().filter(|cost| cost.is_some()).count()
    }
}

pub struct Pathfinder {
    graph: Arc<FacilityGraph>,
    from_entries: Vec<DistanceTable>,
    to_exits: DistanceTable,
    max_spot_cost: u64,
    max_exit_cost: u64,
}

impl Pathfinder {
    pub fn new(graph: Arc<FacilityGraph>) -> Self {
        let from_entries: Vec<DistanceTable> = graph
            .entries()
            .par_iter()
            .map(|&entry| distances_from(&graph, entry))
            .collect();
        let to_exits = distances_to_exits(&graph);

        let max_spot_cost = graph
            .spots()
            .iter()
            .flat_map(|spot| from_entries.iter().filter_map(|table| table.cost(spot.node)))
            .max()
            .unwrap_or(0);
        let max_exit_cost = graph
            .spots()
            .iter()
            .filter_map(|spot| to_exits.cost(spot.node))
            .max()
            .unwrap_or(0);

        Self {
            graph,
            from_entries,
            to_exits,
            max_spot_cost,
            max_exit_cost,
        }
    }

    pub fn graph(&self) -> &FacilityGraph {
        &self.graph
    }

    pub fn shared_graph(&self) -> Arc<FacilityGraph> {
        Arc::clone(&self.graph)
    }

    pub fn shortest_cost(&self, from: NodeId, to: NodeId) -> Result<u64, NoPathError> {
        self.shortest_route(from, to).map(|route| route.cost)
    }

    pub fn shortest_route(&self, from: NodeId, to: NodeId) -> Result<Route, NoPathError> {
        let expanded = Cell::new(0usize);
        let found = dijkstra(
            &from.index(),
            |&node| {
                expanded.set(expanded.get() + 1);
                self.graph.successors(node)
            },
            |&node| node == to.index(),
        );
        let (path, cost) = found.ok_or(NoPathError { from, to })?;
        Ok(self.route_from(path, cost, expanded.get()))
    }

    /// Goal-directed route (A*). With an admissible heuristic the cost always
    /// equals [`Pathfinder::shortest_cost`].
    pub fn route(
        &self,
        from: NodeId,
        to: NodeId,
        heuristic: Heuristic,
    ) -> Result<Route, NoPathError> {
        let expanded = Cell::new(0usize);
        let found = astar(
            &from.index(),
            |&node| {
                expanded.set(expanded.get() + 1);
                self.graph.successors(node)
            },
            |&node| match heuristic {
                Heuristic::Zero => 0,
                Heuristic::StraightLine => {
                    self.graph
                        .straight_line_bound(NodeId::from_index(node), to)
                }
            },
            |&node| node == to.index(),
        );
        let (path, cost) = found.ok_or(NoPathError { from, to })?;
        Ok(self.route_from(path, cost, expanded.get()))
    }

    pub fn distances_from(&self, origin: NodeId) -> DistanceTable {
        distances_from(&self.graph, origin)
    }

    pub fn entry_table(&self, entry: NodeId) -> Option<&DistanceTable> {
        self.graph
            .entries()
            .iter()
            .position(|&candidate| candidate == entry)
            .map(|idx| &self.from_entries[idx])
    }

    pub fn exit_cost(&self, node: NodeId) -> Option<u64> {
        self.to_exits.cost(node)
    }

    pub fn max_spot_cost(&self) -> u64 {
        self.max_spot_cost
    }

    pub fn max_exit_cost(&self) -> u64 {
        self.max_exit_cost
    }

    fn route_from(&self, path: Vec<usize>, cost: u64, expanded: usize) -> Route {
        let edges = self.graph.edges_along(&path);
        Route {
            nodes: path.into_iter().map(NodeId::from_index).collect(),
            edges,
            cost,
            expanded,
        }
    }
}

fn distances_from(graph: &FacilityGraph, origin: NodeId) -> DistanceTable {
    let mut costs = vec![None; graph.nodes().len()];
    costs[origin.index()] = Some(0);
    for (node, (_, cost)) in dijkstra_all(&origin.index(), |&node| graph.successors(node)) {
        costs[node] = Some(cost);
    }
    DistanceTable {
        origin: Some(origin),
        costs,
    }
}

fn distances_to_exits(graph: &FacilityGraph) -> DistanceTable {
    // Reverse search from a virtual root attached to every exit at zero cost.
    let root = graph.nodes().len();
    let mut costs = vec![None; graph.nodes().len()];
    let reached = dijkstra_all(&root, |&node| -> Vec<(usize, u64)> {
        if node == root {
            graph.exits().iter().map(|exit| (exit.index(), 0)).collect()
        } else {
            graph.reverse_successors(node).collect()
        }
    });
    for (node, (_, cost)) in reached {
        if node != root {
            costs[node] = Some(cost);
        }
    }
    DistanceTable {
        origin: None,
        costs,
    }
}
