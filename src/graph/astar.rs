use super::graph::{GeometryId, NodeIdx, RoadGraph, Vertex};
use crate::algorithm;
use geo::Point;
use ordered_float::OrderedFloat;
use pathfinding::prelude::astar;
use std::cmp::Ordering;

/// A point on a road geometry, `offset` meters from its first vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadPoint {
    pub road: GeometryId,
    pub offset: f64,
    pub point: Point<f64>,
}

/// One stretch of a path, running along a single geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub geometry: GeometryId,
    pub from: Vertex,
    pub to: Vertex,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<PathSegment>,
    pub length: f64,
}

impl Path {
    pub fn unreachable() -> Self {
        Path {
            segments: Vec::new(),
            length: f64::INFINITY,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.length.is_finite()
    }
}

/// A node where the search may begin or end, with the distance already
/// covered before it (or still to cover after it).
#[derive(Debug, Clone, Copy)]
struct Terminal {
    node: NodeIdx,
    cost: f64,
    vertex: Vertex,
}

/// Search node: the road graph plus a virtual origin and destination standing
/// for the two points the path runs between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Step {
    Origin,
    Road(NodeIdx),
    Destination,
}

type Cost = OrderedFloat<f64>;

fn cheapest(terminals: &[Terminal], node: NodeIdx) -> Option<Terminal> {
    terminals
        .iter()
        .filter(|terminal| terminal.node == node)
        .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(Ordering::Equal))
        .copied()
}

impl RoadGraph {
    /// Shortest path between two points on the network.
    ///
    /// The origin leaves its road in every traversable direction and the
    /// destination is entered from every traversable direction of its road.
    /// Returns `Path::unreachable()` when no sequence of connections joins
    /// them.
    pub fn find_path(&self, from: &RoadPoint, to: &RoadPoint) -> Path {
        let origin = self.geometry(from.road);
        let destination = self.geometry(to.road);
        let mut seeds = Vec::with_capacity(2);
        if origin.forward {
            seeds.push(Terminal {
                node: origin.end,
                cost: (origin.length - from.offset).max(0.0),
                vertex: origin.vertex(origin.last_index()),
            });
        }
        if origin.backward {
            seeds.push(Terminal {
                node: origin.start,
                cost: from.offset.max(0.0),
                vertex: origin.vertex(0),
            });
        }
        let mut goals = Vec::with_capacity(2);
        if destination.forward {
            goals.push(Terminal {
                node: destination.start,
                cost: to.offset.max(0.0),
                vertex: destination.vertex(0),
            });
        }
        if destination.backward {
            goals.push(Terminal {
                node: destination.end,
                cost: (destination.length - to.offset).max(0.0),
                vertex: destination.vertex(destination.last_index()),
            });
        }
        if seeds.is_empty() || goals.is_empty() {
            return Path::unreachable();
        }

        let successors = |step: &Step| -> Vec<(Step, Cost)> {
            match *step {
                Step::Origin => seeds
                    .iter()
                    .map(|seed| (Step::Road(seed.node), OrderedFloat(seed.cost)))
                    .collect(),
                Step::Road(node) => self
                    .outgoing(node)
                    .map(|(target, connection)| (Step::Road(target), OrderedFloat(connection.length)))
                    .chain(
                        goals
                            .iter()
                            .filter(|goal| goal.node == node)
                            .map(|goal| (Step::Destination, OrderedFloat(goal.cost))),
                    )
                    .collect(),
                Step::Destination => Vec::new(),
            }
        };
        // admissible: no road is shorter than the straight line to a goal
        let heuristic = |step: &Step| -> Cost {
            let Step::Road(node) = *step else {
                return OrderedFloat(0.0);
            };
            let position = self.node(node).position;
            let estimate = goals
                .iter()
                .map(|goal| algorithm::distance(&position, &goal.vertex.point) + goal.cost)
                .fold(f64::INFINITY, f64::min);
            OrderedFloat(estimate)
        };
        let Some((steps, cost)) =
            astar(&Step::Origin, successors, heuristic, |step| *step == Step::Destination)
        else {
            return Path::unreachable();
        };

        let nodes: Vec<NodeIdx> = steps
            .iter()
            .filter_map(|step| match step {
                Step::Road(node) => Some(*node),
                _ => None,
            })
            .collect();
        let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
            return Path::unreachable();
        };
        let (Some(seed), Some(goal)) = (cheapest(&seeds, *first), cheapest(&goals, *last)) else {
            return Path::unreachable();
        };

        let mut segments = Vec::with_capacity(nodes.len() + 1);
        segments.push(PathSegment {
            geometry: from.road,
            from: Vertex {
                point: from.point,
                node_id: None,
            },
            to: seed.vertex,
            length: seed.cost,
        });
        for pair in nodes.windows(2) {
            // parallel connections: the search went along the shortest one
            let Some(connection) = self
                .outgoing(pair[0])
                .filter(|(target, _)| *target == pair[1])
                .map(|(_, connection)| connection)
                .min_by(|a, b| a.length.partial_cmp(&b.length).unwrap_or(Ordering::Equal))
            else {
                return Path::unreachable();
            };
            segments.push(PathSegment {
                geometry: connection.geometry,
                from: self.node_vertex(pair[0]),
                to: self.node_vertex(pair[1]),
                length: connection.length,
            });
        }
        segments.push(PathSegment {
            geometry: to.road,
            from: goal.vertex,
            to: Vertex {
                point: to.point,
                node_id: None,
            },
            length: goal.cost,
        });
        Path {
            segments,
            length: cost.into_inner(),
        }
    }
}
