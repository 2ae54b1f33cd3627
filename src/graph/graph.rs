use super::network::{MapData, RoadAttributes};
use crate::algorithm;
use crate::error::{MatchError, Result};
use geo::{BoundingRect, LineString, Point, Rect};
use log::{debug, info};
use petgraph::algo::astar;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use rtree_rs::{RTree, Rect as RTreeRect};
use std::collections::HashMap;

pub type NodeIdx = NodeIndex<usize>;

/// An intersection, identified by its map node id.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub id: i64,
    pub position: Point<f64>,
}

/// Index of a `ConnectionGeometry` inside its `RoadGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub usize);

/// A directed, traversable road segment between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub from: i64,
    pub to: i64,
    pub speed: f64,
    pub geometry: GeometryId,
    pub way_id: i64,
    pub length: f64, // meters, haversine length of the geometry
}

/// Shape of one tagged way, shared by the connections running along it.
#[derive(Debug, Clone)]
pub struct ConnectionGeometry {
    pub way_id: i64,
    pub line: LineString<f64>,
    pub node_ids: Vec<i64>, // map node id of every vertex
    pub length: f64,
    pub start: NodeIdx,
    pub end: NodeIdx,
    pub forward: bool,  // start -> end is traversable
    pub backward: bool, // end -> start is traversable
}

/// A position on the road network: a geometry vertex or a projected point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub point: Point<f64>,
    pub node_id: Option<i64>,
}

impl ConnectionGeometry {
    pub fn vertex(&self, index: usize) -> Vertex {
        Vertex {
            point: self.line.0[index].into(),
            node_id: self.node_ids.get(index).copied(),
        }
    }

    pub fn last_index(&self) -> usize {
        self.line.0.len() - 1
    }
}

pub struct RoadGraph {
    graph: Graph<RoadNode, Connection, Directed, usize>,
    nodes_index: HashMap<i64, NodeIdx>, // map node id -> graph index
    geometries: Vec<ConnectionGeometry>,
    geometry_rtree: RTree<2, f64, GeometryId>,
}

impl RoadGraph {
    /// Builds the graph from tagged ways.
    ///
    /// Each way adds a connection per accessible direction. A way that is not
    /// accessible in either direction still creates its end nodes.
    pub fn build(map: &MapData) -> Result<Self> {
        info!("start construct graph...");
        let mut gh = RoadGraph {
            graph: Graph::with_capacity(map.ways.len() * 2, map.ways.len() * 2),
            nodes_index: HashMap::new(),
            geometries: Vec::new(),
            geometry_rtree: RTree::new(),
        };
        for way in &map.ways {
            let attributes = RoadAttributes::try_from(way)?;
            if way.nodes.len() < 2 {
                return Err(MatchError::DegenerateWay { way_id: way.id });
            }
            let mut coords = Vec::with_capacity(way.nodes.len());
            for node_id in &way.nodes {
                let position = map.nodes.get(node_id).ok_or(MatchError::UnknownNode {
                    way_id: way.id,
                    node_id: *node_id,
                })?;
                coords.push(position.0);
            }
            let line = LineString::new(coords);
            let (first, last) = (way.nodes[0], way.nodes[way.nodes.len() - 1]);
            let start = gh.get_or_create_node(first, line.0[0].into());
            let end = gh.get_or_create_node(last, line.0[line.0.len() - 1].into());
            if !attributes.accessible && !attributes.accessible_reverse {
                continue;
            }
            let Some(bbox) = line.bounding_rect() else {
                return Err(MatchError::DegenerateWay { way_id: way.id });
            };
            let geometry = GeometryId(gh.geometries.len());
            let length = algorithm::linestring_distance(&line);
            let connection = Connection {
                from: first,
                to: last,
                speed: attributes.speed,
                geometry,
                way_id: attributes.way_id,
                length,
            };
            if attributes.accessible {
                gh.graph.add_edge(start, end, connection.clone());
            }
            if attributes.accessible_reverse {
                gh.graph.add_edge(
                    end,
                    start,
                    Connection {
                        from: last,
                        to: first,
                        ..connection
                    },
                );
            }
            gh.geometry_rtree.insert(
                RTreeRect::new(
                    [bbox.min().x, bbox.min().y],
                    [bbox.max().x, bbox.max().y],
                ),
                geometry,
            );
            gh.geometries.push(ConnectionGeometry {
                way_id: attributes.way_id,
                line,
                node_ids: way.nodes.clone(),
                length,
                start,
                end,
                forward: attributes.accessible,
                backward: attributes.accessible_reverse,
            });
        }
        debug!(
            "node size: {}, connection size: {}, geometry size: {}",
            gh.graph.node_count(),
            gh.graph.edge_count(),
            gh.geometries.len()
        );
        info!("finish construct road graph...");
        Ok(gh)
    }

    fn get_or_create_node(&mut self, id: i64, position: Point<f64>) -> NodeIdx {
        if let Some(index) = self.nodes_index.get(&id) {
            return *index;
        }
        let index = self.graph.add_node(RoadNode { id, position });
        self.nodes_index.insert(id, index);
        index
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> {
        self.graph.node_weights()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.graph.edge_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn find_node_by_id(&self, id: i64) -> Option<NodeIdx> {
        self.nodes_index.get(&id).copied()
    }

    pub fn node(&self, index: NodeIdx) -> &RoadNode {
        &self.graph[index]
    }

    pub fn node_vertex(&self, index: NodeIdx) -> Vertex {
        let node = self.node(index);
        Vertex {
            point: node.position,
            node_id: Some(node.id),
        }
    }

    /// Connections entering or leaving the node with map id `id`.
    pub fn incident(&self, id: i64) -> Vec<&Connection> {
        let Some(index) = self.find_node_by_id(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .chain(self.graph.edges_directed(index, Direction::Incoming))
            .map(|edge| edge.weight())
            .collect()
    }

    /// Outgoing connections of a node with their target.
    pub(crate) fn outgoing(&self, index: NodeIdx) -> impl Iterator<Item = (NodeIdx, &Connection)> {
        self.graph
            .edges(index)
            .map(|edge| (edge.target(), edge.weight()))
    }

    /// Shortest distance in meters between two map nodes.
    pub fn short_path(&self, from: i64, to: i64) -> Option<f64> {
        let from = self.find_node_by_id(from)?;
        let to = self.find_node_by_id(to)?;
        let target = self.node(to).position;
        astar(
            &self.graph,
            from,
            |node| node == to,
            |edge| edge.weight().length,
            |node| algorithm::distance(&self.graph[node].position, &target),
        )
        .map(|(length, _)| length)
    }

    pub fn geometries(&self) -> &[ConnectionGeometry] {
        &self.geometries
    }

    pub fn geometry(&self, id: GeometryId) -> &ConnectionGeometry {
        &self.geometries[id.0]
    }

    /// Geometries whose bounding box intersects `bbox`.
    pub fn query_bbox(&self, bbox: &Rect<f64>) -> Vec<GeometryId> {
        let rect = RTreeRect::new(
            [bbox.min().x, bbox.min().y],
            [bbox.max().x, bbox.max().y],
        );
        let mut result = Vec::new();
        for item in self.geometry_rtree.search(rect) {
            result.push(*item.data);
        }
        result.sort();
        result
    }
}
