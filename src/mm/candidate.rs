use super::model::{CancelToken, CandidateId, CandidatePoint};
use super::traj::Fix;
use crate::algorithm;
use crate::error::{MatchError, Result};
use crate::graph::RoadGraph;
use log::{debug, warn};
use rayon::prelude::*;

/// Candidates of one gps fix, best observation first.
#[derive(Debug, Clone)]
pub struct CandidateGraphLayer {
    pub fix: Fix,
    pub fix_index: usize,
    pub candidates: Vec<CandidateId>,
}

/// Edge between a candidate of layer `i` and one of layer `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatesConnection {
    pub from: CandidateId,
    pub to: CandidateId,
    pub transmission: f64,
}

/// Layered candidates of one trace.
///
/// Candidates are stored in an arena; layers and connections refer to them
/// by `CandidateId`. Edges only ever join adjacent layers, so the graph is a
/// DAG ordered by layer.
#[derive(Debug, Clone, Default)]
pub struct CandidateGraph {
    candidates: Vec<CandidatePoint>,
    layers: Vec<CandidateGraphLayer>,
    connections: Vec<CandidatesConnection>,
    incoming: Vec<Vec<usize>>, // per candidate, indices into `connections`
}

impl CandidateGraph {
    pub fn new() -> Self {
        CandidateGraph::default()
    }

    /// Appends the layer of the next fix. Returns the layer index.
    pub fn push_layer(
        &mut self,
        fix: Fix,
        fix_index: usize,
        candidates: Vec<CandidatePoint>,
    ) -> usize {
        let layer = self.layers.len();
        let mut ids = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            candidate.layer = layer;
            ids.push(CandidateId(self.candidates.len()));
            self.candidates.push(candidate);
        }
        self.layers.push(CandidateGraphLayer {
            fix,
            fix_index,
            candidates: ids,
        });
        layer
    }

    /// Joins every candidate of each layer to every candidate of the next one
    /// and computes the transmission probabilities.
    pub fn connect_layers(&mut self, road_graph: &RoadGraph, cancel: &CancelToken) -> Result<()> {
        let candidates = &self.candidates;
        let per_layer = self
            .layers
            .par_windows(2)
            .map(|pair| {
                if cancel.is_cancelled() {
                    return Err(MatchError::Cancelled);
                }
                let mut connections =
                    Vec::with_capacity(pair[0].candidates.len() * pair[1].candidates.len());
                for from in &pair[0].candidates {
                    for to in &pair[1].candidates {
                        let transmission = transmission_probability(
                            road_graph,
                            &candidates[from.0],
                            &candidates[to.0],
                        );
                        connections.push(CandidatesConnection {
                            from: *from,
                            to: *to,
                            transmission,
                        });
                    }
                }
                Ok(connections)
            })
            .collect::<Result<Vec<_>>>()?;

        self.connections = per_layer.into_iter().flatten().collect();
        self.incoming = vec![Vec::new(); self.candidates.len()];
        for (index, connection) in self.connections.iter().enumerate() {
            self.incoming[connection.to.0].push(index);
        }
        debug!(
            "candidate graph: {} layers, {} candidates, {} connections",
            self.layers.len(),
            self.candidates.len(),
            self.connections.len()
        );
        Ok(())
    }

    pub fn layers(&self) -> &[CandidateGraphLayer] {
        &self.layers
    }

    pub fn candidates(&self) -> &[CandidatePoint] {
        &self.candidates
    }

    pub fn candidate(&self, id: CandidateId) -> &CandidatePoint {
        &self.candidates[id.0]
    }

    pub fn connections(&self) -> &[CandidatesConnection] {
        &self.connections
    }

    pub fn incoming(&self, id: CandidateId) -> impl Iterator<Item = &CandidatesConnection> {
        self.incoming
            .get(id.0)
            .into_iter()
            .flatten()
            .map(|index| &self.connections[*index])
    }
}

/// Ratio of straight-line distance to road distance, in `[0, 1]`.
pub fn calc_tp(gps_dist: f64, path_dist: f64) -> f64 {
    if path_dist.is_infinite() {
        return 0.0;
    }
    // also covers coincident points, where both are zero
    if gps_dist >= path_dist {
        return 1.0;
    }
    gps_dist / path_dist
}

/// Road distance between two candidates, infinite when unreachable.
pub fn shortest_path_length(
    road_graph: &RoadGraph,
    from: &CandidatePoint,
    to: &CandidatePoint,
) -> f64 {
    if from.road == to.road {
        let geometry = road_graph.geometry(from.road);
        return match algorithm::path_length(&from.point, &to.point, &geometry.line) {
            Some(length) => length,
            None => {
                warn!(
                    "candidates not located on their own way {}, treated as unreachable",
                    geometry.way_id
                );
                f64::INFINITY
            }
        };
    }
    road_graph
        .find_path(&from.road_point(), &to.road_point())
        .length
}

pub fn transmission_probability(
    road_graph: &RoadGraph,
    from: &CandidatePoint,
    to: &CandidatePoint,
) -> f64 {
    let gps_dist = algorithm::distance(&from.point, &to.point);
    calc_tp(gps_dist, shortest_path_length(road_graph, from, to))
}
