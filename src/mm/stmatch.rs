use super::candidate::CandidateGraph;
use super::model::{
    CancelToken, CandidatePoint, Config, GapPolicy, MMResult, MatchedPath, MatchedPoint,
};
use super::reconstruct::PathReconstructer;
use super::route::Route;
use super::traj::Fix;
use super::uturn::UTurnFilter;
use super::viterbi::Viterbi;
use crate::algorithm;
use crate::error::{MatchError, Result};
use crate::graph::{network::MapData, RoadGraph};
use anyhow::Context;
use geo::{coord, Rect};
use log::{info, warn};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::path::Path;

pub struct MMatch {
    road_graph: RoadGraph,
    config: Config,
}

impl MMatch {
    pub fn new(road_graph: RoadGraph, config: Config) -> Self {
        MMatch { road_graph, config }
    }

    /// Loads a GeoJSON network file and builds the road graph from it.
    pub fn from_network_file<P: AsRef<Path>>(path: P, config: Config) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let map = MapData::from_path(path)
            .with_context(|| format!("read network file {}", path.display()))?;
        let road_graph = RoadGraph::build(&map)
            .with_context(|| format!("build road graph from {}", path.display()))?;
        info!("construct map matching success... ");
        Ok(MMatch::new(road_graph, config))
    }

    pub fn road_graph(&self) -> &RoadGraph {
        &self.road_graph
    }

    /// Observation probability of a candidate `dist` meters away from its fix.
    pub fn calc_ep(&self, dist: f64) -> f64 {
        let sigma = self.config.sigma;
        0.5 * (-(dist * dist) / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * PI).sqrt())
    }

    /// Projections of `fix` onto the nearby roads, best first.
    pub fn candidates_for(&self, fix: &Fix) -> Vec<CandidatePoint> {
        let (lon, lat) = (fix.point.x(), fix.point.y());
        let bbox = Rect::new(
            coord! {
                x: lon - self.config.search_margin_lon,
                y: lat - self.config.search_margin_lat,
            },
            coord! {
                x: lon + self.config.search_margin_lon,
                y: lat + self.config.search_margin_lat,
            },
        );
        let mut candidates: Vec<CandidatePoint> = self
            .road_graph
            .query_bbox(&bbox)
            .into_iter()
            .filter_map(|road| {
                let geometry = self.road_graph.geometry(road);
                let projection = algorithm::project_point(&fix.point, &geometry.line)?;
                Some(CandidatePoint {
                    point: projection.point,
                    road,
                    way_id: geometry.way_id,
                    distance: projection.distance,
                    offset: projection.offset,
                    observation: self.calc_ep(projection.distance),
                    layer: 0,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.observation
                .partial_cmp(&a.observation)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    /// Candidate layers of a trace, connected with transmission probabilities.
    pub fn build_candidate_graph(&self, traj: &[Fix], cancel: &CancelToken) -> Result<CandidateGraph> {
        let layers = traj
            .par_iter()
            .map(|fix| {
                if cancel.is_cancelled() {
                    return Err(MatchError::Cancelled);
                }
                Ok(self.candidates_for(fix))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut graph = CandidateGraph::new();
        for (index, (fix, candidates)) in traj.iter().zip(layers).enumerate() {
            if candidates.is_empty() {
                match self.config.gap_policy {
                    GapPolicy::Fail => return Err(MatchError::NoCandidates { index }),
                    GapPolicy::Split => warn!("no candidate for gps fix {}, skipped", index),
                }
            }
            graph.push_layer(*fix, index, candidates);
        }
        graph.connect_layers(&self.road_graph, cancel)?;
        Ok(graph)
    }

    pub fn match_traj(&self, traj: &[Fix]) -> Result<MatchedPath> {
        self.match_traj_with_cancel(traj, &CancelToken::new())
    }

    /// Most probable sequence of on-road positions for `traj`.
    pub fn match_traj_with_cancel(&self, traj: &[Fix], cancel: &CancelToken) -> Result<MatchedPath> {
        if traj.is_empty() {
            return Err(MatchError::EmptyTrajectory);
        }
        let graph = self.build_candidate_graph(traj, cancel)?;
        let viterbi = Viterbi::run(&graph);
        let points = viterbi
            .decode(&graph)
            .into_iter()
            .map(|id| {
                let candidate = graph.candidate(id).clone();
                let layer = &graph.layers()[candidate.layer];
                MatchedPoint {
                    fix: layer.fix,
                    fix_index: layer.fix_index,
                    candidate,
                }
            })
            .collect::<Vec<_>>();
        let skipped = graph
            .layers()
            .iter()
            .filter(|layer| layer.candidates.is_empty())
            .map(|layer| layer.fix_index)
            .collect::<Vec<_>>();
        info!(
            "match finished: {} of {} gps fixes matched",
            points.len(),
            traj.len()
        );
        Ok(MatchedPath { points, skipped })
    }

    pub fn reconstruct(&self, matched: &MatchedPath) -> Result<Route> {
        PathReconstructer::new(&self.road_graph).reconstruct(matched)
    }

    /// Matches, rebuilds the route and, given a maximum length, removes the
    /// u-turns up to that length.
    pub fn match_and_reconstruct(
        &self,
        traj: &[Fix],
        max_uturn_length: Option<f64>,
    ) -> Result<MMResult> {
        let matched = self.match_traj(traj)?;
        let mut route = self.reconstruct(&matched)?;
        let uturns_removed = match max_uturn_length {
            Some(max_length) => UTurnFilter::new(max_length).filter(&mut route),
            None => 0,
        };
        Ok(MMResult {
            matched,
            route,
            uturns_removed,
        })
    }
}
