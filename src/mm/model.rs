use super::route::Route;
use super::traj::Fix;
use crate::graph::{GeometryId, RoadPoint};
use geo::Point;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/**
 * Structures shared by the matching stages.
 * */

/// Index of a candidate inside its `CandidateGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub usize);

/// Projection of one gps fix onto one road geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePoint {
    pub point: Point<f64>, // projected position
    pub road: GeometryId,
    pub way_id: i64,
    pub distance: f64,    // meters from the fix
    pub offset: f64,      // meters along the road geometry
    pub observation: f64, // observation probability
    pub layer: usize,
}

impl CandidatePoint {
    pub fn road_point(&self) -> RoadPoint {
        RoadPoint {
            road: self.road,
            offset: self.offset,
            point: self.point,
        }
    }
}

/// A candidate chosen by the matcher, with the fix it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPoint {
    pub candidate: CandidatePoint,
    pub fix: Fix,
    pub fix_index: usize,
}

impl MatchedPoint {
    pub fn point(&self) -> Point<f64> {
        self.candidate.point
    }

    pub fn road_point(&self) -> RoadPoint {
        self.candidate.road_point()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedPath {
    pub points: Vec<MatchedPoint>,
    /// fixes without any candidate, left out of `points`
    pub skipped: Vec<usize>,
}

/// What to do with a fix that has no road nearby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Drop the fix and decode the parts before and after it independently.
    #[default]
    Split,
    /// Abort matching with `MatchError::NoCandidates`.
    Fail,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_candidates: usize,
    pub sigma: f64, // observation model standard deviation, meters
    pub search_margin_lat: f64, // degrees
    pub search_margin_lon: f64, // degrees
    pub gap_policy: GapPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_candidates: 5,
            sigma: 20.0,
            search_margin_lat: 0.0007,
            search_margin_lon: 0.0011,
            gap_policy: GapPolicy::Split,
        }
    }
}

/// Shared flag checked between units of parallel work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct MMResult {
    pub matched: MatchedPath,
    pub route: Route,
    pub uturns_removed: usize,
}
