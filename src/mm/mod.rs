pub mod candidate;
pub mod model;
pub mod reconstruct;
pub mod route;
pub mod stmatch;
pub mod traj;
pub mod uturn;
pub mod viterbi;

pub use candidate::{CandidateGraph, CandidateGraphLayer, CandidatesConnection};
pub use model::*;
pub use reconstruct::PathReconstructer;
pub use route::{Route, RouteNode, RouteWay};
pub use stmatch::MMatch;
pub use traj::{Fix, MultiTrajectory, Trajectory};
pub use uturn::{filter_uturns, UTurnFilter};
pub use viterbi::Viterbi;
