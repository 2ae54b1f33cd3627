use thiserror::Error;

/// Errors raised while building the road graph or matching a trace.
///
/// Unreachable destinations are not errors: the pathfinder reports them as an
/// infinite path and matching carries on.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("point ({lon}, {lat}) does not lie on the geometry of way {way_id}")]
    PathNotFoundOnGeometry { way_id: i64, lon: f64, lat: f64 },

    #[error("way {way_id} is missing tag `{tag}`")]
    MissingTag { way_id: i64, tag: &'static str },

    #[error("way {way_id} has malformed tag `{tag}`: {value:?}")]
    MalformedTag {
        way_id: i64,
        tag: &'static str,
        value: String,
    },

    #[error("way {way_id} references unknown node {node_id}")]
    UnknownNode { way_id: i64, node_id: i64 },

    #[error("way {way_id} has fewer than two nodes")]
    DegenerateWay { way_id: i64 },

    #[error("trajectory is empty")]
    EmptyTrajectory,

    #[error("no candidate found for gps fix {index}")]
    NoCandidates { index: usize },

    #[error("matching cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MatchError>;
