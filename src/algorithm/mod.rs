use geo::algorithm::haversine_distance::HaversineDistance;
use geo::{Bearing, Closest, ClosestPoint, Line, LineString, Point};

/// Lengths below this many meters are treated as zero.
pub const EPS_LENGTH: f64 = 0.01;

/// Slack in degrees when deciding that two bearings are exactly opposite.
pub const UTURN_BEARING_TOLERANCE: f64 = 0.01;

/// Great-circle distance in meters.
pub fn distance(a: &Point<f64>, b: &Point<f64>) -> f64 {
    a.haversine_distance(b)
}

/// Haversine length of a linestring in meters.
pub fn linestring_distance(line: &LineString<f64>) -> f64 {
    line.lines().map(|segment| segment_length(&segment)).sum()
}

pub fn segment_length(segment: &Line<f64>) -> f64 {
    segment.start_point().haversine_distance(&segment.end_point())
}

/// Closest point of `segment` to `point`, computed in coordinate space.
pub fn project_on_segment(point: &Point<f64>, segment: &Line<f64>) -> Point<f64> {
    if segment.start == segment.end {
        return segment.start_point();
    }
    match segment.closest_point(point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        Closest::Indeterminate => segment.start_point(),
    }
}

pub fn distance_to_segment(point: &Point<f64>, segment: &Line<f64>) -> f64 {
    distance(point, &project_on_segment(point, segment))
}

/// Result of projecting a point onto a linestring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Point<f64>,
    /// meters between the original and the projected point
    pub distance: f64,
    /// meters from the first vertex to the projected point, along the line
    pub offset: f64,
}

/// Projects `point` onto the closest segment of `line`.
///
/// Returns `None` for lines without a single segment.
pub fn project_point(point: &Point<f64>, line: &LineString<f64>) -> Option<Projection> {
    let mut best: Option<Projection> = None;
    let mut walked = 0.0;
    for segment in line.lines() {
        let projected = project_on_segment(point, &segment);
        let dist = distance(point, &projected);
        if best.map_or(true, |b| dist < b.distance) {
            best = Some(Projection {
                point: projected,
                distance: dist,
                offset: walked + distance(&segment.start_point(), &projected),
            });
        }
        walked += segment_length(&segment);
    }
    best
}

pub fn distance_to_line(point: &Point<f64>, line: &LineString<f64>) -> f64 {
    project_point(point, line).map_or(f64::INFINITY, |p| p.distance)
}

/// Offset along `line` of the first segment passing within `EPS_LENGTH` of `point`.
pub fn locate(point: &Point<f64>, line: &LineString<f64>) -> Option<f64> {
    let mut walked = 0.0;
    for segment in line.lines() {
        if distance_to_segment(point, &segment) < EPS_LENGTH {
            return Some(walked + distance(&segment.start_point(), point));
        }
        walked += segment_length(&segment);
    }
    None
}

/// Length of the path between two points lying on `line`, measured along it.
///
/// The order of `from` and `to` along the line does not matter.
pub fn path_length(from: &Point<f64>, to: &Point<f64>, line: &LineString<f64>) -> Option<f64> {
    let start = locate(from, line)?;
    let end = locate(to, line)?;
    Some((end - start).abs())
}

/// Offset of every vertex of `line`.
pub fn vertex_offsets(line: &LineString<f64>) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(line.0.len());
    let mut walked = 0.0;
    for (index, segment) in line.lines().enumerate() {
        if index == 0 {
            offsets.push(0.0);
        }
        walked += segment_length(&segment);
        offsets.push(walked);
    }
    offsets
}

/// Indices of the vertices of `line` lying strictly between two offsets,
/// ordered from `start` to `end`.
pub fn vertices_between(start: f64, end: f64, line: &LineString<f64>) -> Vec<usize> {
    let low = start.min(end) + EPS_LENGTH;
    let high = start.max(end) - EPS_LENGTH;
    let mut indices: Vec<usize> = vertex_offsets(line)
        .into_iter()
        .enumerate()
        .filter(|(_, offset)| *offset > low && *offset < high)
        .map(|(index, _)| index)
        .collect();
    if start > end {
        indices.reverse();
    }
    indices
}

/// Initial great-circle bearing from `from` to `to`, in degrees.
pub fn bearing(from: &Point<f64>, to: &Point<f64>) -> f64 {
    from.bearing(*to)
}

pub fn is_opposite(first: f64, second: f64, tolerance: f64) -> bool {
    ((first - second).abs() - 180.0).abs() < tolerance
}
