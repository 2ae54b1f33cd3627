use crate::algorithm;
use crate::graph::{GeometryId, MapData, MapWay, RoadGraph};
use crate::mm::{CandidatePoint, Fix, MatchedPoint};
use geo::Point;

/// A-B-C triangle plus a detached road.
///
/// ```text
///   B(2) ---- C(3)        way 10: A-B    two-way
///   |        /            way 11: B-C    two-way
///   |       /             way 12: A-D-C  one-way, a long detour through D(100)
///   A(1)   /              way 13: E(5)-F(6), far away and unconnected
///     \   /
///      D(100)
/// ```
pub(crate) fn triangle() -> MapData {
    let mut map = MapData::new();
    map.add_node(1, 0.0, 0.0);
    map.add_node(2, 0.0, 0.001);
    map.add_node(3, 0.001, 0.001);
    map.add_node(100, 0.0015, -0.0005);
    map.add_node(5, 0.01, 0.01);
    map.add_node(6, 0.01, 0.011);
    map.add_way(MapWay::tagged(10, vec![1, 2], 50.0, true, true));
    map.add_way(MapWay::tagged(11, vec![2, 3], 50.0, true, true));
    map.add_way(MapWay::tagged(12, vec![1, 100, 3], 30.0, true, false));
    map.add_way(MapWay::tagged(13, vec![5, 6], 50.0, true, true));
    map
}

/// One straight two-way road running north from the equator, about 222 m.
pub(crate) fn straight_road() -> MapData {
    let mut map = MapData::new();
    map.add_node(1, 0.0, 0.0);
    map.add_node(2, 0.0, 0.001);
    map.add_node(3, 0.0, 0.002);
    map.add_way(MapWay::tagged(1, vec![1, 2, 3], 50.0, true, true));
    map
}

/// A two-way road with two bends: north, east, north again.
pub(crate) fn bent_road() -> MapData {
    let mut map = MapData::new();
    map.add_node(1, 0.0, 0.0);
    map.add_node(2, 0.0, 0.001);
    map.add_node(3, 0.001, 0.001);
    map.add_node(4, 0.001, 0.002);
    map.add_way(MapWay::tagged(30, vec![1, 2, 3, 4], 50.0, true, true));
    map
}

/// Candidate for the projection of (lon, lat) onto the road of `way_id`.
pub(crate) fn candidate_on(graph: &RoadGraph, way_id: i64, lon: f64, lat: f64) -> CandidatePoint {
    let (index, geometry) = graph
        .geometries()
        .iter()
        .enumerate()
        .find(|(_, g)| g.way_id == way_id)
        .unwrap();
    let projection = algorithm::project_point(&Point::new(lon, lat), &geometry.line).unwrap();
    CandidatePoint {
        point: projection.point,
        road: GeometryId(index),
        way_id,
        distance: projection.distance,
        offset: projection.offset,
        observation: 0.01,
        layer: 0,
    }
}

/// Matched point for fix `index`, timestamped with its index.
pub(crate) fn matched_on(
    graph: &RoadGraph,
    way_id: i64,
    lon: f64,
    lat: f64,
    index: usize,
) -> MatchedPoint {
    MatchedPoint {
        candidate: candidate_on(graph, way_id, lon, lat),
        fix: Fix::new(lon, lat, index as u64),
        fix_index: index,
    }
}
