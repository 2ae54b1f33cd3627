use super::model::{MatchedPath, MatchedPoint};
use super::route::Route;
use crate::algorithm::{self, EPS_LENGTH};
use crate::error::{MatchError, Result};
use crate::graph::{ConnectionGeometry, GeometryId, RoadGraph};
use geo::Point;
use log::{debug, warn};

/// Turns a matched point sequence into explicit route geometry.
pub struct PathReconstructer<'a> {
    graph: &'a RoadGraph,
}

// Route being written, with the node it currently ends at.
struct RouteBuilder {
    route: Route,
    current: i64,
    way: Option<usize>,
}

impl RouteBuilder {
    fn new(first: &MatchedPoint) -> Self {
        let mut route = Route::new();
        let current = route.add_node(first.point(), None, Some(first.fix.timestamp));
        RouteBuilder {
            route,
            current,
            way: None,
        }
    }

    // continue the last way when it is on the same road and ends here
    fn open_way(&mut self, way_id: i64) {
        if let Some(index) = self.way {
            let way = &self.route.ways[index];
            if way.way_id == way_id && way.nodes.last() == Some(&self.current) {
                return;
            }
        }
        let index = self.route.add_way(way_id);
        self.route.ways[index].nodes.push(self.current);
        self.way = Some(index);
    }

    fn push(&mut self, point: Point<f64>, node_id: Option<i64>, time: Option<u64>) {
        let id = self.route.add_node(point, node_id, time);
        if let Some(index) = self.way {
            self.route.ways[index].nodes.push(id);
        }
        self.current = id;
    }

    /// Starts over at `point`, unconnected to what came before.
    fn restart(&mut self, point: Point<f64>, time: Option<u64>) {
        self.way = None;
        self.current = self.route.add_node(point, None, time);
    }

    /// Emits the vertices of `geometry` strictly between two points on it.
    fn follow(
        &mut self,
        geometry: &ConnectionGeometry,
        from: &Point<f64>,
        to: &Point<f64>,
    ) -> Result<()> {
        let start = locate(geometry, from)?;
        let end = locate(geometry, to)?;
        self.open_way(geometry.way_id);
        for index in algorithm::vertices_between(start, end, &geometry.line) {
            let vertex = geometry.vertex(index);
            self.push(vertex.point, vertex.node_id, None);
        }
        Ok(())
    }
}

fn locate(geometry: &ConnectionGeometry, point: &Point<f64>) -> Result<f64> {
    algorithm::locate(point, &geometry.line).ok_or(MatchError::PathNotFoundOnGeometry {
        way_id: geometry.way_id,
        lon: point.x(),
        lat: point.y(),
    })
}

impl<'a> PathReconstructer<'a> {
    pub fn new(graph: &'a RoadGraph) -> Self {
        PathReconstructer { graph }
    }

    pub fn reconstruct(&self, matched: &MatchedPath) -> Result<Route> {
        let Some(first) = matched.points.first() else {
            return Ok(Route::new());
        };
        let mut builder = RouteBuilder::new(first);
        for pair in matched.points.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let (from, to) = (prev.point(), next.point());
            if algorithm::distance(&from, &to) < EPS_LENGTH {
                continue;
            }
            let time = Some(next.fix.timestamp);
            if let Some(road) = self.shared_road(prev, next) {
                builder.follow(self.graph.geometry(road), &from, &to)?;
                builder.push(to, None, time);
                continue;
            }

            let path = self.graph.find_path(&prev.road_point(), &next.road_point());
            if !path.is_reachable() {
                warn!(
                    "no path from fix {} to fix {}, route broken",
                    prev.fix_index, next.fix_index
                );
                builder.restart(to, time);
                continue;
            }
            let segments: Vec<_> = path
                .segments
                .iter()
                .filter(|segment| segment.length >= EPS_LENGTH)
                .collect();
            let Some((last, inner)) = segments.split_last() else {
                builder.push(to, None, time);
                continue;
            };
            for segment in inner {
                let geometry = self.graph.geometry(segment.geometry);
                builder.follow(geometry, &segment.from.point, &segment.to.point)?;
                builder.push(segment.to.point, segment.to.node_id, None);
            }
            let geometry = self.graph.geometry(last.geometry);
            builder.follow(geometry, &last.from.point, &to)?;
            builder.push(to, None, time);
        }
        debug!(
            "reconstructed route: {} nodes, {} ways",
            builder.route.nodes.len(),
            builder.route.ways.len()
        );
        Ok(builder.route)
    }

    // the geometry both points lie on, if any
    fn shared_road(&self, prev: &MatchedPoint, next: &MatchedPoint) -> Option<GeometryId> {
        let (from, to) = (prev.candidate.road, next.candidate.road);
        if from == to {
            return Some(from);
        }
        if algorithm::distance_to_line(&next.point(), &self.graph.geometry(from).line) < EPS_LENGTH
        {
            return Some(from);
        }
        if algorithm::distance_to_line(&prev.point(), &self.graph.geometry(to).line) < EPS_LENGTH {
            return Some(to);
        }
        None
    }
}

// test
#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{self, matched_on};

    fn path(points: Vec<MatchedPoint>) -> MatchedPath {
        MatchedPath {
            points,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn same_road_reproduces_geometry() {
        let graph = RoadGraph::build(&testutil::bent_road()).unwrap();
        let matched = path(vec![
            matched_on(&graph, 30, 0.0, 0.0005, 0),
            matched_on(&graph, 30, 0.001, 0.0015, 1),
        ]);
        let route = PathReconstructer::new(&graph).reconstruct(&matched).unwrap();

        assert_eq!(route.ways.len(), 1);
        let way = &route.ways[0];
        assert_eq!(way.way_id, 30);
        let node_ids: Vec<Option<i64>> = way
            .nodes
            .iter()
            .map(|id| route.nodes[id].node_id)
            .collect();
        assert_eq!(node_ids, vec![None, Some(2), Some(3), None]);
        let times: Vec<Option<u64>> = way.nodes.iter().map(|id| route.nodes[id].time).collect();
        assert_eq!(times, vec![Some(0), None, None, Some(1)]);
        let points = route.way_points(way);
        assert_eq!(points[1], Point::new(0.0, 0.001));
        assert_eq!(points[2], Point::new(0.001, 0.001));
    }

    #[test]
    fn reverse_direction_on_same_road() {
        let graph = RoadGraph::build(&testutil::bent_road()).unwrap();
        let matched = path(vec![
            matched_on(&graph, 30, 0.001, 0.0015, 0),
            matched_on(&graph, 30, 0.0, 0.0005, 1),
        ]);
        let route = PathReconstructer::new(&graph).reconstruct(&matched).unwrap();
        let node_ids: Vec<Option<i64>> = route.ways[0]
            .nodes
            .iter()
            .map(|id| route.nodes[id].node_id)
            .collect();
        assert_eq!(node_ids, vec![None, Some(3), Some(2), None]);
    }

    #[test]
    fn crossing_roads_splits_ways() {
        let graph = RoadGraph::build(&testutil::triangle()).unwrap();
        let matched = path(vec![
            matched_on(&graph, 10, 0.0, 0.0005, 0),
            matched_on(&graph, 11, 0.0005, 0.001, 1),
        ]);
        let route = PathReconstructer::new(&graph).reconstruct(&matched).unwrap();

        let way_ids: Vec<i64> = route.ways.iter().map(|w| w.way_id).collect();
        assert_eq!(way_ids, vec![10, 11]);
        let junction = route.ways[0].nodes[1];
        assert_eq!(route.nodes[&junction].node_id, Some(2));
        assert_eq!(route.ways[1].nodes[0], junction);
        assert_eq!(route.ways[1].nodes.len(), 2);
        assert_eq!(route.ways[1].order, 2);
    }

    #[test]
    fn one_road_stays_one_way() {
        let graph = RoadGraph::build(&testutil::straight_road()).unwrap();
        let matched = path(vec![
            matched_on(&graph, 1, 0.0, 0.0002, 0),
            matched_on(&graph, 1, 0.0, 0.0002, 1),
            matched_on(&graph, 1, 0.0, 0.0012, 2),
            matched_on(&graph, 1, 0.0, 0.0018, 3),
        ]);
        let route = PathReconstructer::new(&graph).reconstruct(&matched).unwrap();
        assert_eq!(route.ways.len(), 1);
        // the coincident fix shares the first node
        assert_eq!(route.ways[0].nodes.len(), 4);
        assert_eq!(route.nodes.len(), 4);
    }

    #[test]
    fn unreachable_pair_breaks_route() {
        let graph = RoadGraph::build(&testutil::triangle()).unwrap();
        let matched = path(vec![
            matched_on(&graph, 10, 0.0, 0.0002, 0),
            matched_on(&graph, 10, 0.0, 0.0008, 1),
            matched_on(&graph, 13, 0.01, 0.0102, 2),
            matched_on(&graph, 13, 0.01, 0.0108, 3),
        ]);
        let route = PathReconstructer::new(&graph).reconstruct(&matched).unwrap();
        assert_eq!(route.ways.len(), 2);
        assert_eq!(route.ways[0].way_id, 10);
        assert_eq!(route.ways[1].way_id, 13);
        assert_ne!(
            route.ways[0].nodes.last(),
            route.ways[1].nodes.first()
        );
    }

    #[test]
    fn point_off_its_road_is_fatal() {
        let graph = RoadGraph::build(&testutil::bent_road()).unwrap();
        let mut stray = matched_on(&graph, 30, 0.0, 0.0005, 0);
        // about 11 m east of the road it claims
        stray.candidate.point = Point::new(0.0001, 0.0005);
        let matched = path(vec![stray, matched_on(&graph, 30, 0.001, 0.0015, 1)]);
        match PathReconstructer::new(&graph).reconstruct(&matched) {
            Err(MatchError::PathNotFoundOnGeometry { way_id, .. }) => assert_eq!(way_id, 30),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn zero_length_path_keeps_fix_time() {
        let graph = RoadGraph::build(&testutil::triangle()).unwrap();
        let mut prev = matched_on(&graph, 10, 0.0, 0.0005, 0);
        let mut next = matched_on(&graph, 11, 0.0005, 0.001, 1);
        // both offsets at the shared node B, so every path segment is empty
        prev.candidate.offset = graph.geometry(prev.candidate.road).length;
        next.candidate.offset = 0.0;
        let route = PathReconstructer::new(&graph)
            .reconstruct(&path(vec![prev, next]))
            .unwrap();
        let times: Vec<u64> = route.nodes.values().rev().filter_map(|n| n.time).collect();
        assert_eq!(times, vec![0, 1]);
    }

    #[test]
    fn empty_path_gives_empty_route() {
        let graph = RoadGraph::build(&testutil::straight_road()).unwrap();
        let route = PathReconstructer::new(&graph)
            .reconstruct(&MatchedPath::default())
            .unwrap();
        assert!(route.nodes.is_empty());
        assert!(route.ways.is_empty());
    }
}
