use super::route::{Route, RouteWay};
use crate::algorithm::{self, EPS_LENGTH, UTURN_BEARING_TOLERANCE};
use geo::{Line, Point};
use log::debug;
use std::collections::HashSet;

/// Removes short out-and-back excursions from a reconstructed route.
#[derive(Debug, Clone, Copy)]
pub struct UTurnFilter {
    pub max_length: f64, // meters
    pub bearing_tolerance: f64,
}

/// One edge of the flattened route.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: i64,
    end: i64,
    from: Point<f64>,
    to: Point<f64>,
    way: usize, // index of the source way, in route order
}

impl Segment {
    fn length(&self) -> f64 {
        algorithm::distance(&self.from, &self.to)
    }

    fn is_degenerate(&self) -> bool {
        self.length() < EPS_LENGTH
    }

    fn bearing(&self) -> f64 {
        algorithm::bearing(&self.from, &self.to)
    }

    fn distance_to(&self, point: &Point<f64>) -> f64 {
        algorithm::distance_to_segment(point, &Line::new(self.from.0, self.to.0))
    }
}

struct ReturnLeg {
    junction: usize, // window segment the excursion returns onto
    end: i64,
    to: Point<f64>,
    resume: usize, // first segment after the excursion
}

/// Shortcut for `UTurnFilter::new(max_length).filter(route)`.
pub fn filter_uturns(route: &mut Route, max_length: f64) -> usize {
    UTurnFilter::new(max_length).filter(route)
}

impl UTurnFilter {
    pub fn new(max_length: f64) -> Self {
        UTurnFilter {
            max_length,
            bearing_tolerance: UTURN_BEARING_TOLERANCE,
        }
    }

    /// Removes every u-turn no longer than `max_length` and returns how many
    /// were removed. The route is left untouched when nothing is removed.
    pub fn filter(&self, route: &mut Route) -> usize {
        let mut ways: Vec<RouteWay> = route.ways.clone();
        ways.sort_by_key(|way| way.order);
        let mut segments = flatten(route, &ways);

        let mut committed: Vec<Segment> = Vec::new();
        let mut open: Vec<Segment> = Vec::new();
        let mut removed = 0;
        let mut index = 0;
        while index < segments.len() {
            let segment = segments[index];
            if self.is_uturn(&open, &segment) {
                if let Some(leg) = self.find_return_leg(&committed, &open, &segments, index) {
                    debug!(
                        "u-turn between segments {} and {} removed",
                        index,
                        leg.resume - 1
                    );
                    let junction = open[leg.junction];
                    open.truncate(leg.junction);
                    if algorithm::distance(&leg.to, &junction.from) < EPS_LENGTH {
                        segments[leg.resume].start = junction.start;
                        segments[leg.resume].from = junction.from;
                    } else {
                        open.push(Segment {
                            end: leg.end,
                            to: leg.to,
                            ..junction
                        });
                    }
                    removed += 1;
                    index = leg.resume;
                    continue;
                }
            }
            open.push(segment);
            while open.iter().map(Segment::length).sum::<f64>() > self.max_length {
                committed.push(open.remove(0));
            }
            index += 1;
        }

        if removed > 0 {
            committed.extend(open);
            rebuild(route, &ways, &committed);
        }
        removed
    }

    fn is_uturn(&self, open: &[Segment], segment: &Segment) -> bool {
        if segment.is_degenerate() {
            return false;
        }
        open.iter()
            .rev()
            .find(|s| !s.is_degenerate())
            .map_or(false, |last| {
                algorithm::is_opposite(last.bearing(), segment.bearing(), self.bearing_tolerance)
            })
    }

    // the window segment closest to the route end that passes by `point`
    fn closest_open(open: &[Segment], point: &Point<f64>) -> Option<usize> {
        (0..open.len())
            .rev()
            .find(|index| open[*index].distance_to(point) < EPS_LENGTH)
    }

    fn find_return_leg(
        &self,
        committed: &[Segment],
        open: &[Segment],
        segments: &[Segment],
        begin: usize,
    ) -> Option<ReturnLeg> {
        let mut length = 0.0;
        let mut leg: Option<ReturnLeg> = None;
        for index in begin..segments.len() {
            let segment = &segments[index];
            if index > begin {
                let previous = &segments[index - 1];
                if !segment.is_degenerate()
                    && !previous.is_degenerate()
                    && algorithm::is_opposite(
                        previous.bearing(),
                        segment.bearing(),
                        self.bearing_tolerance,
                    )
                {
                    break;
                }
            }
            let Some(junction) = Self::closest_open(open, &segment.to) else {
                break;
            };
            length += segment.length();
            if length > self.max_length {
                return None;
            }
            leg = Some(ReturnLeg {
                junction,
                end: segment.end,
                to: segment.to,
                resume: index + 1,
            });
        }
        let leg = leg?;
        // keep turn-arounds at the end of the route
        if leg.resume >= segments.len() {
            return None;
        }
        // back at the window start: keep the turn if the route goes on
        // retracing what was already committed
        if leg.junction == 0 && algorithm::distance(&leg.to, &open[0].from) < EPS_LENGTH {
            if let Some(last) = committed.last() {
                let next = &segments[leg.resume];
                let retracing = !next.is_degenerate()
                    && !last.is_degenerate()
                    && algorithm::is_opposite(last.bearing(), next.bearing(), self.bearing_tolerance);
                if retracing || last.distance_to(&next.to) < EPS_LENGTH {
                    return None;
                }
            }
        }
        Some(leg)
    }
}

fn flatten(route: &Route, ways: &[RouteWay]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (index, way) in ways.iter().enumerate() {
        for pair in way.nodes.windows(2) {
            let (Some(from), Some(to)) = (route.point(pair[0]), route.point(pair[1])) else {
                continue;
            };
            segments.push(Segment {
                start: pair[0],
                end: pair[1],
                from,
                to,
                way: index,
            });
        }
    }
    segments
}

fn rebuild(route: &mut Route, source: &[RouteWay], segments: &[Segment]) {
    let mut ways: Vec<RouteWay> = Vec::new();
    let mut reused: HashSet<i64> = HashSet::new();
    for segment in segments {
        let way = &source[segment.way];
        if let Some(last) = ways.last_mut() {
            if last.way_id == way.way_id && last.nodes.last() == Some(&segment.start) {
                last.nodes.push(segment.end);
                continue;
            }
        }
        let id = if reused.insert(way.id) {
            way.id
        } else {
            route.next_id()
        };
        ways.push(RouteWay {
            id,
            way_id: way.way_id,
            order: ways.len() + 1,
            nodes: vec![segment.start, segment.end],
        });
    }
    route.ways = ways;
    route.retain_referenced_nodes();
}

// test
#[cfg(test)]
mod test {
    use super::*;

    // builds a route from (way id, points) runs, consecutive runs sharing
    // their junction node
    fn route_of(runs: &[(i64, Vec<(f64, f64)>)]) -> Route {
        let mut route = Route::new();
        let mut last: Option<i64> = None;
        for (way_id, points) in runs {
            let index = route.add_way(*way_id);
            for (position, (lon, lat)) in points.iter().enumerate() {
                let node = match last {
                    Some(node) if position == 0 => node,
                    _ => route.add_node(Point::new(*lon, *lat), None, None),
                };
                route.ways[index].nodes.push(node);
                last = Some(node);
            }
        }
        route
    }

    fn spur(tip_lon: f64, approach_lat: f64) -> Route {
        route_of(
            &[
                (10, vec![(0.0, approach_lat), (0.0, 0.0004)]),
                (20, vec![(0.0, 0.0004), (tip_lon, 0.0004), (0.0, 0.0004)]),
                (10, vec![(0.0, 0.0004), (0.0, 0.0008)]),
            ],
        )
    }

    #[test]
    fn short_spur_is_removed() {
        let mut route = spur(0.00036, 0.0);
        let removed = filter_uturns(&mut route, 100.0);
        assert_eq!(removed, 1);
        assert_eq!(route.ways.len(), 1);
        let way = &route.ways[0];
        assert_eq!(way.way_id, 10);
        assert_eq!(way.order, 1);
        let points = route.way_points(way);
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.0, 0.0004),
                Point::new(0.0, 0.0008)
            ]
        );
        assert_eq!(route.nodes.len(), 3);
    }

    #[test]
    fn leading_uturn_is_removed() {
        let mut route = route_of(&[
            (20, vec![(0.0, 0.0), (0.00036, 0.0), (0.0, 0.0)]),
            (10, vec![(0.0, 0.0), (0.0, 0.0008)]),
        ]);
        let first = route.first_node().map(|node| node.id);
        assert_eq!(filter_uturns(&mut route, 100.0), 1);
        assert_eq!(route.ways.len(), 1);
        assert_eq!(route.ways[0].way_id, 10);
        assert_eq!(route.ways[0].nodes.first().copied(), first);
        assert_eq!(
            route.way_points(&route.ways[0]),
            vec![Point::new(0.0, 0.0), Point::new(0.0, 0.0008)]
        );
        assert_eq!(route.first_node().map(|node| node.id), first);
    }

    #[test]
    fn long_spur_is_kept() {
        let mut route = spur(0.0045, 0.0);
        let before = route.clone();
        assert_eq!(filter_uturns(&mut route, 100.0), 0);
        assert_eq!(route, before);
    }

    #[test]
    fn trailing_uturn_is_kept() {
        let mut route = route_of(
            &[
                (10, vec![(0.0, 0.0), (0.0, 0.0004)]),
                (20, vec![(0.0, 0.0004), (0.00036, 0.0004), (0.0, 0.0004)]),
            ],
        );
        let before = route.clone();
        assert_eq!(filter_uturns(&mut route, 100.0), 0);
        assert_eq!(route, before);
    }

    #[test]
    fn reversal_longer_than_window_is_kept() {
        let out: Vec<(f64, f64)> = (0..=5).map(|k| (0.00027 * k as f64, 0.0004)).collect();
        let back: Vec<(f64, f64)> = out.iter().rev().copied().collect();
        let mut route = route_of(
            &[
                (10, vec![(0.0, 0.0), (0.0, 0.0004)]),
                (20, out),
                (20, back),
                (10, vec![(0.0, 0.0004), (0.0, 0.0008)]),
            ],
        );
        let before = route.clone();
        assert_eq!(filter_uturns(&mut route, 100.0), 0);
        assert_eq!(route, before);
    }

    #[test]
    fn spur_after_long_approach_is_removed() {
        let mut route = spur(0.00036, -0.009);
        assert_eq!(filter_uturns(&mut route, 100.0), 1);
        assert_eq!(route.ways.len(), 1);
        assert_eq!(route.ways[0].nodes.len(), 3);
        assert!(route.first_node().is_some());
    }

    #[test]
    fn straight_route_is_untouched() {
        let mut route = route_of(&[(
            1,
            vec![(0.0, 0.0), (0.0, 0.0004), (0.0, 0.0008), (0.0, 0.0012)],
        )]);
        let before = route.clone();
        assert_eq!(filter_uturns(&mut route, 100.0), 0);
        assert_eq!(route, before);
    }
}
