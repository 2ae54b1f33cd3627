use crate::algorithm;
use geo::Point;
use geojson::{feature, Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::collections::{BTreeMap, HashSet};

/// A node of a reconstructed route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteNode {
    pub id: i64, // synthetic, strictly negative
    pub point: Point<f64>,
    pub node_id: Option<i64>, // map node this vertex came from
    pub time: Option<u64>,    // timestamp of the fix it stands for
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteWay {
    pub id: i64,
    pub way_id: i64, // source road
    pub order: usize, // 1-based position in the route
    pub nodes: Vec<i64>,
}

/// Explicit geometry of a matched trace.
///
/// Every node and way gets a fresh id from one shared counter that starts at
/// -1 and counts down.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: BTreeMap<i64, RouteNode>,
    pub ways: Vec<RouteWay>,
    next_id: i64,
}

impl Default for Route {
    fn default() -> Self {
        Route::new()
    }
}

impl Route {
    pub fn new() -> Self {
        Route {
            nodes: BTreeMap::new(),
            ways: Vec::new(),
            next_id: -1,
        }
    }

    pub(crate) fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id -= 1;
        id
    }

    pub fn add_node(&mut self, point: Point<f64>, node_id: Option<i64>, time: Option<u64>) -> i64 {
        let id = self.next_id();
        self.nodes.insert(
            id,
            RouteNode {
                id,
                point,
                node_id,
                time,
            },
        );
        id
    }

    /// Appends an empty way and returns its index in `ways`.
    pub fn add_way(&mut self, way_id: i64) -> usize {
        let id = self.next_id();
        self.ways.push(RouteWay {
            id,
            way_id,
            order: self.ways.len() + 1,
            nodes: Vec::new(),
        });
        self.ways.len() - 1
    }

    pub fn point(&self, id: i64) -> Option<Point<f64>> {
        self.nodes.get(&id).map(|node| node.point)
    }

    /// The node created first, which stands for the first matched fix.
    pub fn first_node(&self) -> Option<&RouteNode> {
        // ids count down, so the first node has the largest id
        self.nodes.values().next_back()
    }

    pub fn way_points(&self, way: &RouteWay) -> Vec<Point<f64>> {
        way.nodes.iter().filter_map(|id| self.point(*id)).collect()
    }

    /// Total length in meters of all ways.
    pub fn length(&self) -> f64 {
        self.ways
            .iter()
            .map(|way| {
                self.way_points(way)
                    .windows(2)
                    .map(|pair| algorithm::distance(&pair[0], &pair[1]))
                    .sum::<f64>()
            })
            .sum()
    }

    /// Drops nodes no way refers to. The first node always stays.
    pub fn retain_referenced_nodes(&mut self) {
        let mut referenced: HashSet<i64> = self
            .ways
            .iter()
            .flat_map(|way| way.nodes.iter().copied())
            .collect();
        if let Some(first) = self.first_node() {
            referenced.insert(first.id);
        }
        self.nodes.retain(|id, _| referenced.contains(id));
    }

    /// Ways as LineString features, then timestamped nodes as Point features.
    pub fn features(&self) -> Vec<Feature> {
        let mut features = Vec::with_capacity(self.ways.len() + self.nodes.len());
        let mut ways: Vec<&RouteWay> = self.ways.iter().collect();
        ways.sort_by_key(|way| way.order);
        for way in ways {
            let coordinates = self
                .way_points(way)
                .into_iter()
                .map(|p| vec![p.x(), p.y()])
                .collect();
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(way.id));
            properties.insert("way-id".to_string(), JsonValue::from(way.way_id));
            properties.insert("order".to_string(), JsonValue::from(way.order));
            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::LineString(coordinates))),
                id: Some(feature::Id::Number(way.id.into())),
                properties: Some(properties),
                foreign_members: None,
            });
        }
        // fixes in the order they were matched
        for node in self.nodes.values().rev() {
            let Some(time) = node.time else {
                continue;
            };
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(node.id));
            properties.insert("time".to_string(), JsonValue::from(time));
            if let Some(node_id) = node.node_id {
                properties.insert("node-id".to_string(), JsonValue::from(node_id));
            }
            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    node.point.x(),
                    node.point.y(),
                ]))),
                id: Some(feature::Id::Number(node.id.into())),
                properties: Some(properties),
                foreign_members: None,
            });
        }
        features
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features(),
            foreign_members: None,
        }
    }
}

// test
#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Route {
        let mut route = Route::new();
        let a = route.add_node(Point::new(0.0, 0.0), None, Some(10));
        let b = route.add_node(Point::new(0.0, 0.001), Some(2), None);
        let c = route.add_node(Point::new(0.001, 0.001), None, Some(20));
        let first = route.add_way(10);
        route.ways[first].nodes.extend([a, b]);
        let second = route.add_way(11);
        route.ways[second].nodes.extend([b, c]);
        route
    }

    #[test]
    fn ids_are_negative_and_decreasing() {
        let route = sample();
        let node_ids: Vec<i64> = route.nodes.keys().copied().collect();
        assert_eq!(node_ids, vec![-3, -2, -1]);
        assert_eq!(route.ways[0].id, -4);
        assert_eq!(route.ways[1].id, -5);
        assert_eq!(route.ways[0].order, 1);
        assert_eq!(route.ways[1].order, 2);
        assert_eq!(route.first_node().map(|n| n.id), Some(-1));
    }

    #[test]
    fn unreferenced_nodes_are_dropped() {
        let mut route = sample();
        let loose = route.add_node(Point::new(1.0, 1.0), None, None);
        route.ways[1].nodes.pop();
        route.retain_referenced_nodes();
        assert!(!route.nodes.contains_key(&loose));
        assert!(!route.nodes.contains_key(&-3));
        assert!(route.nodes.contains_key(&-1));
    }

    #[test]
    fn first_node_survives_without_ways() {
        let mut route = Route::new();
        route.add_node(Point::new(0.0, 0.0), None, Some(0));
        route.retain_referenced_nodes();
        assert_eq!(route.nodes.len(), 1);
    }

    #[test]
    fn geojson_output() {
        let route = sample();
        let collection = route.to_geojson();
        // two ways, two timestamped nodes
        assert_eq!(collection.features.len(), 4);
        let first = &collection.features[0];
        assert_eq!(first.property("way-id"), Some(&JsonValue::from(10)));
        assert_eq!(first.property("order"), Some(&JsonValue::from(1)));
        let fix = &collection.features[2];
        assert_eq!(fix.property("time"), Some(&JsonValue::from(10)));
        assert!(fix.property("node-id").is_none());
        assert!(route.length() > 222.0);
    }
}
