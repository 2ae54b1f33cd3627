use crate::error::{MatchError, Result};
use anyhow::{anyhow, bail};
use geo::Point;
use geojson::{feature::Id, GeoJson, Value};
use log::{debug, info};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/**
 * @file network.rs
 * Tagged map data the road graph is built from.
 * Tags stay strings here; `RoadAttributes` is the only place that reads them.
 */
#[derive(Debug, Clone, Default)]
pub struct MapData {
    pub nodes: HashMap<i64, Point<f64>>, // map node id -> position
    pub ways: Vec<MapWay>,
}

#[derive(Debug, Clone)]
pub struct MapWay {
    pub id: i64,
    pub nodes: Vec<i64>, // ordered map node ids
    pub tags: HashMap<String, String>,
}

pub const TAG_SPEED: &str = "speed";
pub const TAG_WAY_ID: &str = "way-id";
pub const TAG_ACCESSIBLE: &str = "accessible";
pub const TAG_ACCESSIBLE_REVERSE: &str = "accessible-reverse";

/// Typed attributes of a road, read once from the tags of a way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadAttributes {
    pub way_id: i64,
    pub speed: f64,
    pub accessible: bool,
    pub accessible_reverse: bool,
}

impl MapWay {
    pub fn new(id: i64, nodes: Vec<i64>) -> Self {
        MapWay {
            id,
            nodes,
            tags: HashMap::new(),
        }
    }

    /// A way carrying the routing tags produced by the road tagger.
    pub fn tagged(
        id: i64,
        nodes: Vec<i64>,
        speed: f64,
        accessible: bool,
        accessible_reverse: bool,
    ) -> Self {
        let yes_no = |flag: bool| (if flag { "yes" } else { "no" }).to_string();
        let mut way = MapWay::new(id, nodes);
        way.tags.insert(TAG_SPEED.to_string(), speed.to_string());
        way.tags.insert(TAG_WAY_ID.to_string(), id.to_string());
        way.tags.insert(TAG_ACCESSIBLE.to_string(), yes_no(accessible));
        way.tags
            .insert(TAG_ACCESSIBLE_REVERSE.to_string(), yes_no(accessible_reverse));
        way
    }

    fn tag(&self, key: &'static str) -> Result<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .ok_or(MatchError::MissingTag {
                way_id: self.id,
                tag: key,
            })
    }

    fn malformed(&self, key: &'static str, value: &str) -> MatchError {
        MatchError::MalformedTag {
            way_id: self.id,
            tag: key,
            value: value.to_string(),
        }
    }

    fn flag(&self, key: &'static str) -> Result<bool> {
        match self.tag(key)? {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(self.malformed(key, other)),
        }
    }
}

impl TryFrom<&MapWay> for RoadAttributes {
    type Error = MatchError;
    fn try_from(way: &MapWay) -> Result<Self> {
        let speed = way.tag(TAG_SPEED)?;
        let speed: f64 = speed
            .trim()
            .parse()
            .map_err(|_| way.malformed(TAG_SPEED, speed))?;
        if !speed.is_finite() || speed < 0.0 {
            return Err(way.malformed(TAG_SPEED, &speed.to_string()));
        }
        let way_id = way.tag(TAG_WAY_ID)?;
        let way_id: i64 = way_id
            .trim()
            .parse()
            .map_err(|_| way.malformed(TAG_WAY_ID, way_id))?;
        Ok(RoadAttributes {
            way_id,
            speed,
            accessible: way.flag(TAG_ACCESSIBLE)?,
            accessible_reverse: way.flag(TAG_ACCESSIBLE_REVERSE)?,
        })
    }
}

impl MapData {
    pub fn new() -> Self {
        MapData::default()
    }

    pub fn add_node(&mut self, id: i64, lon: f64, lat: f64) {
        self.nodes.insert(id, Point::new(lon, lat));
    }

    pub fn add_way(&mut self, way: MapWay) {
        self.ways.push(way);
    }

    /// Reads a GeoJSON road network from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!("loading network from: {}", path.display());
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let geojson = GeoJson::from_reader(reader)?;
        let map = MapData::try_from(geojson)?;
        info!(
            "load road network success file: {} ways: {} nodes: {}",
            path.display(),
            map.ways.len(),
            map.nodes.len()
        );
        Ok(map)
    }
}

// tag values may arrive as strings, numbers or booleans
fn tag_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some((if *b { "yes" } else { "no" }).to_string()),
        _ => None,
    }
}

impl TryFrom<GeoJson> for MapData {
    type Error = anyhow::Error;
    fn try_from(value: GeoJson) -> std::result::Result<Self, Self::Error> {
        let feature_collection = match value {
            GeoJson::FeatureCollection(fc) => fc,
            _ => bail!("not a feature collection"),
        };
        let mut map = MapData::new();
        for (index, feature) in feature_collection.features.into_iter().enumerate() {
            let geometry = feature
                .geometry
                .ok_or_else(|| anyhow!("feature {} has no geometry", index))?;
            let coords = match geometry.value {
                Value::LineString(coords) => coords,
                _ => bail!("feature {} geometry is not linestring", index),
            };
            let properties = feature.properties.unwrap_or_default();
            let node_ids = properties
                .get("node-ids")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| anyhow!("feature {} has no node-ids", index))?
                .iter()
                .map(|v| {
                    v.as_i64()
                        .ok_or_else(|| anyhow!("feature {} has a non integer node id", index))
                })
                .collect::<anyhow::Result<Vec<i64>>>()?;
            if node_ids.len() != coords.len() {
                bail!(
                    "feature {} has {} node ids for {} coordinates",
                    index,
                    node_ids.len(),
                    coords.len()
                );
            }
            for (node_id, position) in node_ids.iter().zip(coords.iter()) {
                if position.len() < 2 {
                    bail!("feature {} has a coordinate without lon/lat", index);
                }
                map.add_node(*node_id, position[0], position[1]);
            }
            let tags: HashMap<String, String> = properties
                .iter()
                .filter(|(key, _)| key.as_str() != "node-ids")
                .filter_map(|(key, value)| tag_value(value).map(|v| (key.clone(), v)))
                .collect();
            let id = match &feature.id {
                Some(Id::Number(n)) => n.as_i64(),
                Some(Id::String(s)) => s.parse().ok(),
                None => None,
            }
            .or_else(|| tags.get(TAG_WAY_ID).and_then(|v| v.parse().ok()))
            .unwrap_or(index as i64);
            map.add_way(MapWay {
                id,
                nodes: node_ids,
                tags,
            });
        }
        Ok(map)
    }
}
