use anyhow::{anyhow, bail};
use geo::Point;
use geojson::{GeoJson, JsonObject, Value};
use log::info;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// One timestamped gps position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub point: Point<f64>,
    pub timestamp: u64, // seconds
}

impl Fix {
    pub fn new(lon: f64, lat: f64, timestamp: u64) -> Self {
        Fix {
            point: Point::new(lon, lat),
            timestamp,
        }
    }
}

pub type Trajectory = Vec<Fix>;

pub struct MultiTrajectory {
    pub trajs: Vec<Trajectory>,
}

impl MultiTrajectory {
    /// Reads a `.geojson`/`.json` or `.wkt` trace file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| anyhow!("gps file {} has no extension", path.display()))?;
        match ext {
            "geojson" | "json" => {
                info!("read geojson file {} ", path.display());
                let reader = BufReader::new(File::open(path)?);
                let geojson = GeoJson::from_reader(reader)?;
                MultiTrajectory::try_from(geojson)
            }
            "wkt" => {
                info!("read wkt file {} ", path.display());
                let content = fs::read_to_string(path)?;
                let wkt: wkt::Wkt<f64> = content
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("read gps traj failed: {}", e))?;
                MultiTrajectory::try_from(wkt)
            }
            other => bail!("gps file format {} not support", other),
        }
    }
}

// positions -> fixes, timestamps from `times` when present, else the index
fn build_trajectory(
    positions: Vec<Vec<f64>>,
    properties: Option<&JsonObject>,
) -> anyhow::Result<Trajectory> {
    let times: Option<Vec<u64>> = match properties.and_then(|p| p.get("times")) {
        Some(value) => {
            let times = value
                .as_array()
                .ok_or_else(|| anyhow!("times property is not an array"))?
                .iter()
                .map(|t| t.as_u64().ok_or_else(|| anyhow!("time {} is not an integer", t)))
                .collect::<anyhow::Result<Vec<u64>>>()?;
            if times.len() != positions.len() {
                bail!(
                    "{} times given for {} positions",
                    times.len(),
                    positions.len()
                );
            }
            Some(times)
        }
        None => None,
    };
    let mut traj = Trajectory::with_capacity(positions.len());
    for (i, position) in positions.into_iter().enumerate() {
        if position.len() < 2 {
            bail!("position {} has no lon/lat", i);
        }
        let timestamp = times.as_ref().map_or(i as u64, |t| t[i]);
        traj.push(Fix::new(position[0], position[1], timestamp));
    }
    Ok(traj)
}

fn geometry_trajectory(
    value: Value,
    properties: Option<&JsonObject>,
) -> anyhow::Result<Trajectory> {
    match value {
        Value::LineString(line) => build_trajectory(line, properties),
        Value::MultiPoint(points) => build_trajectory(points, properties),
        _ => bail!("geometry only support LineString, MultiPoint"),
    }
}

impl TryFrom<GeoJson> for MultiTrajectory {
    type Error = anyhow::Error;
    fn try_from(value: GeoJson) -> Result<Self, Self::Error> {
        let mut trajs = MultiTrajectory { trajs: Vec::new() };
        match value {
            GeoJson::FeatureCollection(fc) => {
                for feature in fc.features {
                    let geometry = feature
                        .geometry
                        .ok_or_else(|| anyhow!("feature has no geometry"))?;
                    trajs.trajs.push(geometry_trajectory(
                        geometry.value,
                        feature.properties.as_ref(),
                    )?);
                }
            }
            GeoJson::Feature(feature) => {
                let geometry = feature
                    .geometry
                    .ok_or_else(|| anyhow!("feature has no geometry"))?;
                trajs.trajs.push(geometry_trajectory(
                    geometry.value,
                    feature.properties.as_ref(),
                )?);
            }
            GeoJson::Geometry(geom) => {
                trajs.trajs.push(geometry_trajectory(geom.value, None)?);
            }
        }
        Ok(trajs)
    }
}

impl TryFrom<wkt::Wkt<f64>> for MultiTrajectory {
    type Error = anyhow::Error;
    fn try_from(value: wkt::Wkt<f64>) -> Result<Self, Self::Error> {
        let positions: Vec<Vec<f64>> = match value.item {
            wkt::Geometry::LineString(line) => {
                line.0.into_iter().map(|c| vec![c.x, c.y]).collect()
            }
            wkt::Geometry::MultiPoint(multi_points) => multi_points
                .0
                .into_iter()
                .map(|point| {
                    point
                        .0
                        .map(|c| vec![c.x, c.y])
                        .ok_or_else(|| anyhow!("empty point in multipoint"))
                })
                .collect::<anyhow::Result<_>>()?,
            _ => bail!("wkt only support LineString, MultiPoint"),
        };
        Ok(MultiTrajectory {
            trajs: vec![build_trajectory(positions, None)?],
        })
    }
}

// test
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn geojson_feature_with_times() {
        let text = r#"{
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.0, 0.001], [0.0, 0.002]]},
            "properties": {"times": [100, 110, 125]}
        }"#;
        let geojson: GeoJson = text.parse().unwrap();
        let trajs = MultiTrajectory::try_from(geojson).unwrap();
        assert_eq!(trajs.trajs.len(), 1);
        assert_eq!(
            trajs.trajs[0],
            vec![
                Fix::new(0.0, 0.0, 100),
                Fix::new(0.0, 0.001, 110),
                Fix::new(0.0, 0.002, 125),
            ]
        );
    }

    #[test]
    fn geojson_collection_defaults_to_index_time() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "MultiPoint", "coordinates": [[1.0, 2.0], [3.0, 4.0]]}, "properties": null},
                {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[5.0, 6.0], [7.0, 8.0]]}, "properties": {}}
            ]
        }"#;
        let geojson: GeoJson = text.parse().unwrap();
        let trajs = MultiTrajectory::try_from(geojson).unwrap();
        assert_eq!(trajs.trajs.len(), 2);
        assert_eq!(trajs.trajs[1][1], Fix::new(7.0, 8.0, 1));
    }

    #[test]
    fn mismatched_times_are_rejected() {
        let text = r#"{
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.0, 0.001]]},
            "properties": {"times": [1]}
        }"#;
        let geojson: GeoJson = text.parse().unwrap();
        assert!(MultiTrajectory::try_from(geojson).is_err());
    }

    #[test]
    fn wkt_linestring() {
        let wkt: wkt::Wkt<f64> = "LINESTRING(0 0, 0 0.001, 0.001 0.001)".parse().unwrap();
        let trajs = MultiTrajectory::try_from(wkt).unwrap();
        assert_eq!(trajs.trajs[0].len(), 3);
        assert_eq!(trajs.trajs[0][2], Fix::new(0.001, 0.001, 2));
    }

    #[test]
    fn wkt_polygon_is_rejected() {
        let wkt: wkt::Wkt<f64> = "POLYGON((0 0, 1 0, 1 1, 0 0))".parse().unwrap();
        assert!(MultiTrajectory::try_from(wkt).is_err());
    }
}
