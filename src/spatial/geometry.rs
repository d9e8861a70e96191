//! Planar polygon containment over lon/lat coordinates.
//!
//! Zones are small enough (a few km across) that treating degrees as planar
//! coordinates does not change which polygon a point falls into.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("unsupported geometry type: {0}")]
    UnsupportedType(String),
    #[error("malformed geometry: {0}")]
    Malformed(&'static str),
}

/// Axis-aligned bounds used to reject points before the ring test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// One polygon: the first ring is the exterior, any further rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub rings: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let Some((exterior, holes)) = self.rings.split_first() else {
            return false;
        };
        ring_contains(exterior, lon, lat) && !holes.iter().any(|h| ring_contains(h, lon, lat))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiPolygon {
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    /// Build from a GeoJSON geometry object. A plain Polygon is wrapped.
    pub fn from_geojson(geometry: &Value) -> Result<Self, GeometryError> {
        let geom_type = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeometryError::Malformed("missing type"))?;
        let coords = geometry
            .get("coordinates")
            .ok_or(GeometryError::Malformed("missing coordinates"))?;

        let polygons = match geom_type {
            "Polygon" => vec![parse_polygon(coords)?],
            "MultiPolygon" => coords
                .as_array()
                .ok_or(GeometryError::Malformed("coordinates must be an array"))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(GeometryError::UnsupportedType(other.to_string())),
        };

        if polygons.is_empty() {
            return Err(GeometryError::Malformed("no polygons"));
        }
        Ok(Self { polygons })
    }

    pub fn to_geojson(&self) -> Value {
        let coords: Vec<&Vec<Vec<[f64; 2]>>> = self.polygons.iter().map(|p| &p.rings).collect();
        json!({ "type": "MultiPolygon", "coordinates": coords })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        let mut points = self
            .polygons
            .iter()
            .filter_map(|p| p.rings.first())
            .flatten();
        let first = points.next()?;
        let mut bbox = BoundingBox {
            min_lon: first[0],
            min_lat: first[1],
            max_lon: first[0],
            max_lat: first[1],
        };
        for [lon, lat] in points {
            bbox.min_lon = bbox.min_lon.min(*lon);
            bbox.min_lat = bbox.min_lat.min(*lat);
            bbox.max_lon = bbox.max_lon.max(*lon);
            bbox.max_lat = bbox.max_lat.max(*lat);
        }
        Some(bbox)
    }
}

/// Even-odd ray casting. Points exactly on an edge may land on either side.
fn ring_contains(ring: &[[f64; 2]], lon: f64, lat: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn parse_polygon(value: &Value) -> Result<Polygon, GeometryError> {
    let rings = value
        .as_array()
        .ok_or(GeometryError::Malformed("polygon must be an array of rings"))?
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>, _>>()?;
    if rings.is_empty() {
        return Err(GeometryError::Malformed("polygon without rings"));
    }
    Ok(Polygon { rings })
}

fn parse_ring(value: &Value) -> Result<Vec<[f64; 2]>, GeometryError> {
    value
        .as_array()
        .ok_or(GeometryError::Malformed("ring must be an array of positions"))?
        .iter()
        .map(|pos| {
            // Positions may carry a third (altitude) element.
            let lon = pos.get(0).and_then(Value::as_f64);
            let lat = pos.get(1).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok([lon, lat]),
                _ => Err(GeometryError::Malformed("position must be [lon, lat]")),
            }
        })
        .collect()
}
