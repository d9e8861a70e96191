//! Zone dataset loading and point-in-polygon assignment.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::geometry::MultiPolygon;
use crate::models::Zone;
use crate::repository::{DbContext, DbError};

/// Prague cadastral areas shipped with the binary.
pub const BUNDLED_ZONES: &str = include_str!("../../data/prague_zones.geojson");

const CODE_KEYS: &[&str] = &["ku_kod", "KOD", "kod", "KOD_KU", "KU_KOD", "OBJECTID"];
const NAME_KEYS: &[&str] = &["ku_nazev", "NAZEV", "nazev", "NAZEV_KU", "KU_NAZEV", "name"];

#[derive(Debug, Error)]
pub enum ZoneDataError {
    #[error("failed to read zone file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON has no features")]
    NoFeatures,
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

fn property_code(props: &Value) -> Option<i64> {
    CODE_KEYS.iter().find_map(|key| match props.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn property_name(props: &Value) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| props.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Parse a FeatureCollection into zones.
///
/// Features without a code or with unreadable geometry are skipped.
pub fn parse_zones(geojson: &str) -> Result<Vec<Zone>, ZoneDataError> {
    let collection: Value = serde_json::from_str(geojson)?;
    let features = collection
        .get("features")
        .and_then(Value::as_array)
        .filter(|f| !f.is_empty())
        .ok_or(ZoneDataError::NoFeatures)?;

    let mut zones = Vec::with_capacity(features.len());
    for feature in features {
        let props = feature.get("properties").unwrap_or(&Value::Null);
        let Some(code) = property_code(props) else {
            continue;
        };
        let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) else {
            continue;
        };
        let name = property_name(props);

        let geometry = match MultiPolygon::from_geojson(geometry) {
            Ok(g) => g,
            Err(e) => {
                warn!("Skipping zone {} ({}): {}", code, name, e);
                continue;
            }
        };
        let Some(bbox) = geometry.bbox() else {
            continue;
        };
        zones.push(Zone {
            code,
            name,
            geometry,
            bbox,
        });
    }
    Ok(zones)
}

/// Load zones into the store. Codes already present are left untouched.
///
/// Reads `path` when given, otherwise the bundled dataset. Returns the
/// number of newly inserted zones.
pub async fn load_zones(ctx: &DbContext, path: Option<&Path>) -> Result<usize, ZoneDataError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => BUNDLED_ZONES.to_string(),
    };
    let zones = parse_zones(&raw)?;
    let inserted = ctx.zones().insert_many(&zones).await?;
    info!("Loaded {} of {} zones", inserted, zones.len());
    Ok(inserted)
}

/// In-memory zone lookup.
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub async fn from_store(ctx: &DbContext) -> Result<Self, DbError> {
        Ok(Self::new(ctx.zones().all().await?))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone containing (lon, lat); lowest code wins on overlap.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&Zone> {
        self.zones.iter().find(|z| z.contains(lon, lat))
    }
}

/// Give every zone-less listing with coordinates its containing zone.
///
/// Points outside every zone stay unassigned. Returns the number assigned.
pub async fn assign_zones(ctx: &DbContext) -> Result<usize, DbError> {
    let index = ZoneIndex::from_store(ctx).await?;
    if index.is_empty() {
        warn!("No zones loaded, skipping zone assignment");
        return Ok(0);
    }

    let listings = ctx.listings();
    let pending = listings.unzoned_with_coordinates().await?;
    let assignments: Vec<(i32, i64, String)> = pending
        .into_iter()
        .filter_map(|(id, lat, lon)| {
            index
                .locate(lon, lat)
                .map(|zone| (id, zone.code, zone.name.clone()))
        })
        .collect();

    let assigned = listings.assign_zones(&assignments).await?;
    if assigned > 0 {
        info!("Assigned zones to {} listings", assigned);
    }
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dataset_parses() {
        let zones = parse_zones(BUNDLED_ZONES).unwrap();
        assert!(zones.len() >= 10);
        let codes: std::collections::HashSet<i64> = zones.iter().map(|z| z.code).collect();
        assert_eq!(codes.len(), zones.len());
    }

    #[test]
    fn test_locate_respects_holes() {
        let index = ZoneIndex::new(parse_zones(BUNDLED_ZONES).unwrap());
        assert_eq!(index.locate(14.419, 50.0915).unwrap().name, "Josefov");
        assert_eq!(index.locate(14.412, 50.085).unwrap().name, "Staré Město");
        assert_eq!(index.locate(14.4378, 50.0755).unwrap().name, "Nové Město");
        assert_eq!(index.locate(14.458, 50.075).unwrap().name, "Vinohrady");
        assert!(index.locate(16.6068, 49.1951).is_none());
    }

    #[test]
    fn test_property_key_fallbacks() {
        let raw = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"KU_KOD":"123","name":"A"},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type":"Feature","properties":{"nazev":"no code"},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type":"Feature","properties":{"kod":5},"geometry":{"type":"Point","coordinates":[0,0]}}
        ]}"#;
        let zones = parse_zones(raw).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].code, 123);
        assert_eq!(zones[0].name, "A");
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        assert!(matches!(
            parse_zones(r#"{"type":"FeatureCollection","features":[]}"#),
            Err(ZoneDataError::NoFeatures)
        ));
    }
}
