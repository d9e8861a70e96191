//! Zone reference data.

use serde::{Deserialize, Serialize};

use crate::spatial::geometry::{BoundingBox, MultiPolygon};

/// A named cadastral area with its boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub code: i64,
    pub name: String,
    pub geometry: MultiPolygon,
    pub bbox: BoundingBox,
}

impl Zone {
    /// Whether the point (lon, lat) lies inside this zone.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bbox.contains(lon, lat) && self.geometry.contains(lon, lat)
    }
}
