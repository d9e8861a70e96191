//! Zone reference data storage.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::warn;

use super::pool::{DbError, DbPool};
use super::records::{NewZone, ZoneRecord};
use crate::models::Zone;
use crate::schema::zones;
use crate::spatial::geometry::{BoundingBox, MultiPolygon};
use crate::with_conn;

impl TryFrom<ZoneRecord> for Zone {
    type Error = String;

    fn try_from(record: ZoneRecord) -> Result<Self, Self::Error> {
        let value: serde_json::Value =
            serde_json::from_str(&record.geometry).map_err(|e| e.to_string())?;
        let geometry = MultiPolygon::from_geojson(&value).map_err(|e| e.to_string())?;
        Ok(Zone {
            code: record.code,
            name: record.name,
            geometry,
            bbox: BoundingBox {
                min_lon: record.min_lon,
                min_lat: record.min_lat,
                max_lon: record.max_lon,
                max_lat: record.max_lat,
            },
        })
    }
}

#[derive(Clone)]
pub struct ZoneRepository {
    pool: DbPool,
}

impl ZoneRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            zones::table.count().get_result(&mut conn).await
        })
    }

    /// Insert zones, ignoring codes already present. Returns rows inserted.
    pub async fn insert_many(&self, items: &[Zone]) -> Result<usize, DbError> {
        let rows: Vec<(i64, String, String, BoundingBox)> = items
            .iter()
            .map(|z| {
                (
                    z.code,
                    z.name.clone(),
                    z.geometry.to_geojson().to_string(),
                    z.bbox,
                )
            })
            .collect();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for (code, name, geometry, bbox) in &rows {
                        inserted += diesel::insert_or_ignore_into(zones::table)
                            .values(&NewZone {
                                code: *code,
                                name,
                                geometry,
                                min_lon: bbox.min_lon,
                                min_lat: bbox.min_lat,
                                max_lon: bbox.max_lon,
                                max_lat: bbox.max_lat,
                            })
                            .execute(conn)
                            .await?;
                    }
                    Ok(inserted)
                })
            })
            .await
        })
    }

    /// All stored zones. Rows with unreadable geometry are skipped.
    pub async fn all(&self) -> Result<Vec<Zone>, DbError> {
        with_conn!(self.pool, conn => {
            let records = zones::table
                .order(zones::code.asc())
                .load::<ZoneRecord>(&mut conn)
                .await?;
            Ok(records
                .into_iter()
                .filter_map(|record| {
                    let code = record.code;
                    match Zone::try_from(record) {
                        Ok(zone) => Some(zone),
                        Err(e) => {
                            warn!("Skipping zone {} with bad geometry: {}", code, e);
                            None
                        }
                    }
                })
                .collect())
        })
    }

    pub async fn get(&self, code: i64) -> Result<Option<Zone>, DbError> {
        with_conn!(self.pool, conn => {
            let record = zones::table
                .find(code)
                .first::<ZoneRecord>(&mut conn)
                .await
                .optional()?;
            Ok(record.and_then(|r| Zone::try_from(r).ok()))
        })
    }
}
