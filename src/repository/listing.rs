//! Listing repository: upsert, staleness sweep, and the read paths used by
//! dedup, zone assignment and benchmark aggregation.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{
    ListingChanges, ListingRecord, NewListing, NewPriceSnapshot, PriceSnapshotRecord,
};
use super::{format_datetime, parse_datetime};
use crate::models::{
    price_per_m2, Listing, ListingStatus, NormalizedListing, PriceSnapshot, PropertyKind,
    TransactionKind,
};
use crate::schema::{listings, price_snapshots};
use crate::with_conn;

/// Missed cycles after which an active listing is marked removed.
pub const MISSED_RUNS_THRESHOLD: i32 = 3;

impl From<ListingRecord> for Listing {
    fn from(record: ListingRecord) -> Self {
        Listing {
            id: record.id,
            source: record.source,
            external_id: record.external_id,
            url: record.url,
            title: record.title,
            description: record.description,
            property_kind: PropertyKind::from_str(&record.property_kind)
                .unwrap_or(PropertyKind::Apartment),
            transaction_kind: TransactionKind::from_str(&record.transaction_kind)
                .unwrap_or(TransactionKind::Sale),
            layout: record.layout,
            price: record.price,
            currency: record.currency,
            area_m2: record.area_m2,
            rooms: record.rooms,
            latitude: record.latitude,
            longitude: record.longitude,
            zone_code: record.zone_code,
            zone_name: record.zone_name,
            city: record.city,
            district: record.district,
            address: record.address,
            images: serde_json::from_str(&record.images).unwrap_or_default(),
            raw_payload: serde_json::from_str(&record.raw_payload)
                .unwrap_or(serde_json::Value::Null),
            status: ListingStatus::from_str(&record.status).unwrap_or(ListingStatus::Active),
            duplicate_of: record.duplicate_of,
            missed_runs: record.missed_runs,
            first_seen: parse_datetime(&record.first_seen),
            last_seen: parse_datetime(&record.last_seen),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

impl From<PriceSnapshotRecord> for PriceSnapshot {
    fn from(record: PriceSnapshotRecord) -> Self {
        PriceSnapshot {
            id: record.id,
            listing_id: record.listing_id,
            price: record.price,
            price_per_m2: record.price_per_m2,
            recorded_at: parse_datetime(&record.recorded_at),
        }
    }
}

/// How an upsert changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    /// No row existed for (source, external_id).
    New,
    /// Row existed and both old and new price are present and differ.
    PriceChanged,
    /// Row existed; price unchanged or one side missing.
    Updated,
}

impl UpsertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PriceChanged => "price_changed",
            Self::Updated => "updated",
        }
    }

    /// Classify from the price captured before the write.
    ///
    /// `previous` is `None` when no row existed, `Some(None)` when the row had no price.
    pub fn classify(previous: Option<Option<f64>>, new_price: Option<f64>) -> Self {
        match previous {
            None => Self::New,
            Some(Some(old)) if new_price.is_some_and(|new| new != old) => Self::PriceChanged,
            Some(_) => Self::Updated,
        }
    }
}

/// Result of one listing upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpsertOutcome {
    pub listing_id: i32,
    pub status: UpsertStatus,
    /// Price stored before this upsert, if the row existed and had one.
    pub previous_price: Option<f64>,
}

impl UpsertOutcome {
    /// True when the new price is lower than the previous one.
    pub fn is_price_drop(&self, new_price: Option<f64>) -> bool {
        self.status == UpsertStatus::PriceChanged
            && matches!((self.previous_price, new_price), (Some(old), Some(new)) if new < old)
    }
}

/// Columns the benchmark aggregator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSampleRow {
    pub zone_code: Option<i64>,
    pub zone_name: Option<String>,
    pub city: Option<String>,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub price: f64,
    pub area_m2: f64,
}

#[derive(Clone)]
pub struct ListingRepository {
    pool: DbPool,
}

impl ListingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i32) -> Result<Option<Listing>, DbError> {
        with_conn!(self.pool, conn => {
            listings::table
                .find(id)
                .first::<ListingRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Listing::from))
        })
    }

    pub async fn find_by_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<Listing>, DbError> {
        with_conn!(self.pool, conn => {
            listings::table
                .filter(listings::source.eq(source))
                .filter(listings::external_id.eq(external_id))
                .first::<ListingRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Listing::from))
        })
    }

    /// Insert or update a listing, capturing the prior price first.
    ///
    /// The row is reset to `active` with `missed_runs = 0`. Conflicts on
    /// (source, external_id) merge into the existing row.
    pub async fn upsert(
        &self,
        source: &str,
        record: &NormalizedListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DbError> {
        let source = source.to_string();
        let record = record.clone();
        let now = format_datetime(now);
        let images = serde_json::to_string(&record.images).unwrap_or_else(|_| "[]".to_string());
        let raw_payload =
            serde_json::to_string(&record.raw_payload).unwrap_or_else(|_| "null".to_string());

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let previous: Option<Option<f64>> = listings::table
                        .filter(listings::source.eq(&source))
                        .filter(listings::external_id.eq(&record.external_id))
                        .select(listings::price)
                        .first::<Option<f64>>(conn)
                        .await
                        .optional()?;

                    let new_row = NewListing {
                        source: &source,
                        external_id: &record.external_id,
                        url: record.url.as_deref(),
                        title: record.title.as_deref(),
                        description: record.description.as_deref(),
                        property_kind: record.property_kind.as_str(),
                        transaction_kind: record.transaction_kind.as_str(),
                        layout: record.layout.as_deref(),
                        price: record.price,
                        currency: &record.currency,
                        area_m2: record.area_m2,
                        rooms: record.rooms,
                        latitude: record.latitude,
                        longitude: record.longitude,
                        city: record.city.as_deref(),
                        district: record.district.as_deref(),
                        address: record.address.as_deref(),
                        images: &images,
                        raw_payload: &raw_payload,
                        status: ListingStatus::Active.as_str(),
                        missed_runs: 0,
                        first_seen: &now,
                        last_seen: &now,
                        created_at: &now,
                        updated_at: &now,
                    };
                    let changes = ListingChanges {
                        url: record.url.as_deref(),
                        title: record.title.as_deref(),
                        description: record.description.as_deref(),
                        property_kind: record.property_kind.as_str(),
                        transaction_kind: record.transaction_kind.as_str(),
                        layout: record.layout.as_deref(),
                        price: record.price,
                        currency: &record.currency,
                        area_m2: record.area_m2,
                        rooms: record.rooms,
                        latitude: record.latitude,
                        longitude: record.longitude,
                        city: record.city.as_deref(),
                        district: record.district.as_deref(),
                        address: record.address.as_deref(),
                        images: &images,
                        raw_payload: &raw_payload,
                        status: ListingStatus::Active.as_str(),
                        missed_runs: 0,
                        last_seen: &now,
                        updated_at: &now,
                    };

                    diesel::insert_into(listings::table)
                        .values(&new_row)
                        .on_conflict((listings::source, listings::external_id))
                        .do_update()
                        .set(&changes)
                        .execute(conn)
                        .await?;

                    let listing_id: i32 = listings::table
                        .filter(listings::source.eq(&source))
                        .filter(listings::external_id.eq(&record.external_id))
                        .select(listings::id)
                        .first(conn)
                        .await?;

                    Ok(UpsertOutcome {
                        listing_id,
                        status: UpsertStatus::classify(previous, record.price),
                        previous_price: previous.flatten(),
                    })
                })
            })
            .await
        })
    }

    /// Append a price observation.
    pub async fn append_snapshot(
        &self,
        listing_id: i32,
        price: f64,
        area_m2: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let recorded_at = format_datetime(at);
        with_conn!(self.pool, conn => {
            diesel::insert_into(price_snapshots::table)
                .values(&NewPriceSnapshot {
                    listing_id,
                    price,
                    price_per_m2: price_per_m2(Some(price), area_m2),
                    recorded_at: &recorded_at,
                })
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Price history of a listing, oldest first.
    pub async fn snapshots(&self, listing_id: i32) -> Result<Vec<PriceSnapshot>, DbError> {
        with_conn!(self.pool, conn => {
            price_snapshots::table
                .filter(price_snapshots::listing_id.eq(listing_id))
                .order(price_snapshots::id.asc())
                .load::<PriceSnapshotRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(PriceSnapshot::from).collect())
        })
    }

    /// End-of-cycle staleness sweep for one source.
    ///
    /// Increments `missed_runs` on active listings whose external id was not
    /// observed, then marks every active listing at or over the threshold as
    /// removed. Returns (incremented, removed).
    pub async fn mark_missing(
        &self,
        source: &str,
        seen_external_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(usize, usize), DbError> {
        if seen_external_ids.is_empty() {
            return Ok((0, 0));
        }
        let source = source.to_string();
        let seen = seen_external_ids.to_vec();
        let now = format_datetime(now);

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let incremented = diesel::update(
                        listings::table
                            .filter(listings::source.eq(&source))
                            .filter(listings::status.eq(ListingStatus::Active.as_str()))
                            .filter(listings::external_id.ne_all(&seen)),
                    )
                    .set((
                        listings::missed_runs.eq(listings::missed_runs + 1),
                        listings::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                    let removed = diesel::update(
                        listings::table
                            .filter(listings::source.eq(&source))
                            .filter(listings::status.eq(ListingStatus::Active.as_str()))
                            .filter(listings::missed_runs.ge(MISSED_RUNS_THRESHOLD)),
                    )
                    .set((
                        listings::status.eq(ListingStatus::Removed.as_str()),
                        listings::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                    Ok((incremented, removed))
                })
            })
            .await
        })
    }

    /// Active, non-duplicate listings with coordinates, oldest first.
    pub async fn dedup_candidates(&self) -> Result<Vec<Listing>, DbError> {
        with_conn!(self.pool, conn => {
            listings::table
                .filter(listings::status.eq(ListingStatus::Active.as_str()))
                .filter(listings::duplicate_of.is_null())
                .filter(listings::latitude.is_not_null())
                .filter(listings::longitude.is_not_null())
                .order((listings::first_seen.asc(), listings::id.asc()))
                .load::<ListingRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Listing::from).collect())
        })
    }

    /// Link duplicates to their canonical listing in one transaction.
    ///
    /// Each pair is (duplicate id, canonical id). Rows that already carry a
    /// link are left alone, and so are pairs whose canonical row is itself
    /// linked. Rows pointing at a newly linked duplicate are moved to its
    /// canonical listing so links stay one level deep.
    pub async fn link_duplicates(&self, links: &[(i32, i32)]) -> Result<usize, DbError> {
        if links.is_empty() {
            return Ok(0);
        }
        let links = links.to_vec();
        let now = format_datetime(Utc::now());

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let mut linked = 0;
                    for (duplicate, canonical) in &links {
                        let target: Option<Option<i32>> = listings::table
                            .find(*canonical)
                            .select(listings::duplicate_of)
                            .first::<Option<i32>>(conn)
                            .await
                            .optional()?;
                        if !matches!(target, Some(None)) {
                            continue;
                        }

                        let updated = diesel::update(
                            listings::table
                                .find(*duplicate)
                                .filter(listings::duplicate_of.is_null()),
                        )
                        .set((
                            listings::duplicate_of.eq(Some(*canonical)),
                            listings::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                        if updated == 0 {
                            continue;
                        }

                        diesel::update(
                            listings::table.filter(listings::duplicate_of.eq(*duplicate)),
                        )
                        .set((
                            listings::duplicate_of.eq(Some(*canonical)),
                            listings::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                        linked += updated;
                    }
                    Ok(linked)
                })
            })
            .await
        })
    }

    /// Listings with coordinates but no zone yet.
    pub async fn unzoned_with_coordinates(&self) -> Result<Vec<(i32, f64, f64)>, DbError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<(i32, Option<f64>, Option<f64>)> = listings::table
                .filter(listings::zone_code.is_null())
                .filter(listings::latitude.is_not_null())
                .filter(listings::longitude.is_not_null())
                .select((listings::id, listings::latitude, listings::longitude))
                .load(&mut conn)
                .await?;
            Ok(rows
                .into_iter()
                .filter_map(|(id, lat, lon)| Some((id, lat?, lon?)))
                .collect())
        })
    }

    /// Set zone code and name on a batch of listings.
    ///
    /// Only rows that are still zone-less are touched.
    pub async fn assign_zones(&self, assignments: &[(i32, i64, String)]) -> Result<usize, DbError> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let assignments = assignments.to_vec();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let mut updated = 0;
                    for (id, code, name) in &assignments {
                        updated += diesel::update(
                            listings::table.find(*id).filter(listings::zone_code.is_null()),
                        )
                        .set((
                            listings::zone_code.eq(Some(*code)),
                            listings::zone_name.eq(Some(name)),
                        ))
                        .execute(conn)
                        .await?;
                    }
                    Ok(updated)
                })
            })
            .await
        })
    }

    /// Rows eligible for benchmark aggregation.
    ///
    /// Active, non-duplicate, with positive price and area. The
    /// price-per-area band is applied by the aggregator.
    pub async fn benchmark_samples(&self) -> Result<Vec<BenchmarkSampleRow>, DbError> {
        type Row = (
            Option<i64>,
            Option<String>,
            Option<String>,
            String,
            String,
            Option<f64>,
            Option<f64>,
        );

        with_conn!(self.pool, conn => {
            let rows: Vec<Row> = listings::table
                .filter(listings::status.eq(ListingStatus::Active.as_str()))
                .filter(listings::duplicate_of.is_null())
                .filter(listings::price.gt(0.0))
                .filter(listings::area_m2.gt(0.0))
                .select((
                    listings::zone_code,
                    listings::zone_name,
                    listings::city,
                    listings::property_kind,
                    listings::transaction_kind,
                    listings::price,
                    listings::area_m2,
                ))
                .load(&mut conn)
                .await?;

            Ok(rows
                .into_iter()
                .filter_map(|(zone_code, zone_name, city, pk, tk, price, area)| {
                    Some(BenchmarkSampleRow {
                        zone_code,
                        zone_name,
                        city,
                        property_kind: PropertyKind::from_str(&pk)?,
                        transaction_kind: TransactionKind::from_str(&tk)?,
                        price: price?,
                        area_m2: area?,
                    })
                })
                .collect())
        })
    }

    /// Zone codes of listings whose city equals `city` exactly, most common first.
    pub async fn zone_codes_for_city(&self, city: &str) -> Result<Vec<i64>, DbError> {
        use diesel::dsl::count_star;

        with_conn!(self.pool, conn => {
            let rows: Vec<(Option<i64>, i64)> = listings::table
                .filter(listings::city.eq(city))
                .filter(listings::zone_code.is_not_null())
                .group_by(listings::zone_code)
                .select((listings::zone_code, count_star()))
                .order(count_star().desc())
                .load(&mut conn)
                .await?;
            Ok(rows.into_iter().filter_map(|(code, _)| code).collect())
        })
    }

    pub async fn count_by_status(&self, status: ListingStatus) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            listings::table
                .filter(listings::status.eq(status.as_str()))
                .count()
                .get_result(&mut conn)
                .await
        })
    }

    pub async fn count_duplicates(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            listings::table
                .filter(listings::duplicate_of.is_not_null())
                .count()
                .get_result(&mut conn)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup() -> (ListingRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx.listings(), dir)
    }

    fn record(external_id: &str, price: Option<f64>) -> NormalizedListing {
        let mut r = NormalizedListing::new(
            external_id,
            PropertyKind::Apartment,
            TransactionKind::Sale,
        );
        r.price = price;
        r.area_m2 = Some(50.0);
        r.city = Some("Praha".to_string());
        r
    }

    #[test]
    fn test_classify() {
        assert_eq!(UpsertStatus::classify(None, Some(1.0)), UpsertStatus::New);
        assert_eq!(
            UpsertStatus::classify(Some(Some(1.0)), Some(2.0)),
            UpsertStatus::PriceChanged
        );
        assert_eq!(
            UpsertStatus::classify(Some(Some(1.0)), Some(1.0)),
            UpsertStatus::Updated
        );
        assert_eq!(UpsertStatus::classify(Some(None), Some(1.0)), UpsertStatus::Updated);
        assert_eq!(UpsertStatus::classify(Some(Some(1.0)), None), UpsertStatus::Updated);
    }

    #[tokio::test]
    async fn test_upsert_classifies_and_keeps_first_seen() {
        let (repo, _dir) = setup().await;
        let t0 = Utc::now();

        let first = repo.upsert("a", &record("1", Some(100.0)), t0).await.unwrap();
        assert_eq!(first.status, UpsertStatus::New);
        assert_eq!(first.previous_price, None);

        let later = t0 + Duration::minutes(30);
        let second = repo.upsert("a", &record("1", Some(90.0)), later).await.unwrap();
        assert_eq!(second.status, UpsertStatus::PriceChanged);
        assert_eq!(second.listing_id, first.listing_id);
        assert_eq!(second.previous_price, Some(100.0));
        assert!(second.is_price_drop(Some(90.0)));

        let stored = repo.get(first.listing_id).await.unwrap().unwrap();
        assert_eq!(stored.price, Some(90.0));
        assert_eq!(stored.first_seen, repo_time(t0));
        assert_eq!(stored.last_seen, repo_time(later));
    }

    fn repo_time(t: DateTime<Utc>) -> DateTime<Utc> {
        parse_datetime(&format_datetime(t))
    }

    #[tokio::test]
    async fn test_upsert_clears_fields_set_to_none() {
        let (repo, _dir) = setup().await;
        let mut r = record("1", Some(100.0));
        r.layout = Some("2+kk".to_string());
        let out = repo.upsert("a", &r, Utc::now()).await.unwrap();

        r.layout = None;
        repo.upsert("a", &r, Utc::now()).await.unwrap();
        let stored = repo.get(out.listing_id).await.unwrap().unwrap();
        assert_eq!(stored.layout, None);
    }

    #[tokio::test]
    async fn test_same_external_id_in_two_sources_are_distinct() {
        let (repo, _dir) = setup().await;
        let a = repo.upsert("a", &record("1", None), Utc::now()).await.unwrap();
        let b = repo.upsert("b", &record("1", None), Utc::now()).await.unwrap();
        assert_ne!(a.listing_id, b.listing_id);
        assert_eq!(b.status, UpsertStatus::New);
    }

    #[tokio::test]
    async fn test_mark_missing_only_touches_own_source() {
        let (repo, _dir) = setup().await;
        let now = Utc::now();
        repo.upsert("a", &record("1", None), now).await.unwrap();
        repo.upsert("a", &record("2", None), now).await.unwrap();
        let other = repo.upsert("b", &record("9", None), now).await.unwrap();

        let (incremented, removed) = repo
            .mark_missing("a", &["1".to_string()], now)
            .await
            .unwrap();
        assert_eq!((incremented, removed), (1, 0));

        let missing = repo.find_by_external_id("a", "2").await.unwrap().unwrap();
        assert_eq!(missing.missed_runs, 1);
        let untouched = repo.get(other.listing_id).await.unwrap().unwrap();
        assert_eq!(untouched.missed_runs, 0);
    }

    #[tokio::test]
    async fn test_snapshots_cascade_with_listing() {
        let (repo, _dir) = setup().await;
        let out = repo.upsert("a", &record("1", Some(100.0)), Utc::now()).await.unwrap();
        repo.append_snapshot(out.listing_id, 100.0, Some(50.0), Utc::now())
            .await
            .unwrap();

        let snaps = repo.snapshots(out.listing_id).await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].price_per_m2, Some(2.0));

        let mut conn = repo.pool.get().await.unwrap();
        diesel::delete(listings::table.find(out.listing_id))
            .execute(&mut conn)
            .await
            .unwrap();
        assert!(repo.snapshots(out.listing_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_duplicates_skips_already_linked() {
        let (repo, _dir) = setup().await;
        let now = Utc::now();
        let a = repo.upsert("a", &record("1", None), now).await.unwrap();
        let b = repo.upsert("b", &record("1", None), now).await.unwrap();
        let c = repo.upsert("c", &record("1", None), now).await.unwrap();

        assert_eq!(repo.link_duplicates(&[(b.listing_id, a.listing_id)]).await.unwrap(), 1);
        assert_eq!(repo.link_duplicates(&[(b.listing_id, c.listing_id)]).await.unwrap(), 0);
        let b_row = repo.get(b.listing_id).await.unwrap().unwrap();
        assert_eq!(b_row.duplicate_of, Some(a.listing_id));
        assert_eq!(repo.count_duplicates().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_linking_a_canonical_row_moves_its_dependents() {
        let (repo, _dir) = setup().await;
        let now = Utc::now();
        let a = repo.upsert("a", &record("1", None), now).await.unwrap().listing_id;
        let b = repo.upsert("b", &record("1", None), now).await.unwrap().listing_id;
        let c = repo.upsert("c", &record("1", None), now).await.unwrap().listing_id;

        assert_eq!(repo.link_duplicates(&[(a, b)]).await.unwrap(), 1);
        // b now turns out to be a copy of the older c.
        assert_eq!(repo.link_duplicates(&[(b, c)]).await.unwrap(), 1);

        assert_eq!(repo.get(a).await.unwrap().unwrap().duplicate_of, Some(c));
        assert_eq!(repo.get(b).await.unwrap().unwrap().duplicate_of, Some(c));
        assert_eq!(repo.get(c).await.unwrap().unwrap().duplicate_of, None);

        // A pair whose canonical side is already linked would chain.
        assert_eq!(repo.link_duplicates(&[(c, a)]).await.unwrap(), 0);
        assert_eq!(repo.count_duplicates().await.unwrap(), 2);
    }
}
