//! Diesel row types for database tables.

use diesel::prelude::*;

use crate::schema;

/// Listing row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::listings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ListingRecord {
    pub id: i32,
    pub source: String,
    pub external_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_kind: String,
    pub transaction_kind: String,
    pub layout: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zone_code: Option<i64>,
    pub zone_name: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub images: String,
    pub raw_payload: String,
    pub status: String,
    pub duplicate_of: Option<i32>,
    pub missed_runs: i32,
    pub first_seen: String,
    pub last_seen: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New listing for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::listings)]
pub struct NewListing<'a> {
    pub source: &'a str,
    pub external_id: &'a str,
    pub url: Option<&'a str>,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub property_kind: &'a str,
    pub transaction_kind: &'a str,
    pub layout: Option<&'a str>,
    pub price: Option<f64>,
    pub currency: &'a str,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<&'a str>,
    pub district: Option<&'a str>,
    pub address: Option<&'a str>,
    pub images: &'a str,
    pub raw_payload: &'a str,
    pub status: &'a str,
    pub missed_runs: i32,
    pub first_seen: &'a str,
    pub last_seen: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Mutable listing fields written on conflict. `None` overwrites with NULL.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::listings)]
#[diesel(treat_none_as_null = true)]
pub struct ListingChanges<'a> {
    pub url: Option<&'a str>,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub property_kind: &'a str,
    pub transaction_kind: &'a str,
    pub layout: Option<&'a str>,
    pub price: Option<f64>,
    pub currency: &'a str,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<&'a str>,
    pub district: Option<&'a str>,
    pub address: Option<&'a str>,
    pub images: &'a str,
    pub raw_payload: &'a str,
    pub status: &'a str,
    pub missed_runs: i32,
    pub last_seen: &'a str,
    pub updated_at: &'a str,
}

/// Price snapshot row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::price_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceSnapshotRecord {
    pub id: i32,
    pub listing_id: i32,
    pub price: f64,
    pub price_per_m2: Option<f64>,
    pub recorded_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::price_snapshots)]
pub struct NewPriceSnapshot<'a> {
    pub listing_id: i32,
    pub price: f64,
    pub price_per_m2: Option<f64>,
    pub recorded_at: &'a str,
}

/// Ingestion run row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::ingestion_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngestionRunRecord {
    pub id: i32,
    pub source: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub listings_found: i32,
    pub listings_new: i32,
    pub listings_updated: i32,
    pub error: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::ingestion_runs)]
pub struct NewIngestionRun<'a> {
    pub source: &'a str,
    pub started_at: &'a str,
    pub status: &'a str,
    pub listings_found: i32,
    pub listings_new: i32,
    pub listings_updated: i32,
}

/// Zone row. Geometry is GeoJSON MultiPolygon text.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::zones)]
#[diesel(primary_key(code))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ZoneRecord {
    pub code: i64,
    pub name: String,
    pub geometry: String,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::zones)]
pub struct NewZone<'a> {
    pub code: i64,
    pub name: &'a str,
    pub geometry: &'a str,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// Benchmark row (zone or city scoped).
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::zone_benchmarks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ZoneBenchmarkRecord {
    pub id: i32,
    pub scope: String,
    pub scope_key: String,
    pub label: String,
    pub property_kind: String,
    pub transaction_kind: String,
    pub median_price_m2: f64,
    pub avg_price_m2: f64,
    pub sample_count: i32,
    pub computed_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::zone_benchmarks)]
pub struct NewZoneBenchmark<'a> {
    pub scope: &'a str,
    pub scope_key: &'a str,
    pub label: &'a str,
    pub property_kind: &'a str,
    pub transaction_kind: &'a str,
    pub median_price_m2: f64,
    pub avg_price_m2: f64,
    pub sample_count: i32,
    pub computed_at: &'a str,
}

/// External reference price row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::reference_benchmarks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReferenceBenchmarkRecord {
    pub id: i32,
    pub source: String,
    pub region: String,
    pub property_kind: String,
    pub transaction_kind: String,
    pub price_m2: f64,
    pub period: String,
    pub fetched_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::reference_benchmarks)]
pub struct NewReferenceBenchmark<'a> {
    pub source: &'a str,
    pub region: &'a str,
    pub property_kind: &'a str,
    pub transaction_kind: &'a str,
    pub price_m2: f64,
    pub period: &'a str,
    pub fetched_at: &'a str,
}

/// Subscription filter row. `layouts` is a comma separated list.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::subscription_filters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubscriptionFilterRecord {
    pub id: i32,
    pub owner: String,
    pub name: Option<String>,
    pub property_kind: Option<String>,
    pub transaction_kind: Option<String>,
    pub city: Option<String>,
    pub layouts: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub notify_new: bool,
    pub notify_price_drop: bool,
    pub active: bool,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::subscription_filters)]
pub struct NewSubscriptionFilter<'a> {
    pub owner: &'a str,
    pub name: Option<&'a str>,
    pub property_kind: Option<&'a str>,
    pub transaction_kind: Option<&'a str>,
    pub city: Option<&'a str>,
    pub layouts: Option<&'a str>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub notify_new: bool,
    pub notify_price_drop: bool,
    pub active: bool,
    pub created_at: &'a str,
}

/// Delivery marker row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::delivery_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeliveryRecordRow {
    pub id: i32,
    pub filter_id: i32,
    pub listing_id: i32,
    pub kind: String,
    pub delivered_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::delivery_records)]
pub struct NewDeliveryRecord<'a> {
    pub filter_id: i32,
    pub listing_id: i32,
    pub kind: &'a str,
    pub delivered_at: &'a str,
}

/// Queued event row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::event_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueuedEventRecord {
    pub id: i32,
    pub payload: String,
    pub enqueued_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::event_queue)]
pub struct NewQueuedEvent<'a> {
    pub payload: &'a str,
    pub enqueued_at: &'a str,
}
