//! Realitytracker - Czech real-estate listing tracker.
//!
//! Ingests listings from portals, links cross-source duplicates, prices them
//! against spatial zones and reference feeds, and notifies subscribers about
//! new listings and price drops.

pub mod config;
pub mod dedup;
pub mod events;
pub mod feeds;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod scrapers;
pub mod spatial;
