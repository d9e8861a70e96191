//! Cross-source duplicate detection.
//!
//! Candidates are grouped by source and every listing of one source is
//! scored against every listing of each later source. Pairs scoring at
//! least [`DUPLICATE_THRESHOLD`] are linked newer-to-older. Cost grows with
//! the square of both the source count and the listings per source, which
//! is fine for a few portals and a few thousand active listings each.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::models::Listing;
use crate::repository::{DbContext, DbError};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Points within this distance count as the same address.
const SAME_PLACE_M: f64 = 50.0;
const AREA_TOLERANCE: f64 = 1.05;
const PRICE_TOLERANCE: f64 = 1.10;
pub const DUPLICATE_THRESHOLD: u8 = 5;

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Larger over smaller value is within `tolerance`. Both must be positive.
fn within_ratio(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => a.max(b) / a.min(b) <= tolerance,
        _ => false,
    }
}

/// Similarity of two listings, 0..=6.
pub fn similarity_score(a: &Listing, b: &Listing) -> u8 {
    let mut score = 0;

    if let (Some((lat_a, lon_a)), Some((lat_b, lon_b))) = (a.coordinates(), b.coordinates()) {
        if haversine_m(lat_a, lon_a, lat_b, lon_b) <= SAME_PLACE_M {
            score += 2;
        }
    }
    if matches!((&a.layout, &b.layout), (Some(x), Some(y)) if x == y) {
        score += 1;
    }
    if within_ratio(a.area_m2, b.area_m2, AREA_TOLERANCE) {
        score += 1;
    }
    if within_ratio(a.price, b.price, PRICE_TOLERANCE) {
        score += 1;
    }
    if a.property_kind == b.property_kind && a.transaction_kind == b.transaction_kind {
        score += 1;
    }
    score
}

/// Links to create as (duplicate id, canonical id).
///
/// `candidates` must be active, unlinked and ordered by first_seen. A
/// listing linked during this pass is neither linked again nor used as a
/// canonical target. When a canonical target turns out to duplicate an
/// older listing, its dependents move to that listing, so links never chain.
pub fn find_duplicates(candidates: &[Listing]) -> Vec<(i32, i32)> {
    let mut by_source: BTreeMap<&str, Vec<&Listing>> = BTreeMap::new();
    for listing in candidates {
        by_source.entry(listing.source.as_str()).or_default().push(listing);
    }
    let groups: Vec<&Vec<&Listing>> = by_source.values().collect();

    let mut linked: HashSet<i32> = HashSet::new();
    let mut canonical: HashSet<i32> = HashSet::new();
    let mut links = Vec::new();

    for (i, group_a) in groups.iter().enumerate() {
        for group_b in &groups[i + 1..] {
            for a in group_a.iter() {
                for b in group_b.iter() {
                    if linked.contains(&a.id) {
                        break;
                    }
                    if linked.contains(&b.id) {
                        continue;
                    }
                    if similarity_score(a, b) < DUPLICATE_THRESHOLD {
                        continue;
                    }
                    let (older, newer) = if a.first_seen <= b.first_seen {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    if canonical.remove(&newer.id) {
                        for link in links.iter_mut() {
                            if link.1 == newer.id {
                                link.1 = older.id;
                            }
                        }
                    }
                    linked.insert(newer.id);
                    canonical.insert(older.id);
                    links.push((newer.id, older.id));
                }
            }
        }
    }
    links
}

/// Runs dedup passes against the store, one at a time.
#[derive(Clone)]
pub struct DedupEngine {
    ctx: DbContext,
    lock: Arc<Mutex<()>>,
}

impl DedupEngine {
    pub fn new(ctx: DbContext) -> Self {
        Self {
            ctx,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// One pass. Concurrent callers wait for the running pass to finish.
    /// Returns the number of new links.
    pub async fn run(&self) -> Result<usize, DbError> {
        let _guard = self.lock.lock().await;

        let listings = self.ctx.listings();
        let candidates = listings.dedup_candidates().await?;
        let links = find_duplicates(&candidates);
        let linked = listings.link_duplicates(&links).await?;

        if linked > 0 {
            info!("Deduplication: linked {} duplicates", linked);
        } else {
            info!("Deduplication: no new duplicates found");
        }
        Ok(linked)
    }
}
