//! Zones, benchmarks and reference prices.

pub mod benchmarks;
pub mod geometry;
pub mod reference_tables;
pub mod resolver;
pub mod zones;

pub use benchmarks::compute_benchmarks;
pub use resolver::{ReferenceResolver, ReferenceTier, ResolvedPrice};
pub use zones::{assign_zones, load_zones, ZoneDataError, ZoneIndex};

use tracing::error;

use crate::repository::DbContext;

/// Daily job: assign zones, then recompute benchmarks.
///
/// Failures are logged; the next scheduled run retries.
pub async fn run_zone_pipeline(ctx: &DbContext) -> (usize, usize) {
    let assigned = match assign_zones(ctx).await {
        Ok(n) => n,
        Err(e) => {
            error!("Zone assignment failed: {}", e);
            0
        }
    };
    let computed = match compute_benchmarks(ctx).await {
        Ok(n) => n,
        Err(e) => {
            error!("Benchmark computation failed: {}", e);
            0
        }
    };
    (assigned, computed)
}
