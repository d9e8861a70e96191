//! Domain models.

mod benchmark;
mod event;
mod ingestion_run;
mod listing;
mod subscription;
mod zone;

pub use benchmark::{BenchmarkScope, ReferenceBenchmark, ReferencePoint, ZoneBenchmark};
pub use event::{DomainEvent, EventKind};
pub use ingestion_run::{IngestionRun, RunCounts, RunStatus};
pub use listing::{
    Listing, ListingStatus, NormalizedListing, PriceSnapshot, PropertyKind, TransactionKind,
};
pub(crate) use listing::price_per_m2;
pub use subscription::{parse_layouts, DeliveryRecord, FilterSpec, SubscriptionFilter};
pub use zone::Zone;
