//! Subscription filters and delivery markers.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::{NewDeliveryRecord, NewSubscriptionFilter, SubscriptionFilterRecord};
use super::util::is_unique_violation;
use super::{format_datetime, parse_datetime};
use crate::models::{
    parse_layouts, EventKind, FilterSpec, PropertyKind, SubscriptionFilter, TransactionKind,
};
use crate::schema::{delivery_records, subscription_filters};
use crate::with_conn;

impl From<SubscriptionFilterRecord> for SubscriptionFilter {
    fn from(record: SubscriptionFilterRecord) -> Self {
        SubscriptionFilter {
            id: record.id,
            owner: record.owner,
            name: record.name,
            property_kind: record.property_kind.as_deref().and_then(PropertyKind::from_str),
            transaction_kind: record
                .transaction_kind
                .as_deref()
                .and_then(TransactionKind::from_str),
            city: record.city,
            layouts: record.layouts.as_deref().map(parse_layouts).unwrap_or_default(),
            price_min: record.price_min,
            price_max: record.price_max,
            area_min: record.area_min,
            area_max: record.area_max,
            notify_new: record.notify_new,
            notify_price_drop: record.notify_price_drop,
            active: record.active,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: DbPool,
}

impl SubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a new active filter and return its id.
    pub async fn create(&self, spec: &FilterSpec) -> Result<i32, DbError> {
        let created_at = format_datetime(Utc::now());
        let layouts = (!spec.layouts.is_empty()).then(|| spec.layouts.join(","));

        with_conn!(self.pool, conn => {
            diesel::insert_into(subscription_filters::table)
                .values(&NewSubscriptionFilter {
                    owner: &spec.owner,
                    name: spec.name.as_deref(),
                    property_kind: spec.property_kind.map(|k| k.as_str()),
                    transaction_kind: spec.transaction_kind.map(|k| k.as_str()),
                    city: spec.city.as_deref(),
                    layouts: layouts.as_deref(),
                    price_min: spec.price_min,
                    price_max: spec.price_max,
                    area_min: spec.area_min,
                    area_max: spec.area_max,
                    notify_new: spec.notify_new,
                    notify_price_drop: spec.notify_price_drop,
                    active: true,
                    created_at: &created_at,
                })
                .returning(subscription_filters::id)
                .get_result(&mut conn)
                .await
        })
    }

    pub async fn get(&self, id: i32) -> Result<Option<SubscriptionFilter>, DbError> {
        with_conn!(self.pool, conn => {
            subscription_filters::table
                .find(id)
                .first::<SubscriptionFilterRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(SubscriptionFilter::from))
        })
    }

    /// All filters, optionally for one owner.
    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<SubscriptionFilter>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = subscription_filters::table
                .order(subscription_filters::id.asc())
                .into_boxed();
            if let Some(owner) = owner {
                query = query.filter(subscription_filters::owner.eq(owner));
            }
            query
                .load::<SubscriptionFilterRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(SubscriptionFilter::from).collect())
        })
    }

    pub async fn list_active(&self) -> Result<Vec<SubscriptionFilter>, DbError> {
        with_conn!(self.pool, conn => {
            subscription_filters::table
                .filter(subscription_filters::active.eq(true))
                .order(subscription_filters::id.asc())
                .load::<SubscriptionFilterRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(SubscriptionFilter::from).collect())
        })
    }

    /// Delete a filter; its delivery records go with it.
    pub async fn delete(&self, id: i32) -> Result<bool, DbError> {
        with_conn!(self.pool, conn => {
            let rows = diesel::delete(subscription_filters::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    pub async fn set_active(&self, id: i32, active: bool) -> Result<bool, DbError> {
        with_conn!(self.pool, conn => {
            let rows = diesel::update(subscription_filters::table.find(id))
                .set(subscription_filters::active.eq(active))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    /// Whether this (filter, listing, kind) was already delivered.
    pub async fn was_delivered(
        &self,
        filter_id: i32,
        listing_id: i32,
        kind: EventKind,
    ) -> Result<bool, DbError> {
        use diesel::dsl::count_star;

        with_conn!(self.pool, conn => {
            let count: i64 = delivery_records::table
                .filter(delivery_records::filter_id.eq(filter_id))
                .filter(delivery_records::listing_id.eq(listing_id))
                .filter(delivery_records::kind.eq(kind.as_str()))
                .select(count_star())
                .first(&mut conn)
                .await?;
            Ok(count > 0)
        })
    }

    /// Record a delivery. Returns false if the marker already existed.
    pub async fn record_delivery(
        &self,
        filter_id: i32,
        listing_id: i32,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let delivered_at = format_datetime(at);
        with_conn!(self.pool, conn => {
            let result = diesel::insert_into(delivery_records::table)
                .values(&NewDeliveryRecord {
                    filter_id,
                    listing_id,
                    kind: kind.as_str(),
                    delivered_at: &delivered_at,
                })
                .execute(&mut conn)
                .await;
            match result {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    pub async fn delivery_count(&self, filter_id: i32) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            delivery_records::table
                .filter(delivery_records::filter_id.eq(filter_id))
                .count()
                .get_result(&mut conn)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedListing;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_concurrent_creates_for_one_owner_get_their_own_ids() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let subs = ctx.subscriptions();

        let specs: Vec<FilterSpec> = (0..8)
            .map(|i| {
                let mut spec = FilterSpec::for_owner("chat-1");
                spec.name = Some(format!("filter {i}"));
                spec
            })
            .collect();
        let ids = futures::future::join_all(specs.iter().map(|spec| subs.create(spec))).await;

        let mut seen = std::collections::HashSet::new();
        for (spec, id) in specs.iter().zip(ids) {
            let id = id.unwrap();
            assert!(seen.insert(id));
            let stored = subs.get(id).await.unwrap().unwrap();
            assert_eq!(stored.name, spec.name);
        }
    }

    #[tokio::test]
    async fn test_filter_round_trip_and_delivery_idempotence() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let subs = ctx.subscriptions();

        let mut spec = FilterSpec::for_owner("chat-1");
        spec.transaction_kind = Some(TransactionKind::Sale);
        spec.layouts = vec!["2+kk".to_string(), "3+kk".to_string()];
        spec.price_max = Some(6_000_000.0);
        let id = subs.create(&spec).await.unwrap();

        let stored = subs.get(id).await.unwrap().unwrap();
        assert_eq!(stored.layouts, vec!["2+kk", "3+kk"]);
        assert_eq!(stored.transaction_kind, Some(TransactionKind::Sale));
        assert!(stored.property_kind.is_none());
        assert!(stored.active);

        let listing = ctx
            .listings()
            .upsert(
                "sreality",
                &NormalizedListing::new("1", PropertyKind::Apartment, TransactionKind::Sale),
                Utc::now(),
            )
            .await
            .unwrap();

        let kind = EventKind::NewListing;
        assert!(!subs.was_delivered(id, listing.listing_id, kind).await.unwrap());
        assert!(subs
            .record_delivery(id, listing.listing_id, kind, Utc::now())
            .await
            .unwrap());
        assert!(!subs
            .record_delivery(id, listing.listing_id, kind, Utc::now())
            .await
            .unwrap());
        assert!(subs.was_delivered(id, listing.listing_id, kind).await.unwrap());

        assert!(subs.set_active(id, false).await.unwrap());
        assert!(subs.list_active().await.unwrap().is_empty());

        assert!(subs.delete(id).await.unwrap());
        assert_eq!(subs.delivery_count(id).await.unwrap(), 0);
    }
}
