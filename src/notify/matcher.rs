//! Subscription filter evaluation.

use crate::models::{EventKind, Listing, SubscriptionFilter};

fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(value) = value else {
        return true;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Whether `filter` wants to hear about `kind` for `listing`.
///
/// Unset criteria match anything. A bound or city only rejects when the
/// listing actually has the value.
pub fn matches(filter: &SubscriptionFilter, listing: &Listing, kind: EventKind) -> bool {
    let wanted = match kind {
        EventKind::NewListing => filter.notify_new,
        EventKind::PriceDrop => filter.notify_price_drop,
    };
    if !wanted {
        return false;
    }

    if filter
        .property_kind
        .is_some_and(|k| k != listing.property_kind)
    {
        return false;
    }
    if filter
        .transaction_kind
        .is_some_and(|t| t != listing.transaction_kind)
    {
        return false;
    }

    if let (Some(wanted), Some(city)) = (&filter.city, &listing.city) {
        if !city.to_lowercase().contains(&wanted.to_lowercase()) {
            return false;
        }
    }

    if !within(listing.price, filter.price_min, filter.price_max) {
        return false;
    }
    if !within(listing.area_m2, filter.area_min, filter.area_max) {
        return false;
    }

    match &listing.layout {
        Some(layout) if !filter.layouts.is_empty() => filter.layouts.iter().any(|l| l == layout),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingStatus, PropertyKind, TransactionKind};
    use chrono::Utc;

    fn listing() -> Listing {
        let now = Utc::now();
        Listing {
            id: 1,
            source: "sreality".to_string(),
            external_id: "1".to_string(),
            url: None,
            title: None,
            description: None,
            property_kind: PropertyKind::Apartment,
            transaction_kind: TransactionKind::Sale,
            layout: Some("2+kk".to_string()),
            price: Some(4_500_000.0),
            currency: "CZK".to_string(),
            area_m2: Some(54.0),
            rooms: None,
            latitude: None,
            longitude: None,
            zone_code: None,
            zone_name: None,
            city: Some("Praha 3".to_string()),
            district: None,
            address: None,
            images: Vec::new(),
            raw_payload: serde_json::Value::Null,
            status: ListingStatus::Active,
            duplicate_of: None,
            missed_runs: 0,
            first_seen: now,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn filter() -> SubscriptionFilter {
        SubscriptionFilter {
            id: 1,
            owner: "42".to_string(),
            name: None,
            property_kind: None,
            transaction_kind: None,
            city: None,
            layouts: Vec::new(),
            price_min: None,
            price_max: None,
            area_min: None,
            area_max: None,
            notify_new: true,
            notify_price_drop: true,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches(&filter(), &listing(), EventKind::NewListing));
        assert!(matches(&filter(), &listing(), EventKind::PriceDrop));
    }

    #[test]
    fn test_event_flags() {
        let mut f = filter();
        f.notify_price_drop = false;
        assert!(matches(&f, &listing(), EventKind::NewListing));
        assert!(!matches(&f, &listing(), EventKind::PriceDrop));
    }

    #[test]
    fn test_price_bounds() {
        let mut f = filter();
        f.price_max = Some(6_000_000.0);
        assert!(matches(&f, &listing(), EventKind::PriceDrop));
        f.price_max = Some(4_000_000.0);
        assert!(!matches(&f, &listing(), EventKind::PriceDrop));

        let mut unpriced = listing();
        unpriced.price = None;
        assert!(matches(&f, &unpriced, EventKind::NewListing));
    }

    #[test]
    fn test_city_substring_is_case_insensitive() {
        let mut f = filter();
        f.city = Some("praha".to_string());
        assert!(matches(&f, &listing(), EventKind::NewListing));
        f.city = Some("Brno".to_string());
        assert!(!matches(&f, &listing(), EventKind::NewListing));

        let mut no_city = listing();
        no_city.city = None;
        assert!(matches(&f, &no_city, EventKind::NewListing));
    }

    #[test]
    fn test_kinds_and_layouts() {
        let mut f = filter();
        f.transaction_kind = Some(TransactionKind::Rent);
        assert!(!matches(&f, &listing(), EventKind::NewListing));

        let mut f = filter();
        f.layouts = vec!["3+kk".to_string(), "3+1".to_string()];
        assert!(!matches(&f, &listing(), EventKind::NewListing));
        f.layouts.push("2+kk".to_string());
        assert!(matches(&f, &listing(), EventKind::NewListing));
    }
}
