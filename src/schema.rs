// Kept in sync by hand with DbContext::init_schema.

diesel::table! {
    listings (id) {
        id -> Integer,
        source -> Text,
        external_id -> Text,
        url -> Nullable<Text>,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
        property_kind -> Text,
        transaction_kind -> Text,
        layout -> Nullable<Text>,
        price -> Nullable<Double>,
        currency -> Text,
        area_m2 -> Nullable<Double>,
        rooms -> Nullable<Integer>,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        zone_code -> Nullable<BigInt>,
        zone_name -> Nullable<Text>,
        city -> Nullable<Text>,
        district -> Nullable<Text>,
        address -> Nullable<Text>,
        images -> Text,
        raw_payload -> Text,
        status -> Text,
        duplicate_of -> Nullable<Integer>,
        missed_runs -> Integer,
        first_seen -> Text,
        last_seen -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    price_snapshots (id) {
        id -> Integer,
        listing_id -> Integer,
        price -> Double,
        price_per_m2 -> Nullable<Double>,
        recorded_at -> Text,
    }
}

diesel::table! {
    ingestion_runs (id) {
        id -> Integer,
        source -> Text,
        started_at -> Text,
        finished_at -> Nullable<Text>,
        status -> Text,
        listings_found -> Integer,
        listings_new -> Integer,
        listings_updated -> Integer,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    zones (code) {
        code -> BigInt,
        name -> Text,
        geometry -> Text,
        min_lon -> Double,
        min_lat -> Double,
        max_lon -> Double,
        max_lat -> Double,
    }
}

diesel::table! {
    zone_benchmarks (id) {
        id -> Integer,
        scope -> Text,
        scope_key -> Text,
        label -> Text,
        property_kind -> Text,
        transaction_kind -> Text,
        median_price_m2 -> Double,
        avg_price_m2 -> Double,
        sample_count -> Integer,
        computed_at -> Text,
    }
}

diesel::table! {
    reference_benchmarks (id) {
        id -> Integer,
        source -> Text,
        region -> Text,
        property_kind -> Text,
        transaction_kind -> Text,
        price_m2 -> Double,
        period -> Text,
        fetched_at -> Text,
    }
}

diesel::table! {
    subscription_filters (id) {
        id -> Integer,
        owner -> Text,
        name -> Nullable<Text>,
        property_kind -> Nullable<Text>,
        transaction_kind -> Nullable<Text>,
        city -> Nullable<Text>,
        layouts -> Nullable<Text>,
        price_min -> Nullable<Double>,
        price_max -> Nullable<Double>,
        area_min -> Nullable<Double>,
        area_max -> Nullable<Double>,
        notify_new -> Bool,
        notify_price_drop -> Bool,
        active -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    delivery_records (id) {
        id -> Integer,
        filter_id -> Integer,
        listing_id -> Integer,
        kind -> Text,
        delivered_at -> Text,
    }
}

diesel::table! {
    event_queue (id) {
        id -> Integer,
        payload -> Text,
        enqueued_at -> Text,
    }
}

diesel::joinable!(price_snapshots -> listings (listing_id));
diesel::joinable!(delivery_records -> subscription_filters (filter_id));
diesel::joinable!(delivery_records -> listings (listing_id));

diesel::allow_tables_to_appear_in_same_query!(
    listings,
    price_snapshots,
    ingestion_runs,
    zones,
    zone_benchmarks,
    reference_benchmarks,
    subscription_filters,
    delivery_records,
    event_queue,
);
