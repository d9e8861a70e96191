//! Sreality.cz JSON API adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{extract_area, FetchError, HttpClient, SourceAdapter, ValidationGap};
use crate::models::{NormalizedListing, PropertyKind, TransactionKind};

const API_BASE: &str = "https://www.sreality.cz/api/cs/v2";
const PER_PAGE: usize = 100;
pub const DEFAULT_MAX_PER_CATEGORY: usize = 500;

/// Checked in order; longer codes first so "5+kk" wins over "5+1" substrings.
const LAYOUTS: &[&str] = &[
    "5+kk", "5+1", "4+kk", "4+1", "3+kk", "3+1", "2+kk", "2+1", "1+kk", "1+1", "6+",
];

/// Categories fetched each cycle: (category_main_cb, category_type_cb).
const CATEGORIES: &[(u8, u8)] = &[(1, 1), (2, 1), (1, 2), (2, 2)];

fn property_kind(category_main: u64) -> PropertyKind {
    match category_main {
        2 => PropertyKind::House,
        3 => PropertyKind::Land,
        4 => PropertyKind::Commercial,
        _ => PropertyKind::Apartment,
    }
}

fn transaction_kind(category_type: u64) -> TransactionKind {
    match category_type {
        2 => TransactionKind::Rent,
        _ => TransactionKind::Sale,
    }
}

pub struct SrealityAdapter {
    client: HttpClient,
    max_per_category: usize,
}

impl SrealityAdapter {
    pub fn new(client: HttpClient, max_per_category: usize) -> Self {
        Self {
            client,
            max_per_category,
        }
    }

    fn page_url(category_main: u8, category_type: u8, page: usize) -> String {
        format!(
            "{}/estates?category_main_cb={}&category_type_cb={}&per_page={}&page={}",
            API_BASE, category_main, category_type, PER_PAGE, page
        )
    }

    async fn fetch_category(
        &self,
        category_main: u8,
        category_type: u8,
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        let mut page = 0;

        loop {
            let url = Self::page_url(category_main, category_type, page);
            let data = self.client.get_json(&url).await?;

            let estates = data
                .pointer("/_embedded/estates")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if estates.is_empty() {
                break;
            }

            for mut estate in estates {
                // Category is not part of the estate payload; carry it for normalize.
                if let Some(obj) = estate.as_object_mut() {
                    obj.insert("_category_main_cb".into(), category_main.into());
                    obj.insert("_category_type_cb".into(), category_type.into());
                }
                items.push(estate);
            }

            let result_size = data.get("result_size").and_then(Value::as_u64).unwrap_or(0);
            let fetched = (page + 1) * PER_PAGE;
            if fetched as u64 >= result_size || fetched >= self.max_per_category {
                break;
            }
            page += 1;
            debug!("[sreality] Next page {} for {}/{}", page, category_main, category_type);
        }

        info!(
            "[sreality] Category main={} type={}: {} listings",
            category_main,
            category_type,
            items.len()
        );
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for SrealityAdapter {
    fn id(&self) -> &str {
        "sreality"
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, FetchError> {
        let mut all = Vec::new();
        for (main, kind) in CATEGORIES {
            all.extend(self.fetch_category(*main, *kind).await?);
        }
        Ok(all)
    }

    fn normalize(&self, raw: &Value) -> Result<NormalizedListing, ValidationGap> {
        let hash_id = raw
            .get("hash_id")
            .or_else(|| raw.get("id"))
            .and_then(|v| match v {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .ok_or_else(|| ValidationGap("sreality estate without hash_id".into()))?;

        let category_main = raw.get("_category_main_cb").and_then(Value::as_u64).unwrap_or(1);
        let category_type = raw.get("_category_type_cb").and_then(Value::as_u64).unwrap_or(1);

        let mut listing = NormalizedListing::new(
            hash_id.clone(),
            property_kind(category_main),
            transaction_kind(category_type),
        );

        let name = raw.get("name").and_then(Value::as_str).unwrap_or_default();
        listing.url = Some(format!("https://www.sreality.cz/detail/{}", hash_id));
        listing.title = (!name.is_empty()).then(|| name.to_string());
        listing.description = raw
            .get("description")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        listing.layout = LAYOUTS
            .iter()
            .find(|code| name.contains(*code))
            .map(|code| code.to_string());
        listing.area_m2 = extract_area(name);

        listing.price = match raw.get("price") {
            Some(Value::Object(price)) => price.get("value_raw").and_then(Value::as_f64),
            Some(other) => other.as_f64(),
            None => None,
        }
        .filter(|p| *p > 0.0);

        listing.latitude = raw.pointer("/gps/lat").and_then(Value::as_f64);
        listing.longitude = raw.pointer("/gps/lon").and_then(Value::as_f64);

        let locality = raw
            .pointer("/seo/locality")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !locality.is_empty() {
            match locality.split_once(" - ") {
                Some((city, district)) => {
                    listing.city = Some(city.trim().to_string());
                    listing.district = Some(district.trim().to_string());
                }
                None => listing.city = Some(locality.to_string()),
            }
            listing.address = Some(locality.to_string());
        }

        listing.images = raw
            .pointer("/_links/images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .take(5)
                    .filter_map(|img| img.get("href").and_then(Value::as_str))
                    .filter(|href| !href.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        listing.raw_payload = serde_json::json!({
            "hash_id": hash_id,
            "seo": raw.get("seo").cloned().unwrap_or(Value::Null),
        });

        Ok(listing)
    }
}
