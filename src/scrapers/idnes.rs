//! reality.idnes.cz HTML adapter.
//!
//! Listing cards are read from the search result pages during fetch;
//! normalize extracts layout, area and price from the card text.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::info;

use super::{extract_area, FetchError, HttpClient, SourceAdapter, ValidationGap};
use crate::models::{NormalizedListing, PropertyKind, TransactionKind};

const BASE_URL: &str = "https://reality.idnes.cz";
const CARDS_PER_PAGE: usize = 30;
pub const DEFAULT_MAX_PER_CATEGORY: usize = 500;
const MAX_PAGES: usize = 17;

/// (transaction slug, property slug, property kind, transaction kind)
const CATEGORIES: &[(&str, &str, PropertyKind, TransactionKind)] = &[
    ("prodej", "byty", PropertyKind::Apartment, TransactionKind::Sale),
    ("prodej", "domy", PropertyKind::House, TransactionKind::Sale),
    ("pronajem", "byty", PropertyKind::Apartment, TransactionKind::Rent),
    ("pronajem", "domy", PropertyKind::House, TransactionKind::Rent),
];

static LAYOUT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d\+(?:kk|1)|6\+|atypick[yý])").unwrap());
static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d\s\u{a0}]+)\s*Kč").unwrap());

struct CardSelectors {
    item: Selector,
    link: Selector,
    title: Selector,
    price: Selector,
    info: Selector,
    image: Selector,
}

static SELECTORS: LazyLock<CardSelectors> = LazyLock::new(|| CardSelectors {
    item: Selector::parse(".c-products__item").unwrap(),
    link: Selector::parse(".c-products__link").unwrap(),
    title: Selector::parse(".c-products__title").unwrap(),
    price: Selector::parse(".c-products__price").unwrap(),
    info: Selector::parse(".c-products__info").unwrap(),
    image: Selector::parse(".c-products__img img").unwrap(),
});

fn element_text(card: &ElementRef, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Parse listing cards of one result page, skipping advertisement slots.
pub fn parse_cards(
    html: &str,
    property_kind: PropertyKind,
    transaction_kind: TransactionKind,
) -> Vec<Value> {
    let document = Html::parse_document(html);
    let sel = &*SELECTORS;

    document
        .select(&sel.item)
        .filter(|card| {
            !card
                .value()
                .classes()
                .any(|c| c == "c-products__item-advertisment")
        })
        .filter_map(|card| {
            let href = card.select(&sel.link).next()?.value().attr("href")?;
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", BASE_URL, href)
            };
            let image = card.select(&sel.image).next().and_then(|img| {
                img.value()
                    .attr("data-src")
                    .or_else(|| img.value().attr("src"))
                    .filter(|src| !src.is_empty() && !src.contains("data:image"))
                    .map(str::to_string)
            });
            Some(json!({
                "url": url,
                "title": element_text(&card, &sel.title),
                "price_text": element_text(&card, &sel.price),
                "info": element_text(&card, &sel.info),
                "image": image,
                "property_kind": property_kind.as_str(),
                "transaction_kind": transaction_kind.as_str(),
            }))
        })
        .collect()
}

fn extract_layout(text: &str) -> Option<String> {
    LAYOUT_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

fn parse_price(text: &str) -> Option<f64> {
    let digits: String = PRICE_PATTERN
        .captures(text)?
        .get(1)?
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse::<f64>().ok().filter(|p| *p > 0.0)
}

pub struct IdnesAdapter {
    client: HttpClient,
    max_per_category: usize,
}

impl IdnesAdapter {
    pub fn new(client: HttpClient, max_per_category: usize) -> Self {
        Self {
            client,
            max_per_category,
        }
    }

    fn page_url(txn_slug: &str, type_slug: &str, page: usize) -> String {
        let mut url = format!("{}/s/{}/{}/", BASE_URL, txn_slug, type_slug);
        if page > 0 {
            url.push_str(&format!("?page={}", page));
        }
        url
    }
}

#[async_trait]
impl SourceAdapter for IdnesAdapter {
    fn id(&self) -> &str {
        "idnes"
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, FetchError> {
        let max_pages = MAX_PAGES.min(self.max_per_category.div_ceil(CARDS_PER_PAGE).max(1));
        let mut all = Vec::new();

        for (txn_slug, type_slug, kind, txn) in CATEGORIES {
            let before = all.len();
            for page in 0..max_pages {
                let html = self
                    .client
                    .get_text(&Self::page_url(txn_slug, type_slug, page))
                    .await?;
                let cards = parse_cards(&html, *kind, *txn);
                if cards.is_empty() {
                    break;
                }
                all.extend(cards);
            }
            info!(
                "[idnes] Category {}/{}: {} listings",
                txn_slug,
                type_slug,
                all.len() - before
            );
        }
        Ok(all)
    }

    fn normalize(&self, raw: &Value) -> Result<NormalizedListing, ValidationGap> {
        let url = raw
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationGap("idnes card without link".into()))?;
        let external_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        if external_id.len() < 10 {
            return Err(ValidationGap(format!("idnes card with short id: {}", url)));
        }

        let property_kind = raw
            .get("property_kind")
            .and_then(Value::as_str)
            .and_then(PropertyKind::from_str)
            .ok_or_else(|| ValidationGap("idnes card without property kind".into()))?;
        let transaction_kind = raw
            .get("transaction_kind")
            .and_then(Value::as_str)
            .and_then(TransactionKind::from_str)
            .ok_or_else(|| ValidationGap("idnes card without transaction kind".into()))?;

        let mut listing = NormalizedListing::new(external_id, property_kind, transaction_kind);
        let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
        listing.url = Some(url.to_string());
        listing.title = (!title.is_empty()).then(|| title.to_string());
        listing.layout = extract_layout(title);
        listing.area_m2 = extract_area(title);
        listing.price = raw
            .get("price_text")
            .and_then(Value::as_str)
            .and_then(parse_price);

        let address = raw.get("info").and_then(Value::as_str).unwrap_or_default();
        if !address.is_empty() {
            let parts: Vec<&str> = address.split(',').map(str::trim).collect();
            if parts.len() >= 2 {
                listing.city = parts.last().map(|s| s.to_string());
                listing.district = Some(parts[0].to_string());
            } else {
                listing.city = Some(parts[0].to_string());
            }
            listing.address = Some(address.to_string());
        }

        if let Some(image) = raw.get("image").and_then(Value::as_str) {
            listing.images.push(image.to_string());
        }
        listing.raw_payload = json!({ "idnes_id": external_id });

        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::RateLimiter;
    use std::time::Duration;

    const PAGE: &str = r#"
        <div class="c-products">
          <div class="c-products__item">
            <a class="c-products__link" href="/detail/prodej/byt/praha-5-radlice/65a1b2c3d4e5f60718293a4b/">
              <h2 class="c-products__title">prodej bytu 2+kk 54 m²</h2>
            </a>
            <p class="c-products__price"><strong>5 490 000 Kč</strong></p>
            <p class="c-products__info">Radlická, Praha 5 - Radlice</p>
            <span class="c-products__img"><img data-src="https://sta-reality.1gr.cz/a.jpg"></span>
          </div>
          <div class="c-products__item c-products__item-advertisment">
            <a class="c-products__link" href="/ad/123456789012345/">ad</a>
          </div>
        </div>
    "#;

    fn adapter() -> IdnesAdapter {
        let client =
            HttpClient::new(Duration::from_secs(5), RateLimiter::default(), None).unwrap();
        IdnesAdapter::new(client, DEFAULT_MAX_PER_CATEGORY)
    }

    #[test]
    fn test_parse_cards_skips_ads() {
        let cards = parse_cards(PAGE, PropertyKind::Apartment, TransactionKind::Sale);
        assert_eq!(cards.len(), 1);
        assert!(cards[0]["url"]
            .as_str()
            .unwrap()
            .starts_with("https://reality.idnes.cz/detail/"));
    }

    #[test]
    fn test_normalize_card() {
        let cards = parse_cards(PAGE, PropertyKind::Apartment, TransactionKind::Sale);
        let listing = adapter().normalize(&cards[0]).unwrap();
        assert_eq!(listing.external_id, "65a1b2c3d4e5f60718293a4b");
        assert_eq!(listing.layout.as_deref(), Some("2+kk"));
        assert_eq!(listing.area_m2, Some(54.0));
        assert_eq!(listing.price, Some(5_490_000.0));
        assert_eq!(listing.city.as_deref(), Some("Praha 5 - Radlice"));
        assert_eq!(listing.district.as_deref(), Some("Radlická"));
        assert_eq!(listing.images.len(), 1);
    }

    #[test]
    fn test_price_and_layout_parsing() {
        assert_eq!(parse_price("12\u{a0}500 Kč/měsíc"), Some(12_500.0));
        assert_eq!(parse_price("Cena na vyžádání"), None);
        assert_eq!(extract_layout("Prodej bytu 3+1"), Some("3+1".to_string()));
        assert_eq!(extract_layout("Byt 6+ s terasou"), Some("6+".to_string()));
        assert_eq!(extract_layout("Dům"), None);
    }

    #[test]
    fn test_short_id_is_rejected() {
        let raw = json!({
            "url": "https://reality.idnes.cz/detail/x/123/",
            "property_kind": "apartment",
            "transaction_kind": "sale"
        });
        assert!(adapter().normalize(&raw).is_err());
    }
}
