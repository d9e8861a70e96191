//! Telegram-flavoured HTML messages.

use crate::models::{DomainEvent, EventKind, Listing};

/// "4 500 000 CZK"
pub fn format_price(price: f64) -> String {
    let digits = (price.round() as i64).abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}{grouped} CZK")
}

fn format_area(area: f64) -> String {
    if area.fract() == 0.0 {
        format!("{area:.0} m²")
    } else {
        format!("{area:.1} m²")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Percentage drop from `old` to `new`, 0 when `old` is not positive.
pub fn drop_percent(old: f64, new: f64) -> f64 {
    if old > 0.0 {
        (old - new) / old * 100.0
    } else {
        0.0
    }
}

/// Render the message for one event about one listing.
pub fn render(listing: &Listing, event: &DomainEvent) -> String {
    let price = listing
        .price
        .map(format_price)
        .unwrap_or_else(|| "N/A".to_string());

    let header = match event.kind {
        EventKind::NewListing => "🏠 <b>Novy inzerat</b>".to_string(),
        EventKind::PriceDrop => {
            let old = event.old_price.unwrap_or(0.0);
            let pct = drop_percent(old, listing.price.unwrap_or(0.0));
            format!("📉 <b>Pokles ceny o {pct:.1}%</b>")
        }
    };
    let title = listing.title.as_deref().unwrap_or("Bez nazvu");
    let location = format!(
        "📍 {} {}",
        escape_html(listing.city.as_deref().unwrap_or_default()),
        escape_html(listing.district.as_deref().unwrap_or_default())
    );
    let location = location.trim_end().to_string();
    let price_line = match (event.kind, event.old_price) {
        (EventKind::PriceDrop, Some(old)) => {
            format!("💰 <s>{}</s> → {}", format_price(old), price)
        }
        _ => format!("💰 {price}"),
    };
    let size = format!(
        "📐 {} | {}",
        listing.area_m2.map(format_area).unwrap_or_else(|| "N/A".to_string()),
        escape_html(listing.layout.as_deref().unwrap_or("N/A"))
    );

    let mut lines = vec![
        header,
        String::new(),
        format!("<b>{}</b>", escape_html(title)),
    ];
    // A drop leads with the price change.
    if event.kind == EventKind::PriceDrop {
        lines.push(price_line);
        lines.push(location);
    } else {
        lines.push(location);
        lines.push(price_line);
    }
    lines.push(size);
    lines.push(format!("🔗 {}", capitalize(&listing.source)));

    if let Some(url) = &listing.url {
        lines.push(format!(
            "\n<a href=\"{}\">Zobrazit inzerat</a>",
            url.replace('"', "%22")
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingStatus, PropertyKind, TransactionKind};
    use chrono::Utc;

    fn listing() -> Listing {
        let now = Utc::now();
        Listing {
            id: 7,
            source: "sreality".to_string(),
            external_id: "7".to_string(),
            url: Some("https://www.sreality.cz/detail/7".to_string()),
            title: Some("Prodej bytu 2+kk 54 m²".to_string()),
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
            city: Some("Praha".to_string()),
            district: Some("Žižkov".to_string()),
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

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(4_500_000.0), "4 500 000 CZK");
        assert_eq!(format_price(950.0), "950 CZK");
        assert_eq!(format_price(12_500.4), "12 500 CZK");
    }

    #[test]
    fn test_new_listing_message() {
        let msg = render(&listing(), &DomainEvent::new_listing(7, "sreality"));
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "🏠 <b>Novy inzerat</b>");
        assert_eq!(lines[2], "<b>Prodej bytu 2+kk 54 m²</b>");
        assert_eq!(lines[3], "📍 Praha Žižkov");
        assert_eq!(lines[4], "💰 4 500 000 CZK");
        assert_eq!(lines[5], "📐 54 m² | 2+kk");
        assert_eq!(lines[6], "🔗 Sreality");
        assert!(msg.ends_with("<a href=\"https://www.sreality.cz/detail/7\">Zobrazit inzerat</a>"));
    }

    #[test]
    fn test_price_drop_message() {
        let msg = render(&listing(), &DomainEvent::price_drop(7, "sreality", 5_000_000.0));
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "📉 <b>Pokles ceny o 10.0%</b>");
        assert_eq!(lines[3], "💰 <s>5 000 000 CZK</s> → 4 500 000 CZK");
        assert_eq!(lines[4], "📍 Praha Žižkov");
        assert_eq!(msg.matches("💰").count(), 1);
    }

    #[test]
    fn test_location_and_layout_are_escaped() {
        let mut odd = listing();
        odd.city = Some("Praha <i>".to_string());
        odd.district = Some("Holešovice & Bubny".to_string());
        odd.layout = Some("<3+kk>".to_string());
        let msg = render(&odd, &DomainEvent::new_listing(7, "sreality"));
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[3], "📍 Praha &lt;i&gt; Holešovice &amp; Bubny");
        assert_eq!(lines[5], "📐 54 m² | &lt;3+kk&gt;");
        assert!(!msg.contains("<i>"));
    }

    #[test]
    fn test_missing_fields() {
        let mut bare = listing();
        bare.title = None;
        bare.price = None;
        bare.area_m2 = None;
        bare.layout = None;
        bare.url = None;
        let msg = render(&bare, &DomainEvent::new_listing(7, "idnes"));
        assert!(msg.contains("<b>Bez nazvu</b>"));
        assert!(msg.contains("💰 N/A"));
        assert!(msg.contains("📐 N/A | N/A"));
        assert!(!msg.contains("<a href"));
    }
}
