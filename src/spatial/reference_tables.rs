//! Static reference prices and Czech place-name lookups.
//!
//! Regional averages come from the Czech Statistical Office (CSU), Prague
//! district figures from the Deloitte Real Index. Sale values are CZK per
//! square metre, rent values CZK per square metre per month.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::TransactionKind;
use crate::repository::util::fold_diacritics;

const REGION_SALE: &[(&str, u32)] = &[
    ("Praha", 140_000),
    ("Stredocesky", 58_000),
    ("Jihocesky", 44_000),
    ("Plzensky", 52_000),
    ("Karlovarsky", 27_000),
    ("Ustecky", 22_000),
    ("Liberecky", 42_000),
    ("Kralovehradecky", 43_000),
    ("Pardubicky", 42_000),
    ("Vysocina", 37_000),
    ("Jihomoravsky", 78_000),
    ("Olomoucky", 42_000),
    ("Zlinsky", 41_000),
    ("Moravskoslezsky", 32_000),
];

const REGION_RENT: &[(&str, u32)] = &[
    ("Praha", 380),
    ("Stredocesky", 240),
    ("Jihocesky", 210),
    ("Plzensky", 220),
    ("Karlovarsky", 170),
    ("Ustecky", 160),
    ("Liberecky", 210),
    ("Kralovehradecky", 200),
    ("Pardubicky", 195),
    ("Vysocina", 185),
    ("Jihomoravsky", 280),
    ("Olomoucky", 200),
    ("Zlinsky", 195),
    ("Moravskoslezsky", 180),
];

/// Praha 1 through Praha 22.
const PRAGUE_DISTRICT_SALE: [u32; 22] = [
    200_000, 155_000, 120_000, 110_000, 125_000, 135_000, 140_000, 115_000, 105_000, 110_000,
    90_000, 95_000, 95_000, 85_000, 85_000, 90_000, 85_000, 80_000, 80_000, 85_000, 80_000,
    75_000,
];

const PRAGUE_DISTRICT_RENT: [u32; 22] = [
    450, 400, 370, 340, 360, 370, 390, 350, 330, 340, 300, 310, 310, 290, 280, 300, 280, 270, 270,
    280, 270, 260,
];

/// Prague cadastral areas and the district they belong to.
const CADASTRAL_DISTRICTS: &[(&str, u8)] = &[
    ("stare-mesto", 1),
    ("stare mesto", 1),
    ("nove-mesto", 1),
    ("josefov", 1),
    ("mala-strana", 1),
    ("mala strana", 1),
    ("hradcany", 1),
    ("vinohrady", 2),
    ("vysehrad", 2),
    ("zizkov", 3),
    ("nusle", 4),
    ("podoli", 4),
    ("branik", 4),
    ("lhotka", 4),
    ("krc", 4),
    ("michle", 4),
    ("kunratice", 4),
    ("chodov", 4),
    ("haje", 4),
    ("modrany", 4),
    ("komorany", 4),
    ("hodkovicky", 4),
    ("smichov", 5),
    ("kosire", 5),
    ("motol", 5),
    ("radlice", 5),
    ("hlubocepy", 5),
    ("jinonice", 5),
    ("stodulky", 5),
    ("barrandov", 5),
    ("butovice", 5),
    ("slivenec", 5),
    ("lipence", 5),
    ("zlicin", 5),
    ("reporyje", 5),
    ("lochkov", 5),
    ("dejvice", 6),
    ("bubenec", 6),
    ("vokovice", 6),
    ("veleslavin", 6),
    ("brevnov", 6),
    ("stresovice", 6),
    ("liboc", 6),
    ("nebusice", 6),
    ("suchdol", 6),
    ("lysolaje", 6),
    ("sedlec", 6),
    ("ruzyne", 6),
    ("predni-kopanina", 6),
    ("holesovice", 7),
    ("letna", 7),
    ("troja", 7),
    ("bubny", 7),
    ("karlin", 8),
    ("liben", 8),
    ("kobylisy", 8),
    ("bohnice", 8),
    ("dablice", 8),
    ("dolni-chabry", 8),
    ("cimice", 8),
    ("brezineves", 8),
    ("vysocany", 9),
    ("prosek", 9),
    ("strizkov", 9),
    ("hloubetin", 9),
    ("kbely", 9),
    ("letnany", 9),
    ("cakovice", 9),
    ("vinor", 9),
    ("satalice", 9),
    ("klanovice", 9),
    ("vrsovice", 10),
    ("strasnice", 10),
    ("zabehlice", 10),
    ("hostivar", 10),
    ("uhrineves", 10),
    ("malesice", 10),
    ("dolni-mecholupy", 10),
    ("petrovice", 10),
    ("kresice", 10),
    ("benice", 10),
    ("kolarov", 10),
    ("kralovice", 10),
];

/// Normalized city name to region. Order matters for partial matches.
const CITY_REGIONS: &[(&str, &str)] = &[
    ("praha", "Praha"),
    ("kladno", "Stredocesky"),
    ("mlada-boleslav", "Stredocesky"),
    ("pribram", "Stredocesky"),
    ("kolin", "Stredocesky"),
    ("kutna-hora", "Stredocesky"),
    ("benesov", "Stredocesky"),
    ("beroun", "Stredocesky"),
    ("melnik", "Stredocesky"),
    ("nymburk", "Stredocesky"),
    ("rakovnik", "Stredocesky"),
    ("brandys-nad-labem", "Stredocesky"),
    ("ceske-budejovice", "Jihocesky"),
    ("tabor", "Jihocesky"),
    ("pisek", "Jihocesky"),
    ("strakonice", "Jihocesky"),
    ("jindrichuv-hradec", "Jihocesky"),
    ("cesky-krumlov", "Jihocesky"),
    ("prachatice", "Jihocesky"),
    ("plzen", "Plzensky"),
    ("klatovy", "Plzensky"),
    ("rokycany", "Plzensky"),
    ("domazlice", "Plzensky"),
    ("tachov", "Plzensky"),
    ("karlovy-vary", "Karlovarsky"),
    ("cheb", "Karlovarsky"),
    ("sokolov", "Karlovarsky"),
    ("marianske-lazne", "Karlovarsky"),
    ("frantiskovy-lazne", "Karlovarsky"),
    ("usti-nad-labem", "Ustecky"),
    ("most", "Ustecky"),
    ("teplice", "Ustecky"),
    ("chomutov", "Ustecky"),
    ("decin", "Ustecky"),
    ("litomerice", "Ustecky"),
    ("louny", "Ustecky"),
    ("litvinov", "Ustecky"),
    ("liberec", "Liberecky"),
    ("jablonec-nad-nisou", "Liberecky"),
    ("ceska-lipa", "Liberecky"),
    ("semily", "Liberecky"),
    ("turnov", "Liberecky"),
    ("hradec-kralove", "Kralovehradecky"),
    ("trutnov", "Kralovehradecky"),
    ("nachod", "Kralovehradecky"),
    ("jicin", "Kralovehradecky"),
    ("rychnov-nad-kneznou", "Kralovehradecky"),
    ("pardubice", "Pardubicky"),
    ("chrudim", "Pardubicky"),
    ("svitavy", "Pardubicky"),
    ("usti-nad-orlici", "Pardubicky"),
    ("jihlava", "Vysocina"),
    ("trebic", "Vysocina"),
    ("zdar-nad-sazavou", "Vysocina"),
    ("havlickuv-brod", "Vysocina"),
    ("pelhrimov", "Vysocina"),
    ("brno", "Jihomoravsky"),
    ("znojmo", "Jihomoravsky"),
    ("hodonin", "Jihomoravsky"),
    ("breclav", "Jihomoravsky"),
    ("vyskov", "Jihomoravsky"),
    ("blansko", "Jihomoravsky"),
    ("olomouc", "Olomoucky"),
    ("prostejov", "Olomoucky"),
    ("prerov", "Olomoucky"),
    ("sumperk", "Olomoucky"),
    ("jesenik", "Olomoucky"),
    ("zlin", "Zlinsky"),
    ("kromeriz", "Zlinsky"),
    ("uherske-hradiste", "Zlinsky"),
    ("vsetin", "Zlinsky"),
    ("valasske-mezirici", "Zlinsky"),
    ("ostrava", "Moravskoslezsky"),
    ("opava", "Moravskoslezsky"),
    ("frydek-mistek", "Moravskoslezsky"),
    ("karvina", "Moravskoslezsky"),
    ("novy-jicin", "Moravskoslezsky"),
    ("havirov", "Moravskoslezsky"),
    ("trinec", "Moravskoslezsky"),
    ("bruntal", "Moravskoslezsky"),
];

static DISTRICT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^praha[\s-]+(\d{1,2})").unwrap());

/// Lowercase, strip diacritics, spaces to hyphens.
pub fn normalize_city(city: &str) -> String {
    fold_diacritics(city.trim()).replace(' ', "-")
}

/// Non-empty hyphen-separated tokens after the "praha-" prefix.
///
/// Returns `None` when the city is not a Prague address.
pub fn prague_tokens(city: &str) -> Option<Vec<String>> {
    let normalized = normalize_city(city);
    let rest = normalized.strip_prefix("praha-")?;
    Some(
        rest.split('-')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Joined prefixes of `tokens` of length 1, 2 and 3.
pub fn token_combinations(tokens: &[String]) -> Vec<String> {
    (1..=tokens.len().min(3))
        .map(|len| tokens[..len].join("-"))
        .collect()
}

/// District number of a cadastral area slug ("nove-mesto").
pub fn cadastral_district(slug: &str) -> Option<u8> {
    CADASTRAL_DISTRICTS
        .iter()
        .find(|(name, _)| *name == slug)
        .map(|(_, district)| *district)
}

/// Prague district number from "Praha 5", "praha-10-uhrineves" or a
/// cadastral name such as "praha-vinohrady-manesova".
pub fn prague_district(city: &str) -> Option<u8> {
    let normalized = normalize_city(city);
    if let Some(caps) = DISTRICT_NUMBER.captures(&normalized) {
        return caps[1].parse().ok();
    }
    let tokens = prague_tokens(city)?;
    token_combinations(&tokens)
        .iter()
        .find_map(|candidate| cadastral_district(candidate))
}

/// Region for a city: exact name, then substring either way, then prefix.
pub fn region_for_city(city: &str) -> Option<&'static str> {
    let normalized = normalize_city(city);
    if normalized.is_empty() {
        return None;
    }

    if let Some((_, region)) = CITY_REGIONS.iter().find(|(key, _)| *key == normalized) {
        return Some(region);
    }
    if let Some((_, region)) = CITY_REGIONS
        .iter()
        .find(|(key, _)| normalized.contains(key) || key.contains(normalized.as_str()))
    {
        return Some(region);
    }
    let head = normalized.split('-').next().unwrap_or_default();
    CITY_REGIONS
        .iter()
        .find(|(key, _)| normalized.starts_with(key) || (!head.is_empty() && key.starts_with(head)))
        .map(|(_, region)| *region)
}

pub fn region_price(region: &str, transaction: TransactionKind) -> Option<f64> {
    let table = match transaction {
        TransactionKind::Sale => REGION_SALE,
        TransactionKind::Rent => REGION_RENT,
    };
    table
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, price)| f64::from(*price))
}

pub fn district_price(district: u8, transaction: TransactionKind) -> Option<f64> {
    let table = match transaction {
        TransactionKind::Sale => &PRAGUE_DISTRICT_SALE,
        TransactionKind::Rent => &PRAGUE_DISTRICT_RENT,
    };
    let index = usize::from(district).checked_sub(1)?;
    table.get(index).map(|price| f64::from(*price))
}
