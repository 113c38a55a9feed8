//! Free-text car search
//!
//! [`parse_query`] turns a short request such as "diesel toyota under 20k
//! from 2018" into a [`SearchFilter`]; [`recommend`] applies it to a dataset.
//! English and Arabic keywords are recognised.


use crate::types::CarRecord;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year pattern"));

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*(k\b|thousand|ألف)?").expect("number pattern")
});

const DIESEL_WORDS: [&str; 2] = ["diesel", "ديزل"];
const PETROL_WORDS: [&str; 5] = ["petrol", "gasoline", "gas", "benzine", "بنزين"];
const ELECTRIC_WORDS: [&str; 4] = ["electric", "ev", "كهرباء", "كهربائية"];

const FILLER_WORDS: [&str; 24] = [
    "i", "a", "an", "the", "me", "want", "need", "looking", "for", "find", "show", "car", "cars",
    "under", "below", "less", "than", "price", "budget", "بدي", "سيارة", "تحت", "سعر", "أريد",
];

/// Structured reading of a search request; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchFilter {
    pub price_max: Option<f64>,
    /// Earliest acceptable model year
    pub year: Option<i32>,
    pub fuel: Option<String>,
    /// Leftover text a brand name is looked up in
    pub brand_substring: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn parse_query(text: &str) -> SearchFilter {
    let message = text.to_lowercase();

    let year_match = YEAR_RE.find(&message);
    let year = year_match.and_then(|m| m.as_str().parse().ok());

    let price_max = NUMBER_RE
        .captures_iter(&message)
        .find(|caps| {
            let number = caps.get(1).map(|m| m.start());
            number != year_match.map(|m| m.start())
        })
        .and_then(|caps| {
            let value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
            let multiplier = if caps.get(2).is_some() { 1_000.0 } else { 1.0 };
            Some(value * multiplier)
        });

    let words: Vec<&str> = message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |keywords: &[&str]| words.iter().any(|w| keywords.contains(w));

    // later groups take precedence when several fuels are named
    let mut fuel = None;
    if mentions(&DIESEL_WORDS) {
        fuel = Some("Diesel");
    }
    if mentions(&PETROL_WORDS) {
        fuel = Some("Petrol");
    }
    if mentions(&ELECTRIC_WORDS) {
        fuel = Some("Electric");
    }

    let leftover: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !FILLER_WORDS.contains(w))
        .filter(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
        .collect();
    let brand_substring = (!leftover.is_empty()).then(|| leftover.join(" "));

    SearchFilter {
        price_max,
        year,
        fuel: fuel.map(str::to_string),
        brand_substring,
    }
}

/// Brands in first-seen order
pub fn known_brands(records: &[CarRecord]) -> Vec<&str> {
    let mut brands: Vec<&str> = Vec::new();
    for brand in records.iter().filter_map(|r| r.brand.as_deref()) {
        if !brands.contains(&brand) {
            brands.push(brand);
        }
    }
    brands
}

/// Up to `top_k` listings matching `filter`.
///
/// When nothing matches and a budget was given, the cheapest listings within
/// budget are returned instead.
pub fn recommend<'a>(
    records: &'a [CarRecord],
    filter: &SearchFilter,
    top_k: usize,
) -> Vec<&'a CarRecord> {
    let brand = filter.brand_substring.as_deref().and_then(|text| {
        known_brands(records)
            .into_iter()
            .find(|b| text.contains(&b.to_lowercase()))
    });

    let within_budget = |r: &CarRecord| match filter.price_max {
        Some(max) => r.price_usd.is_some_and(|p| p <= max),
        None => true,
    };

    let matches: Vec<&CarRecord> = records
        .iter()
        .filter(|r| within_budget(r))
        .filter(|r| match filter.year {
            Some(min) => r.year.or(r.manufacture_year).is_some_and(|y| y >= min),
            None => true,
        })
        .filter(|r| match filter.fuel.as_deref() {
            Some(fuel) => r
                .fuel_type
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case(fuel)),
            None => true,
        })
        .filter(|r| match brand {
            Some(b) => r.brand.as_deref() == Some(b),
            None => true,
        })
        .take(top_k)
        .collect();

    if !matches.is_empty() || filter.price_max.is_none() {
        return matches;
    }

    tracing::debug!("No exact matches, falling back to cheapest within budget");
    let mut affordable: Vec<&CarRecord> =
        records.iter().filter(|r| within_budget(r)).collect();
    affordable.sort_by(|a, b| {
        a.price_usd
            .unwrap_or_default()
            .total_cmp(&b.price_usd.unwrap_or_default())
    });
    affordable.truncate(top_k);
    affordable
}
