//! Dataset analytics
//!
//! Summary statistics over listing prices:
//! - Headline KPIs (count, mean, median, spread)
//! - Average price per brand and per body type
//! - Average price per age bracket
//! - Correlation of each numeric column with price


use crate::ml::FeatureBuilder;
use crate::types::CarRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Headline price statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetKpis {
    pub count: usize,
    pub mean_price: f64,
    pub median_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Sample standard deviation; zero for a single listing
    pub std_dev_price: f64,
}

/// Average price for one group of listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    pub group: String,
    pub avg_price: f64,
    pub count: usize,
}

/// Age brackets as `(label, exclusive lower, inclusive upper)`
pub const AGE_BRACKETS: [(&str, f64, f64); 4] = [
    ("New (0-3y)", 0.0, 3.0),
    ("Modern (4-8y)", 3.0, 8.0),
    ("Used (9-15y)", 8.0, 15.0),
    ("Classic (>15y)", 15.0, 100.0),
];

/// `None` when no listing carries a price
pub fn dataset_kpis(records: &[CarRecord]) -> Option<DatasetKpis> {
    let mut prices: Vec<f64> = records.iter().filter_map(|r| r.price_usd).collect();
    if prices.is_empty() {
        return None;
    }
    prices.sort_by(|a, b| a.total_cmp(b));

    let n = prices.len();
    let mean = prices.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    };
    let std_dev = if n > 1 {
        let var = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };

    Some(DatasetKpis {
        count: n,
        mean_price: mean,
        median_price: median,
        min_price: prices[0],
        max_price: prices[n - 1],
        std_dev_price: std_dev,
    })
}

fn group_means<'a>(
    records: &'a [CarRecord],
    key: impl Fn(&'a CarRecord) -> Option<&'a str>,
) -> Vec<GroupStat> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in records {
        if let (Some(k), Some(price)) = (key(record), record.price_usd) {
            let entry = groups.entry(k).or_default();
            entry.0 += price;
            entry.1 += 1;
        }
    }

    let mut stats: Vec<GroupStat> = groups
        .into_iter()
        .map(|(group, (sum, count))| GroupStat {
            group: group.to_string(),
            avg_price: sum / count as f64,
            count,
        })
        .collect();
    stats.sort_by(|a, b| b.avg_price.total_cmp(&a.avg_price));
    stats
}

/// Most expensive brands on average, at most `top_n`
pub fn price_by_brand(records: &[CarRecord], top_n: usize) -> Vec<GroupStat> {
    let mut stats = group_means(records, |r| r.brand.as_deref());
    stats.truncate(top_n);
    stats
}

pub fn price_by_body(records: &[CarRecord]) -> Vec<GroupStat> {
    group_means(records, |r| r.body_type.as_deref())
}

/// Average price per age bracket, in bracket order; empty brackets omitted.
///
/// Brackets are right-inclusive, so a brand-new car (age 0) falls in none.
pub fn price_by_age_bracket(records: &[CarRecord], builder: &FeatureBuilder) -> Vec<GroupStat> {
    let mut sums = [(0.0, 0usize); AGE_BRACKETS.len()];
    for record in records {
        let mut engineered = record.clone();
        builder.engineer(&mut engineered);
        let (Some(age), Some(price)) = (engineered.car_age, engineered.price_usd) else {
            continue;
        };
        if let Some(idx) = AGE_BRACKETS
            .iter()
            .position(|(_, low, high)| age > *low && age <= *high)
        {
            sums[idx].0 += price;
            sums[idx].1 += 1;
        }
    }

    AGE_BRACKETS
        .iter()
        .zip(sums)
        .filter(|(_, (_, count))| *count > 0)
        .map(|((label, _, _), (sum, count))| GroupStat {
            group: label.to_string(),
            avg_price: sum / count as f64,
            count,
        })
        .collect()
}

/// Pearson correlation of `x` and `y`; `None` if either is constant
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Correlation of each numeric column with `Price_USD`, strongest positive first.
///
/// Pairs with a missing value are skipped per column; columns without a
/// defined correlation are omitted.
pub fn correlation_with_price(
    records: &[CarRecord],
    builder: &FeatureBuilder,
) -> Vec<(String, f64)> {
    let engineered: Vec<CarRecord> = records
        .iter()
        .map(|r| {
            let mut r = r.clone();
            builder.engineer(&mut r);
            r
        })
        .collect();

    let columns: [(&str, fn(&CarRecord) -> Option<f64>); 6] = [
        ("Year", |r| r.year.map(f64::from)),
        ("Horsepower", |r| r.horsepower),
        ("Engine_CC", |r| r.engine_cc),
        ("Mileage_km_per_l", |r| r.mileage_km_per_l),
        ("Car_Age", |r| r.car_age),
        ("HP_per_CC", |r| r.hp_per_cc),
    ];

    let mut out: Vec<(String, f64)> = columns
        .iter()
        .filter_map(|(name, get)| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = engineered
                .iter()
                .filter_map(|r| Some((get(r)?, r.price_usd?)))
                .unzip();
            pearson(&xs, &ys).map(|c| (name.to_string(), c))
        })
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}
