//! Feature engineering and the canonical feature schema
//!
//! Training and inference both go through [`FeatureBuilder`] so the derived
//! columns (`Car_Age`, `HP_per_CC`) are computed identically on both sides.

use crate::types::CarRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category substituted when a categorical input is missing
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// How a feature is treated by the preprocessing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Standard-scaled; defaults to `0.0` when absent
    Numeric,
    /// One-hot encoded; defaults to [`UNKNOWN_CATEGORY`] when absent
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    fn new(name: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

pub const NUMERIC_FEATURES: [&str; 5] = [
    "Engine_CC",
    "Horsepower",
    "Mileage_km_per_l",
    "Car_Age",
    "HP_per_CC",
];

pub const CATEGORICAL_FEATURES: [&str; 4] = ["Brand", "Body_Type", "Fuel_Type", "Transmission"];

pub const TARGET_COLUMN: &str = "Price_USD";

/// Ordered schema: numeric group first, then categorical.
///
/// A fitted pipeline is bound to this order; changing it invalidates
/// previously trained bundles.
pub fn feature_schema() -> Vec<FeatureSpec> {
    NUMERIC_FEATURES
        .iter()
        .map(|n| FeatureSpec::new(n, FeatureKind::Numeric))
        .chain(
            CATEGORICAL_FEATURES
                .iter()
                .map(|n| FeatureSpec::new(n, FeatureKind::Categorical)),
        )
        .collect()
}

/// Names of the schema's numeric features, in schema order
pub fn numeric_features(schema: &[FeatureSpec]) -> Vec<&str> {
    names_of_kind(schema, FeatureKind::Numeric)
}

/// Names of the schema's categorical features, in schema order
pub fn categorical_features(schema: &[FeatureSpec]) -> Vec<&str> {
    names_of_kind(schema, FeatureKind::Categorical)
}

fn names_of_kind(schema: &[FeatureSpec], kind: FeatureKind) -> Vec<&str> {
    schema
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.name.as_str())
        .collect()
}

/// A single feature value as fed to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Numeric(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Categorical(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Categorical(v)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Numeric(v) => write!(f, "{}", v),
            FeatureValue::Categorical(s) => f.write_str(s),
        }
    }
}

/// Feature name → value. Absent keys are substituted by the predictor.
pub type FeatureRecord = BTreeMap<String, FeatureValue>;

/// Compact `k=v` rendering used as error context
pub fn describe_features(record: &FeatureRecord) -> String {
    record
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Derives engineered features relative to a fixed reference year
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    reference_year: i32,
}

impl FeatureBuilder {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Fill `Year` (from `Manufacture_Year`), `Car_Age` and `HP_per_CC`
    pub fn engineer(&self, record: &mut CarRecord) {
        if record.year.is_none() {
            record.year = record.manufacture_year;
        }

        if let Some(year) = record.year {
            if !(1900..=self.reference_year + 1).contains(&year) {
                tracing::warn!("Implausible model year {} for {}", year, record.describe());
            }
            record.car_age = Some(f64::from(self.reference_year - year));
        }

        if let (Some(hp), Some(cc)) = (record.horsepower, record.engine_cc) {
            // +1 keeps the ratio finite for a zero displacement
            record.hp_per_cc = Some(hp / (cc + 1.0));
        }
    }

    pub fn engineer_batch(&self, records: &mut [CarRecord]) {
        for record in records.iter_mut() {
            self.engineer(record);
        }
    }

    /// Project an engineered record onto the schema, skipping absent fields
    pub fn feature_record(&self, record: &CarRecord) -> FeatureRecord {
        let mut engineered = record.clone();
        self.engineer(&mut engineered);

        let numeric = [
            ("Engine_CC", engineered.engine_cc),
            ("Horsepower", engineered.horsepower),
            ("Mileage_km_per_l", engineered.mileage_km_per_l),
            ("Car_Age", engineered.car_age),
            ("HP_per_CC", engineered.hp_per_cc),
        ];
        let categorical = [
            ("Brand", engineered.brand),
            ("Body_Type", engineered.body_type),
            ("Fuel_Type", engineered.fuel_type),
            ("Transmission", engineered.transmission),
        ];

        let mut out = FeatureRecord::new();
        for (name, value) in numeric {
            if let Some(v) = value {
                out.insert(name.to_string(), FeatureValue::Numeric(v));
            }
        }
        for (name, value) in categorical {
            if let Some(v) = value {
                out.insert(name.to_string(), FeatureValue::Categorical(v));
            }
        }
        out
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending and non-empty; `q` is in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Drop records priced strictly outside the 1st–99th percentile band.
///
/// Training-time cleaning only. Records without a price are kept here and
/// rejected later by training validation.
pub fn clip_price_outliers(records: Vec<CarRecord>) -> Vec<CarRecord> {
    let mut prices: Vec<f64> = records.iter().filter_map(|r| r.price_usd).collect();
    if prices.is_empty() {
        return records;
    }
    prices.sort_by(|a, b| a.total_cmp(b));

    let low = quantile(&prices, 0.01);
    let high = quantile(&prices, 0.99);

    let before = records.len();
    let kept: Vec<CarRecord> = records
        .into_iter()
        .filter(|r| match r.price_usd {
            Some(p) => p >= low && p <= high,
            None => true,
        })
        .collect();

    tracing::debug!(
        "Price clipping [{:.2}, {:.2}] removed {} of {} records",
        low,
        high,
        before - kept.len(),
        before
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CarRecord {
        CarRecord {
            brand: Some("Toyota".into()),
            body_type: Some("Sedan".into()),
            year: Some(2016),
            horsepower: Some(150.0),
            engine_cc: Some(1999.0),
            fuel_type: Some("Petrol".into()),
            transmission: Some("Automatic".into()),
            mileage_km_per_l: Some(14.0),
            price_usd: Some(15000.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_schema_order() {
        let schema = feature_schema();
        assert_eq!(schema.len(), 9);
        assert_eq!(schema[0].name, "Engine_CC");
        assert_eq!(schema[4].name, "HP_per_CC");
        assert_eq!(schema[5].name, "Brand");
        assert!(schema[..5].iter().all(|s| s.kind == FeatureKind::Numeric));
        assert!(schema[5..].iter().all(|s| s.kind == FeatureKind::Categorical));
    }

    #[test]
    fn test_kind_helpers_follow_schema() {
        let schema = feature_schema();
        assert_eq!(numeric_features(&schema), NUMERIC_FEATURES.to_vec());
        assert_eq!(categorical_features(&schema), CATEGORICAL_FEATURES.to_vec());
    }

    #[test]
    fn test_engineer_derives_age_and_ratio() {
        let builder = FeatureBuilder::new(2026);
        let mut record = sample_record();
        builder.engineer(&mut record);
        assert_eq!(record.car_age, Some(10.0));
        assert!((record.hp_per_cc.unwrap() - 150.0 / 2000.0).abs() < 1e-12);
    }

    #[test]
    fn test_engineer_uses_manufacture_year() {
        let builder = FeatureBuilder::new(2026);
        let mut record = CarRecord {
            manufacture_year: Some(2020),
            ..Default::default()
        };
        builder.engineer(&mut record);
        assert_eq!(record.year, Some(2020));
        assert_eq!(record.car_age, Some(6.0));
        assert!(record.hp_per_cc.is_none());
    }

    #[test]
    fn test_reference_year_is_injected() {
        let mut record = sample_record();
        FeatureBuilder::new(2030).engineer(&mut record);
        assert_eq!(record.car_age, Some(14.0));
    }

    #[test]
    fn test_zero_displacement_ratio_is_finite() {
        let builder = FeatureBuilder::new(2026);
        let mut record = CarRecord {
            horsepower: Some(100.0),
            engine_cc: Some(0.0),
            ..Default::default()
        };
        builder.engineer(&mut record);
        assert_eq!(record.hp_per_cc, Some(100.0));
    }

    #[test]
    fn test_feature_record_skips_absent_fields() {
        let builder = FeatureBuilder::new(2026);
        let mut record = sample_record();
        record.mileage_km_per_l = None;
        let features = builder.feature_record(&record);
        assert_eq!(features.len(), 8);
        assert!(!features.contains_key("Mileage_km_per_l"));
        assert_eq!(features.get("Car_Age"), Some(&FeatureValue::Numeric(10.0)));
        assert_eq!(features.get("Brand"), Some(&FeatureValue::Categorical("Toyota".into())));
    }

    #[test]
    fn test_feature_value_untagged_json() {
        let mut features = FeatureRecord::new();
        features.insert("Horsepower".into(), 120.0.into());
        features.insert("Brand".into(), "Kia".into());
        let json = serde_json::to_string(&features).unwrap();
        assert_eq!(json, r#"{"Brand":"Kia","Horsepower":120.0}"#);
        let back: FeatureRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);
    }

    #[test]
    fn test_quantile_interpolates() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        assert!((quantile(&values, 0.01) - 1.0).abs() < 1e-12);
        assert!((quantile(&values, 0.99) - 99.0).abs() < 1e-12);
        assert!((quantile(&[1.0, 2.0], 0.5) - 1.5).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn test_clip_drops_extreme_prices() {
        let mut records: Vec<CarRecord> = (1..=200)
            .map(|i| CarRecord {
                price_usd: Some(10_000.0 + f64::from(i) * 10.0),
                ..Default::default()
            })
            .collect();
        records.push(CarRecord {
            price_usd: Some(5_000_000.0),
            ..Default::default()
        });

        let kept = clip_price_outliers(records);
        assert!(kept.iter().all(|r| r.price_usd.unwrap() < 5_000_000.0));
        // the cheapest few also fall under the 1st percentile
        assert!(kept.len() < 201);
        assert!(kept.len() >= 195);
    }

    #[test]
    fn test_clip_keeps_boundary_values() {
        let records: Vec<CarRecord> = (0..10)
            .map(|_| CarRecord {
                price_usd: Some(20_000.0),
                ..Default::default()
            })
            .collect();
        assert_eq!(clip_price_outliers(records).len(), 10);
    }
}
