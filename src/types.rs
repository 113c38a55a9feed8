//! Core data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// One vehicle listing.
///
/// Field names follow the dataset columns. Every field is optional so that
/// partial inputs can be represented; training and prediction decide what is
/// actually required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarRecord {
    #[serde(rename = "Brand", default)]
    pub brand: Option<String>,
    #[serde(rename = "Body_Type", default)]
    pub body_type: Option<String>,
    #[serde(rename = "Year", default)]
    pub year: Option<i32>,
    #[serde(rename = "Manufacture_Year", default, skip_serializing_if = "Option::is_none")]
    pub manufacture_year: Option<i32>,
    #[serde(rename = "Horsepower", default)]
    pub horsepower: Option<f64>,
    #[serde(rename = "Engine_CC", default)]
    pub engine_cc: Option<f64>,
    #[serde(rename = "Fuel_Type", default)]
    pub fuel_type: Option<String>,
    #[serde(rename = "Transmission", default)]
    pub transmission: Option<String>,
    #[serde(rename = "Mileage_km_per_l", default)]
    pub mileage_km_per_l: Option<f64>,
    #[serde(rename = "Price_USD", default)]
    pub price_usd: Option<f64>,
    #[serde(rename = "Car_Age", default, skip_serializing_if = "Option::is_none")]
    pub car_age: Option<f64>,
    #[serde(rename = "HP_per_CC", default, skip_serializing_if = "Option::is_none")]
    pub hp_per_cc: Option<f64>,
}

impl CarRecord {
    /// Short human-readable label used in logs and error context
    pub fn describe(&self) -> String {
        format!(
            "{} {} ({})",
            self.brand.as_deref().unwrap_or("?"),
            self.body_type.as_deref().unwrap_or("?"),
            self.year
                .or(self.manufacture_year)
                .map(|y| y.to_string())
                .unwrap_or_else(|| "?".to_string()),
        )
    }
}

/// Outcome of comparing a listed price with the estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealLabel {
    GreatDeal,
    FairPrice,
    Overpriced,
}

impl DealLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealLabel::GreatDeal => "Great Deal",
            DealLabel::FairPrice => "Fair Price",
            DealLabel::Overpriced => "Overpriced",
        }
    }
}

impl fmt::Display for DealLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fair-price band and classification for one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealResult {
    pub label: DealLabel,
    pub lower: f64,
    pub upper: f64,
    /// Model R² expressed as a 0-100 percentage
    pub confidence_score: f64,
}

/// Held-out evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Coefficient of determination on the log-scale test split
    pub r2: f64,
    /// Mean absolute error in dollars
    pub mae: f64,
}
