//! Column preprocessing: standard scaling for numeric features and one-hot
//! encoding for categorical ones, bound to an ordered feature schema.

use super::features::{FeatureKind, FeatureRecord, FeatureSpec, FeatureValue};
use crate::error::{Result, ValuatorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Zero-mean / unit-variance scaling fit on training data only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    /// Fails when the column's mean or spread is not finite
    pub fn fit(column: &str, values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self { mean: 0.0, scale: 1.0 });
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        if !mean.is_finite() || !std_dev.is_finite() {
            return Err(ValuatorError::Data(format!(
                "column {} has non-finite scaling statistics (mean {}, std {})",
                column, mean, std_dev
            )));
        }

        // Constant columns pass through centred but unscaled
        let scale = if std_dev > f64::EPSILON { std_dev } else { 1.0 };
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// One-hot encoder; categories unseen at fit time encode as all zeros
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn encode_into(&self, value: &str, out: &mut Vec<f64>) {
        let start = out.len();
        out.resize(start + self.categories.len(), 0.0);
        if let Ok(idx) = self.categories.binary_search_by(|c| c.as_str().cmp(value)) {
            out[start + idx] = 1.0;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ColumnTransform {
    Scale(StandardScaler),
    OneHot(OneHotEncoder),
}

/// Fitted per-column transforms in schema order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: Vec<FeatureSpec>,
    columns: Vec<ColumnTransform>,
}

impl Preprocessor {
    /// Fit every column transform on the training rows.
    ///
    /// Rows must already carry every schema feature.
    pub fn fit(schema: &[FeatureSpec], rows: &[FeatureRecord]) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.len());

        for spec in schema {
            let column = match spec.kind {
                FeatureKind::Numeric => {
                    let values = rows
                        .iter()
                        .map(|row| numeric_value(row, &spec.name))
                        .collect::<Result<Vec<f64>>>()?;
                    ColumnTransform::Scale(StandardScaler::fit(&spec.name, &values)?)
                }
                FeatureKind::Categorical => {
                    let values = rows
                        .iter()
                        .map(|row| categorical_value(row, &spec.name))
                        .collect::<Result<Vec<String>>>()?;
                    ColumnTransform::OneHot(OneHotEncoder::fit(values.iter().map(String::as_str)))
                }
            };
            columns.push(column);
        }

        Ok(Self {
            schema: schema.to_vec(),
            columns,
        })
    }

    pub fn schema(&self) -> &[FeatureSpec] {
        &self.schema
    }

    /// Width of the encoded feature vector
    pub fn output_width(&self) -> usize {
        self.columns
            .iter()
            .map(|c| match c {
                ColumnTransform::Scale(_) => 1,
                ColumnTransform::OneHot(enc) => enc.width(),
            })
            .sum()
    }

    /// Encoded column names, e.g. `Horsepower`, `Brand=Toyota`
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.output_width());
        for (spec, column) in self.schema.iter().zip(&self.columns) {
            match column {
                ColumnTransform::Scale(_) => names.push(spec.name.clone()),
                ColumnTransform::OneHot(enc) => {
                    names.extend(enc.categories().iter().map(|c| format!("{}={}", spec.name, c)))
                }
            }
        }
        names
    }

    pub fn transform(&self, row: &FeatureRecord) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.output_width());
        for (spec, column) in self.schema.iter().zip(&self.columns) {
            match column {
                ColumnTransform::Scale(scaler) => {
                    out.push(scaler.transform(numeric_value(row, &spec.name)?));
                }
                ColumnTransform::OneHot(encoder) => {
                    encoder.encode_into(&categorical_value(row, &spec.name)?, &mut out);
                }
            }
        }
        Ok(out)
    }

    pub fn transform_all(&self, rows: &[FeatureRecord]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

/// Read a numeric feature, accepting numeric strings
pub fn numeric_value(row: &FeatureRecord, name: &str) -> Result<f64> {
    match row.get(name) {
        Some(FeatureValue::Numeric(v)) => Ok(*v),
        Some(FeatureValue::Categorical(s)) => s.trim().parse::<f64>().map_err(|_| {
            ValuatorError::FeatureMismatch(format!("{} expects a number, got '{}'", name, s))
        }),
        None => Err(ValuatorError::FeatureMismatch(format!("missing feature {}", name))),
    }
}

/// Read a categorical feature, stringifying numbers
pub fn categorical_value(row: &FeatureRecord, name: &str) -> Result<String> {
    match row.get(name) {
        Some(FeatureValue::Categorical(s)) => Ok(s.clone()),
        Some(FeatureValue::Numeric(v)) => Ok(v.to_string()),
        None => Err(ValuatorError::FeatureMismatch(format!("missing feature {}", name))),
    }
}
