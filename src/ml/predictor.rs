//! Online price prediction against a loaded bundle
//!
//! Missing inputs are filled from the bundle's declared feature kinds
//! (numeric → `0.0`, categorical → `"Unknown"`), so an optional field never
//! makes a prediction fail. Only records too sparse to say anything
//! meaningful are refused.
//!
//! ```ignore
//! let bundle = FileBundleStore::new("models/price_model.json").load()?;
//! let price = PricePredictor::default().predict(&bundle, &features)?;
//! ```

use super::bundle::ModelBundle;
use super::features::{
    describe_features, FeatureBuilder, FeatureKind, FeatureRecord, FeatureValue, UNKNOWN_CATEGORY,
};
use super::pipeline::FittedModel;
use crate::config::ValuationConfig;
use crate::error::{Result, ValuatorError};
use crate::types::CarRecord;

pub const DEFAULT_MIN_KNOWN_FEATURES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct PricePredictor {
    min_known_features: usize,
}

impl Default for PricePredictor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_KNOWN_FEATURES)
    }
}

impl PricePredictor {
    pub fn new(min_known_features: usize) -> Self {
        Self { min_known_features }
    }

    pub fn from_config(config: &ValuationConfig) -> Self {
        Self::new(config.min_known_features)
    }

    /// Build the complete row the pipeline expects
    pub fn resolve<M>(
        &self,
        bundle: &ModelBundle<M>,
        record: &FeatureRecord,
    ) -> Result<FeatureRecord> {
        let mut resolved = FeatureRecord::new();
        let mut defaulted = Vec::new();

        for spec in &bundle.features_used {
            let value = match (spec.kind, record.get(&spec.name)) {
                (FeatureKind::Numeric, Some(FeatureValue::Numeric(v))) => FeatureValue::Numeric(*v),
                (FeatureKind::Numeric, Some(FeatureValue::Categorical(s))) => {
                    let parsed = s.trim().parse::<f64>().map_err(|_| {
                        ValuatorError::FeatureMismatch(format!(
                            "{} expects a number, got '{}'",
                            spec.name, s
                        ))
                    })?;
                    FeatureValue::Numeric(parsed)
                }
                (FeatureKind::Categorical, Some(FeatureValue::Categorical(s))) => {
                    FeatureValue::Categorical(s.clone())
                }
                (FeatureKind::Categorical, Some(FeatureValue::Numeric(v))) => {
                    FeatureValue::Categorical(v.to_string())
                }
                (FeatureKind::Numeric, None) => {
                    defaulted.push(spec.name.as_str());
                    FeatureValue::Numeric(0.0)
                }
                (FeatureKind::Categorical, None) => {
                    defaulted.push(spec.name.as_str());
                    FeatureValue::Categorical(UNKNOWN_CATEGORY.to_string())
                }
            };
            resolved.insert(spec.name.clone(), value);
        }

        let known = bundle.features_used.len() - defaulted.len();
        if known < self.min_known_features {
            return Err(ValuatorError::FeatureMismatch(format!(
                "only {} of {} features supplied (need {}); missing: {}",
                known,
                bundle.features_used.len(),
                self.min_known_features,
                defaulted.join(", ")
            )));
        }
        if !defaulted.is_empty() {
            tracing::warn!("Defaulted missing features: {}", defaulted.join(", "));
        }

        Ok(resolved)
    }

    /// Point estimate in dollars
    pub fn predict<M: FittedModel>(
        &self,
        bundle: &ModelBundle<M>,
        record: &FeatureRecord,
    ) -> Result<f64> {
        let resolved = self.resolve(bundle, record)?;

        let raw = bundle
            .pipeline
            .predict_row(&resolved)
            .map_err(|e| ValuatorError::Computation {
                record: describe_features(record),
                reason: e.to_string(),
            })?;

        let price = if bundle.use_log_target { raw.exp_m1() } else { raw };
        if !price.is_finite() {
            return Err(ValuatorError::Computation {
                record: describe_features(record),
                reason: format!("non-finite prediction {}", price),
            });
        }

        tracing::debug!("Predicted ${:.2} for {}", price, describe_features(record));
        Ok(price)
    }

    /// Engineer a raw car against the bundle's reference year, then predict
    pub fn predict_car<M: FittedModel>(
        &self,
        bundle: &ModelBundle<M>,
        car: &CarRecord,
    ) -> Result<f64> {
        let features = FeatureBuilder::new(bundle.reference_year).feature_record(car);
        self.predict(bundle, &features)
    }

    /// One result per record; a failing record never aborts the rest
    pub fn predict_batch<M: FittedModel>(
        &self,
        bundle: &ModelBundle<M>,
        records: &[FeatureRecord],
    ) -> Vec<Result<f64>> {
        records
            .iter()
            .map(|record| {
                let result = self.predict(bundle, record);
                if let Err(ref e) = result {
                    tracing::warn!("Prediction failed: {}", e);
                }
                result
            })
            .collect()
    }
}

/// Predict with the default minimum-field policy
pub fn predict<M: FittedModel>(bundle: &ModelBundle<M>, record: &FeatureRecord) -> Result<f64> {
    PricePredictor::default().predict(bundle, record)
}
