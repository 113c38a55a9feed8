//! Transform-and-regress pipeline
//!
//! The trainer only needs the capability "fit on feature rows, then predict a
//! row"; [`Estimator`] and [`FittedModel`] describe that. The default
//! implementation chains the [`Preprocessor`] with a [`RandomForest`].

use super::features::{FeatureRecord, FeatureSpec};
use super::forest::{ForestConfig, RandomForest};
use super::preprocess::Preprocessor;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// Something that can be trained into a [`FittedModel`]
pub trait Estimator {
    type Fitted: FittedModel;

    /// Name recorded in bundles and prediction logs
    fn model_type(&self) -> &str;

    fn fit(
        &self,
        schema: &[FeatureSpec],
        rows: &[FeatureRecord],
        targets: &[f64],
        abort: Option<&AtomicBool>,
    ) -> Result<Self::Fitted>;
}

/// A trained model mapping a complete feature row to a (log-scale) target
pub trait FittedModel {
    fn predict_row(&self, row: &FeatureRecord) -> Result<f64>;

    fn predict_rows(&self, rows: &[FeatureRecord]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Scaling + one-hot encoding followed by a random forest
#[derive(Debug, Clone, Default)]
pub struct ForestPipeline {
    pub forest: ForestConfig,
}

impl ForestPipeline {
    pub fn new(forest: ForestConfig) -> Self {
        Self { forest }
    }
}

impl Estimator for ForestPipeline {
    type Fitted = FittedPipeline;

    fn model_type(&self) -> &str {
        "RandomForestRegressor"
    }

    fn fit(
        &self,
        schema: &[FeatureSpec],
        rows: &[FeatureRecord],
        targets: &[f64],
        abort: Option<&AtomicBool>,
    ) -> Result<FittedPipeline> {
        let preprocessor = Preprocessor::fit(schema, rows)?;
        let x = preprocessor.transform_all(rows)?;
        tracing::debug!(
            "Encoded {} rows into {} columns",
            x.len(),
            preprocessor.output_width()
        );
        let forest = RandomForest::fit_with_abort(&self.forest, &x, targets, abort)?;
        Ok(FittedPipeline {
            preprocessor,
            forest,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    preprocessor: Preprocessor,
    forest: RandomForest,
}

impl FittedPipeline {
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Encoded column names paired with their importances, highest first
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .preprocessor
            .output_names()
            .into_iter()
            .zip(self.forest.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl FittedModel for FittedPipeline {
    fn predict_row(&self, row: &FeatureRecord) -> Result<f64> {
        let encoded = self.preprocessor.transform(row)?;
        Ok(self.forest.predict_one(&encoded))
    }

    fn predict_rows(&self, rows: &[FeatureRecord]) -> Result<Vec<f64>> {
        let encoded = self.preprocessor.transform_all(rows)?;
        Ok(self.forest.predict(&encoded))
    }
}
