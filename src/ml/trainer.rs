//! Offline training: validation, cleaning, split, fit, evaluate, bundle

use super::bundle::ModelBundle;
use super::features::{clip_price_outliers, feature_schema, FeatureBuilder, FeatureRecord};
use super::forest::ForestConfig;
use super::metrics::{mean_absolute_error, r2_score};
use super::pipeline::{Estimator, FittedModel, ForestPipeline, FittedPipeline};
use crate::config::Config;
use crate::error::{Result, ValuatorError};
use crate::types::{CarRecord, ModelMetrics};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Rows needed after cleaning for a meaningful train/test split
pub const MIN_TRAINING_ROWS: usize = 5;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport<M = FittedPipeline> {
    pub bundle: ModelBundle<M>,
    /// Dataset size as supplied, before outlier clipping
    pub raw_rows: usize,
    /// Rows left after outlier clipping
    pub training_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl<M> TrainingReport<M> {
    pub fn metrics(&self) -> ModelMetrics {
        self.bundle.metrics
    }

    pub fn clipped_rows(&self) -> usize {
        self.raw_rows - self.training_rows
    }
}

pub struct Trainer<E = ForestPipeline> {
    estimator: E,
    builder: FeatureBuilder,
    test_fraction: f64,
    split_seed: u64,
    abort: Option<Arc<AtomicBool>>,
}

impl Trainer<ForestPipeline> {
    pub fn from_config(config: &Config) -> Self {
        let forest = ForestConfig::from(&config.training);
        Trainer::new(
            ForestPipeline::new(forest),
            FeatureBuilder::new(config.valuation.reference_year),
        )
        .with_split(config.training.test_fraction, config.training.seed)
    }
}

impl<E: Estimator> Trainer<E> {
    pub fn new(estimator: E, builder: FeatureBuilder) -> Self {
        Self {
            estimator,
            builder,
            test_fraction: 0.2,
            split_seed: 42,
            abort: None,
        }
    }

    pub fn with_split(mut self, test_fraction: f64, seed: u64) -> Self {
        self.test_fraction = test_fraction;
        self.split_seed = seed;
        self
    }

    /// Abort flag, checked between trees
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Train a bundle from raw records.
    ///
    /// Any validation failure aborts before fitting starts; nothing is
    /// persisted here, so a failed run never leaves a partial bundle.
    pub fn train(&self, records: &[CarRecord]) -> Result<TrainingReport<E::Fitted>> {
        if records.is_empty() {
            return Err(ValuatorError::Data("dataset is empty".into()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ValuatorError::Data(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }

        let raw_rows = records.len();
        let mut engineered = records.to_vec();
        self.builder.engineer_batch(&mut engineered);
        for (idx, record) in engineered.iter().enumerate() {
            validate_training_row(idx, record)?;
        }

        let cleaned = clip_price_outliers(engineered);
        let training_rows = cleaned.len();
        if training_rows < MIN_TRAINING_ROWS {
            return Err(ValuatorError::Data(format!(
                "need at least {} rows after outlier clipping, got {}",
                MIN_TRAINING_ROWS, training_rows
            )));
        }

        let rows: Vec<FeatureRecord> = cleaned
            .iter()
            .map(|r| self.builder.feature_record(r))
            .collect();
        // validated above: every cleaned row has a positive price
        let targets: Vec<f64> = cleaned
            .iter()
            .map(|r| r.price_usd.unwrap_or_default().ln_1p())
            .collect();

        let (train_idx, test_idx) =
            split_indices(training_rows, self.test_fraction, self.split_seed);
        let pick = |idx: &[usize]| -> (Vec<FeatureRecord>, Vec<f64>) {
            (
                idx.iter().map(|&i| rows[i].clone()).collect(),
                idx.iter().map(|&i| targets[i]).collect(),
            )
        };
        let (x_train, y_train) = pick(&train_idx);
        let (x_test, y_test) = pick(&test_idx);

        tracing::info!(
            "Training {} on {} samples ({} held out, {} clipped)",
            self.estimator.model_type(),
            x_train.len(),
            x_test.len(),
            raw_rows - training_rows
        );

        let schema = feature_schema();
        let fitted = self
            .estimator
            .fit(&schema, &x_train, &y_train, self.abort.as_deref())?;

        let y_pred = fitted.predict_rows(&x_test)?;
        let r2 = r2_score(&y_test, &y_pred);
        let actual_prices: Vec<f64> = y_test.iter().map(|v| v.exp_m1()).collect();
        let predicted_prices: Vec<f64> = y_pred.iter().map(|v| v.exp_m1()).collect();
        let mae = mean_absolute_error(&actual_prices, &predicted_prices);

        tracing::info!("Training finished: R²={:.4}, MAE=${:.2}", r2, mae);

        Ok(TrainingReport {
            bundle: ModelBundle {
                pipeline: fitted,
                features_used: schema,
                metrics: ModelMetrics { r2, mae },
                use_log_target: true,
                model_type: self.estimator.model_type().to_string(),
                reference_year: self.builder.reference_year(),
                trained_at: Utc::now(),
            },
            raw_rows,
            training_rows,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        })
    }
}

/// Train the default random-forest pipeline with settings from `config`
pub fn train(records: &[CarRecord], config: &Config) -> Result<TrainingReport> {
    Trainer::from_config(config).train(records)
}

fn validate_training_row(idx: usize, record: &CarRecord) -> Result<()> {
    let missing = |column: &str| {
        ValuatorError::Data(format!(
            "row {} ({}) is missing required column {}",
            idx,
            record.describe(),
            column
        ))
    };

    let text = [
        ("Brand", &record.brand),
        ("Body_Type", &record.body_type),
        ("Fuel_Type", &record.fuel_type),
        ("Transmission", &record.transmission),
    ];
    for (column, value) in text {
        if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(missing(column));
        }
    }

    if record.year.is_none() {
        return Err(missing("Year"));
    }

    let numeric = [
        ("Horsepower", record.horsepower),
        ("Engine_CC", record.engine_cc),
        ("Mileage_km_per_l", record.mileage_km_per_l),
        ("Price_USD", record.price_usd),
    ];
    for (column, value) in numeric {
        match value {
            None => return Err(missing(column)),
            Some(v) if !v.is_finite() => {
                return Err(ValuatorError::Data(format!(
                    "row {} has non-finite {}",
                    idx, column
                )))
            }
            Some(_) => {}
        }
    }

    let positive = [
        ("Horsepower", record.horsepower),
        ("Engine_CC", record.engine_cc),
        ("Price_USD", record.price_usd),
    ];
    for (column, value) in positive {
        if value.is_some_and(|v| v <= 0.0) {
            return Err(ValuatorError::Data(format!(
                "row {} ({}) has non-positive {}",
                idx,
                record.describe(),
                column
            )));
        }
    }

    if record.mileage_km_per_l.is_some_and(|v| v < 0.0) {
        return Err(ValuatorError::Data(format!(
            "row {} ({}) has negative Mileage_km_per_l",
            idx,
            record.describe()
        )));
    }
    Ok(())
}

/// Seeded shuffle then split; test size is `ceil(n * test_fraction)`
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let max_test = n.saturating_sub(1).max(1);
    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, max_test);
    let train = indices.split_off(n_test);
    (train, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FeatureSpec;
    use std::sync::atomic::Ordering;

    /// Predicts the training mean; keeps trainer tests fast
    struct MeanEstimator;

    #[derive(Debug)]
    struct MeanModel(f64);

    impl FittedModel for MeanModel {
        fn predict_row(&self, _row: &FeatureRecord) -> Result<f64> {
            Ok(self.0)
        }
    }

    impl Estimator for MeanEstimator {
        type Fitted = MeanModel;

        fn model_type(&self) -> &str {
            "Mean"
        }

        fn fit(
            &self,
            _schema: &[FeatureSpec],
            _rows: &[FeatureRecord],
            targets: &[f64],
            _abort: Option<&AtomicBool>,
        ) -> Result<MeanModel> {
            Ok(MeanModel(targets.iter().sum::<f64>() / targets.len() as f64))
        }
    }

    fn record(i: usize) -> CarRecord {
        CarRecord {
            brand: Some(["Toyota", "BMW", "Kia"][i % 3].into()),
            body_type: Some("Sedan".into()),
            year: Some(2010 + (i % 12) as i32),
            horsepower: Some(100.0 + i as f64),
            engine_cc: Some(1500.0 + (i % 10) as f64 * 100.0),
            fuel_type: Some("Petrol".into()),
            transmission: Some("Manual".into()),
            mileage_km_per_l: Some(12.0),
            price_usd: Some(10_000.0 + i as f64 * 50.0),
            ..Default::default()
        }
    }

    fn mean_trainer() -> Trainer<MeanEstimator> {
        Trainer::new(MeanEstimator, FeatureBuilder::new(2026))
    }

    #[test]
    fn test_split_sizes_and_disjoint() {
        let (train, test) = split_indices(101, 0.2, 42);
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(split_indices(50, 0.2, 7), split_indices(50, 0.2, 7));
        assert_ne!(split_indices(50, 0.2, 7).1, split_indices(50, 0.2, 8).1);
    }

    #[test]
    fn test_empty_dataset_fails_fast() {
        let err = mean_trainer().train(&[]).unwrap_err();
        assert!(matches!(err, ValuatorError::Data(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[3].transmission = None;
        let err = mean_trainer().train(&records).unwrap_err();
        match err {
            ValuatorError::Data(msg) => {
                assert!(msg.contains("row 3"));
                assert!(msg.contains("Transmission"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_manufacture_year_satisfies_year() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[0].year = None;
        records[0].manufacture_year = Some(2019);
        assert!(mean_trainer().train(&records).is_ok());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[5].price_usd = Some(0.0);
        assert!(matches!(
            mean_trainer().train(&records),
            Err(ValuatorError::Data(_))
        ));
    }

    fn rejected_column(records: &[CarRecord]) -> String {
        match mean_trainer().train(records).unwrap_err() {
            ValuatorError::Data(msg) => msg,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_negative_engine_cc_rejected() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[7].engine_cc = Some(-1.0);
        let msg = rejected_column(&records);
        assert!(msg.contains("row 7"));
        assert!(msg.contains("non-positive Engine_CC"));
    }

    #[test]
    fn test_zero_horsepower_rejected() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[4].horsepower = Some(0.0);
        let msg = rejected_column(&records);
        assert!(msg.contains("row 4"));
        assert!(msg.contains("non-positive Horsepower"));
    }

    #[test]
    fn test_negative_mileage_rejected() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[2].mileage_km_per_l = Some(-0.5);
        let msg = rejected_column(&records);
        assert!(msg.contains("row 2"));
        assert!(msg.contains("negative Mileage_km_per_l"));
    }

    #[test]
    fn test_zero_mileage_accepted() {
        let mut records: Vec<CarRecord> = (0..20).map(record).collect();
        records[2].mileage_km_per_l = Some(0.0);
        assert!(mean_trainer().train(&records).is_ok());
    }

    #[test]
    fn test_too_few_rows_rejected() {
        let records: Vec<CarRecord> = (0..3).map(record).collect();
        assert!(matches!(
            mean_trainer().train(&records),
            Err(ValuatorError::Data(ref m)) if m.contains("at least")
        ));
    }

    #[test]
    fn test_report_counts_and_bundle_metadata() {
        let records: Vec<CarRecord> = (0..100).map(record).collect();
        let report = mean_trainer().train(&records).unwrap();
        assert_eq!(report.raw_rows, 100);
        assert_eq!(report.training_rows + report.clipped_rows(), 100);
        assert_eq!(report.train_rows + report.test_rows, report.training_rows);
        assert!(report.bundle.use_log_target);
        assert_eq!(report.bundle.model_type, "Mean");
        assert_eq!(report.bundle.reference_year, 2026);
        assert_eq!(report.bundle.features_used.len(), 9);
        // a constant predictor is no better than the mean
        assert!(report.metrics().r2 <= 0.05);
        assert!(report.metrics().mae > 0.0);
    }

    #[test]
    fn test_abort_flag_cancels_forest_training() {
        let records: Vec<CarRecord> = (0..30).map(record).collect();
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::Relaxed);
        let trainer = Trainer::new(ForestPipeline::default(), FeatureBuilder::new(2026))
            .with_abort(flag);
        assert!(matches!(
            trainer.train(&records),
            Err(ValuatorError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_invalid_test_fraction() {
        let records: Vec<CarRecord> = (0..20).map(record).collect();
        let trainer = mean_trainer().with_split(1.0, 42);
        assert!(matches!(trainer.train(&records), Err(ValuatorError::Data(_))));
    }
}
