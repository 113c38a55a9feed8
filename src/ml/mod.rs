//! Price model
//!
//! Provides the used-car price model with:
//! - Feature engineering shared by training and inference
//! - Standard scaling and one-hot encoding
//! - A seeded random forest regressor on a log-price target
//! - Training with outlier clipping and held-out evaluation
//! - Bundle persistence and tolerant online prediction

pub mod bundle;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod pipeline;
pub mod predictor;
pub mod preprocess;
pub mod trainer;


pub use bundle::{BundleStore, FileBundleStore, ModelBundle};
pub use features::{
    categorical_features, feature_schema, numeric_features, FeatureBuilder, FeatureKind,
    FeatureRecord, FeatureSpec, FeatureValue,
};
pub use forest::{ForestConfig, RandomForest};
pub use pipeline::{Estimator, FittedModel, FittedPipeline, ForestPipeline};
pub use predictor::{predict, PricePredictor};
pub use preprocess::Preprocessor;
pub use trainer::{train, Trainer, TrainingReport};
