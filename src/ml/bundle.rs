//! Persisted model bundle and its single-slot store

use super::features::FeatureSpec;
use super::pipeline::FittedPipeline;
use crate::error::{Result, ValuatorError};
use crate::types::ModelMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Fitted pipeline plus everything needed to use and judge it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle<M = FittedPipeline> {
    pub pipeline: M,
    /// Ordered schema the pipeline was fit on
    pub features_used: Vec<FeatureSpec>,
    pub metrics: ModelMetrics,
    pub use_log_target: bool,
    pub model_type: String,
    /// Year `Car_Age` was computed against at training time
    pub reference_year: i32,
    pub trained_at: DateTime<Utc>,
}

impl<M> ModelBundle<M> {
    pub fn feature_names(&self) -> Vec<&str> {
        self.features_used.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Single-slot bundle persistence; last write wins
#[cfg_attr(test, mockall::automock)]
pub trait BundleStore: Send + Sync {
    fn save(&self, bundle: &ModelBundle) -> Result<()>;

    /// Fails with [`ValuatorError::ModelNotAvailable`] when nothing usable is stored
    fn load(&self) -> Result<ModelBundle>;

    fn exists(&self) -> bool;
}

/// JSON file on local disk
#[derive(Debug, Clone)]
pub struct FileBundleStore {
    path: PathBuf,
}

impl FileBundleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_json(path: &Path, bundle: &ModelBundle) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(&mut writer, bundle)?;
    writer.flush()?;
    Ok(())
}

impl BundleStore for FileBundleStore {
    fn save(&self, bundle: &ModelBundle) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write aside then rename so readers never observe a half-written bundle
        let tmp = self.temp_path();
        let written = write_json(&tmp, bundle)
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(ValuatorError::from));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::debug!("Could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e);
        }

        tracing::info!("Saved model bundle to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<ModelBundle> {
        let file = fs::File::open(&self.path).map_err(|e| {
            ValuatorError::ModelNotAvailable(format!("{}: {}", self.path.display(), e))
        })?;
        let bundle: ModelBundle = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ValuatorError::ModelNotAvailable(format!(
                "{} is not a readable bundle: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Loaded {} bundle (r2={:.4}, mae={:.2})",
            bundle.model_type,
            bundle.metrics.r2,
            bundle.metrics.mae
        );
        Ok(bundle)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}
