//! Configuration management
//!
//! Layered as: optional TOML file → `CAR_VALUATOR__*` environment variables.
//! A `.env` file is loaded first when present.

use crate::error::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub valuation: ValuationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// CSV file with raw car records
    #[serde(default = "default_data_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Single bundle slot; training overwrites it
    #[serde(default = "default_model_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValuationConfig {
    /// "As-of" year used for `Car_Age`
    #[serde(default = "default_reference_year")]
    pub reference_year: i32,
    /// Relative half-width of the fair-price band
    #[serde(default = "default_band_pct")]
    pub band_pct: f64,
    /// Share of the model MAE used as the absolute band floor
    #[serde(default = "default_mae_factor")]
    pub mae_factor: f64,
    /// Fewer supplied features than this and the predictor refuses
    #[serde(default = "default_min_known_features")]
    pub min_known_features: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Features tried per split; all when unset
    #[serde(default)]
    pub max_features: Option<usize>,
    #[serde(default = "default_true")]
    pub bootstrap: bool,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_data_path() -> String {
    "data/cars.csv".to_string()
}

fn default_model_path() -> String {
    "models/price_model.json".to_string()
}

fn default_database_path() -> String {
    "logs/predictions.db".to_string()
}

fn default_reference_year() -> i32 {
    2026
}

fn default_band_pct() -> f64 {
    0.07
}

fn default_mae_factor() -> f64 {
    0.8
}

fn default_min_known_features() -> usize {
    3
}

fn default_n_trees() -> usize {
    300
}

fn default_max_depth() -> usize {
    20
}

fn default_min_samples_split() -> usize {
    5
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { path: default_data_path() }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { path: default_model_path() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            reference_year: default_reference_year(),
            band_pct: default_band_pct(),
            mae_factor: default_mae_factor(),
            min_known_features: default_min_known_features(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            bootstrap: true,
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from file (if it exists) and environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CAR_VALUATOR")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn data_path(&self) -> PathBuf {
        expand_path(&self.data.path)
    }

    pub fn model_path(&self) -> PathBuf {
        expand_path(&self.model.path)
    }

    pub fn database_path(&self) -> PathBuf {
        expand_path(&self.database.path)
    }

    /// Create the model and log directories.
    ///
    /// Called once by the process entry point; nothing in the library
    /// touches the filesystem at load time.
    pub fn init_dirs(&self) -> Result<()> {
        for path in [self.model_path(), self.database_path()] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("Failed to expand path {}: {}", path, e);
            PathBuf::from(path)
        }
    }
}
