//! Listing data sources

use crate::error::{Result, ValuatorError};
use crate::types::CarRecord;
use std::path::{Path, PathBuf};

/// Anything that can produce a full listing dataset
pub trait DataSource {
    fn load(&self) -> Result<Vec<CarRecord>>;
}

/// CSV file with a header row of dataset column names
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    path: PathBuf,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for CsvDataSource {
    fn load(&self) -> Result<Vec<CarRecord>> {
        if !self.path.is_file() {
            return Err(ValuatorError::Data(format!(
                "dataset not found at {}",
                self.path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<CarRecord>().enumerate() {
            let record = row.map_err(|e| {
                ValuatorError::Data(format!(
                    "{} row {}: {}",
                    self.path.display(),
                    idx + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        tracing::info!("Loaded {} listings from {}", records.len(), self.path.display());
        Ok(records)
    }
}
