//! Prediction log persistence
//!
//! Every served prediction is appended to a SQLite table so listings can be
//! reviewed later. Ids autoincrement, which keeps `read_all` in call order.

#[cfg(test)]
mod tests;

use crate::error::Result;
use crate::ml::FeatureRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// A prediction about to be logged
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub model_type: String,
    pub use_log_target: bool,
    pub features: FeatureRecord,
    pub predicted_price: f64,
    pub listed_price: Option<f64>,
    pub deal_label: Option<String>,
}

/// A stored prediction
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionLogEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub model_type: String,
    pub use_log_target: bool,
    pub features_json: String,
    pub predicted_price: f64,
    pub listed_price: Option<f64>,
    /// `predicted_price - listed_price`
    pub diff_amount: Option<f64>,
    pub deal_label: Option<String>,
}

impl PredictionLogEntry {
    pub fn features(&self) -> Result<FeatureRecord> {
        Ok(serde_json::from_str(&self.features_json)?)
    }
}

/// Append-only sink for served predictions
#[async_trait]
pub trait PredictionLog: Send + Sync {
    /// Store one prediction, returning its id
    async fn append(&self, entry: NewPrediction) -> Result<i64>;

    /// All entries, most recent first
    async fn read_all(&self) -> Result<Vec<PredictionLogEntry>>;

    /// At most `limit` entries, most recent first
    async fn read_recent(&self, limit: usize) -> Result<Vec<PredictionLogEntry>> {
        let mut entries = self.read_all().await?;
        entries.truncate(limit);
        Ok(entries)
    }
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS prediction_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    model_type TEXT NOT NULL,
    use_log_target INTEGER NOT NULL,
    features_json TEXT NOT NULL,
    predicted_price REAL NOT NULL,
    listed_price REAL,
    diff_amount REAL,
    deal_label TEXT
)
"#;

const SELECT_COLUMNS: &str = "SELECT id, created_at, model_type, use_log_target, features_json, \
     predicted_price, listed_price, diff_amount, deal_label FROM prediction_logs";

/// SQLite-backed prediction log
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and its table
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        tracing::debug!("Prediction log ready at {}", path.display());

        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM prediction_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PredictionLog for Database {
    async fn append(&self, entry: NewPrediction) -> Result<i64> {
        let features_json = serde_json::to_string(&entry.features)?;
        let diff_amount = entry.listed_price.map(|listed| entry.predicted_price - listed);

        let result = sqlx::query(
            "INSERT INTO prediction_logs (created_at, model_type, use_log_target, features_json, \
             predicted_price, listed_price, diff_amount, deal_label) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Utc::now())
        .bind(entry.model_type)
        .bind(entry.use_log_target)
        .bind(features_json)
        .bind(entry.predicted_price)
        .bind(entry.listed_price)
        .bind(diff_amount)
        .bind(entry.deal_label)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn read_all(&self) -> Result<Vec<PredictionLogEntry>> {
        let entries = sqlx::query_as::<_, PredictionLogEntry>(&format!(
            "{} ORDER BY id DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn read_recent(&self, limit: usize) -> Result<Vec<PredictionLogEntry>> {
        let entries = sqlx::query_as::<_, PredictionLogEntry>(&format!(
            "{} ORDER BY id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
