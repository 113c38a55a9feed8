//! Valuation HTTP API
//!
//! Serves predictions from the current bundle. The server never trains; when
//! no bundle is available prediction requests get a 503 until one is saved
//! and picked up (lazily, or through `POST /reload`).

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::deal::{round2, DealPolicy};
use crate::error::{Result, ValuatorError};
use crate::ml::{BundleStore, FeatureBuilder, ModelBundle, PricePredictor};
use crate::storage::{NewPrediction, PredictionLog, PredictionLogEntry};
use crate::types::{CarRecord, ModelMetrics};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Mileage assumed when a request leaves it out
pub const DEFAULT_MILEAGE_KM_PER_L: f64 = 15.0;
const DEFAULT_LOG_LIMIT: usize = 50;

/// State shared across handlers
pub struct ApiState {
    bundle: RwLock<Option<Arc<ModelBundle>>>,
    store: Arc<dyn BundleStore>,
    predictor: PricePredictor,
    policy: DealPolicy,
    log: Option<Arc<dyn PredictionLog>>,
    started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(store: Arc<dyn BundleStore>, predictor: PricePredictor, policy: DealPolicy) -> Self {
        Self {
            bundle: RwLock::new(None),
            store,
            predictor,
            policy,
            log: None,
            started_at: Utc::now(),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn BundleStore>) -> Self {
        Self::new(
            store,
            PricePredictor::from_config(&config.valuation),
            DealPolicy::from(&config.valuation),
        )
    }

    pub fn with_log(mut self, log: Arc<dyn PredictionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Replace the served bundle with whatever the store holds now
    pub fn reload(&self) -> Result<Arc<ModelBundle>> {
        let bundle = Arc::new(self.store.load()?);
        *self.bundle.write() = Some(bundle.clone());
        tracing::info!(
            "Serving {} bundle trained {} (r2={:.4})",
            bundle.model_type,
            bundle.trained_at,
            bundle.metrics.r2
        );
        Ok(bundle)
    }

    /// Current bundle, loading it on first use
    pub fn bundle(&self) -> Result<Arc<ModelBundle>> {
        let current = self.bundle.read().clone();
        match current {
            Some(bundle) => Ok(bundle),
            None => self.reload(),
        }
    }

    fn loaded(&self) -> Option<Arc<ModelBundle>> {
        self.bundle.read().clone()
    }
}

/// Error body returned to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Maps library errors onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub ValuatorError);

impl From<ValuatorError> for ApiError {
    fn from(err: ValuatorError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ValuatorError::ModelNotAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ValuatorError::FeatureMismatch(_) => StatusCode::BAD_REQUEST,
            ValuatorError::Computation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> String {
        if self.0.needs_training() {
            format!("{}; train the model first", self.0)
        } else {
            self.0.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }
        (status, Json(ErrorBody { detail: self.detail() })).into_response()
    }
}

/// Car description accepted by `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub brand: String,
    pub body_type: String,
    pub year: i32,
    pub horsepower: f64,
    pub engine_cc: f64,
    pub fuel_type: String,
    pub transmission: String,
    #[serde(default)]
    pub mileage_km_per_l: Option<f64>,
    /// Asking price; a deal analysis is included when positive
    #[serde(default)]
    pub listed_price: Option<f64>,
}

impl PredictRequest {
    pub fn to_car_record(&self) -> CarRecord {
        CarRecord {
            brand: Some(self.brand.clone()),
            body_type: Some(self.body_type.clone()),
            year: Some(self.year),
            horsepower: Some(self.horsepower),
            engine_cc: Some(self.engine_cc),
            fuel_type: Some(self.fuel_type.clone()),
            transmission: Some(self.transmission.clone()),
            mileage_km_per_l: Some(self.mileage_km_per_l.unwrap_or(DEFAULT_MILEAGE_KM_PER_L)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealAnalysis {
    pub label: String,
    pub fair_range: FairRange,
    /// Percentage string such as `"91.25%"`
    pub confidence_score: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub car_details: PredictRequest,
    pub ai_predicted_price: f64,
    pub deal_analysis: Option<DealAnalysis>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub model_loaded: bool,
    pub model_type: Option<String>,
    pub metrics: Option<ModelMetrics>,
    pub uptime_secs: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

// ============ HTTP API Handlers ============

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let bundle = state.loaded();
    Json(StatusResponse {
        status: "online".to_string(),
        message: "Car valuation API is running".to_string(),
        model_loaded: bundle.is_some(),
        model_type: bundle.as_ref().map(|b| b.model_type.clone()),
        metrics: bundle.as_ref().map(|b| b.metrics),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

async fn health_check() -> &'static str {
    "OK"
}

async fn predict(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PredictRequest>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let bundle = state.bundle()?;
    let car = request.to_car_record();
    let predicted = state.predictor.predict_car(&bundle, &car)?;

    let deal = request
        .listed_price
        .filter(|listed| *listed > 0.0)
        .map(|listed| {
            state
                .policy
                .evaluate(listed, predicted, bundle.metrics.mae, bundle.metrics.r2)
        });

    if let Some(log) = &state.log {
        let entry = NewPrediction {
            model_type: bundle.model_type.clone(),
            use_log_target: bundle.use_log_target,
            features: FeatureBuilder::new(bundle.reference_year).feature_record(&car),
            predicted_price: predicted,
            listed_price: request.listed_price.filter(|listed| *listed > 0.0),
            deal_label: deal.as_ref().map(|d| d.label.to_string()),
        };
        // a failed log write never fails the prediction
        if let Err(e) = log.append(entry).await {
            tracing::warn!("Failed to log prediction: {}", e);
        }
    }

    let deal_analysis = deal.map(|d| DealAnalysis {
        label: d.label.to_string(),
        fair_range: FairRange {
            lower: round2(d.lower),
            upper: round2(d.upper),
        },
        confidence_score: format!("{:.2}%", d.confidence_score),
    });

    Ok(Json(PredictResponse {
        car_details: request,
        ai_predicted_price: round2(predicted),
        deal_analysis,
    }))
}

async fn get_logs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LogsQuery>,
) -> std::result::Result<Json<Vec<PredictionLogEntry>>, ApiError> {
    let Some(log) = &state.log else {
        return Ok(Json(Vec::new()));
    };
    let entries = log
        .read_recent(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .await?;
    Ok(Json(entries))
}

async fn reload(
    State(state): State<Arc<ApiState>>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    state.reload()?;
    Ok(status(State(state)).await)
}

/// Create API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/logs", get(get_logs))
        .route("/reload", post(reload))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn start_server(state: Arc<ApiState>, host: &str, port: u16) -> Result<()> {
    if let Err(e) = state.bundle() {
        tracing::warn!("Starting without a model: {}", e);
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Valuation API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Valuation API stopped");
    Ok(())
}
