use super::*;
use crate::ml::bundle::MockBundleStore;
use crate::ml::{ForestConfig, ForestPipeline, Trainer};
use crate::storage::Database;
use crate::testing::{synthetic_cars, SYNTHETIC_REFERENCE_YEAR};
use crate::types::DealLabel;

fn trained_bundle() -> ModelBundle {
    let forest = ForestConfig {
        n_trees: 5,
        ..Default::default()
    };
    Trainer::new(
        ForestPipeline::new(forest),
        FeatureBuilder::new(SYNTHETIC_REFERENCE_YEAR),
    )
    .train(&synthetic_cars(80, 7))
    .unwrap()
    .bundle
}

fn store_with(bundle: ModelBundle, loads: usize) -> MockBundleStore {
    let mut store = MockBundleStore::new();
    store
        .expect_load()
        .times(loads)
        .returning(move || Ok(bundle.clone()));
    store
}

fn empty_store() -> MockBundleStore {
    let mut store = MockBundleStore::new();
    store
        .expect_load()
        .returning(|| Err(ValuatorError::ModelNotAvailable("models/price_model.json".into())));
    store
}

fn state(store: MockBundleStore) -> Arc<ApiState> {
    Arc::new(ApiState::new(
        Arc::new(store),
        PricePredictor::default(),
        DealPolicy::default(),
    ))
}

fn request(listed_price: Option<f64>) -> PredictRequest {
    PredictRequest {
        brand: "Toyota".into(),
        body_type: "Sedan".into(),
        year: 2019,
        horsepower: 180.0,
        engine_cc: 2000.0,
        fuel_type: "Petrol".into(),
        transmission: "Automatic".into(),
        mileage_km_per_l: None,
        listed_price,
    }
}

#[tokio::test]
async fn test_health_check() {
    assert_eq!(health_check().await, "OK");
}

#[tokio::test]
async fn test_status_before_model_loaded() {
    let Json(body) = status(State(state(MockBundleStore::new()))).await;
    assert_eq!(body.status, "online");
    assert!(!body.model_loaded);
    assert!(body.metrics.is_none());
}

#[tokio::test]
async fn test_predict_without_model_is_503() {
    let result = predict(State(state(empty_store())), Json(request(Some(20_000.0)))).await;
    let Err(err) = result else {
        panic!("prediction should fail without a model");
    };
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(err.detail().contains("train the model first"));
}

#[tokio::test]
async fn test_predict_with_deal_analysis() {
    let state = state(store_with(trained_bundle(), 1));
    let Json(body) = predict(State(state.clone()), Json(request(Some(1_000.0))))
        .await
        .unwrap();

    assert!(body.ai_predicted_price > 0.0);
    assert_eq!(body.car_details.brand, "Toyota");
    let deal = body.deal_analysis.unwrap();
    assert_eq!(deal.label, DealLabel::GreatDeal.to_string());
    assert!(deal.fair_range.lower < body.ai_predicted_price);
    assert!(deal.fair_range.upper > body.ai_predicted_price);
    assert!(deal.confidence_score.ends_with('%'));

    // second request reuses the cached bundle; the mock allows one load
    let Json(again) = predict(State(state.clone()), Json(request(None))).await.unwrap();
    assert_eq!(again.ai_predicted_price, body.ai_predicted_price);

    let Json(status) = status(State(state)).await;
    assert!(status.model_loaded);
    assert_eq!(status.model_type.as_deref(), Some("RandomForestRegressor"));
}

#[tokio::test]
async fn test_non_positive_listed_price_skips_deal() {
    let state = state(store_with(trained_bundle(), 1));
    let Json(body) = predict(State(state), Json(request(Some(0.0)))).await.unwrap();
    assert!(body.deal_analysis.is_none());
}

#[tokio::test]
async fn test_predictions_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::connect(dir.path().join("predictions.db")).await.unwrap());
    let state = Arc::new(
        ApiState::new(
            Arc::new(store_with(trained_bundle(), 1)),
            PricePredictor::default(),
            DealPolicy::default(),
        )
        .with_log(db.clone()),
    );

    predict(State(state.clone()), Json(request(Some(500_000.0))))
        .await
        .unwrap();
    predict(State(state.clone()), Json(request(None)))
        .await
        .unwrap();

    let Json(entries) = get_logs(State(state), Query(LogsQuery { limit: Some(10) }))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].deal_label, None);
    assert_eq!(entries[1].deal_label.as_deref(), Some("Overpriced"));
    assert_eq!(entries[1].listed_price, Some(500_000.0));

    let features = entries[1].features().unwrap();
    assert_eq!(
        features.get("Mileage_km_per_l"),
        Some(&crate::ml::FeatureValue::Numeric(DEFAULT_MILEAGE_KM_PER_L))
    );
    assert_eq!(
        features.get("Car_Age"),
        Some(&crate::ml::FeatureValue::Numeric(7.0))
    );
}

#[tokio::test]
async fn test_logs_without_sink_are_empty() {
    let Json(entries) = get_logs(State(state(MockBundleStore::new())), Query(LogsQuery::default()))
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_reload_fetches_from_store_again() {
    let state = state(store_with(trained_bundle(), 2));
    state.bundle().unwrap();
    let Json(body) = reload(State(state)).await.unwrap();
    assert!(body.model_loaded);
}

#[test]
fn test_error_status_mapping() {
    let status_of = |err: ValuatorError| ApiError(err).status();
    assert_eq!(
        status_of(ValuatorError::ModelNotAvailable("x".into())),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        status_of(ValuatorError::FeatureMismatch("x".into())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_of(ValuatorError::Computation {
            record: "Brand=Kia".into(),
            reason: "nan".into()
        }),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        status_of(ValuatorError::Data("x".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_request_defaults_mileage() {
    let req: PredictRequest = serde_json::from_str(
        r#"{"brand":"Kia","body_type":"SUV","year":2020,"horsepower":150,
            "engine_cc":1600,"fuel_type":"Petrol","transmission":"Manual"}"#,
    )
    .unwrap();
    assert_eq!(req.mileage_km_per_l, None);
    assert_eq!(req.listed_price, None);
    assert_eq!(req.to_car_record().mileage_km_per_l, Some(15.0));
}
