use super::*;
use crate::ml::FeatureValue;
use tempfile::TempDir;

async fn open() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::connect(dir.path().join("logs").join("predictions.db"))
        .await
        .unwrap();
    (dir, db)
}

fn prediction(price: f64, listed: Option<f64>) -> NewPrediction {
    let mut features = FeatureRecord::new();
    features.insert("Brand".into(), FeatureValue::Categorical("Toyota".into()));
    features.insert("Horsepower".into(), FeatureValue::Numeric(150.0));
    NewPrediction {
        model_type: "RandomForestRegressor".into(),
        use_log_target: true,
        features,
        predicted_price: price,
        listed_price: listed,
        deal_label: listed.map(|_| "Fair Price".to_string()),
    }
}

#[tokio::test]
async fn test_empty_log_reads_nothing() {
    let (_dir, db) = open().await;
    assert!(db.read_all().await.unwrap().is_empty());
    assert_eq!(db.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_append_and_read_back() {
    let (_dir, db) = open().await;
    let id = db.append(prediction(20_000.0, Some(18_500.0))).await.unwrap();

    let entries = db.read_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id, id);
    assert_eq!(entry.model_type, "RandomForestRegressor");
    assert!(entry.use_log_target);
    assert_eq!(entry.predicted_price, 20_000.0);
    assert_eq!(entry.listed_price, Some(18_500.0));
    assert_eq!(entry.diff_amount, Some(1_500.0));
    assert_eq!(entry.deal_label.as_deref(), Some("Fair Price"));

    let features = entry.features().unwrap();
    assert_eq!(features.get("Horsepower"), Some(&FeatureValue::Numeric(150.0)));
}

#[tokio::test]
async fn test_missing_listed_price_has_no_diff() {
    let (_dir, db) = open().await;
    db.append(prediction(9_000.0, None)).await.unwrap();
    let entry = db.read_all().await.unwrap().remove(0);
    assert_eq!(entry.listed_price, None);
    assert_eq!(entry.diff_amount, None);
    assert_eq!(entry.deal_label, None);
}

#[tokio::test]
async fn test_most_recent_first() {
    let (_dir, db) = open().await;
    for price in [1.0, 2.0, 3.0] {
        db.append(prediction(price, None)).await.unwrap();
    }

    let prices: Vec<f64> = db
        .read_all()
        .await
        .unwrap()
        .iter()
        .map(|e| e.predicted_price)
        .collect();
    assert_eq!(prices, vec![3.0, 2.0, 1.0]);

    let recent = db.read_recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].predicted_price, 3.0);
    assert_eq!(db.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reopen_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("predictions.db");
    {
        let db = Database::connect(&path).await.unwrap();
        db.append(prediction(5.0, None)).await.unwrap();
        db.close().await;
    }
    let db = Database::connect(&path).await.unwrap();
    assert_eq!(db.read_all().await.unwrap().len(), 1);
}
