//! Used-car Price Valuator
//!
//! Train the price model, value single cars, search and summarise the
//! dataset, or serve the valuation API.

use car_valuator::{
    analysis,
    api::{self, ApiState},
    config::Config,
    data::{CsvDataSource, DataSource},
    deal::DealPolicy,
    ml::{BundleStore, FeatureBuilder, FileBundleStore, PricePredictor, Trainer},
    search,
    storage::{Database, NewPrediction, PredictionLog},
    types::CarRecord,
};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "car-valuator")]
#[command(about = "Used-car fair price estimation and deal evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the price model and save the bundle
    Train {
        /// Dataset CSV (overrides config)
        #[arg(long)]
        data: Option<String>,
    },
    /// Estimate the price of one car
    Predict {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        body_type: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        horsepower: f64,
        #[arg(long)]
        engine_cc: f64,
        #[arg(long)]
        fuel_type: String,
        #[arg(long)]
        transmission: String,
        /// Fuel economy in km/l
        #[arg(long, default_value = "15.0")]
        mileage: f64,
        /// Asking price to evaluate
        #[arg(long)]
        listed_price: Option<f64>,
    },
    /// Show recent logged predictions
    Logs {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Search the dataset with a free-text request
    Search {
        query: String,
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },
    /// Summarise dataset prices
    Stats {
        /// Brands to list
        #[arg(short = 'n', long, default_value = "10")]
        top_n: usize,
    },
    /// Run the valuation API
    Serve {
        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.init_dirs()?;

    match cli.command {
        Commands::Train { data } => train_model(config, data).await,
        Commands::Predict {
            brand,
            body_type,
            year,
            horsepower,
            engine_cc,
            fuel_type,
            transmission,
            mileage,
            listed_price,
        } => {
            let car = CarRecord {
                brand: Some(brand),
                body_type: Some(body_type),
                year: Some(year),
                horsepower: Some(horsepower),
                engine_cc: Some(engine_cc),
                fuel_type: Some(fuel_type),
                transmission: Some(transmission),
                mileage_km_per_l: Some(mileage),
                ..Default::default()
            };
            predict_car(config, car, listed_price).await
        }
        Commands::Logs { limit } => show_logs(config, limit).await,
        Commands::Search { query, top_k } => search_cars(config, &query, top_k),
        Commands::Stats { top_n } => show_stats(config, top_n),
        Commands::Serve { port } => serve(config, port).await,
    }
}

async fn train_model(config: Config, data: Option<String>) -> anyhow::Result<()> {
    let path = data
        .map(|p| car_valuator::config::expand_path(&p))
        .unwrap_or_else(|| config.data_path());
    let records = CsvDataSource::new(path).load()?;

    let abort = Arc::new(AtomicBool::new(false));
    let trainer = Trainer::from_config(&config).with_abort(abort.clone());
    let mut job = tokio::task::spawn_blocking(move || trainer.train(&records));

    let report = tokio::select! {
        result = &mut job => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, stopping after the current tree");
            abort.store(true, Ordering::Relaxed);
            job.await??
        }
    };

    let store = FileBundleStore::new(config.model_path());
    store.save(&report.bundle)?;

    let metrics = report.metrics();
    println!("\n✅ Model trained\n");
    println!(
        "Rows: {} raw, {} after clipping ({} train / {} test)",
        report.raw_rows, report.training_rows, report.train_rows, report.test_rows
    );
    let forest = report.bundle.pipeline.forest();
    println!(
        "Forest: {} trees, max depth {} (limit {}), min split {}, seed {}",
        forest.n_trees(),
        forest.max_tree_depth(),
        forest.config().max_depth,
        forest.config().min_samples_split,
        forest.config().seed
    );
    println!("R² (log scale): {:.4}", metrics.r2);
    println!("MAE: ${:.2}", metrics.mae);
    println!("\nTop features:");
    for (name, importance) in report.bundle.pipeline.ranked_importances().iter().take(8) {
        println!("  {:<28} {:.4}", name, importance);
    }
    println!("\nSaved to {}", store.path().display());

    Ok(())
}

async fn predict_car(
    config: Config,
    car: CarRecord,
    listed_price: Option<f64>,
) -> anyhow::Result<()> {
    let bundle = FileBundleStore::new(config.model_path()).load()?;
    let predictor = PricePredictor::from_config(&config.valuation);
    let predicted = predictor.predict_car(&bundle, &car)?;

    println!("\n🚗 {}\n", car.describe());
    println!("Estimated price: ${:.2}", predicted);

    let listed = listed_price.filter(|p| *p > 0.0);
    let deal = listed.map(|listed| {
        DealPolicy::from(&config.valuation).evaluate(
            listed,
            predicted,
            bundle.metrics.mae,
            bundle.metrics.r2,
        )
    });
    if let Some(deal) = &deal {
        println!("Verdict: {}", deal.label);
        println!("Fair range: ${:.2} - ${:.2}", deal.lower, deal.upper);
        println!("Confidence: {:.2}%", deal.confidence_score);
    }

    let db = Database::connect(config.database_path()).await?;
    db.append(NewPrediction {
        model_type: bundle.model_type.clone(),
        use_log_target: bundle.use_log_target,
        features: FeatureBuilder::new(bundle.reference_year).feature_record(&car),
        predicted_price: predicted,
        listed_price: listed,
        deal_label: deal.map(|d| d.label.to_string()),
    })
    .await?;

    Ok(())
}

async fn show_logs(config: Config, limit: usize) -> anyhow::Result<()> {
    let db = Database::connect(config.database_path()).await?;
    let entries = db.read_recent(limit).await?;

    if entries.is_empty() {
        println!("No predictions logged yet");
        return Ok(());
    }

    println!("\n📜 Recent predictions\n");
    for entry in &entries {
        println!(
            "#{:<5} {}  ${:>12.2}  listed {:>12}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.predicted_price,
            entry
                .listed_price
                .map(|p| format!("${:.2}", p))
                .unwrap_or_else(|| "-".to_string()),
            entry.deal_label.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn search_cars(config: Config, query: &str, top_k: usize) -> anyhow::Result<()> {
    let records = CsvDataSource::new(config.data_path()).load()?;
    let filter = search::parse_query(query);
    tracing::debug!("Parsed search filter: {:?}", filter);

    let found = search::recommend(&records, &filter, top_k);
    if found.is_empty() {
        println!("No matching cars");
        return Ok(());
    }

    println!("\n🔎 {} result(s)\n", found.len());
    for car in found {
        println!(
            "  {:<32} {:<10} ${:.2}",
            car.describe(),
            car.fuel_type.as_deref().unwrap_or("-"),
            car.price_usd.unwrap_or_default()
        );
    }
    Ok(())
}

fn show_stats(config: Config, top_n: usize) -> anyhow::Result<()> {
    let records = CsvDataSource::new(config.data_path()).load()?;
    let builder = FeatureBuilder::new(config.valuation.reference_year);

    let kpis = analysis::dataset_kpis(&records)
        .ok_or_else(|| anyhow::anyhow!("dataset has no priced listings"))?;
    println!("\n📊 Dataset\n");
    println!("Listings: {}", kpis.count);
    println!("Mean: ${:.2}  Median: ${:.2}", kpis.mean_price, kpis.median_price);
    println!(
        "Min: ${:.2}  Max: ${:.2}  Std: ${:.2}",
        kpis.min_price, kpis.max_price, kpis.std_dev_price
    );

    println!("\nBy brand:");
    for stat in analysis::price_by_brand(&records, top_n) {
        println!("  {:<16} ${:>12.2}  ({})", stat.group, stat.avg_price, stat.count);
    }
    println!("\nBy body type:");
    for stat in analysis::price_by_body(&records) {
        println!("  {:<16} ${:>12.2}  ({})", stat.group, stat.avg_price, stat.count);
    }
    println!("\nBy age:");
    for stat in analysis::price_by_age_bracket(&records, &builder) {
        println!("  {:<16} ${:>12.2}  ({})", stat.group, stat.avg_price, stat.count);
    }
    println!("\nCorrelation with price:");
    for (column, corr) in analysis::correlation_with_price(&records, &builder) {
        println!("  {:<16} {:+.3}", column, corr);
    }
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let store = Arc::new(FileBundleStore::new(config.model_path()));
    let db = Arc::new(Database::connect(config.database_path()).await?);
    let state = Arc::new(ApiState::from_config(&config, store).with_log(db));

    let port = port.unwrap_or(config.server.port);
    api::start_server(state, &config.server.host, port).await?;
    Ok(())
}
