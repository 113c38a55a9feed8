//! Deterministic synthetic listings for tests and local experiments

use crate::error::Result;
use crate::types::CarRecord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

const BRANDS: [&str; 5] = ["Toyota", "BMW", "Kia", "Mercedes", "Hyundai"];
const BODIES: [&str; 3] = ["Sedan", "SUV", "Hatchback"];
const FUELS: [&str; 3] = ["Petrol", "Diesel", "Hybrid"];
const TRANSMISSIONS: [&str; 2] = ["Automatic", "Manual"];

/// Year `age` is measured against in [`synthetic_price`]
pub const SYNTHETIC_REFERENCE_YEAR: i32 = 2026;

/// `1500*(year-2000) + 120*hp + 5*cc - 1000*age`
pub fn synthetic_price(car: &CarRecord) -> f64 {
    let year = car.year.unwrap_or(SYNTHETIC_REFERENCE_YEAR);
    let age = f64::from(SYNTHETIC_REFERENCE_YEAR - year);
    1_500.0 * f64::from(year - 2000)
        + 120.0 * car.horsepower.unwrap_or_default()
        + 5.0 * car.engine_cc.unwrap_or_default()
        - 1_000.0 * age
}

/// `n` complete listings priced by [`synthetic_price`] plus uniform noise
/// of up to ±$1000. Categorical columns vary but carry no price signal.
pub fn synthetic_cars(n: usize, seed: u64) -> Vec<CarRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut car = CarRecord {
                brand: Some(pick(&BRANDS, &mut rng)),
                body_type: Some(pick(&BODIES, &mut rng)),
                year: Some(rng.random_range(2010..=2025)),
                horsepower: Some(rng.random_range(100.0..400.0)),
                engine_cc: Some(rng.random_range(1200.0..5000.0)),
                fuel_type: Some(pick(&FUELS, &mut rng)),
                transmission: Some(pick(&TRANSMISSIONS, &mut rng)),
                mileage_km_per_l: Some(rng.random_range(8.0..22.0)),
                ..Default::default()
            };
            let noise = rng.random_range(-1_000.0..1_000.0);
            car.price_usd = Some(synthetic_price(&car) + noise);
            car
        })
        .collect()
}

fn pick(options: &[&str], rng: &mut ChaCha8Rng) -> String {
    options[rng.random_range(0..options.len())].to_string()
}

/// Write listings as a dataset CSV with the standard column headers
pub fn write_csv(path: &Path, records: &[CarRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
