//! Used-car Price Valuator
//!
//! Estimates a fair market price for a used car from its specifications and
//! classifies an asking price as a great deal, fair, or overpriced.
//!
//! ## Architecture
//!
//! ```text
//! CSV (data) → FeatureBuilder → Trainer → ModelBundle → BundleStore
//!                                                          ↓
//!              API / CLI → PricePredictor → DealPolicy → PredictionLog (storage)
//!                                ↑
//!                  Search + Analytics over the same dataset
//! ```

pub mod analysis;
pub mod api;
pub mod config;
pub mod data;
pub mod deal;
pub mod error;
pub mod ml;
pub mod search;
pub mod storage;
pub mod testing;
pub mod types;

#[cfg(test)]
mod config_tests;
