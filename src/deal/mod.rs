//! Deal evaluation
//!
//! Compares a listed price with the model estimate. The fair band around the
//! estimate is the wider of a relative margin and a share of the model's
//! held-out MAE, so a weak model widens its own band.

use crate::config::ValuationConfig;
use crate::types::{DealLabel, DealResult};

#[cfg(test)]
mod tests;

pub const DEFAULT_BAND_PCT: f64 = 0.07;
pub const DEFAULT_MAE_FACTOR: f64 = 0.8;

/// Band sizing factors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DealPolicy {
    pub band_pct: f64,
    pub mae_factor: f64,
}

impl Default for DealPolicy {
    fn default() -> Self {
        Self {
            band_pct: DEFAULT_BAND_PCT,
            mae_factor: DEFAULT_MAE_FACTOR,
        }
    }
}

impl From<&ValuationConfig> for DealPolicy {
    fn from(cfg: &ValuationConfig) -> Self {
        Self {
            band_pct: cfg.band_pct,
            mae_factor: cfg.mae_factor,
        }
    }
}

impl DealPolicy {
    /// Half-width of the fair band
    pub fn band(&self, predicted: f64, mae: f64) -> f64 {
        (self.band_pct * predicted).max(self.mae_factor * mae)
    }

    pub fn evaluate(&self, listed: f64, predicted: f64, mae: f64, r2: f64) -> DealResult {
        let band = self.band(predicted, mae);
        let lower = predicted - band;
        let upper = predicted + band;

        // closed interval: both edges count as fair
        let label = if listed < lower {
            DealLabel::GreatDeal
        } else if listed > upper {
            DealLabel::Overpriced
        } else {
            DealLabel::FairPrice
        };

        DealResult {
            label,
            lower,
            upper,
            confidence_score: round2(r2.max(0.0) * 100.0),
        }
    }
}

/// Classify `listed` against `predicted` with the default policy
pub fn evaluate_deal(listed: f64, predicted: f64, mae: f64, r2: f64) -> DealResult {
    DealPolicy::default().evaluate(listed, predicted, mae, r2)
}

/// Round half away from zero to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
