//! Exogenous incentive forcing.

use crate::dataset::{HistoricalDataset, Quantity};
use crate::normalizer::Normalizer;
use serde::Serialize;

/// Annual taper applied to the last observed incentive. A policy assumption,
/// not a fitted value.
pub const POST_HISTORY_DECAY: f64 = 0.9;

/// Normalized incentive strength per calendar year.
///
/// Within the historical window the observed outlay is returned; after it the
/// last observation decays geometrically; before it the signal is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncentiveSignal {
    first_year: i32,
    normalized: Vec<f64>,
    decay: f64,
}

impl IncentiveSignal {
    pub fn from_dataset(data: &HistoricalDataset, normalizer: &Normalizer) -> Self {
        let normalized = data
            .series(Quantity::Incentives)
            .into_iter()
            .map(|dollars| normalizer.normalize(dollars, Quantity::Incentives))
            .collect();
        Self {
            first_year: data.base_year(),
            normalized,
            decay: POST_HISTORY_DECAY,
        }
    }

    pub fn first_year(&self) -> i32 {
        self.first_year
    }

    pub fn last_year(&self) -> i32 {
        self.first_year + self.normalized.len() as i32 - 1
    }

    /// Incentive at calendar time `year`, resolved to its floor year.
    pub fn incentive(&self, year: f64, multiplier: f64) -> f64 {
        self.for_year(year.floor() as i32) * multiplier
    }

    fn for_year(&self, year: i32) -> f64 {
        let last_year = self.last_year();
        if year < self.first_year {
            return 0.0;
        }
        if year > last_year {
            let last = self.normalized[self.normalized.len() - 1];
            return last * self.decay.powi(year - last_year);
        }
        self.normalized[(year - self.first_year) as usize]
    }
}
