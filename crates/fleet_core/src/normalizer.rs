//! Mean scaling between absolute and normalized magnitudes.
//!
//! The state spans fleets of ~1e4 vehicles up to ~1e11 miles, so each
//! quantity is divided by its historical mean before integration.

use crate::dataset::{HistoricalDataset, Quantity};
use crate::error::{FleetError, Result};
use crate::model::StateVector;
use serde::Serialize;

/// Per-quantity historical means, indexed by `Quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizationMeans {
    pub icev: f64,
    pub bev: f64,
    pub phev: f64,
    pub vmt: f64,
    pub co2: f64,
    pub stations: f64,
    pub incentives: f64,
}

impl NormalizationMeans {
    pub fn get(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Icev => self.icev,
            Quantity::Bev => self.bev,
            Quantity::Phev => self.phev,
            Quantity::Vmt => self.vmt,
            Quantity::Co2 => self.co2,
            Quantity::Stations => self.stations,
            Quantity::Incentives => self.incentives,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalizer {
    means: NormalizationMeans,
}

impl Normalizer {
    /// Computes the mean of every series once. A series whose mean is zero
    /// cannot be scaled and fails with `DataError`.
    pub fn from_dataset(data: &HistoricalDataset) -> Result<Self> {
        let mut values = [0.0; 7];
        for quantity in Quantity::ALL {
            let series = data.series(quantity);
            let mean = series.iter().sum::<f64>() / series.len() as f64;
            if !(mean.is_finite() && mean > 0.0) {
                return Err(FleetError::DataError(format!(
                    "mean of {quantity} is {mean}; cannot normalize"
                )));
            }
            values[quantity.index()] = mean;
        }

        Ok(Self {
            means: NormalizationMeans {
                icev: values[0],
                bev: values[1],
                phev: values[2],
                vmt: values[3],
                co2: values[4],
                stations: values[5],
                incentives: values[6],
            },
        })
    }

    pub fn means(&self) -> &NormalizationMeans {
        &self.means
    }

    pub fn normalize(&self, value: f64, quantity: Quantity) -> f64 {
        value / self.means.get(quantity)
    }

    pub fn denormalize(&self, value: f64, quantity: Quantity) -> f64 {
        value * self.means.get(quantity)
    }

    /// Normalized state of the dataset's base-year record.
    pub fn initial_state(&self, data: &HistoricalDataset) -> StateVector {
        let base = data.base_record();
        let mut values = [0.0; 6];
        for (slot, quantity) in values.iter_mut().zip(Quantity::STATE) {
            *slot = self.normalize(base.value(quantity), quantity);
        }
        StateVector::from(values)
    }

    pub fn normalize_state(&self, state: &StateVector) -> StateVector {
        let mut values = state.to_array();
        for (slot, quantity) in values.iter_mut().zip(Quantity::STATE) {
            *slot = self.normalize(*slot, quantity);
        }
        StateVector::from(values)
    }

    pub fn denormalize_state(&self, state: &StateVector) -> StateVector {
        let mut values = state.to_array();
        for (slot, quantity) in values.iter_mut().zip(Quantity::STATE) {
            *slot = self.denormalize(*slot, quantity);
        }
        StateVector::from(values)
    }
}
