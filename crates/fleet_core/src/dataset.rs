//! Historical annual observations the model is anchored to.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven observed series. The first six are also the state components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    Icev,
    Bev,
    Phev,
    Vmt,
    Co2,
    Stations,
    Incentives,
}

impl Quantity {
    pub const ALL: [Quantity; 7] = [
        Quantity::Icev,
        Quantity::Bev,
        Quantity::Phev,
        Quantity::Vmt,
        Quantity::Co2,
        Quantity::Stations,
        Quantity::Incentives,
    ];

    /// State components in integration order (V, B, P, M, C, S).
    pub const STATE: [Quantity; 6] = [
        Quantity::Icev,
        Quantity::Bev,
        Quantity::Phev,
        Quantity::Vmt,
        Quantity::Co2,
        Quantity::Stations,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quantity::Icev => "ICEV",
            Quantity::Bev => "BEV",
            Quantity::Phev => "PHEV",
            Quantity::Vmt => "VMT",
            Quantity::Co2 => "CO2",
            Quantity::Stations => "Stations",
            Quantity::Incentives => "Incentives",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Quantity::Icev => 0,
            Quantity::Bev => 1,
            Quantity::Phev => 2,
            Quantity::Vmt => 3,
            Quantity::Co2 => 4,
            Quantity::Stations => 5,
            Quantity::Incentives => 6,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One year of observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub year: i32,
    pub icev: f64,
    pub bev: f64,
    pub phev: f64,
    /// Vehicle miles traveled.
    pub vmt: f64,
    /// Tonnes of CO2.
    pub co2: f64,
    pub stations: f64,
    /// Public incentive outlay in dollars.
    pub incentives: f64,
}

impl HistoricalRecord {
    pub fn value(&self, quantity: Quantity) -> f64 {
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

/// Consecutive annual records, sorted by year. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalDataset {
    records: Vec<HistoricalRecord>,
}

impl HistoricalDataset {
    /// Validates and sorts `records`.
    ///
    /// Fails with `DataError` when the table is empty, has duplicate or
    /// missing years, or holds a non-finite or negative observation.
    pub fn from_records(mut records: Vec<HistoricalRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(FleetError::DataError(
                "historical table has no records".to_string(),
            ));
        }
        records.sort_by_key(|r| r.year);

        for pair in records.windows(2) {
            if pair[1].year != pair[0].year + 1 {
                return Err(FleetError::DataError(format!(
                    "historical years must be consecutive, found {} followed by {}",
                    pair[0].year, pair[1].year
                )));
            }
        }

        for record in &records {
            for quantity in Quantity::ALL {
                let value = record.value(quantity);
                if !value.is_finite() || value < 0.0 {
                    return Err(FleetError::DataError(format!(
                        "{quantity} in {} must be finite and non-negative, got {value}",
                        record.year
                    )));
                }
            }
        }

        Ok(Self { records })
    }

    /// New York State registrations, travel, emissions, stations and
    /// incentive outlays for 2017-2024.
    pub fn new_york() -> Self {
        let years = 2017..=2024;
        let icev = [
            10182400.0, 10151900.0, 10121400.0, 10080700.0, 10268800.0, 10139400.0, 10056000.0,
            9801541.0,
        ];
        let bev = [
            8535.0, 13069.0, 20944.0, 29223.0, 47656.0, 72394.0, 111347.0, 157211.0,
        ];
        let phev = [
            15413.0, 22734.0, 27006.0, 30245.0, 41448.0, 51440.0, 76096.0, 104612.0,
        ];
        let vmt = [
            122434580000.0,
            122239054000.0,
            122033570000.0,
            121566395000.0,
            124244828000.0,
            122950956000.0,
            122612432000.0,
            120278692000.0,
        ];
        let co2 = [
            49398086.0, 49322022.0, 49247594.0, 49023179.0, 50045139.0, 49437178.0, 49138593.0,
            48026538.0,
        ];
        let stations = [
            1871.0, 2509.0, 4506.0, 6113.0, 7604.0, 9494.0, 11076.0, 12922.0,
        ];
        let incentives = [
            4460000.0, 7229000.0, 8603000.0, 14520000.0, 21757000.0, 31678000.0, 47796000.0,
            49860000.0,
        ];

        let records = years
            .enumerate()
            .map(|(i, year)| HistoricalRecord {
                year,
                icev: icev[i],
                bev: bev[i],
                phev: phev[i],
                vmt: vmt[i],
                co2: co2[i],
                stations: stations[i],
                incentives: incentives[i],
            })
            .collect();

        Self { records }
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn base_year(&self) -> i32 {
        self.records[0].year
    }

    pub fn last_year(&self) -> i32 {
        self.records[self.records.len() - 1].year
    }

    pub fn base_record(&self) -> &HistoricalRecord {
        &self.records[0]
    }

    pub fn last_record(&self) -> &HistoricalRecord {
        &self.records[self.records.len() - 1]
    }

    pub fn record(&self, year: i32) -> Option<&HistoricalRecord> {
        let offset = year.checked_sub(self.base_year())?;
        usize::try_from(offset)
            .ok()
            .and_then(|idx| self.records.get(idx))
    }

    pub fn series(&self, quantity: Quantity) -> Vec<f64> {
        self.records.iter().map(|r| r.value(quantity)).collect()
    }

    pub fn years(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.year).collect()
    }
}
