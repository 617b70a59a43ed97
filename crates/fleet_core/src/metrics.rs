//! Percentage differences between a custom and a baseline trajectory.
//!
//! CO2 differences past the last historical year are bounded to at most
//! `CO2_BOUND_PER_YEAR` points per projected year, capped at `CO2_BOUND_CAP`.
//! This is a policy heuristic: a single lever is not expected to move
//! statewide emissions faster than that. Both raw and bounded values are kept.

use crate::dataset::Quantity;
use crate::error::{FleetError, Result};
use crate::model::StateVector;
use crate::scenario::{ev_share, Trajectory};
use serde::Serialize;

pub const CO2_BOUND_FROM_YEAR: i32 = 2024;
pub const CO2_BOUND_PER_YEAR: f64 = 2.5;
pub const CO2_BOUND_CAP: f64 = 60.0;

/// `(custom - baseline) / baseline * 100`, or 0 when the baseline is 0.
pub fn pct_diff(custom: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (custom - baseline) / baseline * 100.0
    }
}

/// Largest admissible CO2 difference in `year`, if the bound applies.
pub fn co2_bound(year: i32) -> Option<f64> {
    (year > CO2_BOUND_FROM_YEAR)
        .then(|| (CO2_BOUND_PER_YEAR * (year - CO2_BOUND_FROM_YEAR) as f64).min(CO2_BOUND_CAP))
}

pub fn bound_co2(pct: f64, year: i32) -> f64 {
    match co2_bound(year) {
        Some(bound) => pct.clamp(-bound, bound),
        None => pct,
    }
}

fn check_axes(custom: &Trajectory, baseline: &Trajectory) -> Result<()> {
    if custom.years != baseline.years {
        return Err(FleetError::DataError(format!(
            "trajectories cover different years ({} vs {} entries)",
            custom.len(),
            baseline.len()
        )));
    }
    if custom.is_empty() {
        return Err(FleetError::DataError("trajectories are empty".to_string()));
    }
    Ok(())
}

/// Per-year differences of custom against baseline, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparativeMetrics {
    pub years: Vec<i32>,
    pub icev: Vec<f64>,
    pub bev: Vec<f64>,
    pub phev: Vec<f64>,
    pub vmt: Vec<f64>,
    pub stations: Vec<f64>,
    pub co2_raw: Vec<f64>,
    /// For display.
    pub co2_bounded: Vec<f64>,
    /// Difference of EV market shares, in percentage points.
    pub ev_share_pp: Vec<f64>,
}

impl ComparativeMetrics {
    pub fn compare(custom: &Trajectory, baseline: &Trajectory) -> Result<Self> {
        check_axes(custom, baseline)?;

        let diff = |quantity: Quantity| -> Vec<f64> {
            match (custom.series(quantity), baseline.series(quantity)) {
                (Some(c), Some(b)) => c.iter().zip(b).map(|(c, b)| pct_diff(*c, *b)).collect(),
                _ => Vec::new(),
            }
        };

        let co2_raw = diff(Quantity::Co2);
        let co2_bounded = co2_raw
            .iter()
            .zip(&custom.years)
            .map(|(pct, year)| bound_co2(*pct, *year))
            .collect();
        let ev_share_pp = custom
            .ev_share()
            .iter()
            .zip(baseline.ev_share())
            .map(|(c, b)| c - b)
            .collect();

        Ok(Self {
            years: custom.years.clone(),
            icev: diff(Quantity::Icev),
            bev: diff(Quantity::Bev),
            phev: diff(Quantity::Phev),
            vmt: diff(Quantity::Vmt),
            stations: diff(Quantity::Stations),
            co2_raw,
            co2_bounded,
            ev_share_pp,
        })
    }

    /// Differences for one quantity; CO2 gives the raw series.
    pub fn pct_diff(&self, quantity: Quantity) -> Option<&[f64]> {
        let series = match quantity {
            Quantity::Icev => &self.icev,
            Quantity::Bev => &self.bev,
            Quantity::Phev => &self.phev,
            Quantity::Vmt => &self.vmt,
            Quantity::Co2 => &self.co2_raw,
            Quantity::Stations => &self.stations,
            Quantity::Incentives => return None,
        };
        Some(series)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SummaryMetric {
    Bevs,
    Phevs,
    TotalEvs,
    Icevs,
    TotalVehicles,
    EvShare,
    Co2,
    Stations,
    Vmt,
}

impl SummaryMetric {
    pub const ALL: [SummaryMetric; 9] = [
        SummaryMetric::Bevs,
        SummaryMetric::Phevs,
        SummaryMetric::TotalEvs,
        SummaryMetric::Icevs,
        SummaryMetric::TotalVehicles,
        SummaryMetric::EvShare,
        SummaryMetric::Co2,
        SummaryMetric::Stations,
        SummaryMetric::Vmt,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SummaryMetric::Bevs => "BEVs",
            SummaryMetric::Phevs => "PHEVs",
            SummaryMetric::TotalEvs => "Total EVs",
            SummaryMetric::Icevs => "ICEVs",
            SummaryMetric::TotalVehicles => "Total Vehicles",
            SummaryMetric::EvShare => "EV Market Share (%)",
            SummaryMetric::Co2 => "CO2 Emissions",
            SummaryMetric::Stations => "Charging Stations",
            SummaryMetric::Vmt => "VMT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DifferenceUnit {
    Percent,
    PercentagePoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryRow {
    pub metric: SummaryMetric,
    pub custom: f64,
    pub baseline: f64,
    pub difference: f64,
    pub unit: DifferenceUnit,
}

/// Projection-year comparison with the headline emissions figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalYearSummary {
    pub year: i32,
    pub rows: Vec<SummaryRow>,
    /// `(baseline - custom) / baseline * 100`, bounded like the CO2 series.
    pub co2_reduction_pct: f64,
    pub co2_reduction_pct_raw: f64,
    /// Baseline minus custom CO2, in tonnes.
    pub co2_reduction_tonnes: f64,
}

impl FinalYearSummary {
    pub fn new(custom: &Trajectory, baseline: &Trajectory) -> Result<Self> {
        check_axes(custom, baseline)?;
        let year = custom.years[custom.len() - 1];
        let (c, b) = match (custom.final_state(), baseline.final_state()) {
            (Some(c), Some(b)) => (c, b),
            _ => return Err(FleetError::DataError("trajectories are empty".to_string())),
        };

        let rows = SummaryMetric::ALL
            .iter()
            .map(|metric| {
                let pick = |s: &StateVector| match metric {
                    SummaryMetric::Bevs => s.b,
                    SummaryMetric::Phevs => s.p,
                    SummaryMetric::TotalEvs => s.b + s.p,
                    SummaryMetric::Icevs => s.v,
                    SummaryMetric::TotalVehicles => s.v + s.b + s.p,
                    SummaryMetric::EvShare => ev_share(s.b + s.p, s.v + s.b + s.p),
                    SummaryMetric::Co2 => s.c,
                    SummaryMetric::Stations => s.s,
                    SummaryMetric::Vmt => s.m,
                };
                let (custom, baseline) = (pick(&c), pick(&b));
                let (difference, unit) = match metric {
                    SummaryMetric::EvShare => (custom - baseline, DifferenceUnit::PercentagePoints),
                    _ => (pct_diff(custom, baseline), DifferenceUnit::Percent),
                };
                SummaryRow {
                    metric: *metric,
                    custom,
                    baseline,
                    difference,
                    unit,
                }
            })
            .collect();

        let co2_reduction_tonnes = b.c - c.c;
        let co2_reduction_pct_raw = if b.c > 0.0 {
            co2_reduction_tonnes / b.c * 100.0
        } else {
            0.0
        };

        Ok(Self {
            year,
            rows,
            co2_reduction_pct: bound_co2(co2_reduction_pct_raw, year),
            co2_reduction_pct_raw,
            co2_reduction_tonnes,
        })
    }

    pub fn row(&self, metric: SummaryMetric) -> Option<&SummaryRow> {
        self.rows.iter().find(|row| row.metric == metric)
    }
}
