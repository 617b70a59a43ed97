//! Flat tables for export. Rendering them is left to the caller.

use crate::error::Result;
use crate::metrics::{ComparativeMetrics, FinalYearSummary};
use crate::params::{ParameterVector, DESCRIPTORS};
use crate::scenario::{ScenarioRequest, ScenarioResult, Trajectory};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenarioRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Custom_BEV")]
    pub custom_bev: f64,
    #[serde(rename = "Custom_PHEV")]
    pub custom_phev: f64,
    #[serde(rename = "Custom_ICEV")]
    pub custom_icev: f64,
    #[serde(rename = "Custom_CO2")]
    pub custom_co2: f64,
    #[serde(rename = "Custom_Stations")]
    pub custom_stations: f64,
    #[serde(rename = "Custom_VMT")]
    pub custom_vmt: f64,
    #[serde(rename = "Base_BEV")]
    pub base_bev: f64,
    #[serde(rename = "Base_PHEV")]
    pub base_phev: f64,
    #[serde(rename = "Base_ICEV")]
    pub base_icev: f64,
    #[serde(rename = "Base_CO2")]
    pub base_co2: f64,
    #[serde(rename = "Base_Stations")]
    pub base_stations: f64,
    #[serde(rename = "Base_VMT")]
    pub base_vmt: f64,
}

/// One row per year, custom and baseline side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScenarioTable {
    pub rows: Vec<ScenarioRow>,
}

impl ScenarioTable {
    /// Rows are produced for the years the two trajectories share.
    pub fn new(custom: &Trajectory, baseline: &Trajectory) -> Self {
        let rows = custom
            .years
            .iter()
            .enumerate()
            .filter_map(|(i, year)| {
                let base = baseline.at(*year)?;
                Some(ScenarioRow {
                    year: *year,
                    custom_bev: custom.bev[i],
                    custom_phev: custom.phev[i],
                    custom_icev: custom.icev[i],
                    custom_co2: custom.co2[i],
                    custom_stations: custom.stations[i],
                    custom_vmt: custom.vmt[i],
                    base_bev: base.b,
                    base_phev: base.p,
                    base_icev: base.v,
                    base_co2: base.c,
                    base_stations: base.s,
                    base_vmt: base.m,
                })
            })
            .collect();
        Self { rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterRow {
    #[serde(rename = "Parameter")]
    pub parameter: &'static str,
    #[serde(rename = "Description")]
    pub label: &'static str,
    #[serde(rename = "Custom_Value")]
    pub custom: f64,
    #[serde(rename = "Base_Value")]
    pub baseline: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterTable {
    pub rows: Vec<ParameterRow>,
}

impl ParameterTable {
    pub fn new(custom: &ParameterVector, baseline: &ParameterVector) -> Self {
        let rows = DESCRIPTORS
            .iter()
            .zip(custom.values().iter().zip(baseline.values()))
            .map(|(descriptor, (custom, baseline))| ParameterRow {
                parameter: descriptor.name,
                label: descriptor.label,
                custom: *custom,
                baseline: *baseline,
            })
            .collect();
        Self { rows }
    }

    /// Rows whose custom value differs from the baseline.
    pub fn changed(&self) -> impl Iterator<Item = &ParameterRow> {
        self.rows.iter().filter(|row| row.custom != row.baseline)
    }
}

/// Everything a caller needs to present one comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub request: ScenarioRequest,
    pub custom: Trajectory,
    pub baseline: Trajectory,
    pub metrics: ComparativeMetrics,
    pub summary: FinalYearSummary,
    pub scenario_table: ScenarioTable,
    pub parameter_table: ParameterTable,
}

impl From<ScenarioResult> for ScenarioReport {
    fn from(result: ScenarioResult) -> Self {
        let scenario_table = ScenarioTable::new(&result.custom, &result.baseline);
        let parameter_table =
            ParameterTable::new(&result.request.parameters, &result.baseline_parameters);
        Self {
            request: result.request,
            custom: result.custom,
            baseline: result.baseline,
            metrics: result.metrics,
            summary: result.summary,
            scenario_table,
            parameter_table,
        }
    }
}

impl ScenarioReport {
    /// Builds a report from two trajectories computed elsewhere.
    pub fn from_trajectories(
        request: ScenarioRequest,
        baseline_parameters: &ParameterVector,
        custom: Trajectory,
        baseline: Trajectory,
    ) -> Result<Self> {
        let metrics = ComparativeMetrics::compare(&custom, &baseline)?;
        let summary = FinalYearSummary::new(&custom, &baseline)?;
        Ok(Self {
            scenario_table: ScenarioTable::new(&custom, &baseline),
            parameter_table: ParameterTable::new(&request.parameters, baseline_parameters),
            request,
            custom,
            baseline,
            metrics,
            summary,
        })
    }
}
