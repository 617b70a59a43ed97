//! Scenario orchestration: configuration, single runs, and custom/baseline
//! comparisons.

use crate::dataset::{HistoricalDataset, HistoricalRecord, Quantity};
use crate::error::{FleetError, Result};
use crate::incentive::IncentiveSignal;
use crate::integrator::{
    CancelToken, IntegrationSession, IntegrationStats, Integrator, IntegratorSettings,
};
use crate::metrics::{ComparativeMetrics, FinalYearSummary};
use crate::model::{FleetModel, StateVector};
use crate::normalizer::Normalizer;
use crate::params::ParameterVector;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Accepted projection years for external requests.
pub const EARLIEST_PROJECTION_YEAR: i32 = 2025;
pub const LATEST_PROJECTION_YEAR: i32 = 2050;
/// Upper limit for direct runner calls.
pub const MAX_PROJECTION_YEAR: i32 = 2100;

/// Denormalized values below `-NEGATIVE_TOLERANCE` are reported as excursions.
pub const NEGATIVE_TOLERANCE: f64 = 1e-6;

/// Denormalized quantities, one entry per integer year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub years: Vec<i32>,
    pub icev: Vec<f64>,
    pub bev: Vec<f64>,
    pub phev: Vec<f64>,
    pub vmt: Vec<f64>,
    pub co2: Vec<f64>,
    pub stations: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NegativeExcursion {
    pub year: i32,
    pub quantity: Quantity,
    pub value: f64,
}

impl Trajectory {
    fn with_capacity(n: usize) -> Self {
        Self {
            years: Vec::with_capacity(n),
            icev: Vec::with_capacity(n),
            bev: Vec::with_capacity(n),
            phev: Vec::with_capacity(n),
            vmt: Vec::with_capacity(n),
            co2: Vec::with_capacity(n),
            stations: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, year: i32, state: &StateVector) {
        self.years.push(year);
        self.icev.push(state.v);
        self.bev.push(state.b);
        self.phev.push(state.p);
        self.vmt.push(state.m);
        self.co2.push(state.c);
        self.stations.push(state.s);
    }

    fn push_record(&mut self, record: &HistoricalRecord) {
        self.push(
            record.year,
            &StateVector {
                v: record.icev,
                b: record.bev,
                p: record.phev,
                m: record.vmt,
                c: record.co2,
                s: record.stations,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    /// The series of a state quantity; `None` for `Quantity::Incentives`.
    pub fn series(&self, quantity: Quantity) -> Option<&[f64]> {
        let series = match quantity {
            Quantity::Icev => &self.icev,
            Quantity::Bev => &self.bev,
            Quantity::Phev => &self.phev,
            Quantity::Vmt => &self.vmt,
            Quantity::Co2 => &self.co2,
            Quantity::Stations => &self.stations,
            Quantity::Incentives => return None,
        };
        Some(series)
    }

    fn state(&self, idx: usize) -> StateVector {
        StateVector {
            v: self.icev[idx],
            b: self.bev[idx],
            p: self.phev[idx],
            m: self.vmt[idx],
            c: self.co2[idx],
            s: self.stations[idx],
        }
    }

    pub fn at(&self, year: i32) -> Option<StateVector> {
        let idx = self.years.iter().position(|y| *y == year)?;
        Some(self.state(idx))
    }

    pub fn final_state(&self) -> Option<StateVector> {
        (!self.is_empty()).then(|| self.state(self.len() - 1))
    }

    pub fn total_fleet(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.icev[i] + self.bev[i] + self.phev[i])
            .collect()
    }

    /// EV share of the fleet in percent, 0 for an empty fleet.
    pub fn ev_share(&self) -> Vec<f64> {
        self.total_fleet()
            .iter()
            .enumerate()
            .map(|(i, total)| ev_share(self.bev[i] + self.phev[i], *total))
            .collect()
    }

    pub fn negative_excursions(&self, tolerance: f64) -> Vec<NegativeExcursion> {
        let mut found = Vec::new();
        for quantity in Quantity::STATE {
            let Some(series) = self.series(quantity) else {
                continue;
            };
            for (year, value) in self.years.iter().zip(series) {
                if *value < -tolerance {
                    found.push(NegativeExcursion {
                        year: *year,
                        quantity,
                        value: *value,
                    });
                }
            }
        }
        found
    }
}

pub(crate) fn ev_share(evs: f64, total: f64) -> f64 {
    if total > 0.0 {
        evs / total * 100.0
    } else {
        0.0
    }
}

/// Immutable inputs shared by every run: the fixture, its normalization, the
/// incentive schedule, the reference coefficients and solver settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    dataset: HistoricalDataset,
    normalizer: Normalizer,
    signal: IncentiveSignal,
    baseline: ParameterVector,
    integrator: Integrator,
}

impl EngineConfig {
    /// The documented New York fixture with default solver settings.
    pub fn new_york() -> Result<Self> {
        Self::from_dataset(HistoricalDataset::new_york(), IntegratorSettings::default())
    }

    pub fn from_dataset(dataset: HistoricalDataset, settings: IntegratorSettings) -> Result<Self> {
        let normalizer = Normalizer::from_dataset(&dataset)?;
        let signal = IncentiveSignal::from_dataset(&dataset, &normalizer);
        Ok(Self {
            integrator: Integrator::new(settings)?,
            baseline: ParameterVector::baseline(),
            dataset,
            normalizer,
            signal,
        })
    }

    pub fn with_baseline(mut self, baseline: ParameterVector) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_settings(mut self, settings: IntegratorSettings) -> Result<Self> {
        self.integrator = Integrator::new(settings)?;
        Ok(self)
    }

    pub fn dataset(&self) -> &HistoricalDataset {
        &self.dataset
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn signal(&self) -> &IncentiveSignal {
        &self.signal
    }

    pub fn baseline(&self) -> &ParameterVector {
        &self.baseline
    }

    pub fn settings(&self) -> &IntegratorSettings {
        self.integrator.settings()
    }

    pub fn base_year(&self) -> i32 {
        self.dataset.base_year()
    }

    pub fn model(&self, params: ParameterVector, multiplier: f64) -> FleetModel {
        FleetModel::new(params, self.signal.clone(), multiplier, self.base_year())
    }
}

/// Runs single scenarios against one configuration snapshot.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: Arc<EngineConfig>,
}

impl ScenarioRunner {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Integer years from the base year through `projection_year`.
    pub fn year_axis(&self, projection_year: i32) -> Result<Vec<i32>> {
        let base_year = self.config.base_year();
        if !(base_year..=MAX_PROJECTION_YEAR).contains(&projection_year) {
            return Err(FleetError::InvalidHorizon {
                year: projection_year,
                earliest: base_year,
                latest: MAX_PROJECTION_YEAR,
            });
        }
        Ok((base_year..=projection_year).collect())
    }

    pub fn run(&self, projection_year: i32, params: &ParameterVector) -> Result<Trajectory> {
        self.run_with(projection_year, params, 1.0, None)
    }

    pub fn run_baseline(&self, projection_year: i32) -> Result<Trajectory> {
        let baseline = *self.config.baseline();
        self.run(projection_year, &baseline)
    }

    pub fn run_with(
        &self,
        projection_year: i32,
        params: &ParameterVector,
        multiplier: f64,
        cancel: Option<CancelToken>,
    ) -> Result<Trajectory> {
        self.start(projection_year, params, multiplier, cancel)?.finish()
    }

    /// Prepares a run that is advanced one year at a time.
    pub fn start(
        &self,
        projection_year: i32,
        params: &ParameterVector,
        multiplier: f64,
        cancel: Option<CancelToken>,
    ) -> Result<ScenarioSession> {
        check_multiplier(multiplier)?;
        let years = self.year_axis(projection_year)?;
        let out_of_range = params.out_of_range();
        if !out_of_range.is_empty() {
            warn!("coefficients outside their documented range: {out_of_range:?}");
        }

        let config = &self.config;
        let base_year = config.base_year();
        let times: Vec<f64> = years.iter().map(|y| (y - base_year) as f64).collect();
        let initial = config.normalizer.initial_state(&config.dataset).to_array();
        let model = config.model(*params, multiplier);
        let session = config.integrator.session(model, &initial, &times, cancel)?;

        debug!("starting run {base_year}..={projection_year} (incentive x{multiplier})");

        let mut trajectory = Trajectory::with_capacity(years.len());
        trajectory.push_record(config.dataset.base_record());

        Ok(ScenarioSession {
            session,
            normalizer: config.normalizer.clone(),
            years,
            trajectory,
        })
    }
}

fn check_multiplier(multiplier: f64) -> Result<()> {
    if multiplier.is_finite() && multiplier >= 0.0 {
        Ok(())
    } else {
        Err(FleetError::InvalidParameterVector(format!(
            "incentive multiplier must be finite and non-negative, got {multiplier}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioProgress {
    pub done: bool,
    /// Latest year written to the trajectory.
    pub year: i32,
    pub projection_year: i32,
}

/// A scenario run in progress.
pub struct ScenarioSession {
    session: IntegrationSession<FleetModel>,
    normalizer: Normalizer,
    years: Vec<i32>,
    trajectory: Trajectory,
}

impl ScenarioSession {
    pub fn projection_year(&self) -> i32 {
        self.years[self.years.len() - 1]
    }

    pub fn is_done(&self) -> bool {
        self.session.is_done()
    }

    pub fn stats(&self) -> IntegrationStats {
        self.session.stats()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn progress(&self) -> ScenarioProgress {
        ScenarioProgress {
            done: self.is_done(),
            year: self.trajectory.last_year().unwrap_or(self.years[0]),
            projection_year: self.projection_year(),
        }
    }

    /// Integrates one more year; returns the year written, or `None` when the
    /// horizon has been reached.
    pub fn advance(&mut self) -> Result<Option<i32>> {
        let Some(x) = self.session.advance()? else {
            return Ok(None);
        };
        let normalized = StateVector {
            v: x[0],
            b: x[1],
            p: x[2],
            m: x[3],
            c: x[4],
            s: x[5],
        };
        let year = self.years[self.trajectory.len()];
        self.trajectory
            .push(year, &self.normalizer.denormalize_state(&normalized));
        Ok(Some(year))
    }

    pub fn run_steps(&mut self, batch: usize) -> Result<ScenarioProgress> {
        for _ in 0..batch {
            if self.advance()?.is_none() {
                break;
            }
        }
        Ok(self.progress())
    }

    /// Runs to the horizon and hands back the trajectory.
    pub fn finish(mut self) -> Result<Trajectory> {
        while self.advance()?.is_some() {}

        let stats = self.session.stats();
        debug!(
            "run to {} finished: {} accepted ({} implicit), {} rejected steps",
            self.projection_year(),
            stats.accepted_steps,
            stats.stiff_steps,
            stats.rejected_steps
        );
        for excursion in self.trajectory.negative_excursions(NEGATIVE_TOLERANCE) {
            warn!(
                "{} is negative in {}: {}",
                excursion.quantity, excursion.year, excursion.value
            );
        }
        Ok(self.trajectory)
    }
}

fn unit_multiplier() -> f64 {
    1.0
}

/// A comparison request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub projection_year: i32,
    #[serde(default)]
    pub parameters: ParameterVector,
    #[serde(default = "unit_multiplier")]
    pub incentive_multiplier: f64,
}

impl ScenarioRequest {
    pub fn new(projection_year: i32, parameters: ParameterVector) -> Self {
        Self {
            projection_year,
            parameters,
            incentive_multiplier: 1.0,
        }
    }

    pub fn with_multiplier(mut self, incentive_multiplier: f64) -> Self {
        self.incentive_multiplier = incentive_multiplier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(EARLIEST_PROJECTION_YEAR..=LATEST_PROJECTION_YEAR).contains(&self.projection_year) {
            return Err(FleetError::InvalidHorizon {
                year: self.projection_year,
                earliest: EARLIEST_PROJECTION_YEAR,
                latest: LATEST_PROJECTION_YEAR,
            });
        }
        check_multiplier(self.incentive_multiplier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub request: ScenarioRequest,
    pub baseline_parameters: ParameterVector,
    pub custom: Trajectory,
    pub baseline: Trajectory,
    pub metrics: ComparativeMetrics,
    pub summary: FinalYearSummary,
}

/// Holds the current configuration and runs comparisons against it.
///
/// `replace` swaps the whole configuration; runs already started keep the
/// snapshot they took.
#[derive(Debug)]
pub struct ScenarioEngine {
    current: RwLock<Arc<EngineConfig>>,
}

impl ScenarioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn new_york() -> Result<Self> {
        Ok(Self::new(EngineConfig::new_york()?))
    }

    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `config` and returns the one it replaced.
    pub fn replace(&self, config: EngineConfig) -> Arc<EngineConfig> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(config))
    }

    pub fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(self.snapshot())
    }

    pub fn compare(&self, request: &ScenarioRequest) -> Result<ScenarioResult> {
        self.compare_with_cancel(request, None)
    }

    /// Runs the requested scenario and the baseline, then compares them.
    pub fn compare_with_cancel(
        &self,
        request: &ScenarioRequest,
        cancel: Option<CancelToken>,
    ) -> Result<ScenarioResult> {
        request.validate()?;
        let runner = self.runner();
        let baseline_parameters = *runner.config().baseline();
        let year = request.projection_year;
        debug!("comparing scenario against baseline through {year}");

        let (custom, baseline) = join(
            || {
                runner.run_with(
                    year,
                    &request.parameters,
                    request.incentive_multiplier,
                    cancel.clone(),
                )
            },
            || runner.run_with(year, &baseline_parameters, 1.0, cancel.clone()),
        );
        let (custom, baseline) = (custom?, baseline?);

        Ok(ScenarioResult {
            metrics: ComparativeMetrics::compare(&custom, &baseline)?,
            summary: FinalYearSummary::new(&custom, &baseline)?,
            request: request.clone(),
            baseline_parameters,
            custom,
            baseline,
        })
    }
}

#[cfg(feature = "parallel")]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "parallel"))]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrationCause;
    use crate::integrator::Method;
    use crate::params::DESCRIPTORS;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(Arc::new(EngineConfig::new_york().unwrap()))
    }

    #[test]
    fn base_year_row_is_exact_for_any_parameters() {
        let runner = runner();
        let extreme = ParameterVector::baseline()
            .with("r2", 2.0)
            .unwrap()
            .with("tau", 0.1)
            .unwrap();
        for params in [ParameterVector::baseline(), extreme] {
            let trajectory = runner.run(2030, &params).unwrap();
            assert_eq!(trajectory.years[0], 2017);
            assert_eq!(
                trajectory.at(2017),
                Some(StateVector {
                    v: 10182400.0,
                    b: 8535.0,
                    p: 15413.0,
                    m: 122434580000.0,
                    c: 49398086.0,
                    s: 1871.0,
                })
            );
        }
    }

    #[test]
    fn year_axis_spans_base_through_projection() {
        let trajectory = runner().run(2025, &ParameterVector::baseline()).unwrap();
        assert_eq!(trajectory.years, (2017..=2025).collect::<Vec<_>>());
        assert_eq!(trajectory.co2.len(), 9);

        let only_base = runner().run(2017, &ParameterVector::baseline()).unwrap();
        assert_eq!(only_base.len(), 1);
    }

    #[test]
    fn runs_are_deterministic() {
        let runner = runner();
        let params = ParameterVector::baseline().with("beta2", 2.5).unwrap();
        assert_eq!(
            runner.run(2040, &params).unwrap(),
            runner.run(2040, &params).unwrap()
        );
    }

    #[test]
    fn baseline_stays_non_negative_to_2050() {
        let trajectory = runner().run_baseline(2050).unwrap();
        assert_eq!(trajectory.last_year(), Some(2050));
        let excursions = trajectory.negative_excursions(NEGATIVE_TOLERANCE);
        assert!(excursions.is_empty(), "{excursions:?}");
    }

    #[test]
    fn baseline_bev_fleet_grows_past_2024() {
        let trajectory = runner().run_baseline(2035).unwrap();
        let bev_2035 = trajectory.at(2035).unwrap().b;
        assert!(bev_2035 > 157211.0, "BEV in 2035 = {bev_2035}");
    }

    #[test]
    fn halving_tolerances_barely_moves_final_co2() {
        let loose = runner().run_baseline(2050).unwrap();
        let settings = IntegratorSettings {
            rtol: 0.5e-8,
            atol: 0.5e-10,
            ..IntegratorSettings::default()
        };
        let config = EngineConfig::new_york()
            .unwrap()
            .with_settings(settings)
            .unwrap();
        let tight = ScenarioRunner::new(Arc::new(config))
            .run_baseline(2050)
            .unwrap();

        let a = loose.final_state().unwrap().c;
        let b = tight.final_state().unwrap().c;
        assert!(((a - b) / b).abs() < 1e-3, "{a} vs {b}");
    }

    #[test]
    fn rk4_cross_check_agrees_with_adaptive() {
        let adaptive = runner().run_baseline(2035).unwrap();
        let settings = IntegratorSettings {
            method: Method::Rk4,
            ..IntegratorSettings::default()
        };
        let config = EngineConfig::new_york()
            .unwrap()
            .with_settings(settings)
            .unwrap();
        let runner = ScenarioRunner::new(Arc::new(config));
        let fixed = runner.run_baseline(2035).unwrap();
        let means = runner.config().normalizer().means();
        // Compared in normalized units: the ICEV fleet decays to under one
        // vehicle, far below any absolute floor in vehicles.
        for quantity in Quantity::STATE {
            let mean = means.get(quantity);
            let a = adaptive.series(quantity).unwrap();
            let b = fixed.series(quantity).unwrap();
            for (x, y) in a.iter().zip(b) {
                let (x, y) = (x / mean, y / mean);
                assert!((x - y).abs() <= 1e-6 * y.abs().max(1.0), "{quantity}: {x} vs {y}");
            }
        }
    }

    #[test]
    fn every_documented_range_corner_runs_to_2050() {
        let runner = runner();
        for descriptor in &DESCRIPTORS {
            let Some((min, max)) = descriptor.range else {
                continue;
            };
            for value in [min, max] {
                let params = ParameterVector::baseline()
                    .with(descriptor.name, value)
                    .unwrap();
                assert!(params.out_of_range().is_empty());
                let mut session = runner.start(2050, &params, 1.0, None).unwrap();
                while session
                    .advance()
                    .unwrap_or_else(|err| panic!("{} = {value}: {err}", descriptor.name))
                    .is_some()
                {}
                let stats = session.stats();
                let trajectory = session.finish().unwrap();
                assert_eq!(trajectory.last_year(), Some(2050));
                assert!(
                    trajectory.final_state().unwrap().is_finite(),
                    "{} = {value}",
                    descriptor.name
                );
                assert!(
                    stats.attempted() < 50_000,
                    "{} = {value}: {stats:?}",
                    descriptor.name
                );
            }
        }
    }

    #[test]
    fn fast_growth_switches_to_the_implicit_pair() {
        let runner = runner();
        let params = ParameterVector::baseline().with("r2", 2.0).unwrap();
        let mut session = runner.start(2050, &params, 1.0, None).unwrap();
        while session.advance().unwrap().is_some() {}
        let stats = session.stats();
        assert!(stats.stiff_steps > 0, "{stats:?}");
        assert!(stats.attempted() < IntegratorSettings::default().max_steps);

        let explicit = IntegratorSettings {
            method: Method::Tsit5,
            max_steps: 50_000,
            ..IntegratorSettings::default()
        };
        let config = EngineConfig::new_york()
            .unwrap()
            .with_settings(explicit)
            .unwrap();
        let err = ScenarioRunner::new(Arc::new(config))
            .run(2030, &params)
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::IntegrationFailure {
                cause: IntegrationCause::MaxStepsExceeded,
                ..
            }
        ));
    }

    #[test]
    fn horizon_before_base_year_is_rejected() {
        let err = runner().run(2016, &ParameterVector::baseline()).unwrap_err();
        assert_eq!(
            err,
            FleetError::InvalidHorizon {
                year: 2016,
                earliest: 2017,
                latest: MAX_PROJECTION_YEAR
            }
        );
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let err = runner()
            .run_with(2030, &ParameterVector::baseline(), -1.0, None)
            .unwrap_err();
        assert!(matches!(err, FleetError::InvalidParameterVector(_)));
    }

    #[test]
    fn multiplier_scales_the_ev_response() {
        let runner = runner();
        let params = ParameterVector::baseline();
        let plain = runner.run_with(2030, &params, 1.0, None).unwrap();
        let boosted = runner.run_with(2030, &params, 2.0, None).unwrap();
        let off = runner.run_with(2030, &params, 0.0, None).unwrap();
        let at = |t: &Trajectory| t.at(2030).unwrap().p;
        assert!(at(&boosted) > at(&plain));
        assert!(at(&plain) > at(&off));
    }

    #[test]
    fn session_reports_progress_year_by_year() {
        let runner = runner();
        let mut session = runner
            .start(2020, &ParameterVector::baseline(), 1.0, None)
            .unwrap();
        assert_eq!(
            session.progress(),
            ScenarioProgress {
                done: false,
                year: 2017,
                projection_year: 2020
            }
        );
        assert_eq!(session.advance().unwrap(), Some(2018));
        let progress = session.run_steps(10).unwrap();
        assert!(progress.done);
        assert_eq!(progress.year, 2020);
        assert_eq!(session.advance().unwrap(), None);

        let stepped = session.finish().unwrap();
        assert_eq!(stepped, runner.run_baseline(2020).unwrap());
    }

    #[test]
    fn cancelled_run_surfaces_integration_failure() {
        let token = CancelToken::new();
        token.cancel();
        let err = runner()
            .run_with(2030, &ParameterVector::baseline(), 1.0, Some(token))
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::IntegrationFailure {
                cause: IntegrationCause::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn ev_share_handles_empty_fleet() {
        let trajectory = Trajectory {
            years: vec![2017, 2018],
            icev: vec![3.0, 0.0],
            bev: vec![1.0, 0.0],
            phev: vec![0.0, 0.0],
            vmt: vec![1.0, 1.0],
            co2: vec![1.0, 1.0],
            stations: vec![1.0, -0.5],
        };
        assert_eq!(trajectory.ev_share(), vec![25.0, 0.0]);
        let excursions = trajectory.negative_excursions(1e-9);
        assert_eq!(excursions.len(), 1);
        assert_eq!(excursions[0].quantity, Quantity::Stations);
        assert_eq!(excursions[0].year, 2018);
        assert_eq!(trajectory.series(Quantity::Incentives), None);
    }

    #[test]
    fn request_validation_enforces_public_horizon() {
        let params = ParameterVector::baseline();
        assert!(ScenarioRequest::new(2030, params).validate().is_ok());
        assert_eq!(
            ScenarioRequest::new(2024, params).validate(),
            Err(FleetError::InvalidHorizon {
                year: 2024,
                earliest: 2025,
                latest: 2050
            })
        );
        assert!(ScenarioRequest::new(2051, params).validate().is_err());
        assert!(ScenarioRequest::new(2030, params)
            .with_multiplier(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: ScenarioRequest =
            serde_json::from_str(r#"{"projection_year": 2035}"#).unwrap();
        assert_eq!(request.parameters, ParameterVector::baseline());
        assert_eq!(request.incentive_multiplier, 1.0);
    }

    #[test]
    fn compare_runs_custom_and_baseline() {
        let engine = ScenarioEngine::new_york().unwrap();
        let params = ParameterVector::baseline().with("r2", 0.8).unwrap();
        let result = engine.compare(&ScenarioRequest::new(2030, params)).unwrap();

        assert_eq!(result.baseline, engine.runner().run_baseline(2030).unwrap());
        assert_eq!(result.custom, engine.runner().run(2030, &params).unwrap());
        assert_eq!(result.metrics.years, result.custom.years);
        assert_eq!(result.summary.year, 2030);
        assert_eq!(result.baseline_parameters, ParameterVector::baseline());

        let bad = ScenarioRequest::new(2060, params);
        assert!(matches!(
            engine.compare(&bad),
            Err(FleetError::InvalidHorizon { .. })
        ));
    }

    #[test]
    fn concurrent_runs_share_only_the_snapshot() {
        let runner = runner();
        let expected = runner.run_baseline(2040).unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| runner.run_baseline(2040).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn replacing_the_config_leaves_snapshots_intact() {
        let engine = ScenarioEngine::new_york().unwrap();
        let before = engine.snapshot();

        let altered = EngineConfig::new_york()
            .unwrap()
            .with_baseline(ParameterVector::baseline().with("r2", 0.9).unwrap());
        let previous = engine.replace(altered);

        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.baseline(), &ParameterVector::baseline());
        assert_eq!(engine.snapshot().baseline().get("r2"), Some(0.9));
    }
}
