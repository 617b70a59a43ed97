//! Scenario comparison and stepped scenario runs.

use fleet_core::dataset::Quantity;
use fleet_core::params::{ParameterVector, DESCRIPTORS};
use fleet_core::report::ScenarioReport;
use fleet_core::scenario::{
    EngineConfig, ScenarioEngine, ScenarioProgress, ScenarioRequest, ScenarioRunner,
    ScenarioSession, Trajectory,
};
use fleet_core::stability;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Validates the raw inputs coming from the dashboard.
pub(crate) fn build_request(
    projection_year: i32,
    params: &[f64],
    incentive_multiplier: f64,
) -> fleet_core::Result<ScenarioRequest> {
    let request = ScenarioRequest::new(projection_year, ParameterVector::new(params)?)
        .with_multiplier(incentive_multiplier);
    request.validate()?;
    Ok(request)
}

fn quantity_from_label(label: &str) -> Result<Quantity, String> {
    Quantity::ALL
        .into_iter()
        .find(|q| q.label() == label)
        .ok_or_else(|| format!("Unknown quantity {label}"))
}

#[wasm_bindgen]
pub struct WasmScenarioAnalysis {
    engine: ScenarioEngine,
    request: ScenarioRequest,
}

#[wasm_bindgen]
impl WasmScenarioAnalysis {
    #[wasm_bindgen(constructor)]
    pub fn new(
        projection_year: i32,
        params: Vec<f64>,
        incentive_multiplier: f64,
    ) -> Result<WasmScenarioAnalysis, JsValue> {
        console_error_panic_hook::set_once();

        let request =
            build_request(projection_year, &params, incentive_multiplier).map_err(js_error)?;
        let engine = ScenarioEngine::new_york().map_err(js_error)?;
        Ok(WasmScenarioAnalysis { engine, request })
    }

    /// Custom and baseline runs with metrics, summary and export tables.
    pub fn compare(&self) -> Result<JsValue, JsValue> {
        let result = self.engine.compare(&self.request).map_err(js_error)?;
        serialize(&ScenarioReport::from(result))
    }

    pub fn baseline_parameters(&self) -> Vec<f64> {
        self.engine.snapshot().baseline().values().to_vec()
    }

    pub fn parameter_names() -> js_sys::Array {
        DESCRIPTORS
            .iter()
            .map(|d| JsValue::from_str(d.name))
            .collect()
    }

    pub fn parameter_descriptors() -> Result<JsValue, JsValue> {
        serialize(&DESCRIPTORS)
    }

    pub fn historical(&self) -> Result<JsValue, JsValue> {
        serialize(&self.engine.snapshot().dataset().records())
    }

    /// Linearization of the custom scenario at `year`.
    pub fn stability(&self, year: i32) -> Result<JsValue, JsValue> {
        let config = self.engine.snapshot();
        let runner = ScenarioRunner::new(config.clone());
        let trajectory = runner
            .run_with(
                year,
                &self.request.parameters,
                self.request.incentive_multiplier,
                None,
            )
            .map_err(js_error)?;
        let state = trajectory
            .at(year)
            .ok_or_else(|| JsValue::from_str("Year not in trajectory"))?;

        let model = config.model(self.request.parameters, self.request.incentive_multiplier);
        let t = (year - config.base_year()) as f64;
        let report = stability::diagnose(&model, t, &config.normalizer().normalize_state(&state))
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        serialize(&report)
    }
}

struct FinishedRun {
    trajectory: Trajectory,
    progress: ScenarioProgress,
}

/// Stepped single run, advanced a batch of years per call.
#[wasm_bindgen]
pub struct WasmScenarioRunner {
    session: Option<ScenarioSession>,
    finished: Option<FinishedRun>,
}

#[wasm_bindgen]
impl WasmScenarioRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        projection_year: i32,
        params: Vec<f64>,
        incentive_multiplier: f64,
    ) -> Result<WasmScenarioRunner, JsValue> {
        console_error_panic_hook::set_once();

        let request =
            build_request(projection_year, &params, incentive_multiplier).map_err(js_error)?;
        let config = EngineConfig::new_york().map_err(js_error)?;
        let session = ScenarioRunner::new(Arc::new(config))
            .start(
                request.projection_year,
                &request.parameters,
                request.incentive_multiplier,
                None,
            )
            .map_err(js_error)?;

        Ok(WasmScenarioRunner {
            session: Some(session),
            finished: None,
        })
    }

    pub fn is_done(&self) -> bool {
        self.finished.is_some()
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        if let Some(finished) = &self.finished {
            return serialize(&finished.progress);
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let progress = session.run_steps(batch_size as usize).map_err(js_error)?;
        if progress.done {
            if let Some(session) = self.session.take() {
                let trajectory = session.finish().map_err(js_error)?;
                self.finished = Some(FinishedRun {
                    trajectory,
                    progress,
                });
            }
        }
        serialize(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        match (&self.finished, &self.session) {
            (Some(finished), _) => serialize(&finished.progress),
            (None, Some(session)) => serialize(&session.progress()),
            (None, None) => Err(JsValue::from_str("Runner not initialized")),
        }
    }

    /// Years integrated so far for one quantity label (e.g. "BEV").
    /// "Incentives" is a valid label but is never projected, so its series is
    /// empty.
    pub fn partial_series(&self, label: &str) -> Result<Vec<f64>, JsValue> {
        let quantity = quantity_from_label(label).map_err(js_error)?;
        let trajectory = match (&self.finished, &self.session) {
            (Some(finished), _) => &finished.trajectory,
            (None, Some(session)) => session.trajectory(),
            (None, None) => return Err(JsValue::from_str("Runner not initialized")),
        };
        Ok(trajectory
            .series(quantity)
            .map(<[f64]>::to_vec)
            .unwrap_or_default())
    }

    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let finished = self
            .finished
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Scenario run has not finished yet."))?;
        serialize(&finished.trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FleetError;

    #[test]
    fn build_request_validates_inputs() {
        let baseline = *ParameterVector::baseline().values();
        let request = build_request(2030, &baseline, 1.5).unwrap();
        assert_eq!(request.projection_year, 2030);
        assert_eq!(request.incentive_multiplier, 1.5);

        assert!(matches!(
            build_request(2030, &baseline[..20], 1.0),
            Err(FleetError::InvalidParameterVector(_))
        ));
        assert!(matches!(
            build_request(2020, &baseline, 1.0),
            Err(FleetError::InvalidHorizon { .. })
        ));
        assert!(build_request(2030, &baseline, -2.0).is_err());
    }

    #[test]
    fn every_quantity_label_resolves() {
        for quantity in Quantity::ALL {
            assert_eq!(quantity_from_label(quantity.label()), Ok(quantity));
        }
        assert_eq!(quantity_from_label("Incentives"), Ok(Quantity::Incentives));
        assert!(quantity_from_label("bev").is_err());
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn baseline() -> Vec<f64> {
        ParameterVector::baseline().values().to_vec()
    }

    #[wasm_bindgen_test]
    fn runner_steps_to_completion() {
        let mut runner = WasmScenarioRunner::new(2027, baseline(), 1.0).unwrap();
        assert!(runner.get_result().is_err());
        for _ in 0..20 {
            runner.run_steps(3).unwrap();
            if runner.is_done() {
                break;
            }
        }
        assert!(runner.is_done());
        assert_eq!(runner.partial_series("BEV").unwrap().len(), 11);
        assert!(runner.get_result().is_ok());
        assert!(runner.partial_series("Incentives").unwrap().is_empty());
        assert!(runner.partial_series("nope").is_err());
    }

    #[wasm_bindgen_test]
    fn analysis_rejects_bad_horizon() {
        assert!(WasmScenarioAnalysis::new(2060, baseline(), 1.0).is_err());
        let analysis = WasmScenarioAnalysis::new(2030, baseline(), 1.0).unwrap();
        assert_eq!(analysis.baseline_parameters(), baseline());
        assert!(analysis.compare().is_ok());
        assert_eq!(WasmScenarioAnalysis::parameter_names().length(), 24);
    }
}
