//! Browser bindings for the fleet scenario engine.

mod scenario;

pub use scenario::{WasmScenarioAnalysis, WasmScenarioRunner};
