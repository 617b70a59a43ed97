pub mod autodiff;
pub mod dataset;
pub mod error;
pub mod incentive;
pub mod integrator;
pub mod metrics;
pub mod model;
pub mod normalizer;
pub mod params;
pub mod report;
pub mod scenario;
pub mod solvers;
pub mod stability;
/// The `fleet_core` crate is the simulation engine behind the fleet transition dashboard.
/// It projects the combustion, battery-electric and plug-in hybrid fleets together with
/// travel, emissions and charging stations, and compares a custom scenario to the baseline.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem`, `ForcedSystem` (piecewise forcing), `Steppable` (Solvers).
/// - **Model**: the six coupled fleet equations over mean-normalized state.
/// - **Integrator**: adaptive Tsit5 switching to Rosenbrock23 under stiffness, or fixed RK4,
///   over annual segments; cancellable and resumable.
/// - **Scenario**: `EngineConfig`, `ScenarioRunner`, `ScenarioEngine` for custom vs. baseline runs.
/// - **Autodiff**: Dual numbers for exact Jacobians used by the stability diagnostic.
pub mod traits;

pub use error::{FleetError, IntegrationCause, Result};
pub use params::ParameterVector;
pub use scenario::{
    EngineConfig, ScenarioEngine, ScenarioRequest, ScenarioResult, ScenarioRunner, Trajectory,
};
