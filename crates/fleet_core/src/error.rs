use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

/// Failures surfaced by the engine. None of these are retried internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("projection year {year} is outside the accepted horizon [{earliest}, {latest}]")]
    InvalidHorizon {
        year: i32,
        earliest: i32,
        latest: i32,
    },

    #[error("invalid parameter vector: {0}")]
    InvalidParameterVector(String),

    #[error("historical data error: {0}")]
    DataError(String),

    #[error("integration failed at t = {t}: {cause}")]
    IntegrationFailure { t: f64, cause: IntegrationCause },

    #[error("invalid integrator settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntegrationCause {
    NonFiniteState,
    StepSizeUnderflow,
    MaxStepsExceeded,
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for IntegrationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IntegrationCause::NonFiniteState => "state became non-finite",
            IntegrationCause::StepSizeUnderflow => "step size fell below the minimum",
            IntegrationCause::MaxStepsExceeded => "step budget exhausted",
            IntegrationCause::Cancelled => "cancelled by caller",
            IntegrationCause::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(text)
    }
}
