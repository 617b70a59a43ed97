//! Integration of forced systems onto a fixed output grid.
//!
//! Each output interval is split at the forcing breakpoints; inside a segment
//! the system is frozen and stepped adaptively with the explicit Tsit5 pair,
//! the implicit Rosenbrock23 pair, or with fixed RK4 substeps.
//!
//! `Method::Auto` starts explicit and watches for stiffness: every
//! `STIFFNESS_CHECK_INTERVAL` attempts it compares the step size with the
//! spectral radius of the Jacobian, and once the product exceeds
//! `STIFFNESS_THRESHOLD` the rest of the run uses Rosenbrock23.

use crate::autodiff::Dual;
use crate::error::{FleetError, IntegrationCause, Result};
use crate::solvers::{Rosenbrock23, Tsit5, RK4};
use crate::stability;
use crate::traits::{DynamicalSystem, EmbeddedSteppable, ForcedSystem, Steppable};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attempts between two stiffness checks under `Method::Auto`.
pub const STIFFNESS_CHECK_INTERVAL: usize = 25;

/// `h * spectral radius` above which explicit steps are treated as limited by
/// stability rather than accuracy. Tsit5 is stable up to about 3.5 on the
/// negative real axis.
pub const STIFFNESS_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Tsit5 until stiffness is detected, Rosenbrock23 afterwards.
    Auto,
    /// Adaptive Tsitouras 5(4).
    Tsit5,
    /// Adaptive Rosenbrock 2(3), linearized with dual numbers.
    Rosenbrock23,
    /// Fixed-step classic RK4, `rk4_substeps` steps per unit time.
    Rk4,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    pub initial_step: f64,
    pub min_step: f64,
    /// Budget of attempted steps for a whole integration.
    pub max_steps: usize,
    pub safety: f64,
    pub max_growth: f64,
    pub min_shrink: f64,
    pub rk4_substeps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Auto,
            rtol: 1e-8,
            atol: 1e-10,
            initial_step: 0.1,
            min_step: 1e-10,
            max_steps: 500_000,
            safety: 0.9,
            max_growth: 5.0,
            min_shrink: 0.2,
            rk4_substeps: 64,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rtol", self.rtol),
            ("atol", self.atol),
            ("initial_step", self.initial_step),
            ("min_step", self.min_step),
            ("safety", self.safety),
            ("min_shrink", self.min_shrink),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FleetError::InvalidSettings(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if !(self.max_growth.is_finite() && self.max_growth > 1.0) {
            return Err(FleetError::InvalidSettings(format!(
                "max_growth must exceed 1, got {}",
                self.max_growth
            )));
        }
        if self.min_shrink >= 1.0 {
            return Err(FleetError::InvalidSettings(format!(
                "min_shrink must be below 1, got {}",
                self.min_shrink
            )));
        }
        if self.max_steps == 0 {
            return Err(FleetError::InvalidSettings(
                "max_steps must be greater than zero".to_string(),
            ));
        }
        if self.rk4_substeps == 0 {
            return Err(FleetError::InvalidSettings(
                "rk4_substeps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation handle, optionally carrying a wall-clock deadline.
///
/// Clones share the same flag, so a caller can keep one and hand another to
/// a running integration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self, t: f64) -> Result<()> {
        if self.is_cancelled() {
            return Err(FleetError::IntegrationFailure {
                t,
                cause: IntegrationCause::Cancelled,
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(FleetError::IntegrationFailure {
                    t,
                    cause: IntegrationCause::DeadlineExceeded,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    /// Accepted steps taken by the implicit pair.
    pub stiff_steps: usize,
}

impl IntegrationStats {
    pub fn attempted(&self) -> usize {
        self.accepted_steps + self.rejected_steps
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationOutput {
    /// One state per requested output time, in request order.
    pub states: Vec<Vec<f64>>,
    pub stats: IntegrationStats,
}

#[derive(Debug, Clone)]
pub struct Integrator {
    settings: IntegratorSettings,
}

impl Integrator {
    pub fn new(settings: IntegratorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    /// Integrates `field` from `initial` at `times[0]` and samples it at every
    /// entry of `times`. The first sample is `initial` itself.
    pub fn integrate<F: ForcedSystem>(
        &self,
        field: &F,
        initial: &[f64],
        times: &[f64],
    ) -> Result<IntegrationOutput> {
        self.session(field, initial, times, None)?.finish()
    }

    pub fn integrate_with_cancel<F: ForcedSystem>(
        &self,
        field: &F,
        initial: &[f64],
        times: &[f64],
        cancel: &CancelToken,
    ) -> Result<IntegrationOutput> {
        self.session(field, initial, times, Some(cancel.clone()))?.finish()
    }

    /// Prepares a run that the caller advances one output time at a time.
    ///
    /// The session owns `field`; pass a reference to keep ownership.
    pub fn session<F: ForcedSystem>(
        &self,
        field: F,
        initial: &[f64],
        times: &[f64],
        cancel: Option<CancelToken>,
    ) -> Result<IntegrationSession<F>> {
        let dim = field.dimension();
        if initial.len() != dim {
            return Err(FleetError::InvalidSettings(format!(
                "initial state has dimension {}, system expects {dim}",
                initial.len()
            )));
        }
        if times.is_empty() {
            return Err(FleetError::InvalidSettings(
                "at least one output time is required".to_string(),
            ));
        }
        if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FleetError::InvalidSettings(
                "output times must be finite and strictly increasing".to_string(),
            ));
        }
        if initial.iter().any(|x| !x.is_finite()) {
            return Err(FleetError::IntegrationFailure {
                t: times[0],
                cause: IntegrationCause::NonFiniteState,
            });
        }

        let mut outputs = Vec::with_capacity(times.len());
        outputs.push(initial.to_vec());

        Ok(IntegrationSession {
            field,
            times: times.to_vec(),
            outputs,
            stepper: Stepper {
                settings: self.settings,
                t: times[0],
                h: self.settings.initial_step,
                state: initial.to_vec(),
                proposal: vec![0.0; dim],
                error: vec![0.0; dim],
                tsit5: Tsit5::new(dim),
                rosenbrock: Rosenbrock23::new(dim),
                rk4: RK4::new(dim),
                stiff: self.settings.method == Method::Rosenbrock23,
                linearized: false,
                since_check: 0,
                stats: IntegrationStats::default(),
                cancel,
            },
        })
    }
}

/// An integration in progress. Holds the only mutable copy of the state.
pub struct IntegrationSession<F: ForcedSystem> {
    field: F,
    times: Vec<f64>,
    outputs: Vec<Vec<f64>>,
    stepper: Stepper,
}

struct Stepper {
    settings: IntegratorSettings,
    t: f64,
    h: f64,
    state: Vec<f64>,
    proposal: Vec<f64>,
    error: Vec<f64>,
    tsit5: Tsit5<f64>,
    rosenbrock: Rosenbrock23,
    rk4: RK4<f64>,
    /// Whether adaptive steps use the implicit pair.
    stiff: bool,
    /// Whether the implicit pair holds the linearization at (`t`, `state`).
    linearized: bool,
    since_check: usize,
    stats: IntegrationStats,
    cancel: Option<CancelToken>,
}

impl<F: ForcedSystem> IntegrationSession<F> {
    pub fn is_done(&self) -> bool {
        self.outputs.len() == self.times.len()
    }

    /// Number of output samples produced so far (the initial one included).
    pub fn completed(&self) -> usize {
        self.outputs.len()
    }

    pub fn total(&self) -> usize {
        self.times.len()
    }

    pub fn time(&self) -> f64 {
        self.stepper.t
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stepper.stats
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn outputs(&self) -> &[Vec<f64>] {
        &self.outputs
    }

    /// Integrates up to the next output time and returns the sampled state,
    /// or `None` once every output time has been produced.
    pub fn advance(&mut self) -> Result<Option<&[f64]>> {
        if self.is_done() {
            return Ok(None);
        }
        let target = self.times[self.outputs.len()];
        self.integrate_to(target)?;
        self.outputs.push(self.stepper.state.clone());
        Ok(self.outputs.last().map(Vec::as_slice))
    }

    pub fn finish(mut self) -> Result<IntegrationOutput> {
        while self.advance()?.is_some() {}
        Ok(IntegrationOutput {
            states: self.outputs,
            stats: self.stepper.stats,
        })
    }

    fn integrate_to(&mut self, target: f64) -> Result<()> {
        let stepper = &mut self.stepper;
        while stepper.t < target {
            let segment_end = match self.field.next_breakpoint(stepper.t) {
                Some(b) if b > stepper.t && b < target => b,
                _ => target,
            };
            let frozen = self.field.freeze(stepper.t);
            stepper.linearized = false;
            match stepper.settings.method {
                Method::Rk4 => stepper.fixed_segment(&frozen, segment_end)?,
                _ => stepper.adaptive_segment(&frozen, segment_end)?,
            }
            stepper.t = segment_end;
            trace!(
                "segment to t = {segment_end}: {} accepted, {} rejected",
                stepper.stats.accepted_steps,
                stepper.stats.rejected_steps
            );
        }
        Ok(())
    }
}

impl Stepper {
    fn check_budget(&self, t: f64) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            cancel.check(t)?;
        }
        if self.stats.attempted() >= self.settings.max_steps {
            return Err(FleetError::IntegrationFailure {
                t,
                cause: IntegrationCause::MaxStepsExceeded,
            });
        }
        Ok(())
    }

    /// Steps from `t` to `end`, switching pairs when `Method::Auto` detects
    /// stiffness.
    fn adaptive_segment<S>(&mut self, system: &S, end: f64) -> Result<()>
    where
        S: DynamicalSystem<f64> + DynamicalSystem<Dual>,
    {
        let s = self.settings;
        let watch = s.method == Method::Auto;

        while self.t < end {
            self.check_budget(self.t)?;
            let t = self.t;

            if watch && !self.stiff && self.since_check >= STIFFNESS_CHECK_INTERVAL {
                self.since_check = 0;
                self.stiff = self.stiffness_limited(system);
            }

            let remaining = end - t;
            let mut h = self.h;
            let clipped = h >= remaining || remaining - h < s.min_step;
            if clipped {
                h = remaining;
            } else if h < s.min_step {
                return Err(FleetError::IntegrationFailure {
                    t,
                    cause: IntegrationCause::StepSizeUnderflow,
                });
            }

            let (solved, order) = if self.stiff {
                if !self.linearized {
                    self.rosenbrock.linearize(system, t, &self.state);
                    self.linearized = true;
                }
                let solved = self
                    .rosenbrock
                    .try_step(system, t, &self.state, h, &mut self.proposal, &mut self.error)
                    .is_some();
                (solved, self.rosenbrock.error_order())
            } else {
                self.since_check += 1;
                self.tsit5
                    .try_step(system, t, &self.state, h, &mut self.proposal, &mut self.error);
                (true, self.tsit5.error_order())
            };
            let exponent = -1.0 / (order + 1) as f64;
            let err_norm = if solved {
                error_norm(&self.state, &self.proposal, &self.error, s.rtol, s.atol)
            } else {
                f64::INFINITY
            };

            if err_norm <= 1.0 {
                if self.proposal.iter().any(|x| !x.is_finite()) {
                    return Err(FleetError::IntegrationFailure {
                        t: t + h,
                        cause: IntegrationCause::NonFiniteState,
                    });
                }
                std::mem::swap(&mut self.state, &mut self.proposal);
                self.t = if clipped { end } else { t + h };
                self.linearized = false;
                self.stats.accepted_steps += 1;
                if self.stiff {
                    self.stats.stiff_steps += 1;
                }

                let factor = if err_norm == 0.0 {
                    s.max_growth
                } else {
                    (s.safety * err_norm.powf(exponent)).clamp(s.min_shrink, s.max_growth)
                };
                let next = h * factor;
                // A step shortened to land on the segment end says nothing
                // about the step the dynamics allow.
                self.h = if clipped { self.h.max(next) } else { next };
            } else {
                self.stats.rejected_steps += 1;
                let factor = if err_norm.is_finite() {
                    (s.safety * err_norm.powf(exponent)).max(s.min_shrink)
                } else {
                    s.min_shrink
                };
                self.h = h * factor;
                if self.h < s.min_step {
                    return Err(FleetError::IntegrationFailure {
                        t,
                        cause: IntegrationCause::StepSizeUnderflow,
                    });
                }
            }
        }
        Ok(())
    }

    /// True when the current step size is bounded by the explicit pair's
    /// stability region rather than by accuracy.
    fn stiffness_limited(&self, system: &impl DynamicalSystem<Dual>) -> bool {
        let jac = stability::jacobian(system, self.t, &self.state);
        let Ok(report) = stability::spectrum(self.state.len(), &jac) else {
            return false;
        };
        let radius = report.spectral_radius();
        let stiff = self.h * radius > STIFFNESS_THRESHOLD;
        if stiff {
            debug!(
                "switching to Rosenbrock23 at t = {}: step {} against spectral radius {radius}",
                self.t, self.h
            );
        }
        stiff
    }

    fn fixed_segment(&mut self, system: &impl DynamicalSystem<f64>, end: f64) -> Result<()> {
        let span = end - self.t;
        let steps = ((span * self.settings.rk4_substeps as f64).ceil() as usize).max(1);
        let h = span / steps as f64;
        let mut t = self.t;

        for _ in 0..steps {
            self.check_budget(t)?;
            self.rk4.step(system, &mut t, &mut self.state, h);
            self.stats.accepted_steps += 1;
            if self.state.iter().any(|x| !x.is_finite()) {
                return Err(FleetError::IntegrationFailure {
                    t,
                    cause: IntegrationCause::NonFiniteState,
                });
            }
        }
        Ok(())
    }
}

/// Scaled RMS norm of the local error estimate.
fn error_norm(state: &[f64], proposal: &[f64], error: &[f64], rtol: f64, atol: f64) -> f64 {
    let sum: f64 = state
        .iter()
        .zip(proposal)
        .zip(error)
        .map(|((x0, x1), e)| {
            let scale = atol + rtol * x0.abs().max(x1.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / state.len() as f64).sqrt()
}
