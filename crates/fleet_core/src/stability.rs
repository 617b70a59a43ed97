//! Local linearization of the fleet equations.
//!
//! The Jacobian is taken with dual numbers on the frozen system, so the
//! incentive is the one in force during the year containing `t`.

use crate::autodiff::Dual;
use crate::model::{FleetModel, StateVector, STATE_DIM};
use crate::traits::{DynamicalSystem, ForcedSystem};
use anyhow::{bail, Context, Result};
use nalgebra::DMatrix;
use serde::Serialize;

/// Eigenvalues with `|Re λ|` below this are treated as neutral when forming
/// the stiffness ratio.
const NEUTRAL_RATE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Eigenvalue {
    pub re: f64,
    pub im: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    /// Row-major Jacobian of the normalized vector field.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Eigenvalue>,
    /// Largest real part. Negative means locally contracting.
    pub spectral_abscissa: f64,
    pub max_rate: f64,
    /// `max |Re λ| / min |Re λ|` over non-neutral modes.
    pub stiffness_ratio: Option<f64>,
}

/// Row-major Jacobian of `system` at (`t`, `state`), one dual sweep per column.
pub fn jacobian<S: DynamicalSystem<Dual>>(system: &S, t: f64, state: &[f64]) -> Vec<f64> {
    let dim = state.len();
    let mut jac = vec![0.0; dim * dim];
    let mut seeded = vec![Dual::default(); dim];
    let mut out = vec![Dual::default(); dim];

    for j in 0..dim {
        for (i, slot) in seeded.iter_mut().enumerate() {
            *slot = if i == j {
                Dual::variable(state[i])
            } else {
                Dual::constant(state[i])
            };
        }
        system.apply(Dual::constant(t), &seeded, &mut out);
        for i in 0..dim {
            jac[i * dim + j] = out[i].eps;
        }
    }
    jac
}

/// Partial derivative of `system` with respect to `t`, from one dual sweep
/// with the time seeded.
pub fn time_partial<S: DynamicalSystem<Dual>>(system: &S, t: f64, state: &[f64]) -> Vec<f64> {
    let x: Vec<Dual> = state.iter().copied().map(Dual::constant).collect();
    let mut out = vec![Dual::default(); state.len()];
    system.apply(Dual::variable(t), &x, &mut out);
    out.iter().map(|d| d.eps).collect()
}

impl StabilityReport {
    /// Largest eigenvalue modulus.
    pub fn spectral_radius(&self) -> f64 {
        self.eigenvalues
            .iter()
            .map(|e| e.re.hypot(e.im))
            .fold(0.0, f64::max)
    }
}

/// Eigen-analysis of a square row-major matrix.
pub fn spectrum(dim: usize, jac: &[f64]) -> Result<StabilityReport> {
    if jac.len() != dim * dim {
        bail!("expected a {dim}x{dim} matrix, got {} entries", jac.len());
    }
    if let Some(idx) = jac.iter().position(|x| !x.is_finite()) {
        bail!(
            "Jacobian entry ({}, {}) is not finite",
            idx / dim,
            idx % dim
        );
    }

    let eigenvalues: Vec<Eigenvalue> = DMatrix::from_row_slice(dim, dim, jac)
        .complex_eigenvalues()
        .iter()
        .map(|lambda| Eigenvalue {
            re: lambda.re,
            im: lambda.im,
        })
        .collect();

    let spectral_abscissa = eigenvalues
        .iter()
        .map(|e| e.re)
        .fold(f64::NEG_INFINITY, f64::max);
    let rates: Vec<f64> = eigenvalues
        .iter()
        .map(|e| e.re.abs())
        .filter(|r| *r > NEUTRAL_RATE)
        .collect();
    let max_rate = rates.iter().copied().fold(0.0, f64::max);
    let stiffness_ratio = rates
        .iter()
        .copied()
        .reduce(f64::min)
        .map(|min_rate| max_rate / min_rate);

    Ok(StabilityReport {
        jacobian: jac.to_vec(),
        eigenvalues,
        spectral_abscissa,
        max_rate,
        stiffness_ratio,
    })
}

/// Linearizes `model` at normalized `state` and integration time `t`.
pub fn diagnose(model: &FleetModel, t: f64, state: &StateVector) -> Result<StabilityReport> {
    if !state.is_finite() {
        bail!("cannot linearize at a non-finite state {state:?}");
    }
    let frozen = model.freeze(t);
    let jac = jacobian(&frozen, t, &state.to_array());
    spectrum(STATE_DIM, &jac)
        .with_context(|| format!("linearizing the fleet equations at t = {t}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::HistoricalDataset;
    use crate::incentive::IncentiveSignal;
    use crate::model::derivative;
    use crate::normalizer::Normalizer;
    use crate::params::ParameterVector;

    struct Linear(Vec<f64>);

    impl DynamicalSystem<Dual> for Linear {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: Dual, x: &[Dual], out: &mut [Dual]) {
            let a = |k: usize| Dual::constant(self.0[k]);
            out[0] = a(0) * x[0] + a(1) * x[1];
            out[1] = a(2) * x[0] + a(3) * x[1];
        }
    }

    fn sorted(mut values: Vec<Eigenvalue>) -> Vec<Eigenvalue> {
        values.sort_by(|a, b| a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im)));
        values
    }

    #[test]
    fn recovers_a_linear_system() {
        let system = Linear(vec![-1.0, 2.0, 0.0, -3.0]);
        let jac = jacobian(&system, 0.0, &[0.4, -7.0]);
        assert_eq!(jac, vec![-1.0, 2.0, 0.0, -3.0]);

        let report = spectrum(2, &jac).unwrap();
        assert!((report.spectral_radius() - 3.0).abs() < 1e-10);
        let eig = sorted(report.eigenvalues);
        assert!((eig[0].re + 3.0).abs() < 1e-10);
        assert!((eig[1].re + 1.0).abs() < 1e-10);
        assert!((report.spectral_abscissa + 1.0).abs() < 1e-10);
        assert!((report.stiffness_ratio.unwrap() - 3.0).abs() < 1e-10);
    }

    #[test]
    fn rotation_has_no_stiffness_ratio() {
        let report = spectrum(2, &[0.0, -2.0, 2.0, 0.0]).unwrap();
        let eig = sorted(report.eigenvalues.clone());
        assert!((eig[0].im + 2.0).abs() < 1e-10);
        assert!((eig[1].im - 2.0).abs() < 1e-10);
        assert_eq!(report.stiffness_ratio, None);
        assert_eq!(report.max_rate, 0.0);
        assert!((report.spectral_radius() - 2.0).abs() < 1e-10);
    }

    struct Ramp;

    impl DynamicalSystem<Dual> for Ramp {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: Dual, x: &[Dual], out: &mut [Dual]) {
            out[0] = t * t * x[0];
        }
    }

    #[test]
    fn time_partial_seeds_only_the_clock() {
        let partial = time_partial(&Ramp, 3.0, &[0.5]);
        assert_eq!(partial, vec![3.0]);
        assert_eq!(jacobian(&Ramp, 3.0, &[0.5]), vec![9.0]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(spectrum(2, &[1.0, 2.0, 3.0]).is_err());
        let err = spectrum(2, &[1.0, f64::NAN, 0.0, 1.0]).unwrap_err();
        assert!(err.to_string().contains("(0, 1)"), "got \"{err}\"");
    }

    #[test]
    fn fleet_jacobian_matches_finite_differences() {
        let data = HistoricalDataset::new_york();
        let normalizer = Normalizer::from_dataset(&data).unwrap();
        let signal = IncentiveSignal::from_dataset(&data, &normalizer);
        let params = ParameterVector::baseline();
        let model = FleetModel::new(params, signal, 1.0, data.base_year());
        let x = normalizer.initial_state(&data).to_array();
        let incentive = model.incentive_at(0.0);

        let jac = jacobian(&model.freeze(0.0), 0.0, &x);
        let h = 1e-6;
        for j in 0..STATE_DIM {
            let mut up = x;
            let mut down = x;
            up[j] += h;
            down[j] -= h;
            let mut f_up = [0.0; STATE_DIM];
            let mut f_down = [0.0; STATE_DIM];
            derivative(&up, &params, incentive, &mut f_up);
            derivative(&down, &params, incentive, &mut f_down);
            for i in 0..STATE_DIM {
                let fd = (f_up[i] - f_down[i]) / (2.0 * h);
                assert!(
                    (jac[i * STATE_DIM + j] - fd).abs() < 1e-6,
                    "d f{i} / d x{j}: {} vs {fd}",
                    jac[i * STATE_DIM + j]
                );
            }
        }
    }

    #[test]
    fn baseline_initial_state_is_diagnosable() {
        let data = HistoricalDataset::new_york();
        let normalizer = Normalizer::from_dataset(&data).unwrap();
        let signal = IncentiveSignal::from_dataset(&data, &normalizer);
        let model = FleetModel::new(ParameterVector::baseline(), signal, 1.0, data.base_year());

        let report = diagnose(&model, 0.0, &normalizer.initial_state(&data)).unwrap();
        assert_eq!(report.eigenvalues.len(), STATE_DIM);
        assert!(report.spectral_abscissa.is_finite());
        assert!(report.stiffness_ratio.unwrap() >= 1.0);
        // Travel relaxes at rate eta, independent of the fleet.
        assert!((report.jacobian[3 * STATE_DIM + 3] + 1.092616).abs() < 1e-12);
    }

    #[test]
    fn non_finite_state_is_refused() {
        let data = HistoricalDataset::new_york();
        let normalizer = Normalizer::from_dataset(&data).unwrap();
        let signal = IncentiveSignal::from_dataset(&data, &normalizer);
        let model = FleetModel::new(ParameterVector::baseline(), signal, 1.0, 2017);
        let state = StateVector {
            v: f64::NAN,
            ..StateVector::default()
        };
        assert!(diagnose(&model, 0.0, &state).is_err());
    }
}
