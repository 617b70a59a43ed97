//! Coupled fleet, travel, emissions and infrastructure dynamics.
//!
//! State (all mean-normalized):
//! - `V` combustion fleet, `B` battery-electric fleet, `P` plug-in hybrid fleet
//! - `M` vehicle miles traveled, `C` CO2 emissions, `S` charging stations
//!
//! ```text
//! total = V + B + P,  e = (B + P) / total
//! dV = r1 V (1 - total/K1)(1 - ω e) - τ V e - ε V
//! dB = r2 B + β1 I + α1 τ V e - γ1 B
//! dP = r3 P + β2 I + α2 τ V e - γ2 P
//! dM = φ1 V + φ2 B + φ3 P - η M
//! dC = (ψ1 V - ψ2 B + ψ3 P) M / total - δ C + ζ (V/total)^2
//! dS = κ (B + P) / total - λS S
//! ```
//! Every term dividing by `total` is zero when the fleet is empty.

use crate::incentive::IncentiveSignal;
use crate::params::ParameterVector;
use crate::traits::{DynamicalSystem, ForcedSystem, Scalar};
use serde::{Deserialize, Serialize};

pub const STATE_DIM: usize = 6;

/// Ordered (V, B, P, M, C, S).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StateVector {
    pub v: f64,
    pub b: f64,
    pub p: f64,
    pub m: f64,
    pub c: f64,
    pub s: f64,
}

impl StateVector {
    pub fn to_array(&self) -> [f64; STATE_DIM] {
        [self.v, self.b, self.p, self.m, self.c, self.s]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|x| x.is_finite())
    }
}

impl From<[f64; STATE_DIM]> for StateVector {
    fn from(x: [f64; STATE_DIM]) -> Self {
        Self {
            v: x[0],
            b: x[1],
            p: x[2],
            m: x[3],
            c: x[4],
            s: x[5],
        }
    }
}

fn lift<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Evaluates the vector field at normalized state `x` under incentive `incentive`.
pub fn derivative<T: Scalar>(x: &[T], params: &ParameterVector, incentive: T, out: &mut [T]) {
    let [
        r1,
        k1,
        alpha1,
        alpha2,
        r2,
        beta1,
        gamma1,
        r3,
        beta2,
        gamma2,
        phi1,
        phi2,
        phi3,
        eta,
        psi1,
        psi2,
        psi3,
        delta,
        epsilon,
        zeta,
        kappa,
        lambda_s,
        omega,
        tau,
    ] = (*params.values()).map(lift::<T>);
    let (v, b, p, m, c, s) = (x[0], x[1], x[2], x[3], x[4], x[5]);

    let zero = T::zero();
    let one = T::one();
    let total = v + b + p;
    let has_fleet = total > zero;
    let ev_fraction = if has_fleet { (b + p) / total } else { zero };
    let conversion = tau * v * ev_fraction;

    out[0] = r1 * v * (one - total / k1) * (one - omega * ev_fraction) - conversion - epsilon * v;
    out[1] = r2 * b + beta1 * incentive + alpha1 * conversion - gamma1 * b;
    out[2] = r3 * p + beta2 * incentive + alpha2 * conversion - gamma2 * p;
    out[3] = phi1 * v + phi2 * b + phi3 * p - eta * m;

    out[4] = if has_fleet {
        let icev_share = v / total;
        (psi1 * v - psi2 * b + psi3 * p) * m / total - delta * c + zeta * icev_share * icev_share
    } else {
        -delta * c
    };

    out[5] = if has_fleet {
        kappa * (b + p) / total - lambda_s * s
    } else {
        -lambda_s * s
    };
}

/// The fleet equations bound to one parameterization and incentive schedule.
///
/// Integration time is measured in years since `base_year`.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetModel {
    pub params: ParameterVector,
    pub signal: IncentiveSignal,
    pub multiplier: f64,
    pub base_year: i32,
}

impl FleetModel {
    pub fn new(
        params: ParameterVector,
        signal: IncentiveSignal,
        multiplier: f64,
        base_year: i32,
    ) -> Self {
        Self {
            params,
            signal,
            multiplier,
            base_year,
        }
    }

    /// Incentive driving the system at integration time `t`.
    pub fn incentive_at(&self, t: f64) -> f64 {
        self.signal.incentive(self.base_year as f64 + t, self.multiplier)
    }
}

/// The fleet equations with the incentive held constant over one year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenFleet {
    pub params: ParameterVector,
    pub incentive: f64,
}

impl<T: Scalar> DynamicalSystem<T> for FrozenFleet {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        derivative(x, &self.params, lift(self.incentive), out);
    }
}

impl ForcedSystem for FleetModel {
    type Frozen<'b> = FrozenFleet;

    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn freeze(&self, t: f64) -> Self::Frozen<'_> {
        FrozenFleet {
            params: self.params,
            incentive: self.incentive_at(t),
        }
    }

    fn next_breakpoint(&self, t: f64) -> Option<f64> {
        Some(t.floor() + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::HistoricalDataset;
    use crate::normalizer::Normalizer;

    fn eval(x: [f64; 6], params: &ParameterVector, incentive: f64) -> [f64; 6] {
        let mut out = [0.0; 6];
        derivative(&x, params, incentive, &mut out);
        out
    }

    #[test]
    fn matches_hand_evaluated_terms() {
        let params = ParameterVector::baseline();
        let x = [1.0, 0.2, 0.3, 1.1, 0.9, 0.5];
        let d = eval(x, &params, 0.4);

        let total = 1.5;
        let e = 0.5 / 1.5;
        let conv = 0.034564 * 1.0 * e;
        let dv = 0.0327 * (1.0 - total / 5.0) * (1.0 - 0.001 * e) - conv - 0.001;
        let db = 0.610068 * 0.2 + 0.001 * 0.4 + 1.0 * conv - 0.226969 * 0.2;
        let dp = 0.739612 * 0.3 + 1.602318 * 0.4 + 0.001 * conv - 0.472536 * 0.3;
        let dm = 1.064947 + 0.01 * 0.2 + 0.01 * 0.3 - 1.092616 * 1.1;
        let dc = (0.013436 - 0.233819 * 0.2 + 0.515323 * 0.3) * 1.1 / total - 0.111435 * 0.9
            + 0.002782 * (1.0 / total) * (1.0 / total);
        let ds = 0.622263 * 0.5 / total - 0.143516 * 0.5;

        for (got, want) in d.iter().zip([dv, db, dp, dm, dc, ds]) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn empty_fleet_substitutes_zero_ratios() {
        let params = ParameterVector::baseline();
        let d = eval([0.0, 0.0, 0.0, 0.8, 0.7, 0.6], &params, 1.5);
        for value in d {
            assert!(value.is_finite());
        }
        assert_eq!(d[0], 0.0);
        assert!((d[1] - 0.001 * 1.5).abs() < 1e-15);
        assert!((d[2] - 1.602318 * 1.5).abs() < 1e-15);
        assert!((d[3] + 1.092616 * 0.8).abs() < 1e-15);
        assert!((d[4] + 0.111435 * 0.7).abs() < 1e-15);
        assert!((d[5] + 0.143516 * 0.6).abs() < 1e-15);
    }

    #[test]
    fn incentive_only_enters_ev_equations() {
        let params = ParameterVector::baseline();
        let x = [1.0, 0.5, 0.5, 1.0, 1.0, 1.0];
        let without = eval(x, &params, 0.0);
        let with = eval(x, &params, 2.0);
        assert_eq!(without[0], with[0]);
        assert!((with[1] - without[1] - 0.002).abs() < 1e-12);
        assert!((with[2] - without[2] - 2.0 * 1.602318).abs() < 1e-12);
        assert_eq!(&without[3..], &with[3..]);
    }

    #[test]
    fn freezing_holds_the_segment_year_incentive() {
        let data = HistoricalDataset::new_york();
        let normalizer = Normalizer::from_dataset(&data).unwrap();
        let signal = IncentiveSignal::from_dataset(&data, &normalizer);
        let params = ParameterVector::baseline();
        let model = FleetModel::new(params, signal.clone(), 1.0, 2017);

        assert_eq!(model.freeze(3.0).incentive, signal.incentive(2020.0, 1.0));
        assert_eq!(model.freeze(3.7).incentive, signal.incentive(2020.0, 1.0));
        assert_eq!(model.next_breakpoint(3.0), Some(4.0));
        assert_eq!(model.next_breakpoint(3.7), Some(4.0));

        let frozen = model.freeze(0.0);
        let mut early = [0.0; 6];
        let mut late = [0.0; 6];
        let x = normalizer.initial_state(&data).to_array();
        DynamicalSystem::<f64>::apply(&frozen, 0.0, &x, &mut early);
        DynamicalSystem::<f64>::apply(&frozen, 0.999, &x, &mut late);
        assert_eq!(early, late);
    }
}
