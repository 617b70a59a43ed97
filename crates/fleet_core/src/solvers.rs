use crate::autodiff::Dual;
use crate::stability;
use crate::traits::{DynamicalSystem, EmbeddedSteppable, Scalar, Steppable};
use nalgebra::{DMatrix, DVector, Dyn, LU};

fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Classic Runge-Kutta 4th order solver.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = constant(0.5);
        let sixth: T = constant(1.0 / 6.0);
        let two: T = constant(2.0);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

// Tsitouras (2011) 5(4) tableau.
const TSIT5_C: [f64; 6] = [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0];

const TSIT5_A: [[f64; 6]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.161, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-0.008480655492356989, 0.335480655492357, 0.0, 0.0, 0.0, 0.0],
    [2.897153057105493, -6.359448489975075, 4.3622954328695815, 0.0, 0.0, 0.0],
    [
        5.325864828439257,
        -11.748883564062828,
        7.4955393428898365,
        -0.09249506636175525,
        0.0,
        0.0,
    ],
    [
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.028269050394068383,
        0.0,
    ],
];

const TSIT5_B: [f64; 6] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436081,
    2.324710524099774,
];

/// Difference between the 5th and 4th order weights; the 7th weight
/// multiplies the first-same-as-last stage at the proposed state.
const TSIT5_BTILDE: [f64; 7] = [
    -0.00178001105222577714,
    -0.0008164344596567469,
    0.007880878010261995,
    -0.1447110071732629,
    0.5823571654525552,
    -0.45808210592918697,
    1.0 / 66.0,
];

/// Tsitouras 5/4 pair with its embedded error estimate.
pub struct Tsit5<T: Scalar> {
    k: [Vec<T>; 7],
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k: std::array::from_fn(|_| vec![z; dim]),
            tmp: vec![z; dim],
        }
    }

    /// Evaluates stages k1..k6 and writes the 5th order solution to `out`.
    fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t0: T,
        state: &[T],
        dt: T,
        out: &mut [T],
    ) {
        let dim = state.len();
        system.apply(t0, state, &mut self.k[0]);

        for stage in 1..6 {
            for i in 0..dim {
                let mut acc = T::zero();
                for (j, a) in TSIT5_A[stage][..stage].iter().enumerate() {
                    acc = acc + constant::<T>(*a) * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            system.apply(t0 + constant::<T>(TSIT5_C[stage]) * dt, &self.tmp, &mut self.k[stage]);
        }

        for i in 0..dim {
            let mut acc = T::zero();
            for (j, b) in TSIT5_B.iter().enumerate() {
                acc = acc + constant::<T>(*b) * self.k[j][i];
            }
            out[i] = state[i] + dt * acc;
        }
    }
}

impl<T: Scalar> EmbeddedSteppable<T> for Tsit5<T> {
    fn try_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        out: &mut [T],
        error: &mut [T],
    ) {
        self.advance(system, t, state, dt, out);
        system.apply(t + dt, out, &mut self.k[6]);

        for i in 0..state.len() {
            let mut acc = T::zero();
            for (j, bt) in TSIT5_BTILDE.iter().enumerate() {
                acc = acc + constant::<T>(*bt) * self.k[j][i];
            }
            error[i] = dt * acc;
        }
    }

    fn error_order(&self) -> i32 {
        4
    }
}

const ROS23_D: f64 = 1.0 / (2.0 + std::f64::consts::SQRT_2);
const ROS23_E32: f64 = 6.0 + std::f64::consts::SQRT_2;

/// Shampine-Reichelt Rosenbrock 2(3) pair. L-stable, so the step size is
/// bounded by accuracy alone once fast modes have decayed.
///
/// Each attempt solves three linear systems with the stage matrix
/// `I - h d J`, factored once per attempt. `J` and the time partial come
/// from [`Rosenbrock23::linearize`], which must be called again whenever the
/// state or the system changes.
pub struct Rosenbrock23 {
    jacobian: Vec<f64>,
    dfdt: Vec<f64>,
    f0: Vec<f64>,
    f1: Vec<f64>,
    f2: Vec<f64>,
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    tmp: Vec<f64>,
}

impl Rosenbrock23 {
    pub fn new(dim: usize) -> Self {
        Self {
            jacobian: vec![0.0; dim * dim],
            dfdt: vec![0.0; dim],
            f0: vec![0.0; dim],
            f1: vec![0.0; dim],
            f2: vec![0.0; dim],
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }

    /// Linearizes `system` at (`t`, `state`) with dual numbers.
    pub fn linearize<S: DynamicalSystem<Dual>>(&mut self, system: &S, t: f64, state: &[f64]) {
        self.jacobian = stability::jacobian(system, t, state);
        self.dfdt = stability::time_partial(system, t, state);
    }

    /// Attempts a step of size `dt` against the last linearization, writing the
    /// 2nd order solution to `out` and its local error estimate to `error`.
    /// Returns `None` when the stage matrix is singular.
    pub fn try_step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        state: &[f64],
        dt: f64,
        out: &mut [f64],
        error: &mut [f64],
    ) -> Option<()> {
        let dim = state.len();
        let hd = dt * ROS23_D;
        let lu = DMatrix::from_fn(dim, dim, |i, j| {
            let identity = if i == j { 1.0 } else { 0.0 };
            identity - hd * self.jacobian[i * dim + j]
        })
        .lu();
        if !lu.is_invertible() {
            return None;
        }

        system.apply(t, state, &mut self.f0);
        for i in 0..dim {
            self.tmp[i] = self.f0[i] + hd * self.dfdt[i];
        }
        solve_into(&lu, &self.tmp, &mut self.k1)?;

        for i in 0..dim {
            self.tmp[i] = state[i] + 0.5 * dt * self.k1[i];
        }
        system.apply(t + 0.5 * dt, &self.tmp, &mut self.f1);
        for i in 0..dim {
            self.tmp[i] = self.f1[i] - self.k1[i];
        }
        solve_into(&lu, &self.tmp, &mut self.k2)?;
        for i in 0..dim {
            self.k2[i] += self.k1[i];
            out[i] = state[i] + dt * self.k2[i];
        }

        system.apply(t + dt, out, &mut self.f2);
        for i in 0..dim {
            self.tmp[i] = self.f2[i]
                - ROS23_E32 * (self.k2[i] - self.f1[i])
                - 2.0 * (self.k1[i] - self.f0[i])
                + hd * self.dfdt[i];
        }
        solve_into(&lu, &self.tmp, &mut self.k3)?;

        for i in 0..dim {
            error[i] = dt / 6.0 * (self.k1[i] - 2.0 * self.k2[i] + self.k3[i]);
        }
        Some(())
    }

    pub fn error_order(&self) -> i32 {
        2
    }
}

fn solve_into(lu: &LU<f64, Dyn, Dyn>, rhs: &[f64], out: &mut [f64]) -> Option<()> {
    let x = lu.solve(&DVector::from_column_slice(rhs))?;
    out.copy_from_slice(x.as_slice());
    Some(())
}
