use crate::autodiff::Dual;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric types the vector fields are generic over.
/// `f64` for integration, `Dual` for exact Jacobians.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// An autonomous (or already time-resolved) vector field.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates dx/dt at (t, x) into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

impl<T: Scalar, S: DynamicalSystem<T> + ?Sized> DynamicalSystem<T> for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        (**self).apply(t, x, out)
    }
}

/// A solver that advances a system by one fixed step.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt, updating `t` and `state` in place.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// A solver carrying an embedded lower-order solution for error control.
pub trait EmbeddedSteppable<T: Scalar> {
    /// Attempts a step of size dt from (t, state) without committing it.
    /// Writes the proposed state to `out` and the local error estimate to `error`.
    fn try_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        out: &mut [T],
        error: &mut [T],
    );

    /// Order of the lower solution, which drives the step-size controller.
    fn error_order(&self) -> i32;
}

/// A vector field driven by an exogenous, piecewise-constant input.
///
/// The integrator never lets a step cross a breakpoint, and evaluates every
/// stage of a step against the system frozen at the step's segment start.
/// The frozen field must also evaluate over `Dual` so that implicit steps can
/// linearize it.
pub trait ForcedSystem {
    type Frozen<'a>: DynamicalSystem<f64> + DynamicalSystem<Dual>
    where
        Self: 'a;

    fn dimension(&self) -> usize;

    /// The vector field with its forcing held at the value it takes at `t`.
    fn freeze(&self, t: f64) -> Self::Frozen<'_>;

    /// First time strictly after `t` at which the forcing may change.
    fn next_breakpoint(&self, _t: f64) -> Option<f64> {
        None
    }
}

impl<F: ForcedSystem + ?Sized> ForcedSystem for &F {
    type Frozen<'a> = F::Frozen<'a> where Self: 'a;

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn freeze(&self, t: f64) -> Self::Frozen<'_> {
        (**self).freeze(t)
    }

    fn next_breakpoint(&self, t: f64) -> Option<f64> {
        (**self).next_breakpoint(t)
    }
}

/// Adapts a plain vector field to the forced interface.
pub struct Unforced<S>(pub S);

impl<S: DynamicalSystem<f64> + DynamicalSystem<Dual>> ForcedSystem for Unforced<S> {
    type Frozen<'a> = &'a S where Self: 'a;

    fn dimension(&self) -> usize {
        DynamicalSystem::<f64>::dimension(&self.0)
    }

    fn freeze(&self, _t: f64) -> Self::Frozen<'_> {
        &self.0
    }
}
