//! Forward-mode dual numbers.
//!
//! `Dual` satisfies [`crate::traits::Scalar`], so any generic vector field can
//! be evaluated with one seeded input direction to obtain a Jacobian column.

use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::num::FpCategory;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// `val + eps·ε` with `ε² = 0`. Ordering looks at `val` only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self { val, eps: 0.0 }
    }

    /// An input seeded along its own direction.
    pub fn variable(val: f64) -> Self {
        Self { val, eps: 1.0 }
    }

    fn chain(self, val: f64, slope: f64) -> Self {
        Self {
            val,
            eps: self.eps * slope,
        }
    }
}

impl PartialOrd for Dual {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.eps * rhs.val + self.val * rhs.eps)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let val = self.val / rhs.val;
        Self::new(val, (self.eps - val * rhs.eps) / rhs.val)
    }
}

impl Rem for Dual {
    type Output = Self;
    /// `a % b = a - b·trunc(a/b)`, with the truncation treated as constant.
    fn rem(self, rhs: Self) -> Self {
        let q = (self.val / rhs.val).trunc();
        Self::new(self.val % rhs.val, self.eps - q * rhs.eps)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

macro_rules! assign_ops {
    ($($trait:ident $method:ident $op:tt),*) => {
        $(impl $trait for Dual {
            fn $method(&mut self, rhs: Self) {
                *self = *self $op rhs;
            }
        })*
    };
}

assign_ops!(
    AddAssign add_assign +,
    SubAssign sub_assign -,
    MulAssign mul_assign *,
    DivAssign div_assign /,
    RemAssign rem_assign %
);

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Num for Dual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(src, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

/// Float methods whose value is taken from `f64` with a derivative that is
/// a function of the input value alone.
macro_rules! unary {
    ($($name:ident => |$x:ident| $slope:expr;)*) => {
        $(#[allow(unused_variables)]
        fn $name(self) -> Self {
            let $x = self.val;
            self.chain($x.$name(), $slope)
        })*
    };
}

/// Constants and predicates forwarded to the value part.
macro_rules! forward {
    (consts: $($c:ident),*; preds: $($p:ident),*) => {
        $(fn $c() -> Self {
            Self::constant(<f64 as Float>::$c())
        })*
        $(fn $p(self) -> bool {
            self.val.$p()
        })*
    };
}

impl Float for Dual {
    forward!(
        consts: nan, infinity, neg_infinity, neg_zero, min_value, min_positive_value, max_value;
        preds: is_nan, is_infinite, is_finite, is_normal, is_sign_positive, is_sign_negative
    );

    unary! {
        floor => |x| 0.0;
        ceil => |x| 0.0;
        round => |x| 0.0;
        trunc => |x| 0.0;
        fract => |x| 1.0;
        abs => |x| if x >= 0.0 { 1.0 } else { -1.0 };
        signum => |x| 0.0;
        recip => |x| -1.0 / (x * x);
        sqrt => |x| 0.5 / x.sqrt();
        cbrt => |x| 1.0 / (3.0 * x.cbrt() * x.cbrt());
        exp => |x| x.exp();
        exp2 => |x| x.exp2() * std::f64::consts::LN_2;
        exp_m1 => |x| x.exp();
        ln => |x| 1.0 / x;
        ln_1p => |x| 1.0 / (1.0 + x);
        log2 => |x| 1.0 / (x * std::f64::consts::LN_2);
        log10 => |x| 1.0 / (x * std::f64::consts::LN_10);
        sin => |x| x.cos();
        cos => |x| -x.sin();
        tan => |x| 1.0 / (x.cos() * x.cos());
        asin => |x| 1.0 / (1.0 - x * x).sqrt();
        acos => |x| -1.0 / (1.0 - x * x).sqrt();
        atan => |x| 1.0 / (1.0 + x * x);
        sinh => |x| x.cosh();
        cosh => |x| x.sinh();
        tanh => |x| 1.0 - x.tanh() * x.tanh();
        asinh => |x| 1.0 / (x * x + 1.0).sqrt();
        acosh => |x| 1.0 / (x * x - 1.0).sqrt();
        atanh => |x| 1.0 / (1.0 - x * x);
    }

    fn classify(self) -> FpCategory {
        self.val.classify()
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        self.chain(self.val.powi(n), n as f64 * self.val.powi(n - 1))
    }

    fn powf(self, n: Self) -> Self {
        let val = self.val.powf(n.val);
        let from_base = if n.val == 0.0 {
            0.0
        } else {
            n.val * self.val.powf(n.val - 1.0)
        };
        let from_exponent = if n.eps == 0.0 { 0.0 } else { val * self.val.ln() };
        Self::new(val, self.eps * from_base + n.eps * from_exponent)
    }

    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    fn max(self, other: Self) -> Self {
        if self.val >= other.val || other.val.is_nan() {
            self
        } else {
            other
        }
    }

    fn min(self, other: Self) -> Self {
        if self.val <= other.val || other.val.is_nan() {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn atan2(self, other: Self) -> Self {
        let r2 = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / r2,
        )
    }

    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derivative(f: impl Fn(Dual) -> Dual, x: f64) -> f64 {
        f(Dual::variable(x)).eps
    }

    #[test]
    fn arithmetic_follows_the_product_and_quotient_rules() {
        let d = derivative(|x| x * x * Dual::constant(3.0) - x / (x + Dual::one()), 2.0);
        assert!((d - (12.0 - 1.0 / 9.0)).abs() < 1e-12);
    }

    #[test]
    fn elementary_functions_match_closed_forms() {
        let x = 0.7;
        assert!((derivative(Float::exp, x) - x.exp()).abs() < 1e-12);
        assert!((derivative(Float::ln, x) - 1.0 / x).abs() < 1e-12);
        assert!((derivative(Float::sqrt, x) - 0.5 / x.sqrt()).abs() < 1e-12);
        assert!((derivative(Float::sin, x) - x.cos()).abs() < 1e-12);
        assert!((derivative(Float::atan, x) - 1.0 / (1.0 + x * x)).abs() < 1e-12);
        assert!((derivative(|d| d.powi(3), x) - 3.0 * x * x).abs() < 1e-12);
        assert!((derivative(|d| d.powf(Dual::constant(2.5)), x) - 2.5 * x.powf(1.5)).abs() < 1e-12);
    }

    #[test]
    fn comparisons_use_the_value_part() {
        let a = Dual::new(1.0, 5.0);
        let b = Dual::new(2.0, -5.0);
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert_eq!(Dual::new(-3.0, 1.0).abs(), Dual::new(3.0, -1.0));
        assert_eq!(Dual::from_f64(4.0), Some(Dual::constant(4.0)));
    }
}
