//! Forward-mode automatic differentiation
//!
//! Dual numbers truncated at first order, nested up to three levels deep.
//! A dual carries `(re, du)` with `du` the coefficient of a nilpotent ε
//! (ε² = 0); nesting introduces independent infinitesimals, and because
//! mixed ε-products of a single time variable coincide, the component with
//! k ε-factors is exactly the k-th time derivative. Producers that supply
//! only a base function get their rate, acceleration and jerk synthesized
//! through this module to the machine precision of `f64`.

use nalgebra::{Matrix3, Vector3};
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Scalar that the rotation kernel and user-supplied producers are generic
/// over: `f64` itself, or a (nested) dual number.
///
/// The arithmetic bounds are exactly what `nalgebra` needs to multiply
/// `Matrix3<T>` and `Vector3<T>` values, so a producer written against this
/// trait differentiates for free.
pub trait DiffScalar:
    Copy
    + Debug
    + PartialEq
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Zero
    + One
{
    fn from_f64(x: f64) -> Self;

    /// Strip all derivative parts, leaving the underlying value.
    fn value(self) -> f64;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn sqrt(self) -> Self;
}

impl DiffScalar for f64 {
    fn from_f64(x: f64) -> Self {
        x
    }

    fn value(self) -> f64 {
        self
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

/// First-order dual number over `T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual<T> {
    pub re: T,
    pub du: T,
}

/// Dual carrying the first derivative.
pub type Dual1 = Dual<f64>;
/// Nested dual carrying first and second derivatives.
pub type Dual2 = Dual<Dual1>;
/// Nested dual carrying first, second and third derivatives.
pub type Dual3 = Dual<Dual2>;

impl<T: DiffScalar> Dual<T> {
    pub fn new(re: T, du: T) -> Self {
        Dual { re, du }
    }

    /// Lift a value with zero derivative.
    pub fn constant(x: T) -> Self {
        Dual {
            re: x,
            du: T::zero(),
        }
    }

    /// Seed the differentiation variable: unit derivative.
    pub fn variable(x: T) -> Self {
        Dual {
            re: x,
            du: T::one(),
        }
    }
}

impl<T: DiffScalar> Add for Dual<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Dual::new(self.re + rhs.re, self.du + rhs.du)
    }
}

impl<T: DiffScalar> Sub for Dual<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Dual::new(self.re - rhs.re, self.du - rhs.du)
    }
}

impl<T: DiffScalar> Mul for Dual<T> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Dual::new(
            self.re * rhs.re,
            self.re * rhs.du + self.du * rhs.re,
        )
    }
}

impl<T: DiffScalar> Div for Dual<T> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Dual::new(
            self.re / rhs.re,
            (self.du * rhs.re - self.re * rhs.du) / (rhs.re * rhs.re),
        )
    }
}

impl<T: DiffScalar> Neg for Dual<T> {
    type Output = Self;
    fn neg(self) -> Self {
        Dual::new(-self.re, -self.du)
    }
}

impl<T: DiffScalar> AddAssign for Dual<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: DiffScalar> SubAssign for Dual<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: DiffScalar> MulAssign for Dual<T> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<T: DiffScalar> DivAssign for Dual<T> {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<T: DiffScalar> Zero for Dual<T> {
    fn zero() -> Self {
        Dual::new(T::zero(), T::zero())
    }

    fn is_zero(&self) -> bool {
        self.re.is_zero() && self.du.is_zero()
    }
}

impl<T: DiffScalar> One for Dual<T> {
    fn one() -> Self {
        Dual::new(T::one(), T::zero())
    }
}

impl<T: DiffScalar> DiffScalar for Dual<T> {
    fn from_f64(x: f64) -> Self {
        Dual::constant(T::from_f64(x))
    }

    fn value(self) -> f64 {
        self.re.value()
    }

    fn sin(self) -> Self {
        Dual::new(self.re.sin(), self.du * self.re.cos())
    }

    fn cos(self) -> Self {
        Dual::new(self.re.cos(), -(self.du * self.re.sin()))
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        Dual::new(s, self.du / (s + s))
    }
}

/// A scalar that carries a truncated derivative stack (a jet).
///
/// `ORDER` is the highest derivative the type represents: 0 for `f64`,
/// 1 for [`Dual1`], 2 for [`Dual2`], 3 for [`Dual3`]. `seed` packs the
/// coefficients `[x, ẋ, ẍ, …]` into the nested representation; `coeff(k)`
/// reads the k-th derivative back out.
pub trait Jet: DiffScalar {
    const ORDER: usize;

    /// Pack `coeffs` (length `ORDER + 1`: value followed by derivatives).
    fn seed(coeffs: &[f64]) -> Self;

    /// The k-th derivative carried by this jet, `k <= ORDER`.
    fn coeff(self, k: usize) -> f64;
}

impl Jet for f64 {
    const ORDER: usize = 0;

    fn seed(coeffs: &[f64]) -> Self {
        coeffs[0]
    }

    fn coeff(self, k: usize) -> f64 {
        debug_assert_eq!(k, 0);
        self
    }
}

impl<T: Jet> Jet for Dual<T> {
    const ORDER: usize = T::ORDER + 1;

    fn seed(coeffs: &[f64]) -> Self {
        debug_assert_eq!(coeffs.len(), Self::ORDER + 1);
        Dual {
            re: T::seed(&coeffs[..coeffs.len() - 1]),
            du: T::seed(&coeffs[1..]),
        }
    }

    fn coeff(self, k: usize) -> f64 {
        if k == 0 {
            self.value()
        } else {
            self.du.coeff(k - 1)
        }
    }
}

/// Seed the time variable `t` at the jet's full order.
pub fn variable<J: Jet>(t: f64) -> J {
    let mut coeffs = [0.0; 4];
    coeffs[0] = t;
    if J::ORDER >= 1 {
        coeffs[1] = 1.0;
    }
    J::seed(&coeffs[..J::ORDER + 1])
}

/// Pack a vector derivative stack (`derivs[k]` = k-th derivative) into a
/// jet-valued vector. `derivs.len()` must equal `J::ORDER + 1`.
pub fn seed_vector<J: Jet>(derivs: &[Vector3<f64>]) -> Vector3<J> {
    debug_assert_eq!(derivs.len(), J::ORDER + 1);
    Vector3::from_fn(|i, _| {
        let mut coeffs = [0.0; 4];
        for (k, d) in derivs.iter().enumerate() {
            coeffs[k] = d[i];
        }
        J::seed(&coeffs[..derivs.len()])
    })
}

/// Extract the k-th derivative of every entry of a jet-valued matrix.
pub fn matrix_coeff<J: Jet>(m: &Matrix3<J>, k: usize) -> Matrix3<f64> {
    m.map(|e| e.coeff(k))
}

/// Extract the k-th derivative of every entry of a jet-valued vector.
pub fn vector_coeff<J: Jet>(v: &Vector3<J>, k: usize) -> Vector3<f64> {
    v.map(|e| e.coeff(k))
}

/// A time-only DCM function that can be evaluated over any [`DiffScalar`],
/// so missing derivative orders can be synthesized at registration.
pub trait DcmFunction: Send + Sync + 'static {
    fn eval<T: DiffScalar>(&self, t: T) -> Matrix3<T>;
}

/// A time-only 3-vector function, differentiable like [`DcmFunction`].
pub trait VectorFunction: Send + Sync + 'static {
    fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T>;
}

/// k-th time derivative of a [`DcmFunction`] at `t`, `k ∈ 0..=3`.
pub fn dcm_derivative<F>(f: &F, t: f64, k: usize) -> Matrix3<f64>
where
    F: DcmFunction + ?Sized,
{
    match k {
        0 => f.eval(t),
        1 => matrix_coeff(&f.eval(variable::<Dual1>(t)), 1),
        2 => matrix_coeff(&f.eval(variable::<Dual2>(t)), 2),
        _ => matrix_coeff(&f.eval(variable::<Dual3>(t)), 3),
    }
}

/// k-th time derivative of a [`VectorFunction`] at `t`, `k ∈ 0..=3`.
pub fn vector_derivative<F>(f: &F, t: f64, k: usize) -> Vector3<f64>
where
    F: VectorFunction + ?Sized,
{
    match k {
        0 => f.eval(t),
        1 => vector_coeff(&f.eval(variable::<Dual1>(t)), 1),
        2 => vector_coeff(&f.eval(variable::<Dual2>(t)), 2),
        _ => vector_coeff(&f.eval(variable::<Dual3>(t)), 3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dual_product_rule() {
        // d/dt (t·sin t) = sin t + t·cos t
        let t = 0.7;
        let x = Dual1::variable(t);
        let y = x * x.sin();
        assert_relative_eq!(y.re, t * t.sin(), epsilon = 1e-15);
        assert_relative_eq!(y.du, t.sin() + t * t.cos(), epsilon = 1e-15);
    }

    #[test]
    fn test_dual_quotient_rule() {
        // d/dt (sin t / t) = (t·cos t − sin t) / t²
        let t = 1.3;
        let x = Dual1::variable(t);
        let y = x.sin() / x;
        assert_relative_eq!(y.du, (t * t.cos() - t.sin()) / (t * t), epsilon = 1e-15);
    }

    #[test]
    fn test_sqrt_derivatives() {
        let t = 2.0;
        let x: Dual3 = variable(t);
        let y = x.sqrt();
        assert_relative_eq!(y.coeff(0), t.sqrt(), epsilon = 1e-15);
        assert_relative_eq!(y.coeff(1), 0.5 * t.powf(-0.5), epsilon = 1e-15);
        assert_relative_eq!(y.coeff(2), -0.25 * t.powf(-1.5), epsilon = 1e-15);
        assert_relative_eq!(y.coeff(3), 0.375 * t.powf(-2.5), epsilon = 1e-15);
    }

    #[test]
    fn test_sin_third_derivative() {
        let t = 0.4;
        let x: Dual3 = variable(t);
        let y = x.sin();
        assert_relative_eq!(y.coeff(1), t.cos(), epsilon = 1e-14);
        assert_relative_eq!(y.coeff(2), -t.sin(), epsilon = 1e-14);
        assert_relative_eq!(y.coeff(3), -t.cos(), epsilon = 1e-14);
    }

    #[test]
    fn test_seed_and_coeff_round_trip() {
        let jet: Dual3 = Jet::seed(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(jet.coeff(0), 1.0);
        assert_eq!(jet.coeff(1), 2.0);
        assert_eq!(jet.coeff(2), 3.0);
        assert_eq!(jet.coeff(3), 4.0);
    }

    struct Helix;

    impl VectorFunction for Helix {
        fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T> {
            Vector3::new(t.sin(), t.cos(), t * t)
        }
    }

    #[test]
    fn test_vector_derivative_against_closed_form() {
        let t = 0.9;
        let v1 = vector_derivative(&Helix, t, 1);
        assert_relative_eq!(v1.x, t.cos(), epsilon = 1e-14);
        assert_relative_eq!(v1.y, -t.sin(), epsilon = 1e-14);
        assert_relative_eq!(v1.z, 2.0 * t, epsilon = 1e-14);

        let v2 = vector_derivative(&Helix, t, 2);
        assert_relative_eq!(v2.x, -t.sin(), epsilon = 1e-14);
        assert_relative_eq!(v2.y, -t.cos(), epsilon = 1e-14);
        assert_relative_eq!(v2.z, 2.0, epsilon = 1e-14);

        let v3 = vector_derivative(&Helix, t, 3);
        assert_relative_eq!(v3.x, -t.cos(), epsilon = 1e-14);
        assert_relative_eq!(v3.y, t.sin(), epsilon = 1e-14);
        assert_relative_eq!(v3.z, 0.0, epsilon = 1e-14);
    }
}
