//! Fixed-arity rotation and state containers
//!
//! [`Rot`] carries a DCM and its time derivatives; [`State`] carries a
//! position and its time derivatives. Both are parameterized by the
//! derivative order `O ∈ 1..=4` (position through jerk) and live entirely on
//! the stack, so composing transforms along a graph path allocates nothing.
//!
//! Composition and application follow the Leibniz product rule,
//! `(A·B)⁽ᵏ⁾ = Σⱼ C(k,j)·A⁽ᵏ⁻ʲ⁾·B⁽ʲ⁾`, truncated at the container order.

use nalgebra::{Matrix3, Vector3};
use std::ops::{Add, Mul, Neg, Sub};

/// Binomial coefficients C(k, j) for k, j ≤ 3.
pub(crate) const BINOM: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [1.0, 1.0, 0.0, 0.0],
    [1.0, 2.0, 1.0, 0.0],
    [1.0, 3.0, 3.0, 1.0],
];

/// A rotation and its time derivatives up to order `O − 1`.
///
/// Entry `k` is the k-th time derivative of the DCM mapping source axes to
/// target axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot<const O: usize> {
    m: [Matrix3<f64>; O],
}

impl<const O: usize> Rot<O> {
    const ORDER_IN_RANGE: () = assert!(O >= 1 && O <= 4, "derivative order must be 1..=4");

    pub fn new(m: [Matrix3<f64>; O]) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::ORDER_IN_RANGE;
        Rot { m }
    }

    /// The identity rotation with zero derivatives.
    pub fn identity() -> Self {
        let mut m = [Matrix3::zeros(); O];
        m[0] = Matrix3::identity();
        Self::new(m)
    }

    /// A constant rotation: the DCM with zero derivatives.
    pub fn from_dcm(dcm: Matrix3<f64>) -> Self {
        let mut m = [Matrix3::zeros(); O];
        m[0] = dcm;
        Self::new(m)
    }

    /// The k-th derivative block, `k < O`.
    pub fn dcm(&self, k: usize) -> &Matrix3<f64> {
        &self.m[k]
    }

    pub fn order(&self) -> usize {
        O
    }

    /// Leibniz composition: `self` applied after `rhs`.
    pub fn compose(&self, rhs: &Rot<O>) -> Rot<O> {
        let mut out = [Matrix3::zeros(); O];
        for (k, slot) in out.iter_mut().enumerate() {
            let mut acc = Matrix3::zeros();
            for j in 0..=k {
                acc += self.m[k - j] * rhs.m[j] * BINOM[k][j];
            }
            *slot = acc;
        }
        Rot { m: out }
    }

    /// Componentwise transpose, the inverse rotation at every order.
    pub fn inverse(&self) -> Rot<O> {
        let mut out = [Matrix3::zeros(); O];
        for (slot, m) in out.iter_mut().zip(self.m.iter()) {
            *slot = m.transpose();
        }
        Rot { m: out }
    }

    /// Rotate a state, applying the chain rule across derivative orders.
    pub fn transform(&self, s: &State<O>) -> State<O> {
        self.transform_to_order(s, O)
    }

    /// Rotate a state populated only up to `order` entries; higher entries
    /// of the result stay zero.
    pub(crate) fn transform_to_order(&self, s: &State<O>, order: usize) -> State<O> {
        let mut out = [Vector3::zeros(); O];
        for (k, slot) in out.iter_mut().enumerate().take(order) {
            let mut acc = Vector3::zeros();
            for j in 0..=k {
                acc += self.m[k - j] * s.v[j] * BINOM[k][j];
            }
            *slot = acc;
        }
        State { v: out }
    }
}

impl<const O: usize> Mul for Rot<O> {
    type Output = Rot<O>;

    fn mul(self, rhs: Self) -> Rot<O> {
        self.compose(&rhs)
    }
}

impl<const O: usize> Mul<State<O>> for Rot<O> {
    type Output = State<O>;

    fn mul(self, rhs: State<O>) -> State<O> {
        self.transform(&rhs)
    }
}

/// A position and its time derivatives up to order `O − 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State<const O: usize> {
    v: [Vector3<f64>; O],
}

impl<const O: usize> State<O> {
    const ORDER_IN_RANGE: () = assert!(O >= 1 && O <= 4, "derivative order must be 1..=4");

    pub fn new(v: [Vector3<f64>; O]) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::ORDER_IN_RANGE;
        State { v }
    }

    pub fn zero() -> Self {
        Self::new([Vector3::zeros(); O])
    }

    /// A constant offset: position with zero higher derivatives.
    pub fn from_position(r: Vector3<f64>) -> Self {
        let mut v = [Vector3::zeros(); O];
        v[0] = r;
        Self::new(v)
    }

    /// The k-th derivative entry, `k < O`.
    pub fn entry(&self, k: usize) -> &Vector3<f64> {
        &self.v[k]
    }

    pub(crate) fn entry_mut(&mut self, k: usize) -> &mut Vector3<f64> {
        &mut self.v[k]
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.v[0]
    }

    /// Velocity entry; only present when `O ≥ 2`.
    pub fn velocity(&self) -> &Vector3<f64> {
        &self.v[1]
    }

    pub fn order(&self) -> usize {
        O
    }
}

impl<const O: usize> Add for State<O> {
    type Output = State<O>;

    fn add(self, rhs: Self) -> State<O> {
        let mut out = self.v;
        for (slot, r) in out.iter_mut().zip(rhs.v.iter()) {
            *slot += *r;
        }
        State { v: out }
    }
}

impl<const O: usize> Sub for State<O> {
    type Output = State<O>;

    fn sub(self, rhs: Self) -> State<O> {
        let mut out = self.v;
        for (slot, r) in out.iter_mut().zip(rhs.v.iter()) {
            *slot -= *r;
        }
        State { v: out }
    }
}

impl<const O: usize> Neg for State<O> {
    type Output = State<O>;

    fn neg(self) -> State<O> {
        let mut out = self.v;
        for slot in out.iter_mut() {
            *slot = -*slot;
        }
        State { v: out }
    }
}

impl<const O: usize> Mul<f64> for State<O> {
    type Output = State<O>;

    fn mul(self, rhs: f64) -> State<O> {
        let mut out = self.v;
        for slot in out.iter_mut() {
            *slot *= rhs;
        }
        State { v: out }
    }
}
