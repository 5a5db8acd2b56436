//! Rotation kernel: direction cosine matrices and their time derivatives
//!
//! Follows the passive (alias) convention used throughout astrodynamics:
//! a positive rotation about Z by 90° takes the vector `[1, 0, 0]` to
//! `[0, -1, 0]`. Euler-angle sequences compose right-to-left, `M = A₃·A₂·A₁`,
//! so the first angle of the sequence is applied first.
//!
//! Derivative evaluation seeds the angle jets through the same generic DCM
//! builder over nested dual numbers; the results coincide with the
//! per-sequence closed forms to the last bit.

pub mod twovectors;

use nalgebra::{Matrix3, Vector3};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;

use crate::difflib::{matrix_coeff, DiffScalar, Dual1, Dual2, Dual3, Jet};
use crate::errors::{FrameError, Result};

/// A principal rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Symbolic Euler rotation sequence.
///
/// The closed set of 21 sequences: 3 singletons, the 6 two-axis sequences
/// with distinct axes, and all 12 Tait-Bryan / proper-Euler triplets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RotationSeq {
    X,
    Y,
    Z,
    XY,
    XZ,
    YX,
    YZ,
    ZX,
    ZY,
    XYX,
    XYZ,
    XZX,
    XZY,
    YXY,
    YXZ,
    YZX,
    YZY,
    ZXY,
    ZXZ,
    ZYX,
    ZYZ,
}

impl RotationSeq {
    pub const ALL: [RotationSeq; 21] = [
        RotationSeq::X,
        RotationSeq::Y,
        RotationSeq::Z,
        RotationSeq::XY,
        RotationSeq::XZ,
        RotationSeq::YX,
        RotationSeq::YZ,
        RotationSeq::ZX,
        RotationSeq::ZY,
        RotationSeq::XYX,
        RotationSeq::XYZ,
        RotationSeq::XZX,
        RotationSeq::XZY,
        RotationSeq::YXY,
        RotationSeq::YXZ,
        RotationSeq::YZX,
        RotationSeq::YZY,
        RotationSeq::ZXY,
        RotationSeq::ZXZ,
        RotationSeq::ZYX,
        RotationSeq::ZYZ,
    ];

    /// The rotation axes in application order (first applied first).
    pub fn axes(self) -> &'static [Axis] {
        use Axis::*;
        match self {
            RotationSeq::X => &[X],
            RotationSeq::Y => &[Y],
            RotationSeq::Z => &[Z],
            RotationSeq::XY => &[X, Y],
            RotationSeq::XZ => &[X, Z],
            RotationSeq::YX => &[Y, X],
            RotationSeq::YZ => &[Y, Z],
            RotationSeq::ZX => &[Z, X],
            RotationSeq::ZY => &[Z, Y],
            RotationSeq::XYX => &[X, Y, X],
            RotationSeq::XYZ => &[X, Y, Z],
            RotationSeq::XZX => &[X, Z, X],
            RotationSeq::XZY => &[X, Z, Y],
            RotationSeq::YXY => &[Y, X, Y],
            RotationSeq::YXZ => &[Y, X, Z],
            RotationSeq::YZX => &[Y, Z, X],
            RotationSeq::YZY => &[Y, Z, Y],
            RotationSeq::ZXY => &[Z, X, Y],
            RotationSeq::ZXZ => &[Z, X, Z],
            RotationSeq::ZYX => &[Z, Y, X],
            RotationSeq::ZYZ => &[Z, Y, Z],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RotationSeq::X => "X",
            RotationSeq::Y => "Y",
            RotationSeq::Z => "Z",
            RotationSeq::XY => "XY",
            RotationSeq::XZ => "XZ",
            RotationSeq::YX => "YX",
            RotationSeq::YZ => "YZ",
            RotationSeq::ZX => "ZX",
            RotationSeq::ZY => "ZY",
            RotationSeq::XYX => "XYX",
            RotationSeq::XYZ => "XYZ",
            RotationSeq::XZX => "XZX",
            RotationSeq::XZY => "XZY",
            RotationSeq::YXY => "YXY",
            RotationSeq::YXZ => "YXZ",
            RotationSeq::YZX => "YZX",
            RotationSeq::YZY => "YZY",
            RotationSeq::ZXY => "ZXY",
            RotationSeq::ZXZ => "ZXZ",
            RotationSeq::ZYX => "ZYX",
            RotationSeq::ZYZ => "ZYZ",
        }
    }

    /// Number of angles the sequence consumes.
    pub fn angle_count(self) -> usize {
        self.axes().len()
    }
}

/// Sequence lookup table, keyed by the symbolic name.
static SEQ_BY_NAME: Lazy<HashMap<&'static str, RotationSeq>> = Lazy::new(|| {
    RotationSeq::ALL
        .iter()
        .map(|&seq| (seq.name(), seq))
        .collect()
});

impl FromStr for RotationSeq {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        SEQ_BY_NAME
            .get(s.to_ascii_uppercase().as_str())
            .copied()
            .ok_or_else(|| FrameError::InvalidSequence(s.to_string()))
    }
}

/// Skew-symmetric cross-product matrix of `w`: `skew(w)·v = w × v`.
pub fn skew(w: &Vector3<f64>) -> Matrix3<f64> {
    #[rustfmt::skip]
    let m = Matrix3::new(
        0.0,  -w.z,  w.y,
        w.z,   0.0, -w.x,
       -w.y,   w.x,  0.0,
    );
    m
}

/// Time derivative of a DCM whose target frame rotates with angular velocity
/// `w` expressed in the target frame: `Ṁ = −skew(w)·M`.
pub fn ddcm(m: &Matrix3<f64>, w: &Vector3<f64>) -> Matrix3<f64> {
    -skew(w) * m
}

/// Classical Gram-Schmidt on the columns of `m`.
///
/// The result has orthonormal columns when `m` has full rank; a
/// rank-deficient input yields non-finite entries rather than an error.
pub fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let c0 = m.column(0).into_owned();
    let c1 = m.column(1).into_owned();
    let c2 = m.column(2).into_owned();

    let e0 = c0 / c0.norm();
    let v1 = c1 - e0 * e0.dot(&c1);
    let e1 = v1 / v1.norm();
    let v2 = c2 - e0 * e0.dot(&c2) - e1 * e1.dot(&c2);
    let e2 = v2 / v2.norm();

    Matrix3::from_columns(&[e0, e1, e2])
}

/// Passive rotation about a principal axis.
pub fn axis_dcm<T: DiffScalar>(angle: T, axis: Axis) -> Matrix3<T> {
    let (s, c) = (angle.sin(), angle.cos());
    let zero = T::zero();
    let one = T::one();
    match axis {
        #[rustfmt::skip]
        Axis::X => Matrix3::new(
            one,  zero, zero,
            zero,    c,    s,
            zero,   -s,    c,
        ),
        #[rustfmt::skip]
        Axis::Y => Matrix3::new(
            c,    zero,   -s,
            zero,  one,  zero,
            s,    zero,    c,
        ),
        #[rustfmt::skip]
        Axis::Z => Matrix3::new(
            c,       s, zero,
            -s,      c, zero,
            zero, zero,  one,
        ),
    }
}

/// Euler angles to DCM.
///
/// `angles` must supply one angle per letter of `seq`; the rightmost factor
/// of `M = A₃·A₂·A₁` corresponds to the first angle.
pub fn angles_to_dcm<T: DiffScalar>(angles: &[T], seq: RotationSeq) -> Result<Matrix3<T>> {
    let axes = seq.axes();
    if angles.len() != axes.len() {
        return Err(FrameError::DimensionMismatch {
            expected: axes.len(),
            found: angles.len(),
        });
    }
    let mut m = Matrix3::identity();
    for (&angle, &axis) in angles.iter().zip(axes.iter()) {
        m = axis_dcm(angle, axis) * m;
    }
    Ok(m)
}

/// First time derivative of the Euler DCM.
///
/// Each angle slot carries `[angle, rate]`.
pub fn angles_to_ddcm(angles: &[[f64; 2]], seq: RotationSeq) -> Result<Matrix3<f64>> {
    let mut jets = [Dual1::seed(&[0.0; 2]); 3];
    let n = check_arity(angles.len(), seq)?;
    for (jet, a) in jets.iter_mut().zip(angles.iter()) {
        *jet = Jet::seed(a);
    }
    let m = angles_to_dcm(&jets[..n], seq)?;
    Ok(matrix_coeff(&m, 1))
}

/// Second time derivative of the Euler DCM.
///
/// Each angle slot carries `[angle, rate, accel]`.
pub fn angles_to_d2dcm(angles: &[[f64; 3]], seq: RotationSeq) -> Result<Matrix3<f64>> {
    let mut jets = [Dual2::seed(&[0.0; 3]); 3];
    let n = check_arity(angles.len(), seq)?;
    for (jet, a) in jets.iter_mut().zip(angles.iter()) {
        *jet = Jet::seed(a);
    }
    let m = angles_to_dcm(&jets[..n], seq)?;
    Ok(matrix_coeff(&m, 2))
}

/// Third time derivative of the Euler DCM.
///
/// Each angle slot carries `[angle, rate, accel, jerk]`.
pub fn angles_to_d3dcm(angles: &[[f64; 4]], seq: RotationSeq) -> Result<Matrix3<f64>> {
    let mut jets = [Dual3::seed(&[0.0; 4]); 3];
    let n = check_arity(angles.len(), seq)?;
    for (jet, a) in jets.iter_mut().zip(angles.iter()) {
        *jet = Jet::seed(a);
    }
    let m = angles_to_dcm(&jets[..n], seq)?;
    Ok(matrix_coeff(&m, 3))
}

fn check_arity(found: usize, seq: RotationSeq) -> Result<usize> {
    let expected = seq.angle_count();
    if found != expected {
        return Err(FrameError::DimensionMismatch { expected, found });
    }
    Ok(expected)
}
