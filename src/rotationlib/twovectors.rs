//! Two-vectors frame construction
//!
//! Builds a DCM from a primary and a secondary vector: the first letter of
//! the sequence names the axis aligned with the normalized primary, the
//! second names the axis receiving the component of the secondary orthogonal
//! to the primary, and the remaining axis completes the right-handed triad.
//!
//! The higher-order flavours (`rot6`, `rot9`, `rot12`) propagate the input
//! derivative stacks through the normalize/cross/dot pipeline by evaluating
//! the same construction over nested dual numbers, which differentiates the
//! whole pipeline analytically.

use nalgebra::{Matrix3, Vector3};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;

use crate::difflib::{matrix_coeff, seed_vector, DiffScalar, Dual1, Dual2, Dual3};
use crate::errors::{FrameError, Result};
use crate::statelib::Rot;

/// Two-letter axis sequence for the two-vectors construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum TwoVectorsSeq {
    XY,
    YX,
    XZ,
    ZX,
    YZ,
    ZY,
}

impl TwoVectorsSeq {
    pub const ALL: [TwoVectorsSeq; 6] = [
        TwoVectorsSeq::XY,
        TwoVectorsSeq::YX,
        TwoVectorsSeq::XZ,
        TwoVectorsSeq::ZX,
        TwoVectorsSeq::YZ,
        TwoVectorsSeq::ZY,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TwoVectorsSeq::XY => "XY",
            TwoVectorsSeq::YX => "YX",
            TwoVectorsSeq::XZ => "XZ",
            TwoVectorsSeq::ZX => "ZX",
            TwoVectorsSeq::YZ => "YZ",
            TwoVectorsSeq::ZY => "ZY",
        }
    }

    /// Row indices assigned to the primary and secondary directions.
    fn indices(self) -> (usize, usize) {
        match self {
            TwoVectorsSeq::XY => (0, 1),
            TwoVectorsSeq::YX => (1, 0),
            TwoVectorsSeq::XZ => (0, 2),
            TwoVectorsSeq::ZX => (2, 0),
            TwoVectorsSeq::YZ => (1, 2),
            TwoVectorsSeq::ZY => (2, 1),
        }
    }
}

static TWO_VECTORS_SEQ_BY_NAME: Lazy<HashMap<&'static str, TwoVectorsSeq>> = Lazy::new(|| {
    TwoVectorsSeq::ALL
        .iter()
        .map(|&seq| (seq.name(), seq))
        .collect()
});

impl FromStr for TwoVectorsSeq {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        TWO_VECTORS_SEQ_BY_NAME
            .get(s.to_ascii_uppercase().as_str())
            .copied()
            .ok_or_else(|| FrameError::InvalidSequence(s.to_string()))
    }
}

fn unit<T: DiffScalar>(v: &Vector3<T>) -> Vector3<T> {
    *v * (T::one() / v.dot(v).sqrt())
}

/// DCM from the frame the vectors are expressed in to the two-vector frame.
pub fn two_vectors_to_dcm<T: DiffScalar>(
    u: &Vector3<T>,
    w: &Vector3<T>,
    seq: TwoVectorsSeq,
) -> Matrix3<T> {
    let (i, j) = seq.indices();
    let a = unit(u);
    let b = unit(&(*w - a * a.dot(w)));
    // third axis completes the right-handed triad; anti-cyclic sequences
    // flip the cross-product order
    let c = if (i + 1) % 3 == j {
        a.cross(&b)
    } else {
        b.cross(&a)
    };
    let k = 3 - i - j;

    let mut m = Matrix3::zeros();
    for (row, v) in [(i, a), (j, b), (k, c)] {
        m[(row, 0)] = v.x;
        m[(row, 1)] = v.y;
        m[(row, 2)] = v.z;
    }
    m
}

/// Evaluate the two-vector DCM and its time derivatives up to `order − 1`,
/// given derivative stacks for both defining vectors (`u[k]` is the k-th
/// derivative of the primary). Entries above the order are zero.
pub(crate) fn dcm_series(
    u: &[Vector3<f64>],
    w: &[Vector3<f64>],
    seq: TwoVectorsSeq,
    order: usize,
) -> [Matrix3<f64>; 4] {
    debug_assert!(u.len() >= order && w.len() >= order);
    let mut out = [Matrix3::zeros(); 4];
    match order {
        1 => {
            out[0] = two_vectors_to_dcm(&u[0], &w[0], seq);
        }
        2 => {
            let m = two_vectors_to_dcm(
                &seed_vector::<Dual1>(&u[..2]),
                &seed_vector::<Dual1>(&w[..2]),
                seq,
            );
            for (k, slot) in out.iter_mut().enumerate().take(2) {
                *slot = matrix_coeff(&m, k);
            }
        }
        3 => {
            let m = two_vectors_to_dcm(
                &seed_vector::<Dual2>(&u[..3]),
                &seed_vector::<Dual2>(&w[..3]),
                seq,
            );
            for (k, slot) in out.iter_mut().enumerate().take(3) {
                *slot = matrix_coeff(&m, k);
            }
        }
        _ => {
            let m = two_vectors_to_dcm(
                &seed_vector::<Dual3>(&u[..4]),
                &seed_vector::<Dual3>(&w[..4]),
                seq,
            );
            for (k, slot) in out.iter_mut().enumerate() {
                *slot = matrix_coeff(&m, k);
            }
        }
    }
    out
}

/// Two-vectors DCM from plain 3-vectors.
pub fn rot3(u: &Vector3<f64>, w: &Vector3<f64>, seq: TwoVectorsSeq) -> Matrix3<f64> {
    two_vectors_to_dcm(u, w, seq)
}

/// Two-vectors rotation through first order from position/velocity pairs.
pub fn rot6(u: &[Vector3<f64>; 2], w: &[Vector3<f64>; 2], seq: TwoVectorsSeq) -> Rot<2> {
    let s = dcm_series(u, w, seq, 2);
    Rot::new([s[0], s[1]])
}

/// Two-vectors rotation through second order.
pub fn rot9(u: &[Vector3<f64>; 3], w: &[Vector3<f64>; 3], seq: TwoVectorsSeq) -> Rot<3> {
    let s = dcm_series(u, w, seq, 3);
    Rot::new([s[0], s[1], s[2]])
}

/// Two-vectors rotation through third order.
pub fn rot12(u: &[Vector3<f64>; 4], w: &[Vector3<f64>; 4], seq: TwoVectorsSeq) -> Rot<4> {
    let s = dcm_series(u, w, seq, 4);
    Rot::new([s[0], s[1], s[2], s[3]])
}
