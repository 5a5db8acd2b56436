//! Boundary contracts for external collaborators
//!
//! The engine deliberately does not read ephemeris kernels, convert time
//! scales, or evaluate precession-nutation series. Those concerns live
//! behind the traits here; the engine consumes TDB seconds past J2000 and
//! whatever states/orientations the collaborators hand back.

use nalgebra::{Matrix3, Vector3};

use crate::errors::Result;
use crate::graphlib::NodeId;

/// One segment of ephemeris coverage: `target` relative to `center`,
/// expressed in `axes`, valid over `[start_epoch, end_epoch]` TDB seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EphemerisRecord {
    pub target: NodeId,
    pub center: NodeId,
    pub axes: NodeId,
    pub start_epoch: f64,
    pub end_epoch: f64,
}

/// Supplier of target-relative-to-center states.
///
/// `compute` fills entries `0..=order` of the returned stack (position
/// through the requested derivative, `order ∈ 0..=3`); entries above the
/// order are unspecified. An epoch outside coverage fails with
/// [`crate::FrameError::DataGap`].
pub trait EphemerisProvider: Send + Sync {
    fn position_records(&self) -> Vec<EphemerisRecord>;

    fn compute(
        &self,
        order: usize,
        target: NodeId,
        center: NodeId,
        epoch: f64,
    ) -> Result<[Vector3<f64>; 4]>;
}

/// Converter from a caller's raw epoch to TDB seconds past J2000.
///
/// Time-scale arithmetic is out of scope for the engine; queries take TDB
/// seconds directly and callers that hold epochs in another scale convert
/// through an implementation of this trait first.
pub trait TimeProvider: Send + Sync {
    fn seconds_past_j2000(&self, raw_epoch: f64) -> f64;
}

/// Body-orientation model (e.g. an IAU 2006/2000 series evaluation),
/// supplying the DCM and its first two time derivatives.
pub trait PlanetaryOrientation: Send + Sync {
    fn dcm(&self, epoch: f64) -> Matrix3<f64>;
    fn ddcm(&self, epoch: f64) -> Matrix3<f64>;
    fn d2dcm(&self, epoch: f64) -> Matrix3<f64>;
}
