//! # framegraph
//!
//! A reference-frame transformation engine for astrodynamics and spacecraft
//! simulation. It answers queries of the form "what is the position,
//! velocity, acceleration and jerk of point P relative to point Q, expressed
//! in axes A, at epoch t?", together with the corresponding rotation queries
//! between axes.
//!
//! Axes and points live in two independent rooted trees keyed by NAIF-style
//! integer IDs. Each node carries a producer (identity, constant offset,
//! time-only function, two-vectors construction, ephemeris delegate or
//! externally updated slot); the evaluator composes node-local transforms
//! along graph paths with the Leibniz product rule and memoizes per thread.
//!
//! # Example
//!
//! ```
//! use framegraph::{FrameSystem, RotationSeq};
//! use framegraph::rotationlib::angles_to_dcm;
//! use std::f64::consts::FRAC_PI_3;
//!
//! let mut sys = FrameSystem::<2>::new();
//! sys.add_inertial_axes(1, "ICRF", None, None)?;
//! sys.add_fixed_offset_axes(
//!     17,
//!     "ECLIPJ2000",
//!     1,
//!     angles_to_dcm(&[FRAC_PI_3], RotationSeq::Z)?,
//! )?;
//!
//! let rot = sys.rotation(1, 17, 0.0)?;
//! assert!((rot.dcm(0)[(0, 0)] - 0.5).abs() < 1e-15);
//! # Ok::<(), framegraph::FrameError>(())
//! ```
//!
//! Epochs are TDB seconds past J2000 (or any scale the caller converts to
//! through a [`providers::TimeProvider`]); the algebra itself is
//! unit-agnostic, only the light-time solver assumes kilometers and seconds.

pub mod axeslib;
pub mod constants;
pub mod difflib;
pub mod errors;
pub mod framelib;
pub mod graphlib;
pub mod pointslib;
pub mod providers;
pub mod rotationlib;
pub mod statelib;

pub use axeslib::{AxesClass, ComputableVector};
pub use difflib::{DcmFunction, DiffScalar, VectorFunction};
pub use errors::{FrameError, Result};
pub use framelib::{FrameSystem, LightTimeCorrection};
pub use graphlib::NodeId;
pub use pointslib::PointClass;
pub use providers::{EphemerisProvider, EphemerisRecord, PlanetaryOrientation, TimeProvider};
pub use rotationlib::twovectors::TwoVectorsSeq;
pub use rotationlib::RotationSeq;
pub use statelib::{Rot, State};
