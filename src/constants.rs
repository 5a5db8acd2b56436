//! Physical and numerical constants shared across the engine.
//!
//! Epochs are TDB seconds past J2000; distances are kilometers unless a
//! caller chooses otherwise (the graph algebra itself is unit-agnostic, only
//! the light-time solver assumes km and seconds).

/// Speed of light in km/s (IAU 1976 / SPICE CLIGHT).
pub const C_KM_S: f64 = 299_792.458;

/// Seconds per day.
pub const DAY_S: f64 = 86400.0;

/// J2000 epoch as a Julian date.
pub const J2000_JD: f64 = 2451545.0;

/// Maximum number of light-time iterations before giving up.
pub const MAX_LIGHT_TIME_ITERATIONS: usize = 50;

/// Positional precision of the light-time solve, in km (1 mm).
///
/// The convergence tolerance on the light time itself is this distance
/// divided by the speed of light.
pub const LIGHT_TIME_PRECISION_KM: f64 = 1e-6;
