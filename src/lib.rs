//! MOT Sim - motion engine for multiple-object-tracking experiments
//!
//! Core modules:
//! - `sim`: Deterministic simulation (geometry, placement, collisions, trials)
//! - `settings`: Data-driven experiment configuration
//! - `error`: Configuration errors raised before any trial runs

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{Error, Result};
pub use settings::Settings;

use glam::DVec2;

/// Engine configuration constants
pub mod consts {
    /// Display refresh rate assumed when none is configured
    pub const DEFAULT_FRAMERATE: u32 = 60;
    /// Occupancy grid resolution (cells per coordinate unit)
    pub const GRID_CELLS_PER_UNIT: f64 = 1000.0;
    /// Maximum bounces/collisions resolved for one stimulus within a frame
    pub const MAX_RESOLUTIONS_PER_FRAME: u32 = 64;
    /// Minimum approach angle (relative to the wall) for a cross to phase through
    pub const CROSS_MIN_ANGLE: f64 = std::f64::consts::FRAC_PI_4;
    /// Relative speeds and distances below this are treated as zero
    pub const GEOMETRY_EPSILON: f64 = 1e-12;
}

/// Rotate a vector a quarter turn clockwise: (x, y) -> (y, -x)
#[inline]
pub fn rotate_clockwise(v: DVec2) -> DVec2 {
    DVec2::new(v.y, -v.x)
}

/// Unit vector for a heading angle, measured clockwise from +y
#[inline]
pub fn heading_to_unit(theta: f64) -> DVec2 {
    DVec2::new(theta.sin(), theta.cos())
}

/// Total kinetic energy of a set of unit-mass velocities
pub fn kinetic_energy<'a>(velocities: impl IntoIterator<Item = &'a DVec2>) -> f64 {
    velocities.into_iter().map(|v| 0.5 * v.length_squared()).sum()
}
