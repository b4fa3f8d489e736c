//! Continuous collision math
//!
//! Times are fractions of a frame measured from the stimulus' current
//! position, since velocities are displacements per frame. Every function
//! here is pure; the engine in `tick` decides what to do with the results.

use glam::DVec2;

use super::bbox::BoundingBox;
use super::stimulus::Stimulus;
use crate::consts::GEOMETRY_EPSILON;

/// Wall orientation hit by a bounce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Left/right walls (x component reverses)
    X,
    /// Bottom/top walls (y component reverses)
    Y,
}

impl Axis {
    #[inline]
    fn pick(self, v: DVec2) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }

    #[inline]
    fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Frames until the disc's edge reaches the wall it is heading towards on
/// `axis`. Infinite when the velocity component is zero.
pub fn bounce_time(pos: DVec2, vel: DVec2, radius: f64, bounds: &BoundingBox, axis: Axis) -> f64 {
    let p = axis.pick(pos);
    let v = axis.pick(vel);
    let lo = axis.pick(bounds.min) + radius;
    let hi = axis.pick(bounds.max) - radius;

    let dist = if v < 0.0 {
        p - lo
    } else if v > 0.0 {
        hi - p
    } else {
        return f64::INFINITY;
    };

    // Already at or past the wall: bounce immediately
    dist.max(0.0) / v.abs()
}

/// Exact time of impact between two discs moving in straight lines.
///
/// `None` when they are separating, have no relative motion, or pass each
/// other without touching (tangent contact counts as a miss).
pub fn collision_time(a: &Stimulus, b: &Stimulus) -> Option<f64> {
    let r = a.pos - b.pos;
    let v = a.vel - b.vel;

    let approach = r.dot(v);
    if approach > 0.0 {
        return None;
    }

    let travel = v.length();
    let dist = r.length();
    if travel <= GEOMETRY_EPSILON || dist <= GEOMETRY_EPSILON {
        return None;
    }

    // Angle between -r and v
    let cos_theta = (approach / (dist * travel)).clamp(-1.0, 1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

    let closest = sin_theta * dist;
    let contact = a.radius + b.radius;
    if closest >= contact {
        return None;
    }

    // Distance travelled to the closest point, minus the leg back to contact
    let to_closest = (cos_theta * dist).abs();
    let contact_to_closest = (contact * contact - closest * closest).sqrt();
    let t = (to_closest - contact_to_closest) / travel;

    // Already overlapping: resolve now rather than rewinding
    Some(t.max(0.0))
}

/// Velocities after an elastic collision between equal-mass discs in
/// contact. Only the components along the line of centres are exchanged.
pub fn velocities_after_collision(a: &Stimulus, b: &Stimulus) -> (DVec2, DVec2) {
    let r = a.pos - b.pos;
    let dist = r.length();
    if dist <= GEOMETRY_EPSILON {
        return (a.vel, b.vel);
    }

    let normal = r / dist;
    let speed_along = (a.vel - b.vel).dot(normal);
    let delta = normal * speed_along;
    (a.vel - delta, b.vel + delta)
}

/// Velocity after a specular bounce off a wall on `axis`
#[inline]
pub fn reflect_velocity(vel: DVec2, axis: Axis) -> DVec2 {
    match axis {
        Axis::X => DVec2::new(-vel.x, vel.y),
        Axis::Y => DVec2::new(vel.x, -vel.y),
    }
}

/// Angle between the velocity and the wall being struck on `axis`.
///
/// Head-on approaches give π/2, grazing ones approach 0.
pub fn approach_angle(vel: DVec2, axis: Axis) -> f64 {
    axis.pick(vel).abs().atan2(axis.other().pick(vel).abs())
}
