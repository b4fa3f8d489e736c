//! Stimulus state
//!
//! A stimulus is a moving disc. Everything the engine needs to resolve a
//! frame lives here; per-trial fields are reset by placement.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::partition::PartitionId;

/// One boundary bounce, logged for post-hoc analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BounceRecord {
    /// Host timestamp of the frame the bounce happened in
    pub time: f64,
    /// Velocity after the bounce
    pub vel: DVec2,
    /// Contact position
    pub pos: DVec2,
}

/// A moving disc
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    /// Stable index into the stimulus pool
    pub id: usize,
    pub pos: DVec2,
    /// Displacement per frame
    pub vel: DVec2,
    pub radius: f64,
    /// Fraction of the current frame not yet consumed (0..=1)
    pub remaining: f64,
    /// Cleared permanently once the stimulus phases through a wall
    pub bounce_enabled: bool,
    /// Frames since the last bounce or collision
    pub frames_since_collision: u32,
    /// Area covered by the rest of this frame's motion
    pub swept_box: BoundingBox,
    pub partition_id: Option<PartitionId>,
    pub is_tracked: bool,
    /// Boundary bounces this trial (newest last)
    pub bounces: Vec<BounceRecord>,
}

impl Stimulus {
    pub fn new(id: usize, radius: f64) -> Self {
        debug_assert!(radius > 0.0, "stimulus radius must be positive");
        let mut stim = Self {
            id,
            pos: DVec2::ZERO,
            vel: DVec2::ZERO,
            radius,
            remaining: 1.0,
            bounce_enabled: true,
            frames_since_collision: u32::MAX,
            swept_box: BoundingBox::new(DVec2::ZERO, DVec2::ZERO),
            partition_id: None,
            is_tracked: false,
            bounces: Vec::new(),
        };
        stim.update(1.0);
        stim
    }

    /// Set position and velocity and start a fresh frame
    pub fn set_motion(&mut self, pos: DVec2, vel: DVec2) {
        self.pos = pos;
        self.vel = vel;
        self.update(1.0);
    }

    /// Set the remaining frame fraction and rebuild the swept box
    pub fn update(&mut self, remaining: f64) {
        // NaN also lands on zero
        self.remaining = if remaining > 0.0 { remaining.min(1.0) } else { 0.0 };
        self.swept_box = self.sweep(self.remaining);
    }

    /// Box covering the disc along its path for `fraction` of a frame
    pub fn sweep(&self, fraction: f64) -> BoundingBox {
        let end = self.pos + self.vel * fraction;
        let r = DVec2::splat(self.radius);
        BoundingBox::new(self.pos.min(end) - r, self.pos.max(end) + r)
    }

    /// Restore the per-trial defaults (bouncing, cooldown, log)
    pub fn reset_for_trial(&mut self) {
        self.bounce_enabled = true;
        self.frames_since_collision = u32::MAX;
        self.partition_id = None;
        self.is_tracked = false;
        self.bounces.clear();
        self.update(1.0);
    }

    /// Whether the whole disc sits inside `bounds`
    pub fn is_within(&self, bounds: &BoundingBox) -> bool {
        bounds.inset(self.radius).contains(self.pos)
    }

    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.vel.length_squared()
    }
}
