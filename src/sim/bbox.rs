//! Axis-aligned bounding boxes
//!
//! Used both for partition walls and for the swept area a stimulus covers
//! during the remainder of a frame.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle with `min <= max` componentwise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: DVec2,
    pub max: DVec2,
}

impl BoundingBox {
    /// Build from any two opposite corners
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Build from a centre point and width/height
    pub fn from_center(center: DVec2, dimensions: DVec2) -> Self {
        let half = dimensions.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn dimensions(&self) -> DVec2 {
        self.max - self.min
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Separating-axis overlap test. Touching edges count as overlapping.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(other.min.x > self.max.x
            || other.max.x < self.min.x
            || other.max.y < self.min.y
            || other.min.y > self.max.y)
    }

    /// Inclusive point containment
    pub fn contains(&self, point: DVec2) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }

    /// Box shrunk by `margin` on every side (clamped so it never inverts)
    pub fn inset(&self, margin: f64) -> Self {
        let center = self.center();
        let min = (self.min + DVec2::splat(margin)).min(center);
        let max = (self.max - DVec2::splat(margin)).max(center);
        Self { min, max }
    }
}
