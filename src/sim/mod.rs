//! Deterministic simulation module
//!
//! All motion logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only (one display frame per tick)
//! - Seeded RNG only
//! - Stable iteration order (partitions column-major, residents in order)
//! - No rendering or platform dependencies

pub mod bbox;
pub mod collision;
pub mod partition;
pub mod placement;
pub mod stimulus;
pub mod tick;
pub mod trial;

pub use bbox::BoundingBox;
pub use collision::{
    Axis, approach_angle, bounce_time, collision_time, reflect_velocity, velocities_after_collision,
};
pub use partition::{Partition, PartitionId, Partitions};
pub use placement::{
    OccupancyGrid, Placement, StartInfo, place_stimuli, random_velocity, tracked_per_partition,
};
pub use stimulus::{BounceRecord, Stimulus};
pub use tick::{FrameInput, FrameReport, ScriptedEvent, tick};
pub use trial::{Session, TrialCondition, TrialData, TrialPhase, TrialPlan, plan_trial};
