//! Fixed-step frame advance
//!
//! Moves every stimulus by exactly one display frame. Each stimulus is
//! advanced in turn, resolving wall bounces and stimulus collisions at their
//! exact sub-frame time until its whole frame is consumed.

use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::collision::{
    Axis, approach_angle, bounce_time, collision_time, reflect_velocity,
    velocities_after_collision,
};
use super::partition::{Partition, Partitions};
use super::stimulus::{BounceRecord, Stimulus};
use crate::consts::{CROSS_MIN_ANGLE, MAX_RESOLUTIONS_PER_FRAME};
use crate::rotate_clockwise;

/// Scripted perceptual event the host wants attempted this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptedEvent {
    #[default]
    None,
    /// Let this stimulus phase through the next steep wall hit
    ArmedCross(usize),
    /// Rotate this stimulus' heading 90° once it is clear of walls and others
    ArmedChange(usize),
}

impl ScriptedEvent {
    fn cross_target(&self) -> Option<usize> {
        match *self {
            ScriptedEvent::ArmedCross(id) => Some(id),
            _ => None,
        }
    }

    fn change_target(&self) -> Option<usize> {
        match *self {
            ScriptedEvent::ArmedChange(id) => Some(id),
            _ => None,
        }
    }
}

/// Per-frame context supplied by the host
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    /// Host timestamp stamped onto bounce records
    pub time_on_flip: f64,
    /// Display refresh rate, used for the change cooldown
    pub framerate: u32,
    /// Resolve stimulus-stimulus collisions
    pub collisions: bool,
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            time_on_flip: 0.0,
            framerate: crate::consts::DEFAULT_FRAMERATE,
            collisions: true,
        }
    }
}

/// What happened during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// A scripted cross or change fired
    pub event_fired: bool,
    pub wall_bounces: u32,
    pub pair_collisions: u32,
}

/// Earliest interaction found for a stimulus
#[derive(Debug, Clone, Copy)]
enum Contact {
    Wall(Axis),
    /// Arena index of the other stimulus
    Stimulus(usize),
    /// A later resident reaches its own wall before it would meet this one
    PartnerWall(usize, Axis),
}

/// Advance every stimulus by one frame.
///
/// Partitions are visited column-major and residents in order. A fired
/// script is consumed: `script` is reset to `ScriptedEvent::None`, so it
/// never fires twice without the host arming it again.
pub fn tick(
    partitions: &Partitions,
    stims: &mut [Stimulus],
    script: &mut ScriptedEvent,
    input: &FrameInput,
) -> FrameReport {
    let mut report = FrameReport::default();

    for partition in partitions.iter() {
        for slot in 0..partition.residents.len() {
            if advance_stimulus(partition, slot, stims, script, input, &mut report) {
                log::debug!(
                    "Scripted {:?} fired at t={:.3}",
                    script,
                    input.time_on_flip
                );
                *script = ScriptedEvent::None;
                report.event_fired = true;
            }
        }
    }

    log::trace!(
        "Frame t={:.3}: {} bounces, {} collisions",
        input.time_on_flip,
        report.wall_bounces,
        report.pair_collisions
    );
    report
}

/// Earliest wall hit for a stimulus that still bounces (x wins ties)
fn first_wall(stim: &Stimulus, bounds: &BoundingBox) -> Option<(f64, Axis)> {
    if !stim.bounce_enabled {
        return None;
    }
    let tx = bounce_time(stim.pos, stim.vel, stim.radius, bounds, Axis::X);
    let ty = bounce_time(stim.pos, stim.vel, stim.radius, bounds, Axis::Y);
    let (t, axis) = if tx <= ty { (tx, Axis::X) } else { (ty, Axis::Y) };
    t.is_finite().then_some((t, axis))
}

/// Keep a bouncing stimulus inside its walls despite rounding
fn settle(stim: &mut Stimulus, bounds: &BoundingBox) {
    if stim.bounce_enabled {
        let inner = bounds.inset(stim.radius);
        stim.pos = stim.pos.clamp(inner.min, inner.max);
    }
}

/// Reflect off a wall the stimulus is touching and log the bounce
fn bounce(stim: &mut Stimulus, axis: Axis, time_on_flip: f64) {
    stim.vel = reflect_velocity(stim.vel, axis);
    stim.bounces.push(BounceRecord {
        time: time_on_flip,
        vel: stim.vel,
        pos: stim.pos,
    });
    stim.frames_since_collision = 0;
}

/// Consume one stimulus' remaining frame. Returns true if the armed script
/// fired for it.
fn advance_stimulus(
    partition: &Partition,
    slot: usize,
    stims: &mut [Stimulus],
    script: &ScriptedEvent,
    input: &FrameInput,
    report: &mut FrameReport,
) -> bool {
    let i = partition.residents[slot];
    let bounds = &partition.bounds;

    // Frame already consumed (e.g. by collisions earlier this frame)
    if stims[i].remaining <= 0.0 {
        stims[i].update(1.0);
        return false;
    }

    let cooldown = f64::from(input.framerate) / 4.0;

    for _ in 0..MAX_RESOLUTIONS_PER_FRAME {
        let stim = &stims[i];
        let remaining = stim.remaining;

        // Ties go to the first candidate seen: x wall, y wall, then
        // stimuli in resident order
        let mut earliest: Option<(f64, Contact)> = None;
        let mut consider = |t: f64, contact: Contact| {
            if t < remaining && earliest.is_none_or(|(best, _)| t < best) {
                earliest = Some((t, contact));
            }
        };

        let (tx, ty) = if stim.bounce_enabled {
            (
                bounce_time(stim.pos, stim.vel, stim.radius, bounds, Axis::X),
                bounce_time(stim.pos, stim.vel, stim.radius, bounds, Axis::Y),
            )
        } else {
            (f64::INFINITY, f64::INFINITY)
        };
        consider(tx, Contact::Wall(Axis::X));
        consider(ty, Contact::Wall(Axis::Y));

        if input.collisions {
            for &j in &partition.residents[slot + 1..] {
                let other = &stims[j];
                if !stim.swept_box.intersects(&other.swept_box) {
                    continue;
                }
                let Some(t) = collision_time(stim, other) else {
                    continue;
                };
                match first_wall(other, bounds) {
                    Some((tw, axis)) if tw < t => consider(tw, Contact::PartnerWall(j, axis)),
                    _ => consider(t, Contact::Stimulus(j)),
                }
            }
        }

        match earliest {
            None => {
                let stim = &mut stims[i];
                let mut fired = false;
                if script.change_target() == Some(stim.id)
                    && f64::from(stim.frames_since_collision) > cooldown
                    && tx.min(ty) > cooldown
                {
                    stim.vel = rotate_clockwise(stim.vel);
                    fired = true;
                }
                finish_frame(stim, bounds);
                return fired;
            }

            Some((t, Contact::Wall(axis))) => {
                let stim = &mut stims[i];
                stim.pos += stim.vel * t;
                settle(stim, bounds);

                if script.cross_target() == Some(stim.id)
                    && approach_angle(stim.vel, axis) >= CROSS_MIN_ANGLE
                {
                    stim.bounce_enabled = false;
                    stim.pos += stim.vel * (remaining - t);
                    stim.frames_since_collision = stim.frames_since_collision.saturating_add(1);
                    stim.update(1.0);
                    return true;
                }

                bounce(stim, axis, input.time_on_flip);
                stim.update(remaining - t);
                report.wall_bounces += 1;
            }

            Some((t, Contact::Stimulus(j))) => {
                let remaining_j = stims[j].remaining;
                for k in [i, j] {
                    let s = &mut stims[k];
                    s.pos += s.vel * t;
                    settle(s, bounds);
                }

                let (vel_i, vel_j) = velocities_after_collision(&stims[i], &stims[j]);
                stims[i].vel = vel_i;
                stims[j].vel = vel_j;

                // The partner finishes its own frame when its turn comes
                for (k, left) in [(i, remaining - t), (j, remaining_j - t)] {
                    stims[k].frames_since_collision = 0;
                    stims[k].update(left);
                }
                report.pair_collisions += 1;
            }

            Some((t, Contact::PartnerWall(j, axis))) => {
                let remaining_j = stims[j].remaining;
                for k in [i, j] {
                    let s = &mut stims[k];
                    s.pos += s.vel * t;
                    settle(s, bounds);
                }

                bounce(&mut stims[j], axis, input.time_on_flip);
                stims[j].update(remaining_j - t);
                stims[i].update(remaining - t);
                report.wall_bounces += 1;
            }
        }
    }

    log::warn!(
        "Stimulus {} hit {} contacts in one frame; finishing the frame unresolved",
        stims[i].id,
        MAX_RESOLUTIONS_PER_FRAME
    );
    finish_frame(&mut stims[i], bounds);
    false
}

/// Free flight for whatever is left of the frame
fn finish_frame(stim: &mut Stimulus, bounds: &BoundingBox) {
    stim.pos += stim.vel * stim.remaining;
    settle(stim, bounds);
    stim.frames_since_collision = stim.frames_since_collision.saturating_add(1);
    stim.update(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PartitionId;
    use glam::DVec2;

    /// One partition spanning [-1, 1] on both axes holding `stims` in order
    fn arena(stims: &[(DVec2, DVec2, f64)]) -> (Partitions, Vec<Stimulus>) {
        let mut parts = Partitions::new(DVec2::splat(2.0), DVec2::ZERO, [1, 1], DVec2::ZERO).unwrap();
        let id = PartitionId { column: 0, row: 0 };
        let mut pool = Vec::new();
        for (i, &(pos, vel, radius)) in stims.iter().enumerate() {
            let mut s = Stimulus::new(i, radius);
            s.set_motion(pos, vel);
            s.partition_id = Some(id);
            pool.push(s);
        }
        parts.get_mut(id).unwrap().residents = (0..stims.len()).collect();
        (parts, pool)
    }

    fn energy(stims: &[Stimulus]) -> f64 {
        stims.iter().map(Stimulus::kinetic_energy).sum()
    }

    #[test]
    fn test_free_flight() {
        let (parts, mut stims) = arena(&[(DVec2::ZERO, DVec2::new(0.1, 0.05), 0.1)]);
        let mut script = ScriptedEvent::None;
        let report = tick(&parts, &mut stims, &mut script, &FrameInput::default());

        assert_eq!(report, FrameReport::default());
        assert!((stims[0].pos - DVec2::new(0.1, 0.05)).length() < 1e-12);
        assert_eq!(stims[0].remaining, 1.0);
        assert_eq!(stims[0].frames_since_collision, u32::MAX);
    }

    #[test]
    fn test_wall_bounce_mid_frame() {
        // Edge reaches x = 1 after 0.9 of the frame, then travels back 0.1
        let (parts, mut stims) = arena(&[(DVec2::ZERO, DVec2::new(1.0, 0.0), 0.1)]);
        let mut script = ScriptedEvent::None;
        let input = FrameInput {
            time_on_flip: 2.5,
            ..Default::default()
        };
        let report = tick(&parts, &mut stims, &mut script, &input);

        assert_eq!(report.wall_bounces, 1);
        let s = &stims[0];
        assert_eq!(s.vel, DVec2::new(-1.0, 0.0));
        assert!((s.pos.x - 0.8).abs() < 1e-12);
        assert_eq!(s.bounces.len(), 1);

        let record = s.bounces[0];
        assert!((record.pos.x - 0.9).abs() < 1e-12);
        assert_eq!(record.vel, DVec2::new(-1.0, 0.0));
        assert_eq!(record.time, 2.5);
        // The bounce resets the cooldown, the rest of the frame counts once
        assert_eq!(s.frames_since_collision, 1);
    }

    #[test]
    fn test_bounce_only_flips_perpendicular_component() {
        let (parts, mut stims) = arena(&[(DVec2::new(0.0, 0.85), DVec2::new(0.03, 0.1), 0.1)]);
        let before = stims[0].vel;
        tick(&parts, &mut stims, &mut ScriptedEvent::None, &FrameInput::default());

        let after = stims[0].vel;
        assert_eq!(after.x, before.x);
        assert_eq!(after.y, -before.y);
        assert!(stims[0].pos.y <= 0.9 + 1e-12);
    }

    #[test]
    fn test_corner_bounces_both_walls_in_one_frame() {
        let (parts, mut stims) = arena(&[(DVec2::new(0.85, 0.8), DVec2::new(0.1, 0.2), 0.1)]);
        let report = tick(&parts, &mut stims, &mut ScriptedEvent::None, &FrameInput::default());

        assert_eq!(report.wall_bounces, 2);
        assert_eq!(stims[0].vel, DVec2::new(-0.1, -0.2));
        let bounds = parts.iter().next().unwrap().bounds;
        assert!(stims[0].is_within(&bounds));
    }

    #[test]
    fn test_head_on_collision_swaps_velocities() {
        let (parts, mut stims) = arena(&[
            (DVec2::new(-0.2, 0.0), DVec2::new(0.2, 0.0), 0.1),
            (DVec2::new(0.2, 0.0), DVec2::new(-0.2, 0.0), 0.1),
        ]);
        let report = tick(&parts, &mut stims, &mut ScriptedEvent::None, &FrameInput::default());

        assert_eq!(report.pair_collisions, 1);
        assert!((stims[0].vel - DVec2::new(-0.2, 0.0)).length() < 1e-12);
        assert!((stims[1].vel - DVec2::new(0.2, 0.0)).length() < 1e-12);
        // Contact at t = 0.5, then both back off for the other half frame
        assert!((stims[0].pos.x - -0.2).abs() < 1e-12);
        assert!((stims[1].pos.x - 0.2).abs() < 1e-12);
        assert_eq!(stims[0].frames_since_collision, 1);
        assert_eq!(stims[1].frames_since_collision, 1);
    }

    #[test]
    fn test_partner_bounces_off_its_wall_before_contact() {
        // The later resident reaches x = 0.9 at t = 0.5, before the pair
        // would touch at t = 0.95
        let (parts, mut stims) = arena(&[
            (DVec2::new(0.46, 0.0), DVec2::new(0.3, 0.0), 0.1),
            (DVec2::new(0.85, 0.0), DVec2::new(0.1, 0.0), 0.1),
        ]);
        let before = energy(&stims);
        let report = tick(&parts, &mut stims, &mut ScriptedEvent::None, &FrameInput::default());

        assert_eq!(report.wall_bounces, 2);
        assert_eq!(report.pair_collisions, 1);
        let bounds = parts.iter().next().unwrap().bounds;
        assert!(stims.iter().all(|s| s.is_within(&bounds)));

        // Wall at 0.5, contact at 0.725, wall again at 0.8
        assert!((stims[0].pos.x - 0.65).abs() < 1e-9);
        assert!((stims[1].pos.x - 0.84).abs() < 1e-9);
        assert!((stims[0].vel - DVec2::new(-0.1, 0.0)).length() < 1e-12);
        assert!((stims[1].vel - DVec2::new(-0.3, 0.0)).length() < 1e-12);
        assert_eq!(stims[1].bounces.len(), 2);
        assert!((stims[1].bounces[0].pos.x - 0.9).abs() < 1e-12);
        assert!((energy(&stims) - before).abs() < 1e-12);
    }

    #[test]
    fn test_collisions_can_be_disabled() {
        let (parts, mut stims) = arena(&[
            (DVec2::new(-0.3, 0.0), DVec2::new(0.2, 0.0), 0.1),
            (DVec2::new(0.3, 0.0), DVec2::new(-0.2, 0.0), 0.1),
        ]);
        let input = FrameInput {
            collisions: false,
            ..Default::default()
        };
        let report = tick(&parts, &mut stims, &mut ScriptedEvent::None, &input);
        assert_eq!(report.pair_collisions, 0);
        assert_eq!(stims[0].vel, DVec2::new(0.2, 0.0));
    }

    #[test]
    fn test_oblique_collision_conserves_energy() {
        let (parts, mut stims) = arena(&[
            (DVec2::new(-0.3, 0.05), DVec2::new(0.25, 0.01), 0.08),
            (DVec2::new(0.2, -0.04), DVec2::new(-0.15, 0.02), 0.12),
            (DVec2::new(0.0, 0.6), DVec2::new(0.0, -0.05), 0.1),
        ]);
        let before = energy(&stims);
        let mut collisions = 0;
        for frame in 0..10 {
            let input = FrameInput {
                time_on_flip: frame as f64,
                ..Default::default()
            };
            collisions += tick(&parts, &mut stims, &mut ScriptedEvent::None, &input).pair_collisions;
        }
        assert!(collisions > 0);
        assert!((energy(&stims) - before).abs() < 1e-12);
    }

    #[test]
    fn test_change_fires_once() {
        let (parts, mut stims) = arena(&[(DVec2::ZERO, DVec2::new(0.01, 0.02), 0.1)]);
        stims[0].frames_since_collision = 60;
        let mut script = ScriptedEvent::ArmedChange(0);

        let report = tick(&parts, &mut stims, &mut script, &FrameInput::default());
        assert!(report.event_fired);
        assert_eq!(stims[0].vel, DVec2::new(0.02, -0.01));
        assert!((stims[0].pos - DVec2::new(0.02, -0.01)).length() < 1e-12);
        assert_eq!(script, ScriptedEvent::None);

        // Not re-armed: no second rotation
        let report = tick(&parts, &mut stims, &mut script, &FrameInput::default());
        assert!(!report.event_fired);
        assert_eq!(stims[0].vel, DVec2::new(0.02, -0.01));
    }

    #[test]
    fn test_change_waits_for_cooldown_and_clear_walls() {
        // Recently collided
        let (parts, mut stims) = arena(&[(DVec2::ZERO, DVec2::new(0.01, 0.0), 0.1)]);
        stims[0].frames_since_collision = 10;
        let mut script = ScriptedEvent::ArmedChange(0);
        assert!(!tick(&parts, &mut stims, &mut script, &FrameInput::default()).event_fired);
        assert_eq!(script, ScriptedEvent::ArmedChange(0));
        assert_eq!(stims[0].vel, DVec2::new(0.01, 0.0));

        // Close to a wall: 0.05 away at 0.01 per frame is under 15 frames
        let (parts, mut stims) = arena(&[(DVec2::new(0.85, 0.0), DVec2::new(0.01, 0.0), 0.1)]);
        stims[0].frames_since_collision = 60;
        assert!(!tick(&parts, &mut stims, &mut script, &FrameInput::default()).event_fired);

        // Armed for someone else
        let (parts, mut stims) = arena(&[(DVec2::ZERO, DVec2::new(0.01, 0.0), 0.1)]);
        let mut other = ScriptedEvent::ArmedChange(7);
        assert!(!tick(&parts, &mut stims, &mut other, &FrameInput::default()).event_fired);
    }

    #[test]
    fn test_cross_phases_through_steep_wall_hit() {
        let (parts, mut stims) = arena(&[(DVec2::new(0.8, 0.0), DVec2::new(0.2, 0.0), 0.1)]);
        let mut script = ScriptedEvent::ArmedCross(0);

        let report = tick(&parts, &mut stims, &mut script, &FrameInput::default());
        assert!(report.event_fired);
        assert_eq!(script, ScriptedEvent::None);
        assert!(!stims[0].bounce_enabled);
        assert!(stims[0].bounces.is_empty());
        assert!((stims[0].pos.x - 1.0).abs() < 1e-12);

        // Keeps going straight out of the partition
        for _ in 0..5 {
            tick(&parts, &mut stims, &mut script, &FrameInput::default());
        }
        assert!((stims[0].pos.x - 2.0).abs() < 1e-9);
        let bounds = parts.iter().next().unwrap().bounds;
        assert!(!bounds.contains(stims[0].pos));
    }

    #[test]
    fn test_cross_ignores_grazing_hits() {
        // Approach angle atan(0.2 / 0.5) is well under 45°
        let (parts, mut stims) = arena(&[(DVec2::new(0.8, 0.0), DVec2::new(0.2, 0.5), 0.1)]);
        let mut script = ScriptedEvent::ArmedCross(0);

        let report = tick(&parts, &mut stims, &mut script, &FrameInput::default());
        assert!(!report.event_fired);
        assert_eq!(report.wall_bounces, 1);
        assert!(stims[0].bounce_enabled);
        assert_eq!(stims[0].vel.x, -0.2);
        assert_eq!(script, ScriptedEvent::ArmedCross(0));
    }

    #[test]
    fn test_consumed_frame_is_a_no_op() {
        let (parts, mut stims) = arena(&[
            (DVec2::new(0.85, 0.0), DVec2::new(0.3, 0.0), 0.1),
            (DVec2::new(-0.2, 0.0), DVec2::new(0.1, 0.1), 0.1),
        ]);
        for s in &mut stims {
            s.frames_since_collision = 3;
            s.update(0.0);
        }
        let snapshot: Vec<_> = stims.iter().map(|s| (s.pos, s.vel, s.frames_since_collision)).collect();

        let report = tick(&parts, &mut stims, &mut ScriptedEvent::ArmedChange(1), &FrameInput::default());
        assert_eq!(report, FrameReport::default());
        let after: Vec<_> = stims.iter().map(|s| (s.pos, s.vel, s.frames_since_collision)).collect();
        assert_eq!(snapshot, after);
        assert!(stims.iter().all(|s| s.bounces.is_empty()));
        // Ready for the next frame
        assert!(stims.iter().all(|s| s.remaining == 1.0));
    }

    #[test]
    fn test_stimuli_stay_in_partition() {
        let (parts, mut stims) = arena(&[
            (DVec2::new(-0.5, -0.5), DVec2::new(0.07, 0.04), 0.1),
            (DVec2::new(0.5, 0.5), DVec2::new(-0.05, -0.06), 0.1),
            (DVec2::new(0.5, -0.5), DVec2::new(-0.03, 0.08), 0.15),
            (DVec2::new(-0.5, 0.5), DVec2::new(0.06, -0.02), 0.05),
        ]);
        let bounds = parts.iter().next().unwrap().bounds;
        let before = energy(&stims);
        for frame in 0..2000 {
            let input = FrameInput {
                time_on_flip: frame as f64 / 60.0,
                ..Default::default()
            };
            tick(&parts, &mut stims, &mut ScriptedEvent::None, &input);
            for s in &stims {
                assert!(s.is_within(&bounds), "stimulus {} escaped at frame {frame}", s.id);
            }
        }
        assert!((energy(&stims) - before).abs() < 1e-9);
    }
}
