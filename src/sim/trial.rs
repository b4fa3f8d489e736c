//! Trial sequencing
//!
//! A `Session` owns everything one experiment needs and walks a trial through
//! its phases one display frame at a time.

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::partition::Partitions;
use super::placement::{OccupancyGrid, StartInfo, place_stimuli};
use super::stimulus::{BounceRecord, Stimulus};
use super::tick::{FrameInput, FrameReport, ScriptedEvent, tick};
use crate::consts::GRID_CELLS_PER_UNIT;
use crate::error::{Error, Result};
use crate::settings::{Settings, TimingSettings};

/// Perceptual event a trial attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialCondition {
    /// Plain tracking, no event
    Control,
    /// A stimulus phases through its partition wall
    Crossed,
    /// A stimulus turns 90° mid-flight
    Changed,
}

impl TrialCondition {
    pub const ALL: [TrialCondition; 3] = [
        TrialCondition::Control,
        TrialCondition::Crossed,
        TrialCondition::Changed,
    ];

    fn script_for(self, id: usize) -> ScriptedEvent {
        match self {
            TrialCondition::Control => ScriptedEvent::None,
            TrialCondition::Crossed => ScriptedEvent::ArmedCross(id),
            TrialCondition::Changed => ScriptedEvent::ArmedChange(id),
        }
    }
}

/// Where the current trial is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialPhase {
    /// No trial started yet
    Idle,
    /// Free movement before any event
    Tracking,
    /// Script armed every frame until the event fires
    EventSearch,
    /// Movement after the event, before the response
    PostEvent,
    /// Movement over; data ready
    Complete,
}

/// Randomised parameters of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialPlan {
    pub queried_id: usize,
    /// Stimulus the event is attempted on (none for control trials)
    pub event_id: Option<usize>,
    /// Seconds of movement per phase: tracking, then post-event
    pub move_times: Vec<f64>,
}

/// Everything recorded about one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialData {
    pub seed: u64,
    pub condition: TrialCondition,
    pub tracked_ids: Vec<usize>,
    pub queried_id: usize,
    pub event_id: Option<usize>,
    pub move_times: Vec<f64>,
    /// Seconds from trial start to the event, if it fired
    pub event_time: Option<f64>,
    /// Seconds spent waiting for the event to fire
    pub search_time: Option<f64>,
    /// Frames the trial ran for
    pub frames: u64,
    pub stim_info: Vec<StartInfo>,
    /// Boundary bounces per stimulus, indexed by id
    pub bounces: Vec<Vec<BounceRecord>>,
}

fn uniform<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

/// Pick the queried stimulus, the event stimulus and the phase durations.
///
/// The event goes to another tracked stimulus when there is one, otherwise to
/// any stimulus other than the queried one.
pub fn plan_trial<R: Rng>(
    rng: &mut R,
    condition: TrialCondition,
    tracked_ids: &[usize],
    n_stimuli: usize,
    timing: &TimingSettings,
) -> TrialPlan {
    let queried_id = tracked_ids.choose(rng).copied().unwrap_or(0);

    let event_id = match condition {
        TrialCondition::Control => None,
        TrialCondition::Crossed | TrialCondition::Changed => {
            let others: Vec<usize> = tracked_ids.iter().copied().filter(|&id| id != queried_id).collect();
            if others.is_empty() {
                let rest: Vec<usize> = (0..n_stimuli).filter(|&id| id != queried_id).collect();
                rest.choose(rng).copied()
            } else {
                others.choose(rng).copied()
            }
        }
    };

    let move_times = match (condition, event_id) {
        (TrialCondition::Crossed, Some(_)) => vec![
            uniform(rng, (timing.trial_length.0, timing.max_cross_time)),
            uniform(rng, timing.post_cross_length),
        ],
        (TrialCondition::Changed, Some(_)) => vec![
            uniform(rng, (timing.trial_length.0, timing.max_change_time)),
            uniform(rng, timing.post_change_length),
        ],
        _ => vec![uniform(rng, timing.trial_length)],
    };

    TrialPlan {
        queried_id,
        event_id,
        move_times,
    }
}

/// One experiment: settings, partitions, the stimulus pool and the trial in
/// progress.
pub struct Session {
    settings: Settings,
    partitions: Partitions,
    stims: Vec<Stimulus>,
    grid: OccupancyGrid,
    phase: TrialPhase,
    /// Frames since the trial began
    frame: u64,
    /// Frames since the current phase began
    phase_frames: u64,
    script: ScriptedEvent,
    data: Option<TrialData>,
}

impl Session {
    /// Validate settings and build the partitions and stimulus pool
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let w = &settings.window;
        let partitions = Partitions::new(w.dimensions, w.center, w.partition_split, w.spacing)?;
        let grid = OccupancyGrid::new(
            partitions.inner_dimensions(),
            GRID_CELLS_PER_UNIT,
            settings.stimulus.radius,
        )?;

        let per_partition = settings.stimulus.count / partitions.len();
        let capacity = grid.guaranteed_capacity();
        if per_partition > capacity {
            return Err(Error::InvalidConfig(format!(
                "{per_partition} stimuli per partition cannot always be placed (room for {capacity})"
            )));
        }

        let stims = (0..settings.stimulus.count)
            .map(|id| Stimulus::new(id, settings.stimulus.radius))
            .collect();

        log::info!(
            "Session ready: {} stimuli over {}x{} partitions, {} tracked by default",
            settings.stimulus.count,
            partitions.columns(),
            partitions.rows(),
            settings.stimulus.tracked
        );

        Ok(Self {
            settings,
            partitions,
            stims,
            grid,
            phase: TrialPhase::Idle,
            frame: 0,
            phase_frames: 0,
            script: ScriptedEvent::None,
            data: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stims
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TrialPhase::Complete
    }

    /// Data for the trial in progress (bounce logs fill in on completion)
    pub fn data(&self) -> Option<&TrialData> {
        self.data.as_ref()
    }

    /// Place stimuli and plan a new trial with `n_tracked` tracked stimuli,
    /// discarding any trial in progress
    pub fn begin_trial(&mut self, condition: TrialCondition, n_tracked: usize, seed: u64) -> Result<()> {
        if n_tracked == 0 || n_tracked > self.stims.len() {
            return Err(Error::InvalidConfig(format!(
                "tracked count {n_tracked} must be between 1 and {}",
                self.stims.len()
            )));
        }

        let mut rng = Pcg32::seed_from_u64(seed);
        let placement = place_stimuli(
            &mut rng,
            &mut self.partitions,
            &mut self.stims,
            &mut self.grid,
            n_tracked,
            self.settings.speed_per_frame(),
        )?;
        let plan = plan_trial(
            &mut rng,
            condition,
            &placement.tracked_ids,
            self.stims.len(),
            &self.settings.timing,
        );

        log::info!(
            "Trial {:?} (seed {seed}): queried {}, event {:?}, move times {:?}",
            condition,
            plan.queried_id,
            plan.event_id,
            plan.move_times
        );

        self.data = Some(TrialData {
            seed,
            condition,
            tracked_ids: placement.tracked_ids,
            queried_id: plan.queried_id,
            event_id: plan.event_id,
            move_times: plan.move_times,
            event_time: None,
            search_time: None,
            frames: 0,
            stim_info: placement.stim_info,
            bounces: Vec::new(),
        });
        self.phase = TrialPhase::Tracking;
        self.frame = 0;
        self.phase_frames = 0;
        self.script = ScriptedEvent::None;
        Ok(())
    }

    fn seconds(&self, frames: u64) -> f64 {
        frames as f64 / f64::from(self.settings.window.framerate)
    }

    fn frames_for(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.settings.window.framerate)).round().max(0.0) as u64
    }

    /// Advance the trial by one frame. Does nothing unless a trial is running.
    pub fn tick(&mut self) -> FrameReport {
        let Some(data) = self.data.as_ref() else {
            return FrameReport::default();
        };
        if matches!(self.phase, TrialPhase::Idle | TrialPhase::Complete) {
            return FrameReport::default();
        }

        let condition = data.condition;
        let event_id = data.event_id;
        let move_times = data.move_times.clone();

        self.script = match (self.phase, event_id) {
            (TrialPhase::EventSearch, Some(id)) => condition.script_for(id),
            _ => ScriptedEvent::None,
        };

        let input = FrameInput {
            time_on_flip: self.seconds(self.frame),
            framerate: self.settings.window.framerate,
            collisions: self.settings.physics.collisions,
        };
        let report = tick(&self.partitions, &mut self.stims, &mut self.script, &input);
        self.frame += 1;
        self.phase_frames += 1;

        match self.phase {
            TrialPhase::Tracking => {
                let limit = self.frames_for(move_times.first().copied().unwrap_or(0.0));
                if self.phase_frames >= limit {
                    if event_id.is_some() && condition != TrialCondition::Control {
                        self.enter(TrialPhase::EventSearch);
                    } else {
                        self.complete();
                    }
                }
            }
            TrialPhase::EventSearch => {
                if report.event_fired {
                    let event_time = self.seconds(self.frame);
                    let search_time = self.seconds(self.phase_frames);
                    if let Some(data) = self.data.as_mut() {
                        data.event_time = Some(event_time);
                        data.search_time = Some(search_time);
                    }
                    log::info!("{condition:?} event fired after {search_time:.3}s of searching");
                    self.enter(TrialPhase::PostEvent);
                } else if self.phase_frames >= self.frames_for(self.settings.timing.max_event_search) {
                    log::warn!(
                        "{condition:?} event on stimulus {:?} did not fire within {}s; ending trial",
                        event_id,
                        self.settings.timing.max_event_search
                    );
                    if let Some(data) = self.data.as_mut() {
                        data.search_time = Some(self.settings.timing.max_event_search);
                    }
                    self.complete();
                }
            }
            TrialPhase::PostEvent => {
                let limit = self.frames_for(move_times.get(1).copied().unwrap_or(0.0));
                if self.phase_frames >= limit {
                    self.complete();
                }
            }
            TrialPhase::Idle | TrialPhase::Complete => {}
        }

        report
    }

    fn enter(&mut self, phase: TrialPhase) {
        log::debug!("Trial phase {:?} -> {:?} at frame {}", self.phase, phase, self.frame);
        self.phase = phase;
        self.phase_frames = 0;
    }

    fn complete(&mut self) {
        self.enter(TrialPhase::Complete);
        self.script = ScriptedEvent::None;
        let frames = self.frame;
        let bounces = self.stims.iter().map(|s| s.bounces.clone()).collect();
        if let Some(data) = self.data.as_mut() {
            data.frames = frames;
            data.bounces = bounces;
        }
        log::info!("Trial complete after {frames} frames");
    }

    /// Take the finished trial's data, leaving the session idle
    pub fn take_data(&mut self) -> Option<TrialData> {
        if !self.is_complete() {
            return None;
        }
        self.phase = TrialPhase::Idle;
        self.data.take()
    }

    /// Run a whole trial headlessly and return its data
    pub fn run_trial(&mut self, condition: TrialCondition, n_tracked: usize, seed: u64) -> Result<TrialData> {
        self.begin_trial(condition, n_tracked, seed)?;
        while !self.is_complete() {
            self.tick();
        }
        self.take_data().ok_or(Error::NoTrial)
    }
}
