//! Experiment settings
//!
//! Loaded from JSON; any field left out falls back to the defaults of the
//! standard 2x2 experiment.

use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_FRAMERATE;
use crate::error::{Error, Result};

/// Display area and partition layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Width and height of the partitioned area
    pub dimensions: DVec2,
    pub center: DVec2,
    /// Columns and rows
    pub partition_split: [usize; 2],
    /// Gap between neighbouring partitions
    pub spacing: DVec2,
    /// Display refresh rate (frames per second)
    pub framerate: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            dimensions: DVec2::splat(0.75),
            center: DVec2::ZERO,
            partition_split: [2, 2],
            spacing: DVec2::splat(0.125),
            framerate: DEFAULT_FRAMERATE,
        }
    }
}

/// Stimulus pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusSettings {
    /// Total number of stimuli, spread evenly over partitions
    pub count: usize,
    /// Speed in units per second
    pub speed: f64,
    pub radius: f64,
    /// How many stimuli the participant tracks
    pub tracked: usize,
}

impl Default for StimulusSettings {
    fn default() -> Self {
        Self {
            count: 4,
            speed: 0.15,
            radius: 0.045,
            tracked: 4,
        }
    }
}

impl StimulusSettings {
    /// Displacement per display frame
    pub fn speed_per_frame(&self, framerate: u32) -> f64 {
        self.speed / framerate as f64
    }
}

/// Trial timing, all in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Movement duration range for control trials
    pub trial_length: (f64, f64),
    /// Latest point a cross attempt may start
    pub max_cross_time: f64,
    /// Latest point a change attempt may start
    pub max_change_time: f64,
    /// Movement after a cross before the response
    pub post_cross_length: (f64, f64),
    /// Movement after a change before the response
    pub post_change_length: (f64, f64),
    /// Give up waiting for a scripted event after this long
    pub max_event_search: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            trial_length: (3.0, 7.0),
            max_cross_time: 6.0,
            max_change_time: 6.5,
            post_cross_length: (0.2, 0.4),
            post_change_length: (0.1, 0.3),
            max_event_search: 10.0,
        }
    }
}

/// Engine switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Resolve stimulus-stimulus collisions (walls always bounce)
    pub collisions: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self { collisions: true }
    }
}

/// Complete experiment configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub window: WindowSettings,
    pub stimulus: StimulusSettings,
    pub timing: TimingSettings,
    pub physics: PhysicsSettings,
}

impl Settings {
    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn speed_per_frame(&self) -> f64 {
        self.stimulus.speed_per_frame(self.window.framerate)
    }

    pub fn partition_count(&self) -> usize {
        self.window.partition_split[0] * self.window.partition_split[1]
    }

    /// Reject settings that could never run a trial
    pub fn validate(&self) -> Result<()> {
        let w = &self.window;
        let s = &self.stimulus;
        let t = &self.timing;

        if w.framerate == 0 {
            return invalid("framerate must be positive");
        }
        if !(w.dimensions.x > 0.0 && w.dimensions.y > 0.0) {
            return invalid("window dimensions must be positive");
        }
        if w.spacing.x < 0.0 || w.spacing.y < 0.0 {
            return invalid("partition spacing cannot be negative");
        }
        if self.partition_count() == 0 {
            return invalid("partition split must be at least 1x1");
        }
        if !(s.radius > 0.0) {
            return invalid("stimulus radius must be positive");
        }
        if !(s.speed > 0.0) {
            return invalid("stimulus speed must be positive");
        }
        if s.count == 0 || s.count % self.partition_count() != 0 {
            return Err(Error::InvalidConfig(format!(
                "{} stimuli cannot be spread evenly over {} partitions",
                s.count,
                self.partition_count()
            )));
        }
        if s.tracked == 0 || s.tracked > s.count {
            return Err(Error::InvalidConfig(format!(
                "tracked count {} must be between 1 and {}",
                s.tracked, s.count
            )));
        }

        for (name, (lo, hi)) in [
            ("trial_length", t.trial_length),
            ("post_cross_length", t.post_cross_length),
            ("post_change_length", t.post_change_length),
        ] {
            if !(lo >= 0.0 && lo <= hi) {
                return Err(Error::InvalidConfig(format!(
                    "{name} range ({lo}, {hi}) is inverted or negative"
                )));
            }
        }
        if t.max_cross_time < t.trial_length.0 || t.max_change_time < t.trial_length.0 {
            return invalid("event start limits must not precede the minimum trial length");
        }
        if !(t.max_event_search > 0.0) {
            return invalid("max_event_search must be positive");
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(Error::InvalidConfig(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.partition_count(), 4);
        assert!((settings.speed_per_frame() - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "stimulus": { "count": 8, "tracked": 2 }, "window": { "framerate": 120 } }"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.stimulus.count, 8);
        assert_eq!(settings.stimulus.tracked, 2);
        assert_eq!(settings.stimulus.radius, 0.045);
        assert_eq!(settings.window.framerate, 120);
        assert_eq!(settings.window.partition_split, [2, 2]);
        assert_eq!(settings.timing, TimingSettings::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = Settings::default();
        settings.physics.collisions = false;
        settings.timing.trial_length = (2.0, 4.0);
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut uneven = Settings::default();
        uneven.stimulus.count = 5;
        assert!(matches!(uneven.validate(), Err(Error::InvalidConfig(_))));

        let mut too_many_tracked = Settings::default();
        too_many_tracked.stimulus.tracked = 5;
        assert!(too_many_tracked.validate().is_err());

        let mut bad_radius = Settings::default();
        bad_radius.stimulus.radius = 0.0;
        assert!(bad_radius.validate().is_err());

        let mut inverted = Settings::default();
        inverted.timing.post_cross_length = (0.4, 0.2);
        assert!(inverted.validate().is_err());

        let mut no_frames = Settings::default();
        no_frames.window.framerate = 0;
        assert!(no_frames.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(Settings::from_json("{ nope"), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Settings::load("/definitely/not/here/settings.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
