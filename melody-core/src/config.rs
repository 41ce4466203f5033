//! # Configuration Module
//!
//! Tuning constants for pitch estimation, note segmentation and capture.
//! Every value has a default so a partial JSON file still loads; the
//! defaults are the ones a hummed melody at 44.1 kHz works well with.
//!
//! ## Sections
//! - `estimator`: silence gate, edge trimming and plausible pitch range
//! - `segmenter`: admission threshold, re-arm gap, buffer bound, merge window
//! - `capture`: window size, sample rate, polling cadence and auto-stop

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{MelodyError, MelodyResult};

/// Settings for [`crate::pitch::PitchDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Windows with an RMS below this are treated as silence.
    pub silence_threshold: f32,
    /// Leading and trailing samples quieter than this are trimmed.
    pub trim_threshold: f32,
    /// Lowest accepted frequency in Hz.
    pub min_frequency: f32,
    /// Highest accepted frequency in Hz.
    pub max_frequency: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.0025,
            trim_threshold: 0.2,
            min_frequency: 30.0,
            max_frequency: 2000.0,
        }
    }
}

/// Settings for [`crate::segmenter::NoteSegmenter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Frames with a lower confidence are dropped.
    pub min_confidence: f32,
    /// Seconds after which a repeated pitch counts as a new note.
    pub rearm_gap: f32,
    /// Maximum number of notes kept in the working buffer.
    pub capacity: usize,
    /// Same-pitch notes closer than this (seconds) are merged on stop.
    pub merge_min_duration: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            rearm_gap: 0.35,
            capacity: 40,
            merge_min_duration: 0.25,
        }
    }
}

/// Settings for the capture loop driving a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of samples handed to the estimator per tick.
    pub window_size: usize,
    /// Sample rate requested from the input device.
    pub target_sample_rate: u32,
    /// Milliseconds between two estimation ticks.
    pub poll_interval_ms: u64,
    /// Capture stops on its own after this many seconds.
    pub auto_stop_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            target_sample_rate: 44100,
            poll_interval_ms: 200,
            auto_stop_secs: 12,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelodyConfig {
    pub estimator: EstimatorConfig,
    pub segmenter: SegmenterConfig,
    pub capture: CaptureConfig,
}

impl EstimatorConfig {
    pub fn validate(&self) -> MelodyResult<()> {
        positive("estimator.silence_threshold", self.silence_threshold)?;
        positive("estimator.trim_threshold", self.trim_threshold)?;
        positive("estimator.min_frequency", self.min_frequency)?;
        if !self.max_frequency.is_finite() || self.max_frequency <= self.min_frequency {
            return Err(MelodyError::InvalidConfig {
                field: "estimator.max_frequency",
                value: self.max_frequency,
            });
        }
        Ok(())
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> MelodyResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(MelodyError::InvalidConfig {
                field: "segmenter.min_confidence",
                value: self.min_confidence,
            });
        }
        positive("segmenter.rearm_gap", self.rearm_gap)?;
        positive("segmenter.merge_min_duration", self.merge_min_duration)?;
        if self.capacity == 0 {
            return Err(MelodyError::ZeroCapacity);
        }
        Ok(())
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> MelodyResult<()> {
        if self.window_size == 0 {
            return Err(MelodyError::InvalidWindowSize(self.window_size));
        }
        if self.target_sample_rate == 0 {
            return Err(MelodyError::InvalidSampleRate(self.target_sample_rate));
        }
        if self.poll_interval_ms == 0 {
            return Err(MelodyError::InvalidConfig {
                field: "capture.poll_interval_ms",
                value: 0.0,
            });
        }
        Ok(())
    }
}

impl MelodyConfig {
    /// Checks every section, failing on the first invalid value.
    pub fn validate(&self) -> MelodyResult<()> {
        self.estimator.validate()?;
        self.segmenter.validate()?;
        self.capture.validate()
    }
}

fn positive(field: &'static str, value: f32) -> MelodyResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(MelodyError::InvalidConfig { field, value })
    }
}

/// Saves a configuration to a pretty-printed JSON file.
pub fn save_config(config: &MelodyConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json_string = serde_json::to_string_pretty(config)?;
    let mut file = File::create(path)
        .with_context(|| format!("creating config file {}", path.display()))?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads and validates a configuration from a JSON file.
///
/// Missing sections and fields fall back to their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<MelodyConfig> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("opening config file {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: MelodyConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
