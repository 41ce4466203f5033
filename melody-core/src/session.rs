//! # Capture Session Module
//!
//! A [`CaptureSession`] owns everything one recording needs: the pitch
//! detector, the note segmenter while capturing, and the finalized melody
//! once stopped. Callers drive it with one window per polling tick.
//!
//! ```text
//! Idle --start--> Capturing --stop--> Stopped
//!   ^                 |                  |
//!   +------reset------+------reset-------+
//! ```

use log::{debug, info};
use serde::Serialize;

use crate::audio::SampleSource;
use crate::config::MelodyConfig;
use crate::error::{MelodyError, MelodyResult};
use crate::pitch::{PitchDetector, PitchEstimate, calculate_rms};
use crate::segmenter::{Note, NoteSegmenter, PitchFrame, merge_notes};

/// Scale applied to the RMS for the input level meter.
const LEVEL_GAIN: f32 = 3.2;

/// Phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Stopped,
}

/// A finalized, ordered note sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Melody {
    pub notes: Vec<Note>,
}

impl Melody {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Note labels ("G4", ...) in order.
    pub fn labels(&self) -> Vec<String> {
        self.notes.iter().map(Note::label).collect()
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub estimate: PitchEstimate,
    /// Input level for metering (0.0 to 1.0).
    pub level: f32,
    /// The note admitted on this tick, if any.
    pub admitted: Option<Note>,
}

enum Phase {
    Idle,
    Capturing(NoteSegmenter),
    Stopped(Melody),
}

/// Single ownership root for one recording.
pub struct CaptureSession {
    config: MelodyConfig,
    sample_rate: u32,
    detector: PitchDetector,
    phase: Phase,
}

impl CaptureSession {
    /// Creates an idle session for a given input sample rate.
    ///
    /// # Returns
    /// * `Err(MelodyError)` - If the sample rate is 0 or the configuration
    ///   is invalid
    pub fn new(config: MelodyConfig, sample_rate: u32) -> MelodyResult<Self> {
        if sample_rate == 0 {
            return Err(MelodyError::InvalidSampleRate(sample_rate));
        }
        config.validate()?;
        let detector = PitchDetector::new(config.estimator.clone())?;
        Ok(Self {
            config,
            sample_rate,
            detector,
            phase: Phase::Idle,
        })
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Capturing(_) => SessionState::Capturing,
            Phase::Stopped(_) => SessionState::Stopped,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &MelodyConfig {
        &self.config
    }

    fn invalid(&self, action: &'static str) -> MelodyError {
        MelodyError::InvalidTransition {
            action,
            state: self.state(),
        }
    }

    /// Starts capturing with an empty working buffer.
    pub fn start(&mut self) -> MelodyResult<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.invalid("start"));
        }
        let segmenter = NoteSegmenter::new(self.config.segmenter.clone())?;
        self.phase = Phase::Capturing(segmenter);
        info!("capture started at {} Hz", self.sample_rate);
        Ok(())
    }

    /// Runs one polling tick: estimate the window's pitch and admit it.
    ///
    /// # Arguments
    /// * `window` - The latest window of samples from the audio source
    /// * `timestamp` - Seconds since the capture started
    pub fn process_window(&mut self, window: &[f32], timestamp: f32) -> MelodyResult<FrameReport> {
        if self.state() != SessionState::Capturing {
            return Err(self.invalid("process a window"));
        }
        let estimate = self.detector.detect(window, self.sample_rate)?;
        let level = (calculate_rms(window) * LEVEL_GAIN).min(1.0);
        let admitted = match &mut self.phase {
            Phase::Capturing(segmenter) => segmenter
                .push_frame(PitchFrame::from_estimate(estimate, timestamp))
                .cloned(),
            _ => None,
        };
        Ok(FrameReport {
            estimate,
            level,
            admitted,
        })
    }

    /// Notes admitted so far, or the finalized melody once stopped.
    pub fn notes(&self) -> Vec<Note> {
        match &self.phase {
            Phase::Idle => Vec::new(),
            Phase::Capturing(segmenter) => segmenter.notes(),
            Phase::Stopped(melody) => melody.notes.clone(),
        }
    }

    /// Stops capturing and runs the merge pass once.
    pub fn stop(&mut self) -> MelodyResult<Melody> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let segmenter = match phase {
            Phase::Capturing(segmenter) => segmenter,
            other => {
                self.phase = other;
                return Err(self.invalid("stop"));
            }
        };
        let raw = segmenter.into_notes();
        let notes = merge_notes(&raw, self.config.segmenter.merge_min_duration);
        debug!("merged {} raw notes into {}", raw.len(), notes.len());
        info!("capture stopped with {} notes", notes.len());
        let melody = Melody { notes };
        self.phase = Phase::Stopped(melody.clone());
        Ok(melody)
    }

    /// The finalized melody, once stopped.
    pub fn melody(&self) -> Option<&Melody> {
        match &self.phase {
            Phase::Stopped(melody) => Some(melody),
            _ => None,
        }
    }

    /// Discards any notes and returns to idle.
    pub fn reset(&mut self) {
        if !matches!(self.phase, Phase::Idle) {
            info!("session reset");
        }
        self.phase = Phase::Idle;
    }
}

/// Runs a whole capture over a finite source and returns the melody.
///
/// Each window the source yields is one tick, `poll_interval_ms` apart.
/// Sources that never finish (live input) must be driven tick by tick
/// with [`CaptureSession::process_window`] instead.
pub fn transcribe<S: SampleSource>(source: &mut S, config: &MelodyConfig) -> MelodyResult<Melody> {
    let mut session = CaptureSession::new(config.clone(), source.sample_rate())?;
    let interval = config.capture.poll_interval_ms as f32 / 1000.0;
    session.start()?;
    let mut tick = 0usize;
    while !source.is_finished() {
        if let Some(window) = source.latest_window() {
            session.process_window(window, tick as f32 * interval)?;
        }
        tick += 1;
    }
    session.stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / 44100.0).sin())
            .collect()
    }

    fn session() -> CaptureSession {
        CaptureSession::new(MelodyConfig::default(), 44100).unwrap()
    }

    #[test]
    fn lifecycle_transitions() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.notes().is_empty());
    }

    #[test]
    fn restart_requires_reset() {
        let mut session = session();
        session.start().unwrap();
        session.stop().unwrap();
        assert_eq!(
            session.start(),
            Err(MelodyError::InvalidTransition {
                action: "start",
                state: SessionState::Stopped
            })
        );
        session.reset();
        assert!(session.start().is_ok());
    }

    #[test]
    fn stop_and_process_require_capturing() {
        let mut session = session();
        assert!(session.stop().is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.process_window(&[0.0; 64], 0.0).is_err());
    }

    #[test]
    fn zero_sample_rate_fails_fast() {
        assert!(matches!(
            CaptureSession::new(MelodyConfig::default(), 0),
            Err(MelodyError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn tick_reports_level_and_admission() {
        let mut session = session();
        session.start().unwrap();
        let report = session.process_window(&sine(440.0, 2048), 0.0).unwrap();
        assert_eq!(report.level, 1.0);
        assert_eq!(report.admitted.map(|n| n.label()), Some("A4".to_string()));

        let report = session.process_window(&[0.0; 2048], 0.1).unwrap();
        assert_eq!(report.level, 0.0);
        assert!(report.admitted.is_none());
    }

    #[test]
    fn corrupted_window_admits_nothing() {
        let mut session = session();
        session.start().unwrap();
        let mut window = sine(440.0, 512);
        window[0] = f32::NAN;
        let report = session.process_window(&window, 0.0).unwrap();
        assert!(!report.estimate.is_voiced());
        assert!(report.admitted.is_none());
        assert!(session.notes().is_empty());
    }

    #[test]
    fn stop_with_no_notes_gives_empty_melody() {
        let mut session = session();
        session.start().unwrap();
        session.process_window(&[0.0; 2048], 0.0).unwrap();
        assert!(session.stop().unwrap().is_empty());
    }

    #[test]
    fn stop_merges_working_buffer() {
        let mut config = MelodyConfig::default();
        config.segmenter.rearm_gap = 0.05;
        config.segmenter.merge_min_duration = 0.3;
        let mut session = CaptureSession::new(config, 44100).unwrap();
        session.start().unwrap();
        let tone = sine(440.0, 2048);
        session.process_window(&tone, 0.0).unwrap();
        session.process_window(&tone, 0.1).unwrap();
        assert_eq!(session.notes().len(), 2);
        let melody = session.stop().unwrap();
        assert_eq!(melody.labels(), vec!["A4"]);
    }
}
