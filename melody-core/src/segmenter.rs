//! # Note Segmentation Module
//!
//! Turns a stream of per-frame pitch estimates into discrete notes.
//!
//! Frames are admitted when they are confident enough and either change
//! the semitone or arrive after a gap long enough to count as a new attack.
//! The working buffer is bounded; the oldest notes are evicted first.
//! [`merge_notes`] cleans up the finished sequence at the end of a capture.

use std::collections::VecDeque;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::SegmenterConfig;
use crate::error::MelodyResult;
use crate::pitch::PitchEstimate;
use crate::tuning::{MidiNote, NoteName};

/// A discrete note detected in the input.
///
/// Fixed once admitted; only [`merge_notes`] attaches a duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Semitone index; pitch class, octave and label derive from it.
    midi: MidiNote,
    /// Frequency in Hz measured when the note was admitted.
    frequency: f32,
    /// Confidence of the admitting frame.
    confidence: f32,
    /// Seconds since the start of the capture.
    timestamp: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f32>,
}

impl Note {
    pub fn new(midi: MidiNote, frequency: f32, confidence: f32, timestamp: f32) -> Self {
        Self {
            midi,
            frequency,
            confidence,
            timestamp,
            duration: None,
        }
    }

    pub fn midi(&self) -> MidiNote {
        self.midi
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Seconds since the start of the capture, rounded to centiseconds.
    pub fn timestamp(&self) -> f32 {
        self.timestamp
    }

    /// Accumulated duration in seconds, set by [`merge_notes`].
    pub fn duration(&self) -> Option<f32> {
        self.duration
    }

    pub fn pitch_class(&self) -> &'static str {
        self.midi.pitch_class_name()
    }

    pub fn octave(&self) -> i8 {
        self.midi.octave()
    }

    pub fn name(&self) -> NoteName {
        NoteName {
            name: self.pitch_class(),
            octave: self.octave(),
            midi: self.midi.number(),
        }
    }

    /// Label such as "G4".
    pub fn label(&self) -> String {
        self.midi.to_string()
    }
}

/// One polled pitch estimate with the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchFrame {
    pub frequency: Option<f32>,
    pub confidence: f32,
    /// Seconds since the start of the capture.
    pub timestamp: f32,
}

impl PitchFrame {
    pub fn from_estimate(estimate: PitchEstimate, timestamp: f32) -> Self {
        Self {
            frequency: estimate.frequency,
            confidence: estimate.confidence,
            timestamp,
        }
    }
}

/// Rounds a timestamp to centiseconds.
fn round_timestamp(seconds: f32) -> f32 {
    (seconds * 100.0).round() / 100.0
}

/// Bounded, append-only working sequence of admitted notes.
#[derive(Debug, Clone)]
pub struct NoteSegmenter {
    config: SegmenterConfig,
    notes: VecDeque<Note>,
}

impl NoteSegmenter {
    pub fn new(config: SegmenterConfig) -> MelodyResult<Self> {
        config.validate()?;
        Ok(Self {
            notes: VecDeque::with_capacity(config.capacity),
            config,
        })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Applies the admission policy to one frame.
    ///
    /// # Returns
    /// * `Some(note)` - The note appended for this frame
    /// * `None` - The frame was unvoiced, not confident enough, out of MIDI
    ///   range, or a continuation of the last note
    pub fn push_frame(&mut self, frame: PitchFrame) -> Option<&Note> {
        let frequency = frame.frequency?;
        if frame.confidence.is_nan() || frame.confidence < self.config.min_confidence {
            trace!(
                "dropping {frequency:.1} Hz: confidence {:.2} below {:.2}",
                frame.confidence, self.config.min_confidence
            );
            return None;
        }
        let midi = MidiNote::from_frequency(frequency)?;

        let timestamp = round_timestamp(frame.timestamp);
        if let Some(previous) = self.notes.back() {
            let same_pitch = previous.midi == midi;
            let within_gap = (timestamp - previous.timestamp).abs() <= self.config.rearm_gap;
            if same_pitch && within_gap {
                trace!("{midi} at {timestamp:.2}s continues the previous note");
                return None;
            }
        }

        let note = Note::new(midi, frequency, frame.confidence, timestamp);
        debug!(
            "note {} ({:.1} Hz, confidence {:.2}) at {:.2}s",
            midi, frequency, frame.confidence, timestamp
        );
        self.notes.push_back(note);
        if self.notes.len() > self.config.capacity {
            self.notes.pop_front();
        }
        self.notes.back()
    }

    pub fn last(&self) -> Option<&Note> {
        self.notes.back()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Snapshot of the working buffer in temporal order.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.iter().cloned().collect()
    }

    pub fn into_notes(self) -> Vec<Note> {
        self.notes.into()
    }
}

/// Collapses adjacent same-pitch notes that start closer together than
/// `min_duration` seconds.
///
/// The surviving note gains `min_duration` of duration per absorbed note
/// (starting from `min_duration` if it had none). Applying the function to
/// its own output changes nothing.
pub fn merge_notes(notes: &[Note], min_duration: f32) -> Vec<Note> {
    let mut merged: Vec<Note> = Vec::with_capacity(notes.len());
    for note in notes {
        if let Some(last) = merged.last_mut() {
            if note.midi == last.midi && note.timestamp - last.timestamp < min_duration {
                last.duration = Some(last.duration.unwrap_or(min_duration) + min_duration);
                continue;
            }
        }
        merged.push(note.clone());
    }
    merged
}
