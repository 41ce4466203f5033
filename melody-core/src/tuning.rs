//! # Musical Tuning Module
//!
//! Maps frequencies onto the equal-tempered MIDI scale (A4 = 440 Hz) and
//! names the resulting notes.
//!
//! ## Features
//! - Frequency to nearest MIDI semitone conversion
//! - Pitch class and octave derivation from a single semitone index
//! - Note labels such as "A4" or "C#3" and their reverse lookup
//! - Cent deviation between a measured and a target frequency

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chromatic pitch class names, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Reference tuning: A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// MIDI number of A4.
pub const A4_MIDI: u8 = 69;
/// Highest valid MIDI number.
pub const MAX_MIDI: u8 = 127;

/// An equal-tempered semitone index in `0..=127`.
///
/// This is the only stored representation of a note's pitch. Pitch class,
/// octave and label are all computed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MidiNote(u8);

impl MidiNote {
    /// Creates a MIDI note, returning `None` above 127.
    pub fn new(midi: u8) -> Option<Self> {
        (midi <= MAX_MIDI).then_some(Self(midi))
    }

    /// Nearest semitone to a frequency; `None` for non-positive, non-finite
    /// or out-of-range input.
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return None;
        }
        let midi = (12.0 * (frequency / A4_FREQUENCY).log2() + A4_MIDI as f32).round();
        if (0.0..=MAX_MIDI as f32).contains(&midi) {
            Some(Self(midi as u8))
        } else {
            None
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Index into [`NOTE_NAMES`].
    pub fn pitch_class(self) -> usize {
        (self.0 % 12) as usize
    }

    pub fn pitch_class_name(self) -> &'static str {
        NOTE_NAMES[self.pitch_class()]
    }

    /// Scientific pitch notation octave, so MIDI 60 is octave 4.
    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }

    /// Equal-tempered frequency of this semitone in Hz.
    pub fn frequency(self) -> f32 {
        A4_FREQUENCY * 2.0_f32.powf((self.0 as f32 - A4_MIDI as f32) / 12.0)
    }
}

impl TryFrom<u8> for MidiNote {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MidiNote::new(value).ok_or_else(|| format!("MIDI number {value} is above {MAX_MIDI}"))
    }
}

impl From<MidiNote> for u8 {
    fn from(note: MidiNote) -> u8 {
        note.0
    }
}

impl fmt::Display for MidiNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class_name(), self.octave())
    }
}

/// A note name broken into its parts, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteName {
    pub name: &'static str,
    pub octave: i8,
    pub midi: u8,
}

/// Label to MIDI number for every note from C-1 to G9.
static LABEL_MAP: Lazy<BTreeMap<String, MidiNote>> = Lazy::new(|| {
    (0..=MAX_MIDI)
        .map(|midi| {
            let note = MidiNote(midi);
            (note.to_string(), note)
        })
        .collect()
});

/// Converts a frequency to the nearest MIDI number.
///
/// Returns `None` for 0 Hz, non-finite input or frequencies whose
/// semitone falls outside `0..=127`.
pub fn frequency_to_midi(frequency: f32) -> Option<u8> {
    MidiNote::from_frequency(frequency).map(MidiNote::number)
}

/// Names a MIDI number, clamping it into `0..=127` first.
pub fn midi_to_note(midi: i32) -> NoteName {
    let note = MidiNote(midi.clamp(0, MAX_MIDI as i32) as u8);
    NoteName {
        name: note.pitch_class_name(),
        octave: note.octave(),
        midi: note.number(),
    }
}

/// Formats a note as pitch class plus octave, e.g. "G4".
pub fn format_note(note: &NoteName) -> String {
    format!("{}{}", note.name, note.octave)
}

/// Looks up a label produced by [`format_note`].
pub fn midi_from_label(label: &str) -> Option<MidiNote> {
    LABEL_MAP.get(label.trim()).copied()
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
