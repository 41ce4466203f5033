// melody-core/src/lib.rs

//! The core logic for hummed-melody transcription.
//! This crate is responsible for pitch estimation, note segmentation and
//! capture session management. It is completely headless
//! and contains no UI code.

pub mod audio;
pub mod config;
pub mod error;
pub mod insight;
pub mod pitch;
pub mod segmenter;
pub mod session;
pub mod tuning;

pub use config::MelodyConfig;
pub use error::{MelodyError, MelodyResult};
pub use pitch::{PitchDetector, PitchEstimate, calculate_rms, detect_pitch};
pub use segmenter::{Note, NoteSegmenter, PitchFrame, merge_notes};
pub use session::{CaptureSession, FrameReport, Melody, SessionState, transcribe};
pub use tuning::{MidiNote, format_note, frequency_to_midi, midi_to_note};
