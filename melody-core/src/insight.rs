//! # Harmonic Insight Module
//!
//! Suggests a key, style and chords for a finished melody.
//!
//! A remote analyzer (for example a language model behind an HTTP API) can
//! be plugged in through [`HarmonicAnalyzer`]. When none is configured, or
//! when it fails, [`analyze_melody`] falls back to [`summarize_melody`], a
//! local heuristic keyed on the most frequent pitch class.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::segmenter::Note;

/// Key suggestion attached to a dominant pitch class.
#[derive(Debug, Clone, Copy)]
pub struct KeySuggestion {
    pub key: &'static str,
    pub chords: &'static [&'static str],
    pub style: &'static str,
}

/// Dominant pitch class to key suggestion.
pub static KEY_MAP: Lazy<BTreeMap<&'static str, KeySuggestion>> = Lazy::new(|| {
    BTreeMap::from([
        ("C", KeySuggestion { key: "C major", chords: &["C", "F", "G", "Am"], style: "folk / pop" }),
        ("G", KeySuggestion { key: "G major", chords: &["G", "C", "D", "Em"], style: "bluegrass" }),
        ("D", KeySuggestion { key: "D major", chords: &["D", "G", "A", "Bm"], style: "rock" }),
        ("A", KeySuggestion { key: "A major", chords: &["A", "D", "E", "F#m"], style: "country" }),
        ("E", KeySuggestion { key: "E minor", chords: &["Em", "C", "D", "G"], style: "indie" }),
        ("F", KeySuggestion { key: "F major", chords: &["F", "Bb", "C", "Dm"], style: "ballad" }),
    ])
});

/// Harmonic summary of a melody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelodySummary {
    pub likely_key: String,
    pub style: String,
    pub suggested_chords: Vec<String>,
    pub explanation: String,
}

/// Failure of a remote analyzer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No credential or endpoint is configured.
    #[error("Analyzer is not configured")]
    NotConfigured,

    /// The request failed or the service answered with an error.
    #[error("Analyzer request failed: {0}")]
    Request(String),

    /// The service answered with something that is not a summary.
    #[error("Malformed analyzer response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// A harmonic analysis backend consuming note labels such as "G4".
pub trait HarmonicAnalyzer {
    fn analyze(&self, labels: &[String]) -> Result<MelodySummary, AnalysisError>;
}

/// Builds the request text a remote analyzer sends for these labels.
pub fn analysis_prompt(labels: &[String]) -> String {
    let sequence = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Given the note sequence {sequence}, determine the most likely musical key. \
         Suggest a style this fits in, and possible chords to harmonize. Respond with \
         JSON containing keys: likely_key, style, suggested_chords (array), and explanation."
    )
}

/// Parses a JSON summary as returned by a remote analyzer.
pub fn parse_summary(text: &str) -> Result<MelodySummary, AnalysisError> {
    Ok(serde_json::from_str(text)?)
}

/// Pitch class of a label: the text left once the octave is stripped.
///
/// Spellings outside the canonical sharp names ("Bb4") are kept as written.
fn pitch_class_of(label: &str) -> &str {
    label
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '-')
}

/// Local heuristic summary of a sequence of note labels.
///
/// The most frequent pitch class (the first one seen wins a tie) selects an
/// entry of [`KEY_MAP`]; pitch classes without an entry fall back to C major.
pub fn summarize_melody(labels: &[String]) -> MelodySummary {
    if labels.is_empty() {
        return MelodySummary {
            likely_key: "C major".to_string(),
            style: "ambient".to_string(),
            suggested_chords: vec!["C".into(), "F".into(), "G".into()],
            explanation: "No melody detected yet. Try recording a short idea to get theory \
                          suggestions."
                .to_string(),
        };
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for label in labels {
        let pitch_class = pitch_class_of(label);
        if pitch_class.is_empty() {
            continue;
        }
        let count = counts.entry(pitch_class).or_insert(0);
        if *count == 0 {
            order.push(pitch_class);
        }
        *count += 1;
    }

    let mut dominant = "C";
    let mut max_count = 0;
    for pitch_class in order {
        if counts[pitch_class] > max_count {
            dominant = pitch_class;
            max_count = counts[pitch_class];
        }
    }

    let suggestion = KEY_MAP.get(dominant).unwrap_or(&KEY_MAP["C"]);
    MelodySummary {
        likely_key: suggestion.key.to_string(),
        style: suggestion.style.to_string(),
        suggested_chords: suggestion.chords.iter().map(|c| c.to_string()).collect(),
        explanation: format!(
            "Your melody leans on {dominant}, which maps naturally to {}. Try the {}",
            suggestion.key,
            suggestion.chords.join(", ")
        ),
    }
}

/// Summarizes a melody, preferring the remote analyzer when one is given.
///
/// Any analyzer error is logged and replaced by the local heuristic, so
/// this never fails.
pub fn analyze_melody(notes: &[Note], analyzer: Option<&dyn HarmonicAnalyzer>) -> MelodySummary {
    let labels: Vec<String> = notes.iter().map(Note::label).collect();
    if labels.is_empty() {
        return summarize_melody(&labels);
    }
    analyzer
        .ok_or(AnalysisError::NotConfigured)
        .and_then(|analyzer| analyzer.analyze(&labels))
        .unwrap_or_else(|err| {
            if !matches!(err, AnalysisError::NotConfigured) {
                warn!("Harmonic analyzer failed, falling back to heuristic: {err}");
            }
            summarize_melody(&labels)
        })
}
