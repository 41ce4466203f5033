//! # Report Module
//!
//! Terminal output for the CLI: a live input level meter while recording,
//! the notes as they are detected, and the final melody with its summary
//! either as text or as JSON.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use melody_core::insight::MelodySummary;
use melody_core::tuning::calculate_cents_deviation;
use melody_core::{FrameReport, Melody, Note};
use serde::Serialize;

/// Width of the level meter in characters.
const METER_WIDTH: usize = 24;

/// JSON document printed with `--json`.
#[derive(Serialize)]
struct Transcription<'a> {
    labels: Vec<String>,
    notes: &'a [Note],
    summary: &'a MelodySummary,
}

pub fn print_listening(sample_rate: u32, auto_stop: Duration) {
    println!(
        "Recording at {sample_rate} Hz... hum for a few seconds. \
         Press Enter to stop (auto-stop after {}s).",
        auto_stop.as_secs()
    );
}

/// Renders the level meter, and the note if one was admitted this tick.
pub fn print_frame(frame: &FrameReport) {
    let mut stdout = std::io::stdout().lock();
    if let Some(note) = &frame.admitted {
        let _ = writeln!(stdout, "\r{:<width$}", describe_note(note), width = METER_WIDTH + 2);
    }
    let _ = write!(stdout, "\r[{}]", level_bar(frame.level));
    let _ = stdout.flush();
}

/// Moves past the level meter line.
pub fn end_live_line() {
    println!();
}

pub fn print_result(melody: &Melody, summary: &MelodySummary, json: bool) -> Result<()> {
    if json {
        let document = Transcription {
            labels: melody.labels(),
            notes: &melody.notes,
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    if melody.is_empty() {
        println!("No stable pitch detected. Try a clearer hum.");
        return Ok(());
    }

    println!("Melody ({} notes): {}", melody.len(), melody.labels().join(" "));
    for note in &melody.notes {
        println!("  {}", describe_note(note));
    }
    println!();
    println!("Likely key: {} ({})", summary.likely_key, summary.style);
    println!("Chords:     {}", summary.suggested_chords.join(" "));
    println!("{}", summary.explanation);
    Ok(())
}

fn describe_note(note: &Note) -> String {
    let cents = calculate_cents_deviation(note.frequency(), note.midi().frequency());
    let mut line = format!(
        "{:>6.2}s  {:<4} {:>7.1} Hz {:>+4.0}c",
        note.timestamp(),
        note.label(),
        note.frequency(),
        cents
    );
    if let Some(duration) = note.duration() {
        line.push_str(&format!("  ~{duration:.2}s"));
    }
    line
}

fn level_bar(level: f32) -> String {
    let filled = (level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize;
    format!("{}{}", "#".repeat(filled), " ".repeat(METER_WIDTH - filled))
}
