use std::f32::consts::PI;

use melody_core::audio::{self, WavSource};
use melody_core::insight::analyze_melody;
use melody_core::{CaptureSession, MelodyConfig, Note, SessionState, transcribe};

const SAMPLE_RATE: u32 = 44100;

fn tone(frequency: f32, seconds: f32, offset: usize) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (offset..offset + len)
        .map(|i| 0.8 * (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn silence(seconds: f32) -> Vec<f32> {
    vec![0.0; (seconds * SAMPLE_RATE as f32) as usize]
}

/// Deterministic white noise in [-amplitude, amplitude].
fn noise(seconds: f32, amplitude: f32) -> Vec<f32> {
    let mut state: u32 = 0x9e37_79b9;
    (0..(seconds * SAMPLE_RATE as f32) as usize)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32 * 2.0 - 1.0) * amplitude
        })
        .collect()
}

fn config_with_poll(poll_interval_ms: u64) -> MelodyConfig {
    let mut config = MelodyConfig::default();
    config.capture.poll_interval_ms = poll_interval_ms;
    config
}

fn hop(config: &MelodyConfig) -> usize {
    SAMPLE_RATE as usize * config.capture.poll_interval_ms as usize / 1000
}

#[test]
fn tone_interrupted_by_silence_stays_one_note() {
    // 70 ms ticks do not divide the 100 ms segments, so some windows are
    // only partly voiced.
    let config = config_with_poll(70);
    let mut samples = Vec::new();
    for _ in 0..2 {
        let offset = samples.len();
        samples.extend(tone(440.0, 0.1, offset));
        samples.extend(silence(0.1));
    }

    let mut source = WavSource::from_samples(samples, SAMPLE_RATE, 2048, hop(&config));
    let melody = transcribe(&mut source, &config).unwrap();

    assert_eq!(melody.labels(), vec!["A4"]);
    assert_eq!(melody.notes[0].timestamp(), 0.0);
}

#[test]
fn arpeggio_from_wav_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arpeggio.wav");
    let mut samples = Vec::new();
    for frequency in [261.63, 329.63, 392.0] {
        let offset = samples.len();
        samples.extend(tone(frequency, 0.4, offset));
    }
    audio::write_wav(&path, &samples, SAMPLE_RATE).unwrap();

    let config = config_with_poll(200);
    let mut source = WavSource::open(&path, config.capture.window_size, 200).unwrap();
    let melody = transcribe(&mut source, &config).unwrap();

    assert_eq!(melody.labels(), vec!["C4", "E4", "G4"]);
    let timestamps: Vec<f32> = melody.notes.iter().map(Note::timestamp).collect();
    assert_eq!(timestamps, vec![0.0, 0.4, 0.8]);

    let summary = analyze_melody(&melody.notes, None);
    assert_eq!(summary.likely_key, "C major");
}

#[test]
fn white_noise_yields_no_notes() {
    let config = config_with_poll(200);
    let mut source = WavSource::from_samples(noise(1.0, 0.5), SAMPLE_RATE, 2048, hop(&config));
    let melody = transcribe(&mut source, &config).unwrap();
    assert!(melody.is_empty());
}

#[test]
fn silence_yields_empty_melody() {
    let config = MelodyConfig::default();
    let mut source = WavSource::from_samples(silence(1.0), SAMPLE_RATE, 2048, hop(&config));
    let melody = transcribe(&mut source, &config).unwrap();
    assert!(melody.is_empty());
    assert!(analyze_melody(&melody.notes, None).explanation.starts_with("No melody"));
}

#[test]
fn manual_ticks_through_a_session() {
    let mut session = CaptureSession::new(MelodyConfig::default(), SAMPLE_RATE).unwrap();
    session.start().unwrap();

    let a4 = tone(440.0, 0.05, 0);
    let b4 = tone(493.88, 0.05, 0);
    let windows = [(&a4, 0.0), (&a4, 0.2), (&b4, 0.4), (&a4, 0.6)];
    for (window, timestamp) in windows {
        session.process_window(&window[..2048], timestamp).unwrap();
    }
    assert_eq!(session.notes().len(), 3);

    let melody = session.stop().unwrap();
    assert_eq!(melody.labels(), vec!["A4", "B4", "A4"]);
    assert_eq!(session.state(), SessionState::Stopped);
}
