//! # Hummelody - Melody Transcription CLI
//!
//! This binary records a hummed or sung melody from the default input device
//! (or reads it from a WAV file) and prints the detected notes together with
//! a harmonic summary.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, live feedback and final report
//! - **Audio Thread**: owns the input stream and the capture session
//! - **Communication**: Crossbeam channels for frames, ticks and shutdown

mod report;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use melody_core::audio::{self, ChannelSource, SampleSource, WavSource};
use melody_core::config::{self, MelodyConfig};
use melody_core::insight::analyze_melody;
use melody_core::{CaptureSession, FrameReport, Melody, transcribe};

/// Command line interface.
#[derive(Debug, Parser)]
#[command(name = "hummelody", version, about = "Transcribe a hummed melody into notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record from the default input device until Enter or the auto-stop timeout
    Listen {
        #[command(flatten)]
        tuning: TuningArgs,
        /// Stop after this many seconds instead of the configured auto-stop
        #[arg(long)]
        duration: Option<u64>,
        /// Save the raw recording to a WAV file
        #[arg(long, value_name = "FILE")]
        save_wav: Option<PathBuf>,
    },
    /// Transcribe a WAV file
    File {
        /// Input WAV file
        path: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Write the default configuration as JSON
    InitConfig {
        /// Output path
        path: PathBuf,
    },
}

/// Options shared by the transcribing commands.
#[derive(Debug, Args)]
struct TuningArgs {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Minimum confidence for a frame to become a note (0.0 to 1.0)
    #[arg(long)]
    min_confidence: Option<f32>,
    /// Seconds after which a repeated pitch counts as a new note
    #[arg(long)]
    rearm_gap: Option<f32>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl TuningArgs {
    /// Loads the configuration file (or defaults) and applies overrides.
    fn load(&self) -> Result<MelodyConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => MelodyConfig::default(),
        };
        if let Some(min_confidence) = self.min_confidence {
            config.segmenter.min_confidence = min_confidence;
        }
        if let Some(rearm_gap) = self.rearm_gap {
            config.segmenter.rearm_gap = rearm_gap;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Messages sent from the audio thread to the main thread.
#[derive(Debug)]
enum WorkerEvent {
    /// Capture is running at this sample rate.
    Started(u32),
    /// One polling tick was processed.
    Frame(FrameReport),
    /// Capture is over; the session has been finalized.
    Finished {
        melody: Melody,
        recording: Option<Vec<f32>>,
        sample_rate: u32,
    },
    /// Capture could not start or failed.
    Failed(String),
}

/// Audio worker thread management structure.
///
/// Owns the handle of the capture thread and a way to stop it.
struct AudioWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioWorker {
    /// Spawns the capture thread.
    ///
    /// The thread opens the input stream, starts a [`CaptureSession`] and
    /// ticks it every `poll_interval_ms` until shutdown or `auto_stop`.
    fn spawn(
        config: MelodyConfig,
        auto_stop: Duration,
        record: bool,
        events: Sender<WorkerEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread_handle = thread::spawn(move || {
            if let Err(e) = run_capture(&config, auto_stop, record, &events, &shutdown_rx) {
                error!("[AUDIO-THREAD] Capture failed: {e:#}");
                let _ = events.send(WorkerEvent::Failed(format!("{e:#}")));
            }
        });
        Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        }
    }

    /// Asks the capture thread to stop and waits for it.
    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("[MAIN] Audio thread panicked");
            }
        }
    }
}

/// Body of the audio thread.
fn run_capture(
    config: &MelodyConfig,
    auto_stop: Duration,
    record: bool,
    events: &Sender<WorkerEvent>,
    shutdown_rx: &Receiver<()>,
) -> Result<()> {
    let (raw_audio_tx, raw_audio_rx) = crossbeam_channel::bounded::<Vec<f32>>(256);

    info!("[AUDIO-THREAD] Starting audio capture...");
    let (stream, sample_rate) =
        audio::start_audio_capture(raw_audio_tx, config.capture.target_sample_rate)?;

    let mut source = ChannelSource::new(raw_audio_rx, sample_rate, config.capture.window_size);
    if record {
        source = source.with_recording();
    }
    let mut session = CaptureSession::new(config.clone(), sample_rate)?;
    session.start()?;
    let _ = events.send(WorkerEvent::Started(sample_rate));

    let started = Instant::now();
    let ticker = crossbeam_channel::tick(Duration::from_millis(config.capture.poll_interval_ms));
    let deadline = crossbeam_channel::after(auto_stop);

    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => {
                let Some(window) = source.latest_window() else {
                    continue;
                };
                let report = session.process_window(window, started.elapsed().as_secs_f32())?;
                if events.send(WorkerEvent::Frame(report)).is_err() {
                    warn!("[AUDIO-THREAD] Main thread went away");
                    break;
                }
            },
            recv(deadline) -> _ => {
                info!("[AUDIO-THREAD] Auto-stop after {:?}", auto_stop);
                break;
            },
            recv(shutdown_rx) -> _ => {
                info!("[AUDIO-THREAD] Received shutdown signal");
                break;
            },
        }
    }

    if let Err(e) = stream.pause() {
        warn!("[AUDIO-THREAD] Error pausing stream: {e}");
    }
    drop(stream);
    source.drain();

    let melody = session.stop()?;
    let _ = events.send(WorkerEvent::Finished {
        melody,
        recording: source.take_recording(),
        sample_rate,
    });
    Ok(())
}

/// Returns `true` once a line is read. End of input (no terminal attached)
/// is not a stop request; capture then runs until the auto-stop deadline.
fn wait_for_enter(mut input: impl BufRead) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => {
            debug!("[MAIN] Stdin closed; waiting for auto-stop");
            false
        }
        Ok(_) => true,
        Err(e) => {
            warn!("[MAIN] Could not read stdin: {e}");
            false
        }
    }
}

/// Spawns a thread that stops the capture when the user presses Enter.
fn stop_on_enter(shutdown_tx: Sender<()>) {
    thread::spawn(move || {
        if wait_for_enter(std::io::stdin().lock()) {
            info!("[MAIN] Stop requested");
            let _ = shutdown_tx.try_send(());
        }
    });
}

fn listen(tuning: &TuningArgs, duration: Option<u64>, save_wav: Option<PathBuf>) -> Result<()> {
    let config = tuning.load()?;
    let auto_stop = Duration::from_secs(duration.unwrap_or(config.capture.auto_stop_secs));

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let mut worker = AudioWorker::spawn(config, auto_stop, save_wav.is_some(), events_tx);
    stop_on_enter(worker.shutdown_tx.clone());

    let outcome = loop {
        match events_rx.recv() {
            Ok(WorkerEvent::Started(sample_rate)) => {
                report::print_listening(sample_rate, auto_stop);
            }
            Ok(WorkerEvent::Frame(frame)) => report::print_frame(&frame),
            Ok(WorkerEvent::Finished {
                melody,
                recording,
                sample_rate,
            }) => break Ok((melody, recording, sample_rate)),
            Ok(WorkerEvent::Failed(message)) => break Err(anyhow!(message)),
            Err(_) => break Err(anyhow!("audio thread exited unexpectedly")),
        }
    };
    worker.shutdown();

    let (melody, recording, sample_rate) = outcome.context("Unable to capture from microphone")?;
    report::end_live_line();

    if let (Some(path), Some(samples)) = (save_wav, recording) {
        audio::write_wav(&path, &samples, sample_rate)?;
        info!("[MAIN] Recording saved to {}", path.display());
    }

    let summary = analyze_melody(&melody.notes, None);
    report::print_result(&melody, &summary, tuning.json)
}

fn transcribe_file(path: &Path, tuning: &TuningArgs) -> Result<()> {
    let config = tuning.load()?;
    let mut source = WavSource::open(
        path,
        config.capture.window_size,
        config.capture.poll_interval_ms,
    )?;
    let melody = transcribe(&mut source, &config)?;
    let summary = analyze_melody(&melody.notes, None);
    report::print_result(&melody, &summary, tuning.json)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Listen {
            tuning,
            duration,
            save_wav,
        } => listen(&tuning, duration, save_wav),
        Command::File { path, tuning } => transcribe_file(&path, &tuning),
        Command::InitConfig { path } => {
            config::save_config(&MelodyConfig::default(), &path)?;
            info!("[MAIN] Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cli = Cli::parse_from([
            "hummelody",
            "file",
            "take.wav",
            "--min-confidence",
            "0.58",
            "--rearm-gap",
            "0.25",
        ]);
        let Command::File { tuning, .. } = cli.command else {
            panic!("expected file command");
        };
        let config = tuning.load().unwrap();
        assert_eq!(config.segmenter.min_confidence, 0.58);
        assert_eq!(config.segmenter.rearm_gap, 0.25);
        assert_eq!(config.segmenter.capacity, 40);
    }

    #[test]
    fn only_a_line_requests_a_stop() {
        assert!(wait_for_enter(&b"\n"[..]));
        assert!(wait_for_enter(&b"q\n"[..]));
        assert!(!wait_for_enter(&b""[..]));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::parse_from(["hummelody", "file", "take.wav", "--min-confidence", "2"]);
        let Command::File { tuning, .. } = cli.command else {
            panic!("expected file command");
        };
        assert!(tuning.load().is_err());
    }
}
