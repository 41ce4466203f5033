//! # Audio Input Module
//!
//! This module connects audio sources to the analysis pipeline. Live input
//! is captured with CPAL (Cross-Platform Audio Library) and streamed over a
//! channel; files are read with hound. Both are exposed to the capture loop
//! through the [`SampleSource`] trait, which hands out the most recent
//! fixed-size window once per polling tick.
//!
//! ## Features
//! - Default input device selection with mono downmixing
//! - Rolling analysis window fed from the capture callback
//! - Optional raw recording of everything captured
//! - WAV file input and output

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

/// Default number of samples per analysis window.
///
/// At 44.1 kHz this is about 46 ms of audio.
pub const BUFFER_SIZE: usize = 2048;

/// A synchronous provider of analysis windows.
pub trait SampleSource {
    /// Sample rate in Hz, constant for the life of the source.
    fn sample_rate(&self) -> u32;

    /// The most recent window of samples.
    ///
    /// Returns `None` until a full window is available, or once a finite
    /// source has run out of audio.
    fn latest_window(&mut self) -> Option<&[f32]>;

    /// Whether a finite source has delivered its last window.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 input format close to `target_rate`
/// 3. Streams mono chunks to `sender` from the audio callback
///
/// # Arguments
/// * `sender` - Channel sender for streaming audio data to the capture loop
/// * `target_rate` - Desired sample rate in Hz
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and actual sample rate
/// * `Err(e)` - Error if audio setup fails
pub fn start_audio_capture(
    sender: Sender<Vec<f32>>,
    target_rate: u32,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = cpal::SampleRate(
        target_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        ),
    );
    let config = supported_config.with_sample_rate(sample_rate);

    let sample_rate_val = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    info!("Selected sample rate: {sample_rate_val} Hz, {channels} channel(s)");

    let err_fn = |err| error!("An error occurred on the audio stream: {err}");

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let chunk = downmix(data, channels);
            // The receiver going away just means capture is over.
            let _ = sender.try_send(chunk);
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val))
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Prefers 32-bit float mono, then 32-bit float with the fewest channels,
/// and among those the rate range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range =
                c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_distance = if in_range { 0 } else { min_diff.min(max_diff) };
            (c.channels(), rate_distance)
        })
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Rolling window over chunks arriving from the capture callback.
pub struct ChannelSource {
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
    window_size: usize,
    window: Vec<f32>,
    recording: Option<Vec<f32>>,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<Vec<f32>>, sample_rate: u32, window_size: usize) -> Self {
        Self {
            receiver,
            sample_rate,
            window_size,
            window: Vec::with_capacity(window_size * 2),
            recording: None,
        }
    }

    /// Also keeps every received sample, for saving the take afterwards.
    pub fn with_recording(mut self) -> Self {
        self.recording = Some(Vec::new());
        self
    }

    /// Moves all pending chunks into the window.
    pub fn drain(&mut self) {
        for chunk in self.receiver.try_iter() {
            if let Some(recording) = self.recording.as_mut() {
                recording.extend_from_slice(&chunk);
            }
            self.window.extend_from_slice(&chunk);
        }
        if self.window.len() > self.window_size {
            let excess = self.window.len() - self.window_size;
            self.window.drain(..excess);
        }
    }

    /// Takes the recorded audio, if recording was enabled.
    pub fn take_recording(&mut self) -> Option<Vec<f32>> {
        self.recording.take()
    }
}

impl SampleSource for ChannelSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn latest_window(&mut self) -> Option<&[f32]> {
        self.drain();
        (self.window.len() == self.window_size).then_some(&self.window[..])
    }
}

/// Finite source stepping through in-memory audio, one window per tick.
pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    window_size: usize,
    hop: usize,
    position: usize,
}

impl WavSource {
    /// Wraps already decoded mono samples.
    ///
    /// `hop` is the number of samples between two consecutive ticks.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, window_size: usize, hop: usize) -> Self {
        Self {
            samples,
            sample_rate,
            window_size,
            hop: hop.max(1),
            position: 0,
        }
    }

    /// Reads a WAV file, downmixing to mono.
    ///
    /// Integer samples are scaled into [-1, 1].
    pub fn open(path: impl AsRef<Path>, window_size: usize, hop_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("opening WAV file {}", path.display()))?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };
        let samples = downmix(&interleaved, spec.channels as usize);
        if samples.len() < window_size {
            warn!(
                "{} holds {} samples, shorter than one {}-sample window",
                path.display(),
                samples.len(),
                window_size
            );
        }
        let hop = (spec.sample_rate as u64 * hop_ms / 1000) as usize;
        info!(
            "Loaded {} ({} Hz, {:.2}s)",
            path.display(),
            spec.sample_rate,
            samples.len() as f32 / spec.sample_rate as f32
        );
        Ok(Self::from_samples(samples, spec.sample_rate, window_size, hop))
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

impl SampleSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn latest_window(&mut self) -> Option<&[f32]> {
        if self.is_finished() {
            return None;
        }
        let start = self.position;
        self.position += self.hop;
        Some(&self.samples[start..start + self.window_size])
    }

    fn is_finished(&self) -> bool {
        self.position + self.window_size > self.samples.len()
    }
}

/// Writes mono samples to a 32-bit float WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating WAV file {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, -0.25], 1), vec![0.25, -0.25]);
    }

    #[test]
    fn channel_source_keeps_latest_window() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = ChannelSource::new(rx, 8000, 4).with_recording();
        tx.send(vec![1.0, 2.0]).unwrap();
        assert!(source.latest_window().is_none());
        tx.send(vec![3.0, 4.0, 5.0]).unwrap();
        assert_eq!(source.latest_window(), Some(&[2.0, 3.0, 4.0, 5.0][..]));
        assert_eq!(source.take_recording().unwrap().len(), 5);
        assert!(!source.is_finished());
    }

    #[test]
    fn wav_source_steps_by_hop() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut source = WavSource::from_samples(samples, 1000, 4, 3);
        assert_eq!(source.latest_window(), Some(&[0.0, 1.0, 2.0, 3.0][..]));
        assert_eq!(source.latest_window(), Some(&[3.0, 4.0, 5.0, 6.0][..]));
        assert_eq!(source.latest_window(), Some(&[6.0, 7.0, 8.0, 9.0][..]));
        assert!(source.is_finished());
        assert_eq!(source.latest_window(), None);
    }

    #[test]
    fn wav_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 100.0) - 0.5).collect();
        write_wav(&path, &samples, 8000).unwrap();

        let mut source = WavSource::open(&path, 100, 10).unwrap();
        assert_eq!(source.sample_rate(), 8000);
        assert_eq!(source.latest_window(), Some(&samples[..]));
    }
}
