//! # Pitch Detection Module
//!
//! This module estimates the fundamental frequency of a single window of
//! time-domain audio using autocorrelation period detection.
//!
//! ## Features
//! - RMS silence gate so the noise floor never produces a pitch
//! - Edge trimming to soften arbitrary window boundaries
//! - Autocorrelation peak picking past the zero-lag slope
//! - Parabolic interpolation for sub-sample accuracy
//! - Confidence derived from the peak-to-energy ratio

use log::trace;
use serde::Serialize;

use crate::config::EstimatorConfig;
use crate::error::{MelodyError, MelodyResult};

/// Result of estimating the pitch of one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchEstimate {
    /// The detected frequency in Hz, `None` when no stable pitch is present.
    pub frequency: Option<f32>,
    /// Periodicity strength (0.0 to 1.0).
    pub confidence: f32,
}

impl PitchEstimate {
    /// The "no pitch" verdict.
    pub const fn none() -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency.is_some()
    }
}

/// Root-mean-square amplitude of a buffer; 0 for an empty buffer.
pub fn calculate_rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|&s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
}

/// Autocorrelation pitch detector.
///
/// The detector holds no per-call state, so one instance can serve every
/// window of a session.
#[derive(Debug, Clone, Default)]
pub struct PitchDetector {
    config: EstimatorConfig,
}

impl PitchDetector {
    /// Creates a detector after validating its configuration.
    pub fn new(config: EstimatorConfig) -> MelodyResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimates the pitch of one window of samples.
    ///
    /// The algorithm:
    /// 1. Gates silence by RMS
    /// 2. Trims quiet samples from both ends of the window
    /// 3. Computes the autocorrelation for every lag
    /// 4. Skips the initial descent from the zero-lag peak
    /// 5. Picks the strongest remaining lag as the period
    /// 6. Refines the period with parabolic interpolation
    ///
    /// # Arguments
    /// * `signal` - One window of samples in roughly [-1, 1]
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// * `Ok(estimate)` - A voiced estimate, or [`PitchEstimate::none`] for
    ///   silence, noise, degenerate windows and out-of-range pitches
    /// * `Err(MelodyError::InvalidSampleRate)` - If `sample_rate` is 0
    pub fn detect(&self, signal: &[f32], sample_rate: u32) -> MelodyResult<PitchEstimate> {
        if sample_rate == 0 {
            return Err(MelodyError::InvalidSampleRate(sample_rate));
        }
        if signal.is_empty() {
            return Ok(PitchEstimate::none());
        }

        // --- Noise Gate ---
        let rms = calculate_rms(signal);
        if !rms.is_finite() {
            trace!("window contains non-finite samples");
            return Ok(PitchEstimate::none());
        }
        if rms < self.config.silence_threshold {
            trace!("rms {rms:.5} below silence gate");
            return Ok(PitchEstimate::none());
        }

        let trimmed = trim_edges(signal, self.config.trim_threshold);
        if trimmed.len() < 2 {
            return Ok(PitchEstimate::none());
        }

        let autocorr = autocorrelate(trimmed);

        let Some((peak, peak_value)) = find_period_peak(&autocorr) else {
            return Ok(PitchEstimate::none());
        };
        if peak == 0 {
            return Ok(PitchEstimate::none());
        }

        let period = parabolic_peak(&autocorr, peak);
        if !period.is_finite() || period <= 0.0 {
            return Ok(PitchEstimate::none());
        }

        let frequency = sample_rate as f32 / period;
        if !frequency.is_finite()
            || frequency < self.config.min_frequency
            || frequency > self.config.max_frequency
        {
            trace!("frequency {frequency:.2} Hz outside accepted range");
            return Ok(PitchEstimate::none());
        }

        let energy = autocorr[0];
        let confidence = if energy == 0.0 {
            0.0
        } else {
            (peak_value / energy).clamp(0.0, 1.0)
        };
        if !confidence.is_finite() {
            return Ok(PitchEstimate::none());
        }

        Ok(PitchEstimate {
            frequency: Some(frequency),
            confidence,
        })
    }
}

/// Estimates the pitch of a window using the default thresholds.
pub fn detect_pitch(signal: &[f32], sample_rate: u32) -> MelodyResult<PitchEstimate> {
    PitchDetector::default().detect(signal, sample_rate)
}

/// Drops leading and trailing samples quieter than `threshold`.
///
/// Each side scans at most up to the middle of the window. The returned
/// slice ends just before the last loud sample found from the right.
pub fn trim_edges(signal: &[f32], threshold: f32) -> &[f32] {
    let len = signal.len();
    let mut start = 0;
    while start * 2 < len && signal[start].abs() < threshold {
        start += 1;
    }
    let mut end = len.saturating_sub(1);
    while end * 2 > len && signal[end].abs() < threshold {
        end -= 1;
    }
    if end <= start {
        return &[];
    }
    &signal[start..end]
}

/// Computes the (unnormalized) autocorrelation for every lag of the signal.
pub fn autocorrelate(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    (0..n)
        .map(|lag| {
            signal[..n - lag]
                .iter()
                .zip(&signal[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Finds the strongest lag after the descent from lag 0.
///
/// Returns the lag and its value, or `None` when the autocorrelation
/// descends all the way to the last lag. Ties keep the smallest lag.
fn find_period_peak(autocorr: &[f32]) -> Option<(usize, f32)> {
    let n = autocorr.len();
    let mut descent = 0;
    while descent + 1 < n && autocorr[descent] > autocorr[descent + 1] {
        descent += 1;
    }
    if descent + 1 >= n {
        return None;
    }

    autocorr
        .iter()
        .enumerate()
        .skip(descent)
        .fold(None, |best: Option<(usize, f32)>, (lag, &value)| match best {
            Some((_, best_value)) if value <= best_value => best,
            _ => Some((lag, value)),
        })
}

/// Parabolic interpolation of a peak at `peak` from its two neighbours.
///
/// Falls back to the integer lag at the edges or on a flat top.
fn parabolic_peak(values: &[f32], peak: usize) -> f32 {
    if peak == 0 || peak + 1 >= values.len() {
        return peak as f32;
    }
    let left = values[peak - 1];
    let center = values[peak];
    let right = values[peak + 1];
    let divisor = 2.0 * center - left - right;
    if divisor == 0.0 {
        return peak as f32;
    }
    peak as f32 + (right - left) / (2.0 * divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(frequency: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn detects_a440_sine() {
        let window = sine(440.0, 44100, 2048);
        let estimate = detect_pitch(&window, 44100).unwrap();
        let frequency = estimate.frequency.expect("frequency should be detected");
        assert!((frequency - 440.0).abs() < 2.0, "got {frequency} Hz");
        assert!(estimate.confidence > 0.5);
    }

    #[test]
    fn detects_lower_and_higher_tones() {
        for target in [110.0, 220.0, 330.0, 880.0] {
            let window = sine(target, 44100, 2048);
            let frequency = detect_pitch(&window, 44100).unwrap().frequency.unwrap();
            let cents = crate::tuning::calculate_cents_deviation(frequency, target);
            assert!(cents.abs() < 20.0, "{target} Hz detected as {frequency} Hz");
        }
    }

    #[test]
    fn silent_window_has_no_pitch() {
        let estimate = detect_pitch(&[0.0; 2048], 44100).unwrap();
        assert_eq!(estimate, PitchEstimate::none());
        assert_eq!(estimate.confidence, 0.0);
    }

    #[test]
    fn empty_window_has_no_pitch() {
        assert_eq!(detect_pitch(&[], 44100).unwrap(), PitchEstimate::none());
    }

    #[test]
    fn quiet_noise_floor_is_gated() {
        let window: Vec<f32> = sine(440.0, 44100, 2048).iter().map(|s| s * 0.002).collect();
        assert!(!detect_pitch(&window, 44100).unwrap().is_voiced());
    }

    #[test]
    fn zero_sample_rate_is_a_configuration_error() {
        let window = sine(440.0, 44100, 2048);
        assert_eq!(
            detect_pitch(&window, 0),
            Err(MelodyError::InvalidSampleRate(0))
        );
    }

    #[test]
    fn constant_signal_has_no_period() {
        // Autocorrelation of a DC signal only ever decreases.
        assert!(!detect_pitch(&[0.5; 512], 44100).unwrap().is_voiced());
    }

    #[test]
    fn non_finite_samples_have_no_pitch() {
        let mut window = sine(440.0, 44100, 512);
        window[0] = f32::NAN;
        assert_eq!(detect_pitch(&window, 44100).unwrap(), PitchEstimate::none());

        let mut window = sine(440.0, 44100, 512);
        window[100] = f32::INFINITY;
        assert_eq!(detect_pitch(&window, 44100).unwrap(), PitchEstimate::none());
    }

    #[test]
    fn out_of_range_frequency_is_rejected() {
        let window = sine(3000.0, 44100, 2048);
        assert!(!detect_pitch(&window, 44100).unwrap().is_voiced());
    }

    #[test]
    fn custom_range_narrows_acceptance() {
        let detector = PitchDetector::new(EstimatorConfig {
            max_frequency: 300.0,
            ..EstimatorConfig::default()
        })
        .unwrap();
        let window = sine(440.0, 44100, 2048);
        assert!(!detector.detect(&window, 44100).unwrap().is_voiced());
    }

    #[test]
    fn rms_of_reference_buffers() {
        assert_eq!(calculate_rms(&[0.0; 512]), 0.0);
        assert_eq!(calculate_rms(&[1.0; 512]), 1.0);
        assert_eq!(calculate_rms(&[]), 0.0);
        assert_relative_eq!(calculate_rms(&[-0.5, 0.5]), 0.5);
    }

    #[test]
    fn trim_edges_skips_quiet_ends() {
        let signal = [0.0, 0.1, 0.5, -0.6, 0.7, 0.4, 0.1, 0.0];
        assert_eq!(trim_edges(&signal, 0.2), &[0.5f32, -0.6, 0.7][..]);
        assert!(trim_edges(&[0.0; 8], 0.2).is_empty());
        assert!(trim_edges(&[0.9], 0.2).is_empty());
    }

    #[test]
    fn autocorrelation_small_reference() {
        let autocorr = autocorrelate(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(autocorr, vec![30.0, 20.0, 11.0, 4.0]);
    }

    #[test]
    fn parabolic_peak_centers_symmetric_neighbours() {
        assert_relative_eq!(parabolic_peak(&[1.0, 3.0, 1.0], 1), 1.0);
        assert!(parabolic_peak(&[1.0, 3.0, 2.0], 1) > 1.0);
        assert_eq!(parabolic_peak(&[1.0, 3.0], 1), 1.0);
    }
}
