//! # Pitch Detection Module
//!
//! This module implements the time-domain pitch estimator used by the tuner.
//! It compares the first half of an analysis window against lagged copies of
//! itself and reports the lag of the first strong periodic match as the
//! fundamental period.
//!
//! ## Features
//! - RMS silence gate
//! - Difference-based (absolute difference) autocorrelation
//! - Early termination past the first periodic peak
//! - Neighbour-difference refinement of the winning lag
//!
//! All thresholds come from [`DetectionParams`]; the functions here keep no
//! state between calls.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{PitchError, Result};
use crate::params::DetectionParams;

/// Outcome of one estimation call.
///
/// `Detected` always carries a positive, finite frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PitchEstimate {
    Detected(f64),
    NotFound,
}

impl PitchEstimate {
    /// The detected frequency in Hz, if any.
    pub fn frequency(&self) -> Option<f64> {
        match *self {
            PitchEstimate::Detected(hz) => Some(hz),
            PitchEstimate::NotFound => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, PitchEstimate::Detected(_))
    }
}

/// Phase of the lag scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No lag has cleared the threshold yet.
    Scanning,
    /// At least one rising lag cleared the threshold and the run is ongoing.
    FoundGoodRun,
    /// The run ended; later lags would only revisit harmonics of the peak.
    Done,
}

/// Peak tracker fed one lag correlation at a time.
///
/// A lag is "good" when its correlation exceeds the threshold and is still
/// rising relative to the previous lag. The first non-good lag after a good
/// run moves the scan to [`ScanState::Done`].
///
/// The previous correlation starts at 1.0, the maximum any lag can reach, so
/// the first observed lag never qualifies. Together with termination only
/// happening on a later lag, this keeps the best lag at least one above the
/// first scanned lag with its right-hand neighbour already observed.
#[derive(Debug, Clone)]
pub struct LagScan {
    threshold: f64,
    state: ScanState,
    last_correlation: f64,
    best: Option<(usize, f64)>,
}

impl LagScan {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: ScanState::Scanning,
            last_correlation: 1.0,
            best: None,
        }
    }

    /// Feeds the correlation for `offset` and returns the resulting state.
    ///
    /// Observations after [`ScanState::Done`] are ignored.
    pub fn observe(&mut self, offset: usize, correlation: f64) -> ScanState {
        if self.state == ScanState::Done {
            return ScanState::Done;
        }

        if correlation > self.threshold && correlation > self.last_correlation {
            self.state = ScanState::FoundGoodRun;
            let improves = self.best.is_none_or(|(_, best)| correlation > best);
            if improves {
                self.best = Some((offset, correlation));
            }
        } else if self.state == ScanState::FoundGoodRun {
            self.state = ScanState::Done;
            return ScanState::Done;
        }

        self.last_correlation = correlation;
        self.state
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Best `(offset, correlation)` seen in the good run, if there was one.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best
    }
}

/// Root-mean-square amplitude of a buffer.
pub fn root_mean_square(buffer: &[f32]) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let energy: f64 = buffer.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / buffer.len() as f64).sqrt()
}

/// Normalized difference correlation of the first `window` samples against the
/// samples `offset` further on: 1.0 for a perfect match, lower otherwise.
fn lag_correlation(buffer: &[f32], offset: usize, window: usize) -> f64 {
    let distance: f64 = buffer[..window]
        .iter()
        .zip(&buffer[offset..offset + window])
        .map(|(&a, &b)| (f64::from(a) - f64::from(b)).abs())
        .sum();
    1.0 - distance / window as f64
}

/// Estimates the fundamental frequency of the dominant tone in `buffer`.
///
/// The first half of the buffer is compared against every lag in
/// `[params.min_lag_samples, len / 2)`, so no lag ever reads past the end.
///
/// # Arguments
/// * `buffer` - One analysis window of samples in [-1, 1]
/// * `sample_rate` - Capture rate of `buffer` in Hz
/// * `params` - Detection thresholds
///
/// # Returns
/// * `Ok(PitchEstimate::Detected(hz))` - A periodic match was found
/// * `Ok(PitchEstimate::NotFound)` - Silence or no convincing periodicity
/// * `Err(PitchError::InvalidInput)` - Fewer than 2 samples, a non-positive
///   sample rate or out-of-range parameters
pub fn estimate(
    buffer: &[f32],
    sample_rate: f64,
    params: &DetectionParams,
) -> Result<PitchEstimate> {
    if buffer.len() < 2 {
        return Err(PitchError::InvalidInput(format!(
            "buffer needs at least 2 samples, got {}",
            buffer.len()
        )));
    }
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(PitchError::InvalidInput(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }
    params.validate()?;

    // --- Silence gate (NaN samples count as silence) ---
    let rms = root_mean_square(buffer);
    if !(rms >= params.silence_rms_floor) {
        trace!(target: "pitch", "rms {rms:.4} below floor, no pitch");
        return Ok(PitchEstimate::NotFound);
    }

    // --- Lag scan ---
    let window = buffer.len() / 2;
    let mut correlations = vec![0.0_f64; window];
    let mut scan = LagScan::new(params.good_enough_correlation);

    for offset in params.min_lag_samples..window {
        let correlation = lag_correlation(buffer, offset, window);
        correlations[offset] = correlation;
        if scan.observe(offset, correlation) == ScanState::Done {
            break;
        }
    }

    let result = match (scan.state(), scan.best()) {
        (ScanState::Done, Some((best_offset, _))) => {
            refine(&correlations, best_offset, sample_rate, params.interpolation_scale)
        }
        (_, Some((best_offset, best_correlation)))
            if best_correlation > params.fallback_correlation_floor =>
        {
            PitchEstimate::Detected(sample_rate / best_offset as f64)
        }
        _ => PitchEstimate::NotFound,
    };

    trace!(
        target: "pitch",
        "rms {rms:.4}, scan {:?}, best {:?} -> {result:?}",
        scan.state(),
        scan.best()
    );
    Ok(result)
}

/// Shifts the winning lag by the slope of its neighbours' correlations.
///
/// Falls back to the unrefined lag when the shifted period is not positive,
/// which can only happen for very short lags with a large scale.
fn refine(
    correlations: &[f64],
    best_offset: usize,
    sample_rate: f64,
    interpolation_scale: f64,
) -> PitchEstimate {
    debug_assert!(best_offset >= 1 && best_offset + 1 < correlations.len());

    let shift = (correlations[best_offset + 1] - correlations[best_offset - 1])
        / correlations[best_offset];
    let frequency = sample_rate / (best_offset as f64 + interpolation_scale * shift);

    if frequency.is_finite() && frequency > 0.0 {
        PitchEstimate::Detected(frequency)
    } else {
        PitchEstimate::Detected(sample_rate / best_offset as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(frequency: f64, sample_rate: f64, amplitude: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amplitude * (2.0 * PI * frequency * i as f64 / sample_rate).sin()) as f32)
            .collect()
    }

    #[test]
    fn scan_ignores_the_first_lag() {
        let mut scan = LagScan::new(0.9);
        assert_eq!(scan.observe(0, 1.0), ScanState::Scanning);
        assert_eq!(scan.best(), None);
    }

    #[test]
    fn scan_stops_after_the_first_good_run() {
        let mut scan = LagScan::new(0.9);
        let correlations = [1.0, 0.5, 0.6, 0.92, 0.97, 0.95, 0.99];
        let mut states = Vec::new();
        for (offset, &c) in correlations.iter().enumerate() {
            states.push(scan.observe(offset, c));
        }
        assert_eq!(
            states,
            vec![
                ScanState::Scanning,
                ScanState::Scanning,
                ScanState::Scanning,
                ScanState::FoundGoodRun,
                ScanState::FoundGoodRun,
                ScanState::Done,
                ScanState::Done,
            ]
        );
        // the late 0.99 arrives after Done and must not replace the peak
        assert_eq!(scan.best(), Some((4, 0.97)));
    }

    #[test]
    fn falling_values_above_threshold_are_not_good() {
        let mut scan = LagScan::new(0.9);
        for (offset, c) in [1.0, 0.99, 0.97, 0.95].into_iter().enumerate() {
            assert_eq!(scan.observe(offset, c), ScanState::Scanning);
        }
        assert_eq!(scan.best(), None);
    }

    #[test]
    fn rms_of_a_constant_buffer() {
        assert_eq!(root_mean_square(&[0.5; 16]), 0.5);
        assert_eq!(root_mean_square(&[]), 0.0);
    }

    #[test]
    fn detects_a_440_hz_sine() {
        let buffer = sine(440.0, 44100.0, 0.5, 2048);
        let hz = estimate(&buffer, 44100.0, &DetectionParams::default())
            .unwrap()
            .frequency()
            .unwrap();
        assert!((hz - 440.0).abs() / 440.0 < 0.02, "got {hz}");
    }

    #[test]
    fn quiet_buffer_is_not_found() {
        let buffer = sine(440.0, 44100.0, 0.005, 2048);
        assert_eq!(
            estimate(&buffer, 44100.0, &DetectionParams::default()).unwrap(),
            PitchEstimate::NotFound
        );
    }

    #[test]
    fn nan_samples_are_treated_as_silence() {
        let mut buffer = sine(440.0, 44100.0, 0.5, 2048);
        buffer[10] = f32::NAN;
        assert_eq!(
            estimate(&buffer, 44100.0, &DetectionParams::default()).unwrap(),
            PitchEstimate::NotFound
        );
    }

    #[test]
    fn min_lag_past_the_window_scans_nothing() {
        let buffer = sine(440.0, 44100.0, 0.5, 2048);
        let params = DetectionParams {
            min_lag_samples: 5000,
            ..DetectionParams::default()
        };
        assert_eq!(
            estimate(&buffer, 44100.0, &params).unwrap(),
            PitchEstimate::NotFound
        );
    }

    #[test]
    fn zero_scale_reports_the_raw_lag() {
        let buffer = sine(441.0, 44100.0, 0.5, 2048);
        let params = DetectionParams {
            interpolation_scale: 0.0,
            ..DetectionParams::default()
        };
        // 441 Hz at 44.1 kHz has an exact 100-sample period
        assert_eq!(
            estimate(&buffer, 44100.0, &params).unwrap(),
            PitchEstimate::Detected(441.0)
        );
    }

    #[test]
    fn refinement_falls_back_to_the_raw_lag_when_the_period_goes_negative() {
        // shift = (-1.0 - 0.5) / 0.95, so 2 + 8 * shift is below zero
        assert_eq!(
            refine(&[1.0, 0.5, 0.95, -1.0], 2, 1000.0, 8.0),
            PitchEstimate::Detected(500.0)
        );
    }

    #[test]
    fn refinement_moves_toward_the_stronger_neighbour() {
        let hz = refine(&[0.0, 0.92, 0.99, 0.96], 2, 1000.0, 8.0)
            .frequency()
            .unwrap();
        assert!(hz < 500.0, "got {hz}");
    }

    #[test]
    fn rejects_malformed_input() {
        let params = DetectionParams::default();
        assert!(matches!(
            estimate(&[0.1], 44100.0, &params),
            Err(PitchError::InvalidInput(_))
        ));
        assert!(estimate(&[0.1, 0.2], 0.0, &params).is_err());
        assert!(estimate(&[0.1, 0.2], -48000.0, &params).is_err());
        assert!(estimate(&[0.1, 0.2], f64::NAN, &params).is_err());
    }
}
