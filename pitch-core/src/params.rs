//! # Detection Parameters
//!
//! The complete tuning surface of the estimator. Every threshold the
//! autocorrelation scan depends on is a named field here with an empirical
//! default, so it can be retuned (or loaded from a JSON document by a front
//! end) without touching the algorithm.

use serde::{Deserialize, Serialize};

use crate::error::{PitchError, Result};

/// Default minimum lag (in samples) considered by the scan.
pub const DEFAULT_MIN_LAG_SAMPLES: usize = 0;
/// Default bar a correlation has to clear to count as periodic.
pub const DEFAULT_GOOD_ENOUGH_CORRELATION: f64 = 0.9;
/// Default RMS level below which a buffer is treated as silence.
pub const DEFAULT_SILENCE_RMS_FLOOR: f64 = 0.01;
/// Default scaling of the neighbour-difference shift used in refinement.
pub const DEFAULT_INTERPOLATION_SCALE: f64 = 8.0;
/// Default best-correlation floor for the unrefined fallback result.
pub const DEFAULT_FALLBACK_CORRELATION_FLOOR: f64 = 0.01;

/// Configuration for [`crate::pitch::estimate`].
///
/// Missing fields deserialize to their defaults, so `{"min_lag_samples": 20}`
/// is a valid document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Smallest autocorrelation lag to consider.
    pub min_lag_samples: usize,
    /// Threshold in [0, 1] a rising correlation must exceed.
    pub good_enough_correlation: f64,
    /// Empirical noise floor; quieter buffers report no pitch.
    pub silence_rms_floor: f64,
    /// Multiplier applied to the neighbour shift when refining the best lag.
    pub interpolation_scale: f64,
    /// A completed scan only reports a pitch above this best correlation.
    pub fallback_correlation_floor: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_lag_samples: DEFAULT_MIN_LAG_SAMPLES,
            good_enough_correlation: DEFAULT_GOOD_ENOUGH_CORRELATION,
            silence_rms_floor: DEFAULT_SILENCE_RMS_FLOOR,
            interpolation_scale: DEFAULT_INTERPOLATION_SCALE,
            fallback_correlation_floor: DEFAULT_FALLBACK_CORRELATION_FLOOR,
        }
    }
}

impl DetectionParams {
    /// Checks that every threshold lies in its domain.
    ///
    /// # Returns
    /// * `Ok(())` - Parameters are usable
    /// * `Err(PitchError::InvalidInput)` - A field is out of range or not finite
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.good_enough_correlation) {
            return Err(PitchError::InvalidInput(format!(
                "good_enough_correlation must be in [0, 1], got {}",
                self.good_enough_correlation
            )));
        }
        if !self.silence_rms_floor.is_finite() || self.silence_rms_floor < 0.0 {
            return Err(PitchError::InvalidInput(format!(
                "silence_rms_floor must be a non-negative number, got {}",
                self.silence_rms_floor
            )));
        }
        if !self.interpolation_scale.is_finite() || self.interpolation_scale < 0.0 {
            return Err(PitchError::InvalidInput(format!(
                "interpolation_scale must be a non-negative number, got {}",
                self.interpolation_scale
            )));
        }
        if !self.fallback_correlation_floor.is_finite() {
            return Err(PitchError::InvalidInput(format!(
                "fallback_correlation_floor must be finite, got {}",
                self.fallback_correlation_floor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_constants() {
        let params = DetectionParams::default();
        assert_eq!(params.min_lag_samples, 0);
        assert_eq!(params.good_enough_correlation, 0.9);
        assert_eq!(params.silence_rms_floor, 0.01);
        assert_eq!(params.interpolation_scale, 8.0);
        assert_eq!(params.fallback_correlation_floor, 0.01);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let params: DetectionParams =
            serde_json::from_str(r#"{ "min_lag_samples": 20, "interpolation_scale": 0.0 }"#)
                .unwrap();
        assert_eq!(
            params,
            DetectionParams {
                min_lag_samples: 20,
                interpolation_scale: 0.0,
                ..DetectionParams::default()
            }
        );
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let too_high = DetectionParams {
            good_enough_correlation: 1.5,
            ..DetectionParams::default()
        };
        assert!(matches!(too_high.validate(), Err(PitchError::InvalidInput(_))));

        let nan_scale = DetectionParams {
            interpolation_scale: f64::NAN,
            ..DetectionParams::default()
        };
        assert!(nan_scale.validate().is_err());

        let negative_floor = DetectionParams {
            silence_rms_floor: -0.1,
            ..DetectionParams::default()
        };
        assert!(negative_floor.validate().is_err());
    }
}
