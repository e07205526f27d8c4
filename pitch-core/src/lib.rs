// pitch-core/src/lib.rs

//! The core logic for the autocorrelation tuner.
//! This crate is responsible for pitch estimation, note mapping and the
//! frame plumbing between a capture source and a display. It is completely
//! headless and performs no device I/O.

pub mod audio;
pub mod error;
pub mod params;
pub mod pitch;
pub mod tuning;
pub mod worker;

use serde::Serialize;

pub use error::{PitchError, Result};
pub use params::DetectionParams;
pub use pitch::{PitchEstimate, estimate};
pub use tuning::{Accidental, NoteInfo, to_note_info};

/// Represents the result of a single analysis tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// The raw estimator output.
    pub estimate: PitchEstimate,
    /// The note derived from `estimate`.
    pub note: NoteInfo,
}

/// Runs the estimator and the note mapper on one frame.
///
/// # Arguments
/// * `frame` - One analysis window
/// * `sample_rate` - Capture rate of `frame` in Hz
/// * `params` - Detection thresholds
pub fn analyze(frame: &[f32], sample_rate: f64, params: &DetectionParams) -> Result<Reading> {
    let estimate = pitch::estimate(frame, sample_rate, params)?;
    Ok(Reading {
        estimate,
        note: NoteInfo::from_estimate(estimate),
    })
}
