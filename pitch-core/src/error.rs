//! Error type shared by the estimator, the parameter checks and the tick pipeline.

use thiserror::Error;

/// Errors surfaced synchronously to the caller of an analysis function.
///
/// "No pitch" is not an error; it is [`crate::PitchEstimate::NotFound`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PitchError {
    /// The caller handed over a malformed buffer, sample rate or parameter set.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PitchError>;
