//! # Frame Assembly Module
//!
//! Capture sources deliver samples in whatever block sizes their driver
//! chooses. The estimator wants fixed analysis windows. [`Framer`] sits in
//! between: it accumulates incoming blocks and hands each complete window to
//! the analysis side as an owned frame over a channel.
//!
//! A frame is moved into the channel once it is complete, so the analysis
//! thread only ever borrows finished buffers.

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, trace};

use crate::error::{PitchError, Result};

/// Default analysis window length in samples.
///
/// Larger windows provide more low-frequency reach but increase latency.
pub const DEFAULT_BUFFER_LEN: usize = 2048;

/// Accumulates sample blocks and emits fixed-length frames.
#[derive(Debug)]
pub struct Framer {
    frame_len: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: u64,
}

impl Framer {
    /// Creates a framer emitting `frame_len`-sample frames to `sender`.
    ///
    /// # Returns
    /// * `Err(PitchError::InvalidInput)` - `frame_len` is below 2, which no
    ///   estimator call could accept
    pub fn new(frame_len: usize, sender: Sender<Vec<f32>>) -> Result<Self> {
        if frame_len < 2 {
            return Err(PitchError::InvalidInput(format!(
                "frame length must be at least 2 samples, got {frame_len}"
            )));
        }
        Ok(Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
            sender,
            dropped: 0,
        })
    }

    /// Samples waiting for the next frame to fill up.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Frames discarded because the receiver was full or gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Appends a block of samples and sends every frame it completes.
    ///
    /// Never blocks: a frame that does not fit into a bounded channel is
    /// dropped, since a late frame is worth less than the next one.
    ///
    /// # Returns
    /// * Number of frames handed to the channel
    pub fn push(&mut self, data: &[f32]) -> usize {
        self.pending.extend_from_slice(data);

        let mut sent = 0;
        while self.pending.len() >= self.frame_len {
            let frame: Vec<f32> = self.pending.drain(..self.frame_len).collect();
            match self.sender.try_send(frame) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    trace!(target: "framer", "analysis queue full, dropped frame");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped += 1;
                    debug!(target: "framer", "analysis side disconnected, dropped frame");
                }
            }
        }
        sent
    }
}
