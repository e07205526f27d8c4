//! # Analysis Worker Module
//!
//! Runs the per-tick analysis on a dedicated thread. Frames arrive from a
//! [`crate::audio::Framer`], each one is analyzed exactly once, and the
//! resulting [`Reading`] is sent to whoever presents it.
//!
//! ## Lifecycle
//! - The thread exits when [`AnalysisWorker::shutdown`] is called, when the
//!   frame channel disconnects, or when the reading receiver is dropped.
//! - Frames rejected as invalid input are logged and skipped.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::thread::{self, JoinHandle};

use crate::error::{PitchError, Result};
use crate::params::DetectionParams;
use crate::{Reading, analyze};

/// Handle to the analysis thread.
#[derive(Debug)]
pub struct AnalysisWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Starts the analysis thread.
    ///
    /// # Arguments
    /// * `frames` - Receiving end of the framer's channel
    /// * `sample_rate` - Capture rate shared by every frame
    /// * `params` - Detection parameters used for every tick
    ///
    /// # Returns
    /// * `Ok((worker, readings))` - Worker handle and the channel readings arrive on
    /// * `Err(PitchError::InvalidInput)` - Bad sample rate or parameters; no thread is started
    pub fn spawn(
        frames: Receiver<Vec<f32>>,
        sample_rate: f64,
        params: DetectionParams,
    ) -> Result<(Self, Receiver<Reading>)> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PitchError::InvalidInput(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        params.validate()?;

        let (reading_tx, reading_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::spawn(move || {
            debug!(target: "worker", "analysis thread started at {sample_rate} Hz");
            run(frames, shutdown_rx, reading_tx, sample_rate, params);
            debug!(target: "worker", "analysis thread finished");
        });

        let worker = Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        };
        Ok((worker, reading_rx))
    }

    /// Signals the thread to stop and waits for it.
    pub fn shutdown(mut self) {
        let _ = self.shutdown_tx.try_send(());
        self.wait();
    }

    /// Waits for the thread to run out of frames on its own.
    ///
    /// Returns once every sender of the frame channel has been dropped and
    /// the queued frames are processed.
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(target: "worker", "analysis thread panicked");
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            let _ = self.shutdown_tx.try_send(());
            self.wait();
        }
    }
}

fn run(
    frames: Receiver<Vec<f32>>,
    shutdown_rx: Receiver<()>,
    reading_tx: Sender<Reading>,
    sample_rate: f64,
    params: DetectionParams,
) {
    loop {
        crossbeam_channel::select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => match analyze(&frame, sample_rate, &params) {
                    Ok(reading) => {
                        if reading_tx.send(reading).is_err() {
                            debug!(target: "worker", "reading receiver dropped");
                            break;
                        }
                    }
                    Err(e) => warn!(target: "worker", "skipping frame: {e}"),
                },
                Err(_) => {
                    debug!(target: "worker", "frame channel closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                debug!(target: "worker", "received shutdown signal");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Framer;
    use crate::pitch::PitchEstimate;
    use std::f64::consts::PI;

    fn sine(frequency: f64, sample_rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (0.5 * (2.0 * PI * frequency * i as f64 / sample_rate).sin()) as f32)
            .collect()
    }

    #[test]
    fn one_reading_per_frame() {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let (worker, readings) =
            AnalysisWorker::spawn(frame_rx, 44100.0, DetectionParams::default()).unwrap();

        let mut framer = Framer::new(2048, frame_tx).unwrap();
        assert_eq!(framer.push(&sine(440.0, 44100.0, 2048 * 3 + 100)), 3);
        drop(framer);
        worker.join();

        let readings: Vec<Reading> = readings.try_iter().collect();
        assert_eq!(readings.len(), 3);
        for reading in readings {
            assert!(reading.estimate.is_detected());
            assert_eq!((reading.note.note_name, reading.note.octave), ("A", 4));
        }
    }

    #[test]
    fn silent_frames_still_produce_readings() {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let (worker, readings) =
            AnalysisWorker::spawn(frame_rx, 48000.0, DetectionParams::default()).unwrap();

        frame_tx.send(vec![0.0; 2048]).unwrap();
        drop(frame_tx);
        worker.join();

        let reading = readings.recv().unwrap();
        assert_eq!(reading.estimate, PitchEstimate::NotFound);
        assert!(reading.note.is_silent());
    }

    #[test]
    fn invalid_frames_are_skipped() {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let (worker, readings) =
            AnalysisWorker::spawn(frame_rx, 44100.0, DetectionParams::default()).unwrap();

        frame_tx.send(vec![0.5]).unwrap();
        frame_tx.send(vec![0.0; 64]).unwrap();
        drop(frame_tx);
        worker.join();

        assert_eq!(readings.try_iter().count(), 1);
    }

    #[test]
    fn shutdown_stops_an_idle_worker() {
        let (_frame_tx, frame_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        let (worker, readings) =
            AnalysisWorker::spawn(frame_rx, 44100.0, DetectionParams::default()).unwrap();

        worker.shutdown();
        assert!(readings.recv().is_err());
    }

    #[test]
    fn refuses_to_start_with_a_bad_sample_rate() {
        let (_frame_tx, frame_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        assert!(matches!(
            AnalysisWorker::spawn(frame_rx, 0.0, DetectionParams::default()),
            Err(PitchError::InvalidInput(_))
        ));
    }
}
