//! # pitch-probe
//!
//! Command-line front end for the tuner core. It plays the capture side of
//! the pipeline (a synthesized tone, or raw little-endian `f32` mono samples
//! on stdin), frames the samples, runs the analysis worker and prints one
//! reading per tick.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use log::{debug, info};
use pitch_core::audio::{DEFAULT_BUFFER_LEN, Framer};
use pitch_core::tuning::{A4_MIDI, C0_MIDI, frequency_from_midi, note_index_from_name};
use pitch_core::worker::AnalysisWorker;
use pitch_core::{DetectionParams, Reading};
use std::f64::consts::PI;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Samples handed to the framer per simulated driver callback.
const CALLBACK_BLOCK: usize = 512;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sample rate of the input in Hz
    #[arg(long, global = true, default_value_t = 44100.0)]
    sample_rate: f64,
    /// Analysis window length in samples
    #[arg(long, global = true, default_value_t = DEFAULT_BUFFER_LEN)]
    buffer_len: usize,
    /// JSON file with detection parameters; missing fields use defaults
    #[arg(long, global = true)]
    params: Option<PathBuf>,
    /// Print one JSON object per reading instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    source: Source,
}

#[derive(Subcommand, Debug)]
enum Source {
    /// Analyze a synthesized sine tone
    Tone {
        /// Tone frequency in Hz (defaults to A4)
        #[arg(long, conflicts_with = "note")]
        freq: Option<f64>,
        /// Tone given as a note name, e.g. "A4", "C#3", "Bb2"
        #[arg(long)]
        note: Option<String>,
        /// Peak amplitude in [0, 1]
        #[arg(long, default_value_t = 0.5)]
        amplitude: f64,
        /// Number of analysis frames to generate
        #[arg(long, default_value_t = 8)]
        frames: usize,
    },
    /// Analyze raw little-endian f32 mono samples read from stdin
    Stdin,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let params = match &args.params {
        Some(path) => load_params(path)?,
        None => DetectionParams::default(),
    };
    debug!("detection parameters: {params:?}");

    let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
    let mut framer = Framer::new(args.buffer_len, frame_tx)?;
    let (worker, readings) = AnalysisWorker::spawn(frame_rx, args.sample_rate, params)?;
    let mut printer = Printer { json: args.json, tick: 0 };

    match &args.source {
        Source::Tone {
            freq,
            note,
            amplitude,
            frames,
        } => {
            let frequency = tone_frequency(*freq, note.as_deref())?;
            info!(
                "synthesizing {frequency:.2} Hz at {} Hz, {frames} frames of {}",
                args.sample_rate, args.buffer_len
            );
            let total = frames * args.buffer_len;
            let samples: Vec<f32> = (0..total)
                .map(|i| (amplitude * (2.0 * PI * frequency * i as f64 / args.sample_rate).sin()) as f32)
                .collect();
            for block in samples.chunks(CALLBACK_BLOCK) {
                framer.push(block);
                printer.drain(&readings)?;
            }
        }
        Source::Stdin => {
            info!("reading f32le samples from stdin at {} Hz", args.sample_rate);
            feed_stdin(&mut framer, &readings, &mut printer)?;
        }
    }

    if framer.pending_len() > 0 {
        debug!("discarding {} samples of incomplete frame", framer.pending_len());
    }
    let dropped = framer.dropped();
    drop(framer);

    for reading in readings.iter() {
        printer.print(&reading)?;
    }
    worker.join();

    info!("{} readings, {dropped} frames dropped", printer.tick);
    Ok(())
}

/// Reads a `DetectionParams` JSON document.
fn load_params(path: &Path) -> Result<DetectionParams> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading parameter file {}", path.display()))?;
    let params: DetectionParams = serde_json::from_str(&text)
        .with_context(|| format!("parsing parameter file {}", path.display()))?;
    params.validate()?;
    Ok(params)
}

fn tone_frequency(freq: Option<f64>, note: Option<&str>) -> Result<f64> {
    match (freq, note) {
        (Some(hz), _) if hz.is_finite() && hz > 0.0 => Ok(hz),
        (Some(hz), _) => bail!("tone frequency must be positive, got {hz}"),
        (None, Some(name)) => {
            let index = note_index_from_name(name)
                .with_context(|| format!("unknown note name {name:?}"))?;
            Ok(frequency_from_midi(index + C0_MIDI))
        }
        (None, None) => Ok(frequency_from_midi(A4_MIDI)),
    }
}

fn feed_stdin(framer: &mut Framer, readings: &Receiver<Reading>, printer: &mut Printer) -> Result<()> {
    let mut stdin = io::stdin().lock();
    let mut bytes = vec![0u8; CALLBACK_BLOCK * 4];
    let mut carry: Vec<u8> = Vec::with_capacity(4);
    let mut samples = Vec::with_capacity(CALLBACK_BLOCK);

    loop {
        let n = stdin.read(&mut bytes).context("reading stdin")?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&bytes[..n]);

        samples.clear();
        let whole = carry.len() / 4 * 4;
        samples.extend(
            carry[..whole]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        carry.drain(..whole);

        framer.push(&samples);
        printer.drain(readings)?;
    }

    if !carry.is_empty() {
        debug!("ignoring {} trailing bytes", carry.len());
    }
    Ok(())
}

struct Printer {
    json: bool,
    tick: u64,
}

impl Printer {
    fn drain(&mut self, readings: &Receiver<Reading>) -> Result<()> {
        for reading in readings.try_iter() {
            self.print(&reading)?;
        }
        Ok(())
    }

    fn print(&mut self, reading: &Reading) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(reading)?);
        } else {
            match reading.estimate.frequency() {
                Some(hz) => println!("{:>6} {hz:>9.2} Hz  {}", self.tick, reading.note),
                None => println!("{:>6}        --", self.tick),
            }
        }
        self.tick += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_defaults_to_a4() {
        assert_eq!(tone_frequency(None, None).unwrap(), 440.0);
    }

    #[test]
    fn tone_from_note_name() {
        let hz = tone_frequency(None, Some("C4")).unwrap();
        assert!((hz - 261.6256).abs() < 1e-3);
        assert!(tone_frequency(None, Some("X9")).is_err());
    }

    #[test]
    fn tone_rejects_non_positive_frequency() {
        assert!(tone_frequency(Some(0.0), None).is_err());
        assert_eq!(tone_frequency(Some(330.0), None).unwrap(), 330.0);
    }

    #[test]
    fn cli_parses_global_flags_after_the_subcommand() {
        let args = Args::try_parse_from([
            "pitch-probe", "tone", "--note", "A#3", "--sample-rate", "48000", "--json",
        ])
        .unwrap();
        assert_eq!(args.sample_rate, 48000.0);
        assert!(args.json);
        assert!(matches!(args.source, Source::Tone { note: Some(ref n), .. } if n == "A#3"));
    }
}
