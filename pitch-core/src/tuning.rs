//! # Musical Tuning Module
//!
//! Maps pitch estimates onto the 12-tone equal-tempered scale referenced to
//! A4 = 440 Hz.
//!
//! ## Features
//! - Frequency to note name, octave and cent deviation
//! - MIDI note number to ideal frequency
//! - Note name to semitone index lookups (sharp and flat spellings)
//! - Accidental symbols for display

use log::{debug, trace};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::LN_2;
use std::fmt;

use crate::pitch::PitchEstimate;

/// Pitch-class names, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C♯", "D", "D♯", "E", "F", "F♯", "G", "G♯", "A", "A♯", "B",
];

/// Display symbols for [`Accidental::Flat`], [`Accidental::Natural`] and
/// [`Accidental::Sharp`], in that order.
pub const ACCIDENTAL_SYMBOLS: [&str; 3] = ["♭", "", "♯"];

/// Reference pitch in Hz.
pub const A4_FREQUENCY: f64 = 440.0;
/// MIDI note number of the reference pitch.
pub const A4_MIDI: i32 = 69;
/// MIDI note number of C0, the origin of [`NoteInfo::note_index`].
pub const C0_MIDI: i32 = 12;

/// Number of octaves covered by the name lookup table (C0 to B9).
const NAMED_OCTAVES: i32 = 10;

/// Direction of the tuning offset.
///
/// This encodes the sign of the detune, not whether the note is a black key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Accidental {
    Flat,
    #[default]
    Natural,
    Sharp,
}

impl Accidental {
    pub fn from_detune(cents: i32) -> Self {
        match cents {
            c if c < 0 => Accidental::Flat,
            0 => Accidental::Natural,
            _ => Accidental::Sharp,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::Flat => ACCIDENTAL_SYMBOLS[0],
            Accidental::Natural => ACCIDENTAL_SYMBOLS[1],
            Accidental::Sharp => ACCIDENTAL_SYMBOLS[2],
        }
    }
}

/// Note description derived from a [`PitchEstimate`].
///
/// The default value is the "no pitch" sentinel: index 0, empty name,
/// natural, octave 0, no detune.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteInfo {
    /// Semitones above C0. Negative below C0; no clamping is applied.
    pub note_index: i32,
    /// Pitch-class name, empty when no pitch was found.
    pub note_name: &'static str,
    pub accidental: Accidental,
    /// Scientific octave number (A4 = 440 Hz is octave 4).
    pub octave: i32,
    /// Signed deviation from the nearest equal-tempered note, floored to whole cents.
    pub detune_cents: i32,
}

impl NoteInfo {
    /// Builds the note description for an estimate.
    ///
    /// # Arguments
    /// * `estimate` - Output of the pitch estimator
    ///
    /// # Returns
    /// * The sentinel for `NotFound`, otherwise the nearest note with its detune
    /// * The sentinel as well for frequencies so small (subnormal) that their
    ///   logarithm or ideal pitch underflows
    pub fn from_estimate(estimate: PitchEstimate) -> Self {
        let frequency = match estimate {
            PitchEstimate::Detected(hz) => hz,
            PitchEstimate::NotFound => return NoteInfo::default(),
        };

        let Some((midi, detune_cents)) = midi_from_frequency(frequency)
            .and_then(|midi| Some((midi, cents_off(frequency, midi)?)))
        else {
            debug!(target: "tuning", "{frequency:e} Hz has no representable note");
            return NoteInfo::default();
        };
        let note_index = midi - C0_MIDI;

        let info = NoteInfo {
            note_index,
            note_name: NOTE_NAMES[note_index.rem_euclid(12) as usize],
            accidental: Accidental::from_detune(detune_cents),
            octave: note_index.div_euclid(12),
            detune_cents,
        };
        trace!(target: "tuning", "{frequency:.2} Hz -> {info:?}");
        info
    }

    /// Whether this is the "no pitch" sentinel.
    pub fn is_silent(&self) -> bool {
        self.note_name.is_empty()
    }

    pub fn midi_note(&self) -> i32 {
        self.note_index + C0_MIDI
    }

    /// Equal-tempered frequency of the nearest note, `None` for the sentinel.
    pub fn ideal_frequency(&self) -> Option<f64> {
        (!self.is_silent()).then(|| frequency_from_midi(self.midi_note()))
    }
}

/// Shorthand for [`NoteInfo::from_estimate`].
pub fn to_note_info(estimate: PitchEstimate) -> NoteInfo {
    NoteInfo::from_estimate(estimate)
}

impl fmt::Display for NoteInfo {
    /// `A4`, `A♯4 ♭1¢`, or nothing for the sentinel.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_silent() {
            return Ok(());
        }
        write!(f, "{}{}", self.note_name, self.octave)?;
        if self.detune_cents != 0 {
            write!(
                f,
                " {}{}¢",
                self.accidental.symbol(),
                self.detune_cents.unsigned_abs()
            )?;
        }
        Ok(())
    }
}

/// Nearest MIDI note number for a frequency (69 = A4). Halves round up.
///
/// `None` when the semitone distance is not finite, e.g. for a non-positive
/// or underflowing frequency.
pub fn midi_from_frequency(frequency: f64) -> Option<i32> {
    let semitones = 12.0 * ((frequency / A4_FREQUENCY).ln() / LN_2);
    semitones
        .is_finite()
        .then(|| (semitones + 0.5).floor() as i32 + A4_MIDI)
}

/// Exact equal-tempered frequency of a MIDI note number.
pub fn frequency_from_midi(midi: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf(f64::from(midi - A4_MIDI) / 12.0)
}

/// Cent deviation of `frequency` from `midi`'s ideal pitch, floored.
///
/// Positive values are sharp, negative values flat. `None` when the ratio to
/// the ideal pitch is not representable.
pub fn cents_off(frequency: f64, midi: i32) -> Option<i32> {
    let cents = ((1200.0 * (frequency / frequency_from_midi(midi)).ln()) / LN_2).floor();
    cents.is_finite().then_some(cents as i32)
}

/// Canonical names ("C0" .. "B9") mapped to their semitone index from C0.
static NOTE_MAP: Lazy<BTreeMap<String, i32>> = Lazy::new(|| {
    (0..NAMED_OCTAVES * 12)
        .map(|index| {
            let name = format!("{}{}", NOTE_NAMES[(index % 12) as usize], index / 12);
            (name, index)
        })
        .collect()
});

/// Gets the semitone index from C0 for a note name such as `A4`, `C#3` or `Bb2`.
///
/// # Arguments
/// * `name` - Note name; `#`/`♯` and `b`/`♭` spellings are accepted in both
///   directions, so `E#4` is F4 and `Cb4` is B3
///
/// # Returns
/// * `Some(index)` - Index in C0..=B9
/// * `None` - Unknown name or outside the table
pub fn note_index_from_name(name: &str) -> Option<i32> {
    let name = name.trim().replace('#', "♯");
    if let Some(&index) = NOTE_MAP.get(&name) {
        return Some(index);
    }

    // Remaining spellings are a natural raised or lowered by one semitone,
    // which also covers E♯/B♯ and C♭/F♭ crossing into the next letter.
    let mut chars = name.chars();
    let letter = chars.next()?;
    let rest = chars.as_str();
    let (octave, step) = if let Some(octave) = rest.strip_prefix('♯') {
        (octave, 1)
    } else if let Some(octave) = rest.strip_prefix('b').or_else(|| rest.strip_prefix('♭')) {
        (octave, -1)
    } else {
        return None;
    };
    let natural = NOTE_MAP.get(&format!("{letter}{octave}"))?;
    Some(natural + step).filter(|index| (0..NAMED_OCTAVES * 12).contains(index))
}
