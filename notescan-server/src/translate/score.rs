//! Minimal score representation used between the MusicXML reader and the SMF writer
//!
//! Only what MIDI export needs: timed notes per part, tempo and meter maps.
//! All positions are absolute MIDI ticks.

#[derive(Debug, Clone)]
pub struct Score {
    /// Ticks per quarter note
    pub tpq: u16,
    pub tempos: Vec<Tempo>,
    pub time_signatures: Vec<TimeSignature>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tempo {
    pub tick: u64,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u8,
    pub denominator: u8,
}

#[derive(Debug, Clone)]
pub struct Part {
    pub id: String,
    pub name: String,
    /// MIDI channel 0-15
    pub channel: u8,
    /// General MIDI program 0-127
    pub program: u8,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub start: u64,
    pub duration: u64,
    pub key: u8,
    pub velocity: u8,
}

/// Upper bound for a single converted duration
pub const MAX_DURATION_TICKS: u64 = u32::MAX as u64;

/// Convert a MusicXML duration (in divisions) to MIDI ticks, rounding to nearest
///
/// Non-finite or absurdly long durations are capped at [`MAX_DURATION_TICKS`].
pub fn divisions_to_ticks(duration: f64, divisions: f64, tpq: u16) -> u64 {
    if divisions <= 0.0 || duration <= 0.0 {
        return 0;
    }
    let ticks = (duration * f64::from(tpq) / divisions).round();
    if ticks.is_nan() {
        return 0;
    }
    (ticks as u64).min(MAX_DURATION_TICKS)
}

/// MIDI key number for a MusicXML pitch; C4 is 60
///
/// Returns `None` for an unknown step or a pitch outside 0-127.
pub fn pitch_to_key(step: &str, alter: i32, octave: i32) -> Option<u8> {
    let base = match step.trim().to_ascii_uppercase().as_str() {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    };
    let key = octave
        .checked_add(1)?
        .checked_mul(12)?
        .checked_add(base)?
        .checked_add(alter)?;
    u8::try_from(key).ok().filter(|k| *k <= 127)
}
