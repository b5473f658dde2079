//! Standard MIDI File writer for [`Score`]
//!
//! Format 1: a conductor track with tempo and meter, then one track per part.

use midly::num::{u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use super::score::{Part, Score};
use super::TranslateError;

/// Same-tick ordering: meta first, then program, then note-offs before note-ons
/// so a repeated key is released before it is struck again.
const ORDER_META: u8 = 0;
const ORDER_PROGRAM: u8 = 1;
const ORDER_NOTE_OFF: u8 = 2;
const ORDER_NOTE_ON: u8 = 3;

/// An event at an absolute tick, before delta encoding
type TimedEvent<'a> = (u64, u8, TrackEventKind<'a>);

pub fn write_smf(score: &Score) -> Result<Vec<u8>, TranslateError> {
    let mut tracks = Vec::with_capacity(score.parts.len() + 1);
    tracks.push(encode_track(conductor_events(score)));
    for part in &score.parts {
        tracks.push(encode_track(part_events(part)));
    }

    let smf = Smf {
        header: Header::new(Format::Parallel, Timing::Metrical(score.tpq.into())),
        tracks,
    };

    let mut out = Vec::new();
    smf.write_std(&mut out)
        .map_err(|e| TranslateError::Midi(format!("Failed to write MIDI: {}", e)))?;
    Ok(out)
}

fn conductor_events(score: &Score) -> Vec<TimedEvent<'static>> {
    let mut events = Vec::new();

    for tempo in &score.tempos {
        let micros = (60_000_000.0 / tempo.bpm).round().clamp(1.0, 16_777_215.0) as u32;
        events.push((
            tempo.tick,
            ORDER_META,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
        ));
    }

    for ts in &score.time_signatures {
        let denominator_power = ts.denominator.max(1).ilog2() as u8;
        events.push((
            ts.tick,
            ORDER_META,
            // 24 clocks per click, 8 thirty-seconds per quarter
            TrackEventKind::Meta(MetaMessage::TimeSignature(
                ts.numerator,
                denominator_power,
                24,
                8,
            )),
        ));
    }

    events
}

fn part_events(part: &Part) -> Vec<TimedEvent<'_>> {
    let channel = (part.channel & 0x0F).into();
    let mut events = vec![
        (
            0,
            ORDER_META,
            TrackEventKind::Meta(MetaMessage::TrackName(part.name.as_bytes())),
        ),
        (
            0,
            ORDER_PROGRAM,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: (part.program & 0x7F).into(),
                },
            },
        ),
    ];

    for note in &part.notes {
        let key = (note.key & 0x7F).into();
        events.push((
            note.start,
            ORDER_NOTE_ON,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: note.velocity.clamp(1, 127).into(),
                },
            },
        ));
        events.push((
            note.start.saturating_add(note.duration),
            ORDER_NOTE_OFF,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: 0.into(),
                },
            },
        ));
    }

    events
}

/// Sort by absolute tick, convert to deltas, terminate the track
fn encode_track(mut events: Vec<TimedEvent<'_>>) -> Vec<TrackEvent<'_>> {
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut previous = 0u64;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: delta_ticks(tick - previous),
            kind,
        });
        previous = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn delta_ticks(delta: u64) -> u28 {
    u28::new(delta.min(u64::from(u28::max_value().as_int())) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::score::{Note, Tempo, TimeSignature};

    fn score_with(notes: Vec<Note>) -> Score {
        Score {
            tpq: 480,
            tempos: vec![Tempo { tick: 0, bpm: 120.0 }],
            time_signatures: vec![TimeSignature {
                tick: 0,
                numerator: 6,
                denominator: 8,
            }],
            parts: vec![Part {
                id: "P1".to_string(),
                name: "Piano".to_string(),
                channel: 0,
                program: 0,
                notes,
            }],
        }
    }

    fn absolute<'a>(track: &[TrackEvent<'a>]) -> Vec<(u32, TrackEventKind<'a>)> {
        let mut tick = 0;
        track
            .iter()
            .map(|e| {
                tick += e.delta.as_int();
                (tick, e.kind)
            })
            .collect()
    }

    #[test]
    fn test_header_and_conductor() {
        let bytes = write_smf(&score_with(vec![])).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(480.into()));
        assert_eq!(smf.tracks.len(), 2);

        let conductor = &smf.tracks[0];
        assert!(conductor
            .iter()
            .any(|e| e.kind == TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))));
        assert!(conductor
            .iter()
            .any(|e| e.kind == TrackEventKind::Meta(MetaMessage::TimeSignature(6, 3, 24, 8))));
        assert_eq!(
            conductor.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        );
    }

    #[test]
    fn test_note_timing() {
        let bytes = write_smf(&score_with(vec![
            Note {
                start: 0,
                duration: 480,
                key: 60,
                velocity: 80,
            },
            Note {
                start: 960,
                duration: 240,
                key: 64,
                velocity: 80,
            },
        ]))
        .unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        let notes: Vec<(u32, bool, u8)> = absolute(&smf.tracks[1])
            .into_iter()
            .filter_map(|(tick, kind)| match kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some((tick, true, key.as_int())),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } => Some((tick, false, key.as_int())),
                _ => None,
            })
            .collect();

        assert_eq!(
            notes,
            vec![(0, true, 60), (480, false, 60), (960, true, 64), (1200, false, 64)]
        );
    }

    #[test]
    fn test_repeated_key_released_before_restrike() {
        let repeated = |start| Note {
            start,
            duration: 480,
            key: 67,
            velocity: 90,
        };
        let bytes = write_smf(&score_with(vec![repeated(480), repeated(0)])).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let at_480: Vec<bool> = absolute(&smf.tracks[1])
            .into_iter()
            .filter(|(tick, _)| *tick == 480)
            .filter_map(|(_, kind)| match kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => Some(true),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => Some(false),
                _ => None,
            })
            .collect();
        assert_eq!(at_480, vec![false, true]);
    }

    #[test]
    fn test_note_off_at_end_of_timeline() {
        let bytes = write_smf(&score_with(vec![Note {
            start: u64::MAX - 10,
            duration: 480,
            key: 60,
            velocity: 80,
        }]))
        .unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let note_offs = smf.tracks[1]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOff { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(note_offs, 1);
    }

    #[test]
    fn test_track_name_and_program() {
        let mut score = score_with(vec![]);
        score.parts[0].program = 40;
        score.parts[0].channel = 3;
        let bytes = write_smf(&score).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let track = &smf.tracks[1];
        assert_eq!(
            track[0].kind,
            TrackEventKind::Meta(MetaMessage::TrackName(b"Piano"))
        );
        assert_eq!(
            track[1].kind,
            TrackEventKind::Midi {
                channel: 3.into(),
                message: MidiMessage::ProgramChange {
                    program: 40.into()
                },
            }
        );
    }
}
