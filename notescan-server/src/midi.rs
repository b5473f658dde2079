//! Standard MIDI File helpers

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Magic bytes opening every Standard MIDI File
pub const MIDI_HEADER: &[u8; 4] = b"MThd";

/// Ticks per quarter note of the demo scale
const DEMO_TPQ: u16 = 96;

/// C4 D4 E4 F4 G4 A4 B4 C5
const DEMO_SCALE: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];

pub fn has_midi_header(bytes: &[u8]) -> bool {
    bytes.starts_with(MIDI_HEADER)
}

/// True when the file exists and starts with `MThd`
pub async fn validate_midi_file(path: &Path) -> std::io::Result<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = [0u8; 4];
    match file.read_exact(&mut header).await {
        Ok(_) => Ok(has_midi_header(&header)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Format 0 file playing a one-octave C-major scale, one quarter note per step
pub fn demo_scale_smf() -> std::io::Result<Vec<u8>> {
    let mut track = Vec::with_capacity(DEMO_SCALE.len() * 2 + 1);
    for key in DEMO_SCALE {
        track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: 100.into(),
                },
            },
        });
        track.push(TrackEvent {
            delta: (DEMO_TPQ as u32).into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 100.into(),
                },
            },
        });
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(DEMO_TPQ.into()),
        },
        tracks: vec![track],
    };

    let mut out = Vec::new();
    smf.write_std(&mut out)?;
    Ok(out)
}
