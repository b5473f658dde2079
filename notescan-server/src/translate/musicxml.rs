//! MusicXML reader
//!
//! Reads partwise MusicXML (plain or `.mxl` archive) into a [`Score`].
//! Handles divisions changes, chords, ties, backup/forward, grace notes,
//! tempo and dynamics from `<sound>`, and `<midi-instrument>` settings.

use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::score::{divisions_to_ticks, pitch_to_key, Note, Part, Score, Tempo, TimeSignature};
use super::TranslateError;

const DEFAULT_BPM: f64 = 120.0;

/// Velocity of MusicXML dynamics="100" (forte)
const FORTE_VELOCITY: f64 = 90.0;

const DEFAULT_VELOCITY: u8 = 80;

const PERCUSSION_CHANNEL: u8 = 9;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Parse MusicXML or `.mxl` bytes
pub fn read_score(bytes: &[u8], tpq: u16) -> Result<Score, TranslateError> {
    let text = if bytes.starts_with(ZIP_MAGIC) {
        extract_mxl(bytes)?
    } else {
        decode_text(bytes)?
    };
    parse_partwise(&text, tpq)
}

/// Pull the root MusicXML document out of a compressed `.mxl` archive
///
/// The root file is named by `META-INF/container.xml`; archives without a
/// container fall back to the first `.xml`/`.musicxml` entry outside META-INF.
pub fn extract_mxl(bytes: &[u8]) -> Result<String, TranslateError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| TranslateError::Archive(format!("Failed to open MXL archive: {}", e)))?;

    let root_path = match read_entry(&mut archive, "META-INF/container.xml")? {
        Some(container) => rootfile_from_container(&container)?,
        None => archive
            .file_names()
            .find(|name| {
                !name.starts_with("META-INF/")
                    && (name.ends_with(".xml") || name.ends_with(".musicxml"))
            })
            .map(str::to_string)
            .ok_or_else(|| {
                TranslateError::Archive("No MusicXML file found in archive".to_string())
            })?,
    };

    read_entry(&mut archive, &root_path)?.ok_or_else(|| {
        TranslateError::Archive(format!("Root file '{}' not found in archive", root_path))
    })
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, TranslateError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| TranslateError::Archive(format!("Failed to read '{}': {}", name, e)))?;
            decode_text(&bytes).map(Some)
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(TranslateError::Archive(format!("Failed to open '{}': {}", name, e))),
    }
}

fn rootfile_from_container(container: &str) -> Result<String, TranslateError> {
    let doc = Document::parse(container)
        .map_err(|e| TranslateError::Archive(format!("Failed to parse container.xml: {}", e)))?;
    doc.descendants()
        .filter(|n| n.has_tag_name("rootfile"))
        .find_map(|n| n.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| TranslateError::Archive("No rootfile found in container.xml".to_string()))
}

/// UTF-8 (with or without BOM) or BOM-marked UTF-16
fn decode_text(bytes: &[u8]) -> Result<String, TranslateError> {
    let utf16 = |units: Vec<u16>| {
        String::from_utf16(&units)
            .map_err(|_| TranslateError::Xml("document is not valid UTF-16".to_string()))
    };

    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return utf16(rest.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect());
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16(rest.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect());
    }

    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| TranslateError::Xml("document is not valid UTF-8".to_string()))
}

/// Instrument settings from `<part-list>`
#[derive(Debug, Default)]
struct PartInfo {
    name: Option<String>,
    channel: Option<u8>,
    program: Option<u8>,
}

/// Per-part reading position
struct PartCursor {
    divisions: f64,
    tick: u64,
    /// Start of the previous non-chord note; chord members share it
    last_start: u64,
    velocity: u8,
    /// key -> index into the part's notes, for notes with an unresolved tie
    open_ties: HashMap<u8, usize>,
}

impl PartCursor {
    fn new() -> Self {
        Self {
            divisions: 1.0,
            tick: 0,
            last_start: 0,
            velocity: DEFAULT_VELOCITY,
            open_ties: HashMap::new(),
        }
    }
}

/// Parse a partwise MusicXML document
pub fn parse_partwise(text: &str, tpq: u16) -> Result<Score, TranslateError> {
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    let doc = Document::parse_with_options(text, options)
        .map_err(|e| TranslateError::Xml(e.to_string()))?;

    let root = doc.root_element();
    match root.tag_name().name() {
        "score-partwise" => {}
        "score-timewise" => {
            return Err(TranslateError::Invalid(
                "score-timewise documents are not supported".to_string(),
            ))
        }
        other => {
            return Err(TranslateError::Invalid(format!(
                "unexpected root element <{}>",
                other
            )))
        }
    }

    let part_info = read_part_list(root);

    let mut score = Score {
        tpq,
        tempos: Vec::new(),
        time_signatures: Vec::new(),
        parts: Vec::new(),
    };

    let mut next_channel = 0u8;
    for (index, part_node) in root.children().filter(|n| n.has_tag_name("part")).enumerate() {
        let id = part_node
            .attribute("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("P{}", index + 1));
        let info = part_info.get(&id);

        let channel = match info.and_then(|i| i.channel) {
            Some(channel) => channel,
            None => {
                if next_channel == PERCUSSION_CHANNEL {
                    next_channel += 1;
                }
                let channel = next_channel % 16;
                next_channel = (next_channel + 1) % 16;
                channel
            }
        };

        let mut part = Part {
            name: info.and_then(|i| i.name.clone()).unwrap_or_else(|| id.clone()),
            id,
            channel,
            program: info.and_then(|i| i.program).unwrap_or(0),
            notes: Vec::new(),
        };

        read_part(part_node, index == 0, &mut score, &mut part);
        debug!(part = %part.id, notes = part.notes.len(), "Read MusicXML part");
        score.parts.push(part);
    }

    if score.parts.is_empty() {
        return Err(TranslateError::Invalid("score has no parts".to_string()));
    }

    finalize_maps(&mut score);
    Ok(score)
}

fn read_part_list(root: Node) -> HashMap<String, PartInfo> {
    let mut parts = HashMap::new();

    let Some(part_list) = child(root, "part-list") else {
        return parts;
    };

    for score_part in part_list.children().filter(|n| n.has_tag_name("score-part")) {
        let Some(id) = score_part.attribute("id") else {
            continue;
        };
        let mut info = PartInfo {
            name: child_text(score_part, "part-name")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..Default::default()
        };

        if let Some(instrument) = child(score_part, "midi-instrument") {
            // MusicXML numbers channels 1-16 and programs 1-128
            info.channel = child_text(instrument, "midi-channel")
                .and_then(|s| s.parse::<u8>().ok())
                .filter(|c| (1..=16).contains(c))
                .map(|c| c - 1);
            info.program = child_text(instrument, "midi-program")
                .and_then(|s| s.parse::<u8>().ok())
                .filter(|p| (1..=128).contains(p))
                .map(|p| p - 1);
        }

        parts.insert(id.to_string(), info);
    }

    parts
}

fn read_part(part_node: Node, is_first_part: bool, score: &mut Score, part: &mut Part) {
    let mut cursor = PartCursor::new();

    for measure in part_node.children().filter(|n| n.has_tag_name("measure")) {
        for element in measure.children().filter(Node::is_element) {
            match element.tag_name().name() {
                "attributes" => read_attributes(element, is_first_part, score, &mut cursor),
                "direction" => {
                    for sound in element.descendants().filter(|n| n.has_tag_name("sound")) {
                        read_sound(sound, score, &mut cursor);
                    }
                }
                "sound" => read_sound(element, score, &mut cursor),
                "note" => read_note(element, score.tpq, &mut cursor, part),
                "backup" => {
                    let ticks = duration_ticks(element, &cursor, score.tpq);
                    cursor.tick = cursor.tick.saturating_sub(ticks);
                }
                "forward" => {
                    let ticks = duration_ticks(element, &cursor, score.tpq);
                    cursor.tick = cursor.tick.saturating_add(ticks);
                }
                _ => {}
            }
        }
    }
}

fn read_attributes(element: Node, is_first_part: bool, score: &mut Score, cursor: &mut PartCursor) {
    if let Some(divisions) = child_text(element, "divisions").and_then(|s| s.parse::<f64>().ok()) {
        if divisions > 0.0 {
            cursor.divisions = divisions;
        }
    }

    // Meter is global; the first part is authoritative
    if !is_first_part {
        return;
    }
    if let Some(time) = child(element, "time") {
        let numerator = child_text(time, "beats").and_then(parse_beats);
        let denominator = child_text(time, "beat-type").and_then(|s| s.parse::<u8>().ok());
        if let (Some(numerator), Some(denominator)) = (numerator, denominator) {
            score.time_signatures.push(TimeSignature {
                tick: cursor.tick,
                numerator,
                denominator,
            });
        }
    }
}

/// `beats` may be additive, e.g. "3+2"
fn parse_beats(text: &str) -> Option<u8> {
    text.split('+')
        .map(|part| part.trim().parse::<u8>().ok())
        .sum::<Option<u8>>()
        .filter(|n| *n > 0)
}

fn read_sound(sound: Node, score: &mut Score, cursor: &mut PartCursor) {
    if let Some(bpm) = sound.attribute("tempo").and_then(|s| s.parse::<f64>().ok()) {
        if bpm > 0.0 {
            score.tempos.push(Tempo {
                tick: cursor.tick,
                bpm,
            });
        }
    }
    if let Some(dynamics) = sound.attribute("dynamics").and_then(|s| s.parse::<f64>().ok()) {
        cursor.velocity = dynamics_to_velocity(dynamics);
    }
}

fn dynamics_to_velocity(percent: f64) -> u8 {
    (FORTE_VELOCITY * percent / 100.0).round().clamp(1.0, 127.0) as u8
}

fn duration_ticks(element: Node, cursor: &PartCursor, tpq: u16) -> u64 {
    child_text(element, "duration")
        .and_then(|s| s.parse::<f64>().ok())
        .map(|d| divisions_to_ticks(d, cursor.divisions, tpq))
        .unwrap_or(0)
}

fn read_note(note: Node, tpq: u16, cursor: &mut PartCursor, part: &mut Part) {
    // Grace notes carry no duration and do not move the cursor
    if child(note, "grace").is_some() {
        return;
    }

    let ticks = duration_ticks(note, cursor, tpq);
    let start = if child(note, "chord").is_some() {
        cursor.last_start
    } else {
        let start = cursor.tick;
        cursor.last_start = start;
        cursor.tick = start.saturating_add(ticks);
        start
    };

    if child(note, "rest").is_some() {
        return;
    }

    let Some(key) = note_key(note) else {
        return;
    };

    let velocity = note
        .attribute("dynamics")
        .and_then(|s| s.parse::<f64>().ok())
        .map(dynamics_to_velocity)
        .unwrap_or(cursor.velocity);

    let tie = |kind: &str| {
        note.children()
            .any(|n| n.has_tag_name("tie") && n.attribute("type") == Some(kind))
    };
    let (tie_start, tie_stop) = (tie("start"), tie("stop"));
    let end = start.saturating_add(ticks);

    if tie_stop {
        if let Some(index) = cursor.open_ties.remove(&key) {
            let tied = &mut part.notes[index];
            tied.duration = end.saturating_sub(tied.start);
            if tie_start {
                cursor.open_ties.insert(key, index);
            }
            return;
        }
    }

    if ticks == 0 {
        return;
    }

    part.notes.push(Note {
        start,
        duration: ticks,
        key,
        velocity,
    });
    if tie_start {
        cursor.open_ties.insert(key, part.notes.len() - 1);
    }
}

fn note_key(note: Node) -> Option<u8> {
    if let Some(pitch) = child(note, "pitch") {
        let step = child_text(pitch, "step")?;
        let alter = child_text(pitch, "alter")
            .and_then(|s| s.parse::<f64>().ok())
            .map(|a| a.round() as i32)
            .unwrap_or(0);
        let octave = child_text(pitch, "octave")?.parse::<i32>().ok()?;
        return pitch_to_key(step, alter, octave);
    }
    if let Some(unpitched) = child(note, "unpitched") {
        let step = child_text(unpitched, "display-step")?;
        let octave = child_text(unpitched, "display-octave")?.parse::<i32>().ok()?;
        return pitch_to_key(step, 0, octave);
    }
    None
}

/// Sort tempo and meter maps, drop same-tick duplicates, ensure entries at tick 0
fn finalize_maps(score: &mut Score) {
    score.tempos.sort_by_key(|t| t.tick);
    score.tempos.dedup_by_key(|t| t.tick);
    if score.tempos.first().map_or(true, |t| t.tick > 0) {
        score.tempos.insert(
            0,
            Tempo {
                tick: 0,
                bpm: DEFAULT_BPM,
            },
        );
    }

    score.time_signatures.sort_by_key(|t| t.tick);
    score.time_signatures.dedup_by_key(|t| t.tick);
    if score.time_signatures.first().map_or(true, |t| t.tick > 0) {
        score.time_signatures.insert(
            0,
            TimeSignature {
                tick: 0,
                numerator: 4,
                denominator: 4,
            },
        );
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text()).map(str::trim)
}
