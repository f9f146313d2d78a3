use crate::model::NoteSequence;
use encore_ports::notes::NoteEvent;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum NotesImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

const ONSET_COLUMN: &str = "start_time_s";
const PITCH_COLUMN: &str = "pitch_midi";

pub fn import_note_csv_path(path: &Path) -> Result<NoteSequence, NotesImportError> {
    let data = std::fs::read_to_string(path).map_err(|e| NotesImportError::Io(e.to_string()))?;
    import_note_csv_str(&data)
}

/// Parse a note-event table with a header row.
///
/// Only `start_time_s` and `pitch_midi` are read; any other column
/// (`end_time_s`, `velocity`, pitch bends, ...) is ignored. The delimiter is
/// sniffed from the header.
pub fn import_note_csv_str(data: &str) -> Result<NoteSequence, NotesImportError> {
    let mut lines = data
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Ok(NoteSequence::new());
    };

    let delimiter = sniff_delimiter(header);
    let columns: Vec<&str> = header
        .split(delimiter)
        .map(|c| c.trim().trim_matches('"'))
        .collect();
    let onset_idx = column_index(&columns, ONSET_COLUMN)?;
    let pitch_idx = column_index(&columns, PITCH_COLUMN)?;

    let mut events = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        let onset = parse_field::<f64>(&fields, onset_idx, line_no)?;
        let pitch = parse_pitch(&fields, pitch_idx, line_no)?;
        let event = NoteEvent::new(pitch, onset).ok_or_else(|| {
            NotesImportError::Parse(format!(
                "line {}: invalid note (pitch {}, onset {})",
                line_no + 1,
                pitch,
                onset
            ))
        })?;
        events.push(event);
    }

    Ok(NoteSequence::from_events(events))
}

fn sniff_delimiter(header: &str) -> char {
    [',', '\t', ';']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .unwrap_or(',')
}

fn column_index(columns: &[&str], name: &str) -> Result<usize, NotesImportError> {
    columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
        .ok_or_else(|| NotesImportError::Parse(format!("missing column: {}", name)))
}

fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    idx: usize,
    line_no: usize,
) -> Result<T, NotesImportError> {
    let raw = fields.get(idx).ok_or_else(|| {
        NotesImportError::Parse(format!("line {}: missing field {}", line_no + 1, idx))
    })?;
    raw.trim_matches('"').parse::<T>().map_err(|_| {
        NotesImportError::Parse(format!("line {}: invalid value {:?}", line_no + 1, raw))
    })
}

// Some exporters write pitches as floats ("60.0").
fn parse_pitch(fields: &[&str], idx: usize, line_no: usize) -> Result<u8, NotesImportError> {
    let value = parse_field::<f64>(fields, idx, line_no)?;
    if !(0.0..=127.0).contains(&value) || value.fract() != 0.0 {
        return Err(NotesImportError::Parse(format!(
            "line {}: pitch out of range: {}",
            line_no + 1,
            value
        )));
    }
    Ok(value as u8)
}
