use crate::model::NoteSequence;
use encore_ports::notes::NoteEvent;
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::BTreeMap;
use std::path::Path;

type Tick = i64;

#[derive(thiserror::Error, Debug)]
pub enum MidiImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TempoPoint {
    tick: Tick,
    us_per_quarter: u32,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: Tick,
    start_us: i64,
    us_per_quarter: u32,
}

/// Tick → wall-clock conversion for one file.
#[derive(Clone, Debug)]
struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(ppq: u16, points: Vec<TempoPoint>) -> Self {
        let mut segments = Vec::with_capacity(points.len());
        let mut current_us = 0i64;
        for (idx, point) in points.iter().enumerate() {
            if idx > 0 {
                let prev = &points[idx - 1];
                current_us += ticks_to_us(point.tick - prev.tick, prev.us_per_quarter, ppq);
            }
            segments.push(TempoSegment {
                start_tick: point.tick,
                start_us: current_us,
                us_per_quarter: point.us_per_quarter,
            });
        }
        Self { ppq, segments }
    }

    fn tick_to_secs(&self, tick: Tick) -> f64 {
        let mut seg = self.segments[0];
        for candidate in &self.segments {
            if candidate.start_tick > tick {
                break;
            }
            seg = *candidate;
        }
        let micros = seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq);
        micros as f64 / 1_000_000.0
    }
}

pub fn import_midi_path(path: &Path) -> Result<NoteSequence, MidiImportError> {
    let data = std::fs::read(path).map_err(|e| MidiImportError::Io(e.to_string()))?;
    import_midi_bytes(&data)
}

/// Reference onsets from every Note-On (velocity > 0) in every track.
pub fn import_midi_bytes(data: &[u8]) -> Result<NoteSequence, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };
    if ppq == 0 {
        return Err(MidiImportError::Parse("zero ticks per quarter".to_string()));
    }

    let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
    let mut note_ons: Vec<(Tick, u8)> = Vec::new();

    for track in &smf.tracks {
        let mut tick: Tick = 0;
        for event in track {
            tick += event.delta.as_int() as Tick;
            match &event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => {
                    note_ons.push((tick, key.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    tempo_points.insert(tick, us_per_quarter.as_int());
                }
                _ => {}
            }
        }
    }

    let tempo_map = TempoMap::new(ppq, build_tempo_points(tempo_points, tempo_override));
    let events = note_ons
        .into_iter()
        .filter_map(|(tick, note)| NoteEvent::new(note, tempo_map.tick_to_secs(tick)));
    Ok(NoteSequence::from_events(events))
}

fn build_tempo_points(
    tempo_points: BTreeMap<Tick, u32>,
    override_us_per_quarter: Option<u32>,
) -> Vec<TempoPoint> {
    if let Some(us_per_quarter) = override_us_per_quarter {
        return vec![TempoPoint {
            tick: 0,
            us_per_quarter,
        }];
    }

    let mut map: Vec<TempoPoint> = tempo_points
        .into_iter()
        .map(|(tick, us_per_quarter)| TempoPoint {
            tick,
            us_per_quarter,
        })
        .collect();

    if map.is_empty() || map[0].tick != 0 {
        map.insert(
            0,
            TempoPoint {
                tick: 0,
                us_per_quarter: 500_000,
            },
        );
    }
    map
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}

fn ticks_to_us(ticks: Tick, us_per_quarter: u32, ppq: u16) -> i64 {
    let ticks = ticks as i128;
    let us_per_quarter = us_per_quarter as i128;
    let ppq = ppq as i128;
    ((ticks * us_per_quarter) / ppq) as i64
}
