use encore_ports::notes::{NoteEvent, PITCH_COUNT};
use serde::{Deserialize, Serialize};

/// File format a reference transcription was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotesSource {
    NoteCsv,
    Midi,
}

/// Onset times grouped by MIDI pitch, ascending within each pitch.
///
/// Built once and never mutated in place; `slice` and `shifted` return new sequences.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteSequence {
    onsets: [Vec<f64>; PITCH_COUNT],
}

impl NoteSequence {
    pub fn new() -> Self {
        Self {
            onsets: std::array::from_fn(|_| Vec::new()),
        }
    }

    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = NoteEvent>,
    {
        let mut onsets: [Vec<f64>; PITCH_COUNT] = std::array::from_fn(|_| Vec::new());
        for event in events {
            let idx = event.pitch as usize;
            if idx < PITCH_COUNT && event.onset_secs.is_finite() {
                onsets[idx].push(event.onset_secs);
            }
        }
        for bucket in onsets.iter_mut() {
            bucket.sort_by(f64::total_cmp);
        }
        Self { onsets }
    }

    pub fn onsets(&self, pitch: u8) -> &[f64] {
        self.onsets
            .get(pitch as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of onsets across all pitches.
    pub fn len(&self) -> usize {
        self.onsets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.iter().all(Vec::is_empty)
    }

    /// Pitches that have at least one onset, ascending.
    pub fn pitches(&self) -> impl Iterator<Item = u8> + '_ {
        self.onsets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(pitch, _)| pitch as u8)
    }

    pub fn events(&self) -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = self
            .onsets
            .iter()
            .enumerate()
            .flat_map(|(pitch, bucket)| {
                bucket.iter().map(move |&onset_secs| NoteEvent {
                    pitch: pitch as u8,
                    onset_secs,
                })
            })
            .collect();
        events.sort_by(|a, b| {
            a.onset_secs
                .total_cmp(&b.onset_secs)
                .then(a.pitch.cmp(&b.pitch))
        });
        events
    }

    /// Onsets within `[start_secs, end_secs)`.
    pub fn slice(&self, start_secs: f64, end_secs: f64) -> Self {
        let onsets = std::array::from_fn(|pitch| {
            let bucket = &self.onsets[pitch];
            let lo = bucket.partition_point(|&t| t < start_secs);
            let hi = bucket.partition_point(|&t| t < end_secs);
            if lo >= hi {
                Vec::new()
            } else {
                bucket[lo..hi].to_vec()
            }
        });
        Self { onsets }
    }

    pub fn shifted(&self, offset_secs: f64) -> Self {
        let onsets = std::array::from_fn(|pitch| {
            self.onsets[pitch]
                .iter()
                .map(|&t| t + offset_secs)
                .collect()
        });
        Self { onsets }
    }

    /// Onset of the last note, if any.
    pub fn last_onset(&self) -> Option<f64> {
        self.onsets
            .iter()
            .filter_map(|bucket| bucket.last().copied())
            .max_by(f64::total_cmp)
    }
}

impl Default for NoteSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<NoteEvent> for NoteSequence {
    fn from_iter<T: IntoIterator<Item = NoteEvent>>(iter: T) -> Self {
        Self::from_events(iter)
    }
}

/// A reference transcription plus where it came from.
#[derive(Clone, Debug)]
pub struct ReferenceNotes {
    pub source: NotesSource,
    pub notes: NoteSequence,
}
