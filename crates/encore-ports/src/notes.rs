use serde::{Deserialize, Serialize};

pub const PITCH_COUNT: usize = 128;

/// A single detected or reference note onset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub onset_secs: f64,
}

impl NoteEvent {
    /// Returns `None` for pitches outside the MIDI range or non-finite onsets.
    pub fn new(pitch: u8, onset_secs: f64) -> Option<Self> {
        if pitch as usize >= PITCH_COUNT || !onset_secs.is_finite() {
            return None;
        }
        Some(Self { pitch, onset_secs })
    }
}
