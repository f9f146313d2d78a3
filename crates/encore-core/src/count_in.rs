use serde::{Deserialize, Serialize};

pub const CLICK_AMPLITUDE: f32 = 0.8;
const CLICK_SECS: f64 = 0.03;
const CLICK_HZ: f64 = 1_000.0;
pub const MIN_COUNT_IN_BPM: f64 = 20.0;
pub const MAX_COUNT_IN_BPM: f64 = 400.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountInConfig {
    pub enabled: bool,
    pub bpm: f64,
    pub beats: u32,
}

impl Default for CountInConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bpm: 120.0,
            beats: 4,
        }
    }
}

impl CountInConfig {
    /// Frames between clicks, or `None` when the tempo is out of range.
    pub fn beat_frames(&self, sample_rate_hz: u32) -> Option<u64> {
        if !self.bpm.is_finite() || !(MIN_COUNT_IN_BPM..=MAX_COUNT_IN_BPM).contains(&self.bpm) {
            return None;
        }
        let frames = (60.0 / self.bpm * sample_rate_hz as f64).round() as u64;
        Some(frames.max(1))
    }
}

/// Metronome clicks played after a start and before the transport moves.
#[derive(Debug)]
pub struct CountIn {
    click: Vec<f32>,
    enabled: bool,
    beats: u32,
    beat_frames: u64,
    remaining: u64,
}

impl CountIn {
    pub fn new(sample_rate_hz: u32, enabled: bool, beats: u32, beat_frames: u64) -> Self {
        let rate = sample_rate_hz.max(1) as f64;
        let freq = CLICK_HZ.min(rate / 4.0);
        let len = ((CLICK_SECS * rate).round() as usize).max(1);
        let click = (0..len)
            .map(|k| {
                let envelope = 1.0 - k as f64 / len as f64;
                let phase = std::f64::consts::TAU * freq * k as f64 / rate;
                (CLICK_AMPLITUDE as f64 * envelope * phase.cos()) as f32
            })
            .collect();
        Self {
            click,
            enabled,
            beats,
            beat_frames: beat_frames.max(1),
            remaining: 0,
        }
    }

    /// Reconfiguring drops a count-in already running.
    pub fn configure(&mut self, enabled: bool, beats: u32, beat_frames: u64) {
        self.enabled = enabled;
        self.beats = beats;
        self.beat_frames = beat_frames.max(1);
        self.remaining = 0;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Begin counting. Returns `false` when the count-in is switched off.
    pub fn arm(&mut self) -> bool {
        if !self.enabled || self.beats == 0 {
            return false;
        }
        self.remaining = self.total_frames();
        true
    }

    pub fn cancel(&mut self) {
        self.remaining = 0;
    }

    /// Write clicks into the front of `out`. Returns how many frames the
    /// count-in took; the rest belong to the track.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let n = self.remaining.min(out.len() as u64) as usize;
        let elapsed = self.total_frames() - self.remaining;
        for (i, sample) in out[..n].iter_mut().enumerate() {
            let into_beat = ((elapsed + i as u64) % self.beat_frames) as usize;
            *sample = self.click.get(into_beat).copied().unwrap_or(0.0);
        }
        self.remaining -= n as u64;
        n
    }

    fn total_frames(&self) -> u64 {
        self.beats as u64 * self.beat_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_bounds() {
        let config = CountInConfig {
            bpm: 60.0,
            ..CountInConfig::default()
        };
        assert_eq!(config.beat_frames(100), Some(100));

        let slow = CountInConfig {
            bpm: 5.0,
            ..CountInConfig::default()
        };
        assert_eq!(slow.beat_frames(100), None);

        let nan = CountInConfig {
            bpm: f64::NAN,
            ..CountInConfig::default()
        };
        assert_eq!(nan.beat_frames(100), None);
    }

    #[test]
    fn disabled_count_in_never_arms() {
        let mut count_in = CountIn::new(100, false, 4, 50);
        assert!(!count_in.arm());
        assert_eq!(count_in.render(&mut [0.0; 8]), 0);
    }
}
