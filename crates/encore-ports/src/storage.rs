use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_sample_rate_hz() -> u32 {
    44_100
}

fn default_mix_gain() -> Gain01 {
    Gain01::new(1.0)
}

fn default_hit_window_ms() -> u32 {
    50
}

fn default_max_partial_penalty() -> f64 {
    0.5
}

fn default_chunk_secs() -> f64 {
    6.0
}

fn default_overlap_secs() -> f64 {
    2.0
}

fn default_min_loop_secs() -> f64 {
    1.0
}

fn default_count_in_bpm() -> f64 {
    120.0
}

fn default_count_in_beats() -> u32 {
    4
}

fn default_swing_history_chunks() -> usize {
    5
}

fn default_work_queue_capacity() -> usize {
    4
}

fn default_worker_count() -> usize {
    1
}

/// How a chunk's result is weighted before it is added to the running totals.
///
/// Consecutive chunks overlap, so one performed note can be scored by more
/// than one chunk. `Halve` keeps the historical behaviour of crediting every
/// chunk at half weight; `Full` credits each chunk fully.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverlapCredit {
    #[default]
    Halve,
    Full,
}

impl OverlapCredit {
    pub fn weight(self) -> f64 {
        match self {
            OverlapCredit::Halve => 0.5,
            OverlapCredit::Full => 1.0,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_audio_in: Option<DeviceId>,
    pub selected_audio_out: Option<DeviceId>,
    pub audio_buffer_size_frames: Option<u32>,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_mix_gain")]
    pub mix_gain: Gain01,
    #[serde(default = "default_hit_window_ms")]
    pub hit_window_ms: u32,
    #[serde(default = "default_max_partial_penalty")]
    pub max_partial_penalty: f64,
    #[serde(default = "default_chunk_secs")]
    pub chunk_secs: f64,
    #[serde(default = "default_overlap_secs")]
    pub overlap_secs: f64,
    #[serde(default = "default_min_loop_secs")]
    pub min_loop_secs: f64,
    pub latency_compensation_enabled: bool,
    pub latency_compensation_ms: i32,
    pub overlap_credit: OverlapCredit,
    #[serde(default = "default_swing_history_chunks")]
    pub swing_history_chunks: usize,
    #[serde(default = "default_work_queue_capacity")]
    pub work_queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    pub transcriber_command: Option<String>,
    /// Metronome clicks before playback leaves a pause or the end.
    pub count_in_enabled: bool,
    #[serde(default = "default_count_in_bpm")]
    pub count_in_bpm: f64,
    #[serde(default = "default_count_in_beats")]
    pub count_in_beats: u32,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_audio_in: None,
            selected_audio_out: None,
            audio_buffer_size_frames: None,
            sample_rate_hz: default_sample_rate_hz(),
            mix_gain: default_mix_gain(),
            hit_window_ms: default_hit_window_ms(),
            max_partial_penalty: default_max_partial_penalty(),
            chunk_secs: default_chunk_secs(),
            overlap_secs: default_overlap_secs(),
            min_loop_secs: default_min_loop_secs(),
            latency_compensation_enabled: false,
            latency_compensation_ms: 0,
            overlap_credit: OverlapCredit::default(),
            swing_history_chunks: default_swing_history_chunks(),
            work_queue_capacity: default_work_queue_capacity(),
            worker_count: default_worker_count(),
            transcriber_command: None,
            count_in_enabled: false,
            count_in_bpm: default_count_in_bpm(),
            count_in_beats: default_count_in_beats(),
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
