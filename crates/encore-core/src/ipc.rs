use crate::aggregator::ScoreSnapshot;
use crate::pipeline::PipelineMetricsSnapshot;
use encore_domain_notes::NotesSource;
use encore_ports::storage::SettingsDto;
use encore_ports::types::{AudioConfig, AudioDevice, DeviceId, Gain01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SongSource {
    /// A source recording whose separated outputs are looked up through the
    /// separation service.
    Separated(String),
    Files {
        primary: String,
        accompaniment: Option<String>,
        /// Note-event CSV or Standard MIDI File.
        reference: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListAudioDevices,
    SelectAudioDevices {
        input: DeviceId,
        output: DeviceId,
        config: Option<AudioConfig>,
    },
    LoadSong { source: SongSource },
    Start,
    Stop,
    Seek { secs: f64 },
    SetLoopMarkers { start_secs: f64, end_secs: f64 },
    ClearLoop,
    SetLooping { enabled: bool },
    SetGain { gain: Gain01 },
    SetHitWindowMs { ms: u32 },
    /// `None` disables latency compensation.
    SetLatencyCompensationMs { ms: Option<i32> },
    /// `bpm` keeps the saved tempo when `None`.
    SetCountIn { enabled: bool, bpm: Option<f64> },
    ExportDiagnostics { path: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Ready,
    Running,
    Paused,
    Ended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    AudioDevicesUpdated {
        inputs: Vec<AudioDevice>,
        outputs: Vec<AudioDevice>,
    },
    SessionStateUpdated {
        state: SessionState,
        settings: SettingsDto,
    },
    SongLoaded {
        duration_secs: f64,
        reference_notes: usize,
        reference_source: NotesSource,
    },
    TransportUpdated {
        position_secs: f64,
        duration_secs: f64,
        playing: bool,
        ended: bool,
        counting_in: bool,
        looping: bool,
        loop_start_secs: Option<f64>,
        loop_end_secs: Option<f64>,
        gain: f32,
    },
    ScoreUpdated {
        snapshot: ScoreSnapshot,
        metrics: PipelineMetricsSnapshot,
    },
}
