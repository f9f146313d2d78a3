use crate::transport::{Transport, TransportState};
use encore_ports::types::SampleTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

const NO_MARKER: u64 = u64::MAX;

/// Playback state published by the audio thread after every callback.
#[derive(Debug)]
pub struct EngineStatus {
    sample_rate_hz: u32,
    length_frames: SampleTime,
    position: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
    counting_in: AtomicBool,
    looping: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    gain: AtomicU32,
    generation: AtomicU64,
    /// Generation of a restart the control side has not picked up yet.
    restart_generation: AtomicU64,
    chunks_emitted: AtomicU64,
    chunks_dropped: AtomicU64,
}

/// Plain copy of [`EngineStatus`] for the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub position_secs: f64,
    pub duration_secs: f64,
    pub playing: bool,
    pub ended: bool,
    pub counting_in: bool,
    pub looping: bool,
    pub loop_start_secs: Option<f64>,
    pub loop_end_secs: Option<f64>,
    pub gain: f32,
    pub generation: u64,
    pub chunks_emitted: u64,
    pub chunks_dropped: u64,
}

impl EngineStatus {
    pub fn new(sample_rate_hz: u32, length_frames: SampleTime, gain: f32, generation: u64) -> Self {
        Self {
            sample_rate_hz,
            length_frames,
            position: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            counting_in: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            loop_start: AtomicU64::new(NO_MARKER),
            loop_end: AtomicU64::new(NO_MARKER),
            gain: AtomicU32::new(gain.to_bits()),
            generation: AtomicU64::new(generation),
            restart_generation: AtomicU64::new(NO_MARKER),
            chunks_emitted: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn publish(&self, transport: &Transport, counting_in: bool, generation: u64) {
        self.position.store(transport.position(), Ordering::Relaxed);
        self.playing
            .store(transport.state() == TransportState::Playing, Ordering::Relaxed);
        self.ended.store(transport.is_ended(), Ordering::Relaxed);
        self.counting_in.store(counting_in, Ordering::Relaxed);
        self.looping.store(transport.looping(), Ordering::Relaxed);
        let (start, end) = transport.loop_region().unwrap_or((NO_MARKER, NO_MARKER));
        self.loop_start.store(start, Ordering::Relaxed);
        self.loop_end.store(end, Ordering::Relaxed);
        self.gain
            .store(transport.gain().get().to_bits(), Ordering::Relaxed);
        self.generation.store(generation, Ordering::Release);
    }

    pub(crate) fn record_restart(&self, generation: u64) {
        self.restart_generation.store(generation, Ordering::Release);
    }

    /// Generation of the latest restart from the top, reported once.
    pub fn take_restart(&self) -> Option<u64> {
        let generation = self.restart_generation.swap(NO_MARKER, Ordering::AcqRel);
        (generation != NO_MARKER).then_some(generation)
    }

    pub(crate) fn record_chunk(&self, dropped: bool) {
        self.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn position_frames(&self) -> SampleTime {
        self.position.load(Ordering::Relaxed)
    }

    pub fn position_secs(&self) -> f64 {
        self.position_frames() as f64 / self.sample_rate_hz as f64
    }

    pub fn duration_secs(&self) -> f64 {
        self.length_frames as f64 / self.sample_rate_hz as f64
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    pub fn counting_in(&self) -> bool {
        self.counting_in.load(Ordering::Relaxed)
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let to_secs = |frames: u64| {
            (frames != NO_MARKER).then(|| frames as f64 / self.sample_rate_hz as f64)
        };
        StatusSnapshot {
            position_secs: self.position_secs(),
            duration_secs: self.duration_secs(),
            playing: self.playing(),
            ended: self.ended(),
            counting_in: self.counting_in(),
            looping: self.looping(),
            loop_start_secs: to_secs(self.loop_start.load(Ordering::Relaxed)),
            loop_end_secs: to_secs(self.loop_end.load(Ordering::Relaxed)),
            gain: self.gain(),
            generation: self.generation(),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
        }
    }
}
