use crate::count_in::{CountIn, CountInConfig};
use crate::pipeline::{ChunkSink, SubmitOutcome};
use crate::recording_window::RecordingWindow;
use crate::status::EngineStatus;
use crate::transport::{Transport, TransportError, TransportLimits};
use encore_ports::audio::AudioCallback;
use encore_ports::tracks::PcmTrack;
use encore_ports::types::{Gain01, SampleTime};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("primary track is empty")]
    EmptyTrack,
    #[error("track sample rate {track_hz} Hz does not match device rate {device_hz} Hz")]
    SampleRateMismatch { track_hz: u32, device_hz: u32 },
    #[error("invalid recording window: {0}")]
    InvalidWindow(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("count-in tempo of {bpm} bpm is out of range")]
    InvalidTempo { bpm: f64 },
    #[error("engine command queue is full")]
    CommandQueueFull,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate_hz: u32,
    pub chunk_secs: f64,
    pub overlap_secs: f64,
    pub min_loop_secs: f64,
    pub gain: Gain01,
    pub initial_generation: u64,
    pub command_capacity: usize,
    pub count_in: CountInConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44_100,
            chunk_secs: 6.0,
            overlap_secs: 2.0,
            min_loop_secs: 1.0,
            gain: Gain01::new(1.0),
            initial_generation: 0,
            command_capacity: 64,
            count_in: CountInConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn main_frames(&self) -> usize {
        (self.chunk_secs * self.sample_rate_hz as f64).round() as usize
    }

    pub fn overlap_frames(&self) -> usize {
        (self.overlap_secs * self.sample_rate_hz as f64).round() as usize
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate_hz == 0 {
            return Err(EngineError::InvalidWindow("sample rate is zero".to_string()));
        }
        if !self.chunk_secs.is_finite() || self.main_frames() == 0 {
            return Err(EngineError::InvalidWindow(format!(
                "chunk of {}s is empty",
                self.chunk_secs
            )));
        }
        if !self.overlap_secs.is_finite() || self.overlap_frames() == 0 {
            return Err(EngineError::InvalidWindow(format!(
                "overlap of {}s is empty",
                self.overlap_secs
            )));
        }
        if self.overlap_frames() > self.main_frames() {
            return Err(EngineError::InvalidWindow(format!(
                "overlap {}s exceeds chunk {}s",
                self.overlap_secs, self.chunk_secs
            )));
        }
        if self.count_in.enabled {
            self.count_in_beat_frames()?;
        }
        if !self.min_loop_secs.is_finite() || self.min_loop_secs <= 0.0 {
            return Err(EngineError::InvalidWindow(format!(
                "minimum loop of {}s",
                self.min_loop_secs
            )));
        }
        Ok(())
    }

    fn count_in_beat_frames(&self) -> Result<u64, EngineError> {
        self.count_in
            .beat_frames(self.sample_rate_hz)
            .ok_or(EngineError::InvalidTempo {
                bpm: self.count_in.bpm,
            })
    }
}

/// The two pre-rendered tracks played by the engine.
#[derive(Clone, Debug)]
pub struct PlaybackTracks {
    pub primary: Arc<PcmTrack>,
    pub accompaniment: Option<Arc<PcmTrack>>,
}

/// Commands from the control thread, drained at the top of every callback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCommand {
    /// Resume; an ended track restarts from the top.
    Start { restart_generation: u64 },
    Stop { generation: u64 },
    Seek { frame: SampleTime, generation: u64 },
    SetLoop { start: SampleTime, end: SampleTime },
    ClearLoop,
    SetLooping(bool),
    SetGain(Gain01),
    SetCountIn {
        enabled: bool,
        beats: u32,
        beat_frames: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Resumed,
    /// Playback restarts from the top; results before `generation` are stale.
    Restarted { generation: u64 },
}

/// Owns the duplex callback: mixes the tracks into the output, advances the
/// transport and feeds captured input into the recording window.
pub struct StreamEngine {
    primary: Arc<PcmTrack>,
    accompaniment: Option<Arc<PcmTrack>>,
    transport: Transport,
    count_in: CountIn,
    window: RecordingWindow,
    sink: ChunkSink,
    commands: Consumer<EngineCommand>,
    status: Arc<EngineStatus>,
    generation: u64,
}

/// Control-thread handle to a [`StreamEngine`] running inside a device stream.
pub struct EngineControl {
    limits: TransportLimits,
    count_in: CountInConfig,
    commands: Producer<EngineCommand>,
    status: Arc<EngineStatus>,
    next_generation: u64,
    has_loop_markers: bool,
}

impl StreamEngine {
    pub fn new(
        tracks: PlaybackTracks,
        config: EngineConfig,
        sink: ChunkSink,
    ) -> Result<(Self, EngineControl), EngineError> {
        config.validate()?;
        // A disabled count-in keeps whatever tempo was saved; it is checked
        // again when switched on.
        let beat_frames = config.count_in_beat_frames().unwrap_or(1);
        let primary = tracks.primary;
        if primary.samples.is_empty() {
            return Err(EngineError::EmptyTrack);
        }
        for track in std::iter::once(&primary).chain(tracks.accompaniment.iter()) {
            if track.sample_rate_hz != config.sample_rate_hz {
                return Err(EngineError::SampleRateMismatch {
                    track_hz: track.sample_rate_hz,
                    device_hz: config.sample_rate_hz,
                });
            }
        }

        let limits = TransportLimits::new(
            config.sample_rate_hz,
            primary.samples.len() as u64,
            config.min_loop_secs,
        );
        let status = Arc::new(EngineStatus::new(
            config.sample_rate_hz,
            limits.length_frames,
            config.gain.get(),
            config.initial_generation,
        ));
        let (producer, consumer) = RingBuffer::new(config.command_capacity.max(8));

        let engine = Self {
            primary,
            accompaniment: tracks.accompaniment,
            transport: Transport::new(limits, config.gain),
            count_in: CountIn::new(
                config.sample_rate_hz,
                config.count_in.enabled,
                config.count_in.beats,
                beat_frames,
            ),
            window: RecordingWindow::new(config.main_frames(), config.overlap_frames()),
            sink,
            commands: consumer,
            status: status.clone(),
            generation: config.initial_generation,
        };
        engine.publish_status();

        let control = EngineControl {
            limits,
            count_in: config.count_in,
            commands: producer,
            status,
            next_generation: config.initial_generation + 1,
            has_loop_markers: false,
        };
        Ok((engine, control))
    }

    pub fn status(&self) -> Arc<EngineStatus> {
        self.status.clone()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn count_in(&self) -> &CountIn {
        &self.count_in
    }

    pub fn window(&self) -> &RecordingWindow {
        &self.window
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn position_secs(&self) -> f64 {
        self.transport.position_secs()
    }

    /// Resume playback; an ended track restarts from the top. Leaving a
    /// pause or the end arms the count-in when it is enabled.
    pub fn start(&mut self, restart_generation: u64) -> StartOutcome {
        self.generation = self.generation.max(restart_generation);
        let was_playing = self.transport.is_playing();
        let restarted = self.transport.play();
        if !was_playing {
            self.count_in.arm();
        }
        if restarted {
            self.window.reset();
            self.status.record_restart(restart_generation);
            return StartOutcome::Restarted {
                generation: restart_generation,
            };
        }
        StartOutcome::Resumed
    }

    /// Pause and zero the recording buffers. Idempotent.
    pub fn stop(&mut self, generation: u64) {
        self.transport.pause();
        self.count_in.cancel();
        self.window.reset();
        self.generation = self.generation.max(generation);
    }

    pub fn seek(&mut self, secs: f64, generation: u64) -> Result<(), EngineError> {
        let frame = self.transport.limits().seek_frame(secs)?;
        self.seek_frame(frame, generation);
        Ok(())
    }

    pub fn set_loop_markers(&mut self, start_secs: f64, end_secs: f64) -> Result<(), EngineError> {
        let (start, end) = self.transport.limits().loop_frames(start_secs, end_secs)?;
        self.transport.set_loop_region(start, end);
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        self.transport.clear_loop();
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), EngineError> {
        self.transport.set_looping(looping)?;
        Ok(())
    }

    pub fn set_gain(&mut self, gain: Gain01) {
        self.transport.set_gain(gain);
    }

    pub fn set_count_in(&mut self, config: CountInConfig) -> Result<(), EngineError> {
        let beat_frames = config
            .beat_frames(self.transport.limits().sample_rate_hz)
            .ok_or(EngineError::InvalidTempo { bpm: config.bpm })?;
        self.count_in
            .configure(config.enabled, config.beats, beat_frames);
        Ok(())
    }

    fn publish_status(&self) {
        self.status
            .publish(&self.transport, self.count_in.is_active(), self.generation);
    }

    fn seek_frame(&mut self, frame: SampleTime, generation: u64) {
        self.transport.seek(frame);
        self.window.reset();
        self.generation = self.generation.max(generation);
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                EngineCommand::Start { restart_generation } => {
                    self.start(restart_generation);
                }
                EngineCommand::Stop { generation } => self.stop(generation),
                EngineCommand::Seek { frame, generation } => self.seek_frame(frame, generation),
                EngineCommand::SetLoop { start, end } => self.transport.set_loop_region(start, end),
                EngineCommand::ClearLoop => self.transport.clear_loop(),
                EngineCommand::SetLooping(looping) => {
                    // Validated on the control side; a stale request after a
                    // clear is ignored.
                    let _ = self.transport.set_looping(looping);
                }
                EngineCommand::SetGain(gain) => self.transport.set_gain(gain),
                EngineCommand::SetCountIn {
                    enabled,
                    beats,
                    beat_frames,
                } => self.count_in.configure(enabled, beats, beat_frames),
            }
        }
    }

    /// Mix each transport segment into `output` and capture the input frames
    /// that line up with it. A loop wrap or the end of the track flushes the
    /// audio still waiting in the window, so the tail of every pass is scored.
    fn render_and_capture(&mut self, input: &[f32], output: &mut [f32]) {
        let gain = self.transport.gain().get();
        let mut written = 0;
        while written < output.len() {
            let Some(segment) = self.transport.advance(output.len() - written) else {
                break;
            };
            let end = written + segment.len;
            mix_segment(
                &mut output[written..end],
                &self.primary.samples,
                self.accompaniment.as_deref().map(|t| t.samples.as_slice()),
                segment.start as usize,
                gain,
            );

            let captured = end.min(input.len()).saturating_sub(written);
            if captured > 0 {
                self.capture(&input[written..written + captured], segment.start);
            }
            written = end;

            if (segment.wrapped || self.transport.is_ended()) && self.window.flush() {
                self.submit_chunk(segment.start + captured as u64);
            }
            if segment.wrapped {
                self.window.reset();
            }
        }
    }

    /// `start_frame` is the playback frame aligned with `input[0]`.
    fn capture(&mut self, input: &[f32], start_frame: SampleTime) {
        let mut offset = 0;
        while offset < input.len() {
            let advance = self.window.append(&input[offset..]);
            offset += advance.consumed;
            if advance.chunk_ready {
                self.submit_chunk(start_frame + offset as u64);
            }
        }
    }

    fn submit_chunk(&self, end_frame: SampleTime) {
        let rate = self.transport.limits().sample_rate_hz as f64;
        let chunk = self.window.chunk();
        let span_secs = chunk.valid_frames as f64 / rate;
        let outcome = self
            .sink
            .submit(chunk.samples, end_frame, span_secs, self.generation);
        self.status
            .record_chunk(outcome != SubmitOutcome::Queued);
    }
}

fn mix_segment(
    out: &mut [f32],
    primary: &[f32],
    accompaniment: Option<&[f32]>,
    start: usize,
    gain: f32,
) {
    for (i, sample) in out.iter_mut().enumerate() {
        let idx = start + i;
        let backing = accompaniment
            .and_then(|acc| acc.get(idx))
            .copied()
            .unwrap_or(0.0);
        *sample = primary[idx] * gain + backing;
    }
}

impl AudioCallback for StreamEngine {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.drain_commands();
        output.fill(0.0);

        let counted = if self.transport.is_playing() {
            self.count_in.render(output)
        } else {
            0
        };
        let input = input.get(counted..).unwrap_or(&[]);
        self.render_and_capture(input, &mut output[counted..]);

        self.publish_status();
    }
}

impl EngineControl {
    pub fn status(&self) -> Arc<EngineStatus> {
        self.status.clone()
    }

    pub fn limits(&self) -> TransportLimits {
        self.limits
    }

    pub fn position_secs(&self) -> f64 {
        self.status.position_secs()
    }

    pub fn duration_secs(&self) -> f64 {
        self.limits.duration_secs()
    }

    /// Generation the next invalidating command will carry.
    pub fn peek_generation(&self) -> u64 {
        self.next_generation
    }

    /// Resume playback. Whether the track restarts is only known once the
    /// callback runs; it is reported through [`EngineStatus::take_restart`].
    pub fn start(&mut self) -> Result<(), EngineError> {
        let generation = self.next_generation;
        self.push(EngineCommand::Start {
            restart_generation: generation,
        })?;
        self.next_generation += 1;
        Ok(())
    }

    /// Pause playback; results still in flight become stale. Returns the new
    /// generation.
    pub fn stop(&mut self) -> Result<u64, EngineError> {
        let generation = self.next_generation;
        self.push(EngineCommand::Stop { generation })?;
        self.next_generation += 1;
        Ok(generation)
    }

    /// Validate and queue a seek. Returns the generation results must carry
    /// to count after it.
    pub fn seek(&mut self, secs: f64) -> Result<u64, EngineError> {
        let frame = self.limits.seek_frame(secs)?;
        let generation = self.next_generation;
        self.push(EngineCommand::Seek { frame, generation })?;
        self.next_generation += 1;
        Ok(generation)
    }

    pub fn set_loop_markers(&mut self, start_secs: f64, end_secs: f64) -> Result<(), EngineError> {
        let (start, end) = self.limits.loop_frames(start_secs, end_secs)?;
        self.push(EngineCommand::SetLoop { start, end })?;
        self.has_loop_markers = true;
        Ok(())
    }

    pub fn clear_loop(&mut self) -> Result<(), EngineError> {
        self.push(EngineCommand::ClearLoop)?;
        self.has_loop_markers = false;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), EngineError> {
        if looping && !self.has_loop_markers {
            return Err(TransportError::NoLoopMarkers.into());
        }
        self.push(EngineCommand::SetLooping(looping))
    }

    pub fn set_gain(&mut self, gain: Gain01) -> Result<(), EngineError> {
        self.push(EngineCommand::SetGain(gain))
    }

    pub fn count_in(&self) -> CountInConfig {
        self.count_in
    }

    pub fn set_count_in(&mut self, config: CountInConfig) -> Result<(), EngineError> {
        let beat_frames = config
            .beat_frames(self.limits.sample_rate_hz)
            .ok_or(EngineError::InvalidTempo { bpm: config.bpm })?;
        self.push(EngineCommand::SetCountIn {
            enabled: config.enabled,
            beats: config.beats,
            beat_frames,
        })?;
        self.count_in = config;
        Ok(())
    }

    fn push(&mut self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .push(cmd)
            .map_err(|_| EngineError::CommandQueueFull)
    }
}
