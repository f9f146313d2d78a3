use crate::aggregator::ScoreAggregator;
use crate::analysis_params::AnalysisParams;
use crate::count_in::CountInConfig;
use crate::diagnostics::{export_diagnostics, DiagnosticsReport};
use crate::ipc::{Command, Event, SessionState, SongSource};
use crate::pipeline::{PipelineConfig, ScoringPipeline};
use crate::status::StatusSnapshot;
use crate::stream_engine::{
    EngineConfig, EngineControl, EngineError, PlaybackTracks, StreamEngine,
};
use encore_domain_notes::{
    import_midi_path, import_note_csv_path, MidiImportError, NoteSequence, NotesImportError,
    NotesSource, ReferenceNotes,
};
use encore_ports::audio::{AudioDuplexPort, AudioError, AudioStreamHandle};
use encore_ports::separation::{SeparationError, SeparationPort};
use encore_ports::storage::{SettingsDto, StorageError, StoragePort};
use encore_ports::tracks::{TrackError, TrackSourcePort};
use encore_ports::transcription::TranscriptionPort;
use encore_ports::types::{AudioConfig, DeviceId};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TRANSPORT_EMIT_INTERVAL: Duration = Duration::from_millis(33);

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("track error: {0}")]
    Track(#[from] TrackError),
    #[error("separation error: {0}")]
    Separation(#[from] SeparationError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("reference notes: {0}")]
    NotesImport(#[from] NotesImportError),
    #[error("reference MIDI: {0}")]
    MidiImport(#[from] MidiImportError),
    #[error("not ready: {0}")]
    NotReady(String),
}

struct LoadedSong {
    tracks: PlaybackTracks,
    reference: Arc<NoteSequence>,
}

struct ActiveSession {
    control: EngineControl,
    stream: Option<Box<dyn AudioStreamHandle>>,
    pipeline: ScoringPipeline,
}

impl ActiveSession {
    fn close(mut self) -> u64 {
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        self.pipeline.shutdown();
        self.control.peek_generation()
    }
}

/// Consumer-facing message loop: turns [`Command`]s into engine and
/// aggregator calls, and status changes into [`Event`]s.
pub struct AppCore {
    audio_port: Box<dyn AudioDuplexPort>,
    track_source: Box<dyn TrackSourcePort>,
    separation: Option<Box<dyn SeparationPort>>,
    transcriber: Arc<dyn TranscriptionPort>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    session_state: SessionState,
    params: Arc<AnalysisParams>,
    aggregator: ScoreAggregator,
    song: Option<LoadedSong>,
    devices: Option<(DeviceId, DeviceId, AudioConfig)>,
    session: Option<ActiveSession>,
    next_generation: u64,
    events: VecDeque<Event>,
    last_transport_emit: Instant,
}

impl AppCore {
    pub fn new(
        audio_port: Box<dyn AudioDuplexPort>,
        track_source: Box<dyn TrackSourcePort>,
        separation: Option<Box<dyn SeparationPort>>,
        transcriber: Arc<dyn TranscriptionPort>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Result<Self, AppError> {
        let settings = match storage.as_ref().map(|s| s.load_settings()) {
            Some(Ok(settings)) => settings,
            Some(Err(err)) => {
                warn!(error = %err, "failed to load settings; using defaults");
                SettingsDto::default()
            }
            None => SettingsDto::default(),
        };

        let params = Arc::new(AnalysisParams::new(&settings));
        let aggregator =
            ScoreAggregator::spawn(settings.overlap_credit, settings.swing_history_chunks);

        let devices = match (&settings.selected_audio_in, &settings.selected_audio_out) {
            (Some(input), Some(output)) => Some((
                input.clone(),
                output.clone(),
                default_audio_config(&settings),
            )),
            _ => None,
        };

        Ok(Self {
            audio_port,
            track_source,
            separation,
            transcriber,
            storage,
            settings,
            session_state: SessionState::Idle,
            params,
            aggregator,
            song: None,
            devices,
            session: None,
            next_generation: 0,
            events: VecDeque::new(),
            last_transport_emit: Instant::now(),
        })
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), AppError> {
        match cmd {
            Command::ListAudioDevices => {
                let inputs = self.audio_port.list_inputs()?;
                let outputs = self.audio_port.list_outputs()?;
                self.events
                    .push_back(Event::AudioDevicesUpdated { inputs, outputs });
            }
            Command::SelectAudioDevices {
                input,
                output,
                config,
            } => {
                let config = config.unwrap_or_else(|| default_audio_config(&self.settings));
                self.settings.selected_audio_in = Some(input.clone());
                self.settings.selected_audio_out = Some(output.clone());
                self.settings.sample_rate_hz = config.sample_rate_hz;
                self.settings.audio_buffer_size_frames = config.buffer_size_frames;
                self.devices = Some((input, output, config));
                self.save_settings();
                self.open_session()?;
                self.emit_session_state();
            }
            Command::LoadSong { source } => {
                self.load_song(source)?;
            }
            Command::Start => {
                self.session_mut()?.control.start()?;
                self.session_state = SessionState::Running;
                self.emit_session_state();
                self.emit_transport(true);
            }
            Command::Stop => {
                let generation = self.session_mut()?.control.stop()?;
                self.aggregator.invalidate(generation);
                self.session_state = SessionState::Paused;
                self.emit_session_state();
                self.emit_transport(true);
            }
            Command::Seek { secs } => {
                let generation = self.session_mut()?.control.seek(secs)?;
                self.aggregator.reset(generation);
                if self.session_state == SessionState::Ended {
                    self.session_state = SessionState::Paused;
                    self.emit_session_state();
                }
                self.emit_transport(true);
            }
            Command::SetLoopMarkers {
                start_secs,
                end_secs,
            } => {
                self.session_mut()?
                    .control
                    .set_loop_markers(start_secs, end_secs)?;
                self.emit_transport(true);
            }
            Command::ClearLoop => {
                self.session_mut()?.control.clear_loop()?;
                self.emit_transport(true);
            }
            Command::SetLooping { enabled } => {
                self.session_mut()?.control.set_looping(enabled)?;
                self.emit_transport(true);
            }
            Command::SetGain { gain } => {
                self.settings.mix_gain = gain;
                if let Some(session) = self.session.as_mut() {
                    session.control.set_gain(gain)?;
                }
                self.save_settings();
                self.emit_transport(true);
            }
            Command::SetHitWindowMs { ms } => {
                self.settings.hit_window_ms = ms;
                self.params.set_hit_window_ms(ms);
                self.save_settings();
                self.emit_session_state();
            }
            Command::SetLatencyCompensationMs { ms } => {
                self.settings.latency_compensation_enabled = ms.is_some();
                if let Some(ms) = ms {
                    self.settings.latency_compensation_ms = ms;
                }
                self.params.set_latency_compensation(
                    self.settings.latency_compensation_enabled,
                    self.settings.latency_compensation_ms,
                );
                self.save_settings();
                self.emit_session_state();
            }
            Command::SetCountIn { enabled, bpm } => {
                let config = CountInConfig {
                    enabled,
                    bpm: bpm.unwrap_or(self.settings.count_in_bpm),
                    beats: self.settings.count_in_beats,
                };
                if config.beat_frames(self.settings.sample_rate_hz).is_none() {
                    return Err(EngineError::InvalidTempo { bpm: config.bpm }.into());
                }
                if let Some(session) = self.session.as_mut() {
                    session.control.set_count_in(config)?;
                }
                self.settings.count_in_enabled = config.enabled;
                self.settings.count_in_bpm = config.bpm;
                self.save_settings();
                self.emit_session_state();
            }
            Command::ExportDiagnostics { path } => {
                let inputs = self.audio_port.list_inputs()?;
                let outputs = self.audio_port.list_outputs()?;
                let report = DiagnosticsReport {
                    settings: &self.settings,
                    inputs,
                    outputs,
                    transport: self.status_snapshot(),
                    score: self.aggregator.latest(),
                    pipeline: self.session.as_ref().map(|s| s.pipeline.metrics()),
                };
                export_diagnostics(Path::new(&path), report)?;
            }
        }
        Ok(())
    }

    /// Poll engine status and score updates. Call at UI rate.
    pub fn tick(&mut self) {
        let restart = self
            .session
            .as_ref()
            .and_then(|s| s.control.status().take_restart());
        if let Some(generation) = restart {
            self.aggregator.reset(generation);
        }

        if let Some(status) = self.status_snapshot() {
            if status.ended && self.session_state == SessionState::Running {
                self.session_state = SessionState::Ended;
                self.emit_session_state();
                self.emit_transport(true);
            }
        }
        self.emit_transport(false);

        let metrics = self
            .session
            .as_ref()
            .map(|s| s.pipeline.metrics())
            .unwrap_or_default();
        for snapshot in self.aggregator.drain_updates() {
            self.events
                .push_back(Event::ScoreUpdated { snapshot, metrics });
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    fn session_mut(&mut self) -> Result<&mut ActiveSession, AppError> {
        self.session
            .as_mut()
            .ok_or_else(|| AppError::NotReady("no song loaded on an open device".to_string()))
    }

    fn status_snapshot(&self) -> Option<StatusSnapshot> {
        self.session
            .as_ref()
            .map(|s| s.control.status().snapshot())
    }

    fn load_song(&mut self, source: SongSource) -> Result<(), AppError> {
        let (primary_path, accompaniment_path, reference_path) = match source {
            SongSource::Separated(source) => {
                let separation = self.separation.as_ref().ok_or_else(|| {
                    AppError::NotReady("no separation service configured".to_string())
                })?;
                let song = separation.separated(Path::new(&source))?;
                (
                    song.primary_path,
                    Some(song.accompaniment_path),
                    song.reference_notes_path,
                )
            }
            SongSource::Files {
                primary,
                accompaniment,
                reference,
            } => (
                PathBuf::from(primary),
                accompaniment.map(PathBuf::from),
                PathBuf::from(reference),
            ),
        };

        let primary = self.track_source.load_track(&primary_path)?;
        let accompaniment = accompaniment_path
            .map(|path| self.track_source.load_track(&path))
            .transpose()?;
        let reference = load_reference(&reference_path)?;

        let duration_secs = primary.duration_secs();
        let reference_notes = reference.notes.len();
        let reference_source = reference.source;
        info!(
            primary = %primary_path.display(),
            duration_secs,
            reference_notes,
            ?reference_source,
            "song loaded"
        );

        self.close_session();
        self.song = Some(LoadedSong {
            tracks: PlaybackTracks {
                primary: Arc::new(primary),
                accompaniment: accompaniment.map(Arc::new),
            },
            reference: Arc::new(reference.notes),
        });
        self.events.push_back(Event::SongLoaded {
            duration_secs,
            reference_notes,
            reference_source,
        });

        self.open_session()?;
        self.emit_session_state();
        self.emit_transport(true);
        Ok(())
    }

    fn open_session(&mut self) -> Result<(), AppError> {
        self.close_session();
        let (Some(song), Some((input, output, config))) = (self.song.as_ref(), self.devices.as_ref())
        else {
            return Ok(());
        };

        let engine_config = EngineConfig {
            sample_rate_hz: config.sample_rate_hz,
            chunk_secs: self.settings.chunk_secs,
            overlap_secs: self.settings.overlap_secs,
            min_loop_secs: self.settings.min_loop_secs,
            gain: self.settings.mix_gain,
            initial_generation: self.next_generation,
            count_in: count_in_config(&self.settings),
            ..EngineConfig::default()
        };
        let pipeline_config = PipelineConfig {
            sample_rate_hz: config.sample_rate_hz,
            main_frames: engine_config.main_frames(),
            queue_capacity: self.settings.work_queue_capacity,
            worker_count: self.settings.worker_count,
        };

        let (pipeline, sink) = ScoringPipeline::spawn(
            pipeline_config,
            song.reference.clone(),
            self.transcriber.clone(),
            self.params.clone(),
            self.aggregator.sender(),
        );
        let (engine, control) = StreamEngine::new(song.tracks.clone(), engine_config, sink)?;
        let stream = self
            .audio_port
            .open_duplex(input, output, *config, Box::new(engine))?;

        self.aggregator.reset(self.next_generation);
        info!(
            input = %input,
            output = %output,
            sample_rate_hz = config.sample_rate_hz,
            "session opened"
        );
        self.session = Some(ActiveSession {
            control,
            stream: Some(stream),
            pipeline,
        });
        self.session_state = SessionState::Ready;
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.next_generation = session.close();
            self.session_state = SessionState::Idle;
        }
    }

    fn emit_session_state(&mut self) {
        self.events.push_back(Event::SessionStateUpdated {
            state: self.session_state,
            settings: self.settings.clone(),
        });
    }

    fn emit_transport(&mut self, force: bool) {
        let now = Instant::now();
        if !force && now.duration_since(self.last_transport_emit) < TRANSPORT_EMIT_INTERVAL {
            return;
        }
        let Some(status) = self.status_snapshot() else {
            return;
        };
        self.events.push_back(Event::TransportUpdated {
            position_secs: status.position_secs,
            duration_secs: status.duration_secs,
            playing: status.playing,
            ended: status.ended,
            counting_in: status.counting_in,
            looping: status.looping,
            loop_start_secs: status.loop_start_secs,
            loop_end_secs: status.loop_end_secs,
            gain: status.gain,
        });
        self.last_transport_emit = now;
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            if let Err(err) = storage.save_settings(&self.settings) {
                warn!(error = %err, "failed to save settings");
            }
        }
    }
}

impl Drop for AppCore {
    fn drop(&mut self) {
        self.close_session();
    }
}

fn count_in_config(settings: &SettingsDto) -> CountInConfig {
    CountInConfig {
        enabled: settings.count_in_enabled,
        bpm: settings.count_in_bpm,
        beats: settings.count_in_beats,
    }
}

fn default_audio_config(settings: &SettingsDto) -> AudioConfig {
    AudioConfig {
        sample_rate_hz: settings.sample_rate_hz,
        channels: 1,
        buffer_size_frames: settings.audio_buffer_size_frames,
    }
}

/// Standard MIDI Files by extension, note-event CSV otherwise.
fn load_reference(path: &Path) -> Result<ReferenceNotes, AppError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let reference = match extension.as_deref() {
        Some("mid") | Some("midi") => ReferenceNotes {
            source: NotesSource::Midi,
            notes: import_midi_path(path)?,
        },
        _ => ReferenceNotes {
            source: NotesSource::NoteCsv,
            notes: import_note_csv_path(path)?,
        },
    };
    Ok(reference)
}
