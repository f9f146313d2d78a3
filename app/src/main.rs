use anyhow::{bail, Context, Result};
use clap::Parser;
use encore_core::{AppCore, Command, Event, SessionState, SongSource};
use encore_infra_audio_cpal::CpalAudioDuplexPort;
use encore_infra_storage_fs::{FsSeparatedLibrary, FsStorage, HoundTrackSource};
use encore_infra_transcribe_cli::CliTranscriber;
use encore_ports::audio::{AudioDuplexPort, AudioError};
use encore_ports::separation::SeparationPort;
use encore_ports::storage::StoragePort;
use encore_ports::types::{AudioConfig, AudioDevice, DeviceId, Gain01};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Play a song's accompaniment and score the performance against its
/// reference notes.
#[derive(Parser, Debug)]
#[command(name = "encore")]
#[command(version)]
struct Args {
    /// Source recording; its separated stems and notes are looked up in the
    /// library directories
    song: Option<PathBuf>,

    /// Primary (instrument) track WAV, instead of a library lookup
    #[arg(long, requires = "reference", conflicts_with = "song")]
    primary: Option<PathBuf>,

    /// Accompaniment track WAV
    #[arg(long, requires = "primary")]
    accompaniment: Option<PathBuf>,

    /// Reference notes, as a note-event CSV or a MIDI file
    #[arg(long, requires = "primary")]
    reference: Option<PathBuf>,

    /// Directory holding separated stems, one folder per song
    #[arg(long)]
    tracks_dir: Option<PathBuf>,

    /// Directory holding reference notes, one folder per song
    #[arg(long)]
    notes_dir: Option<PathBuf>,

    /// Capture device id (see --list-devices)
    #[arg(short, long)]
    input: Option<String>,

    /// Playback device id (see --list-devices)
    #[arg(short, long)]
    output: Option<String>,

    /// Device sample rate; must match the tracks
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Volume of the primary track, 0.0 to 1.0
    #[arg(long)]
    gain: Option<f32>,

    /// Timing tolerance for a full hit
    #[arg(long)]
    hit_window_ms: Option<u32>,

    /// Shift captured notes earlier by this much to compensate round-trip latency
    #[arg(long, allow_negative_numbers = true)]
    latency_ms: Option<i32>,

    /// Start playback here
    #[arg(long)]
    start_at: Option<f64>,

    /// Click a metronome count-in before playback starts
    #[arg(long)]
    count_in: bool,

    /// Count-in tempo
    #[arg(long, requires = "count_in")]
    bpm: Option<f64>,

    /// Loop between two positions, e.g. --loop 12.5 20
    #[arg(long = "loop", num_args = 2, value_names = ["START", "END"])]
    loop_secs: Option<Vec<f64>>,

    /// Transcriber command line; {input} and {output_dir} are substituted
    #[arg(long)]
    transcriber: Option<String>,

    /// Print every core event as a JSON line
    #[arg(long)]
    json: bool,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let audio_port = CpalAudioDuplexPort::new();
    if args.list_devices {
        return list_devices(&audio_port);
    }

    let storage = FsStorage::default();
    let settings = storage.load_settings().unwrap_or_else(|err| {
        warn!(error = %err, "failed to load settings; using defaults");
        Default::default()
    });
    let transcriber = CliTranscriber::new(
        args.transcriber
            .clone()
            .or_else(|| settings.transcriber_command.clone()),
    );
    let library = FsSeparatedLibrary::new(
        args.tracks_dir
            .clone()
            .unwrap_or_else(|| storage.base_dir().join("separated")),
        args.notes_dir
            .clone()
            .unwrap_or_else(|| storage.base_dir().join("notes")),
    );

    let input = pick_device(args.input.as_deref(), settings.selected_audio_in.as_ref(), || {
        audio_port.list_inputs()
    })?;
    let output = pick_device(
        args.output.as_deref(),
        settings.selected_audio_out.as_ref(),
        || audio_port.list_outputs(),
    )?;
    let config = args.sample_rate.map(|sample_rate_hz| AudioConfig {
        sample_rate_hz,
        channels: 1,
        buffer_size_frames: settings.audio_buffer_size_frames,
    });

    let separation: Option<Box<dyn SeparationPort>> = Some(Box::new(library));
    let storage: Option<Box<dyn StoragePort>> = Some(Box::new(storage));
    let mut core = AppCore::new(
        Box::new(audio_port),
        Box::new(HoundTrackSource::new()),
        separation,
        Arc::new(transcriber),
        storage,
    )
    .context("failed to initialize core")?;

    let source = song_source(&args)?;
    core.handle_command(Command::LoadSong { source })
        .context("failed to load song")?;
    core.handle_command(Command::SelectAudioDevices {
        input,
        output,
        config,
    })
    .context("failed to open audio devices")?;

    if let Some(gain) = args.gain {
        core.handle_command(Command::SetGain {
            gain: Gain01::new(gain),
        })?;
    }
    if let Some(ms) = args.hit_window_ms {
        core.handle_command(Command::SetHitWindowMs { ms })?;
    }
    if let Some(ms) = args.latency_ms {
        core.handle_command(Command::SetLatencyCompensationMs { ms: Some(ms) })?;
    }
    if let Some(bounds) = args.loop_secs.as_deref() {
        if let [start_secs, end_secs] = *bounds {
            core.handle_command(Command::SetLoopMarkers {
                start_secs,
                end_secs,
            })?;
        }
    }
    if args.count_in {
        core.handle_command(Command::SetCountIn {
            enabled: true,
            bpm: args.bpm,
        })?;
    }
    if let Some(secs) = args.start_at {
        core.handle_command(Command::Seek { secs })?;
    }
    core.handle_command(Command::Start)?;

    run(&mut core, args.json)
}

fn run(core: &mut AppCore, json: bool) -> Result<()> {
    let mut last_score = None;
    loop {
        core.tick();
        for event in core.drain_events() {
            if json {
                println!("{}", serde_json::to_string(&event)?);
            }
            match event {
                Event::ScoreUpdated { snapshot, metrics } => {
                    if !json {
                        info!(
                            score = snapshot.score,
                            accuracy = format_args!("{:.1}", snapshot.accuracy),
                            swing_ms = snapshot.swing_secs.map(|s| (s * 1000.0).round() as i64),
                            dropped_chunks = metrics.dropped,
                            "score"
                        );
                    }
                    last_score = Some(snapshot);
                }
                Event::SessionStateUpdated {
                    state: SessionState::Ended,
                    ..
                } => {
                    // Give in-flight chunks a moment to land.
                    std::thread::sleep(Duration::from_millis(500));
                    core.tick();
                    for event in core.drain_events() {
                        if let Event::ScoreUpdated { snapshot, .. } = event {
                            last_score = Some(snapshot);
                        }
                    }
                    if let Some(score) = last_score {
                        info!(
                            score = score.score,
                            accuracy = format_args!("{:.1}", score.accuracy),
                            notes_hit = score.notes_hit,
                            total_notes = score.total_notes,
                            "session finished"
                        );
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        std::thread::sleep(TICK_INTERVAL);
    }
}

fn song_source(args: &Args) -> Result<SongSource> {
    if let Some(primary) = args.primary.as_ref() {
        let Some(reference) = args.reference.as_ref() else {
            bail!("--primary needs --reference");
        };
        return Ok(SongSource::Files {
            primary: primary.display().to_string(),
            accompaniment: args.accompaniment.as_ref().map(|p| p.display().to_string()),
            reference: reference.display().to_string(),
        });
    }
    match args.song.as_ref() {
        Some(song) => Ok(SongSource::Separated(song.display().to_string())),
        None => bail!("no song given; pass a source recording or --primary/--reference"),
    }
}

fn pick_device<F>(requested: Option<&str>, saved: Option<&DeviceId>, list: F) -> Result<DeviceId>
where
    F: FnOnce() -> Result<Vec<AudioDevice>, AudioError>,
{
    if let Some(id) = requested {
        return Ok(DeviceId(id.to_string()));
    }
    if let Some(id) = saved {
        return Ok(id.clone());
    }
    let devices = list().context("failed to list audio devices")?;
    let first = devices
        .into_iter()
        .next()
        .context("no audio device available")?;
    info!(device = %first.id, "using first available device");
    Ok(first.id)
}

fn list_devices(port: &CpalAudioDuplexPort) -> Result<()> {
    for (label, devices) in [("input", port.list_inputs()?), ("output", port.list_outputs()?)] {
        for device in devices {
            println!(
                "{label}\t{}\t{} Hz, {} ch\t{}",
                device.id,
                device.default_config.sample_rate_hz,
                device.default_config.channels,
                device.name
            );
        }
    }
    Ok(())
}
