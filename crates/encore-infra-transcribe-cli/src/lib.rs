use encore_domain_notes::import_note_csv_path;
use encore_ports::notes::NoteEvent;
use encore_ports::transcription::{TranscriptionError, TranscriptionPort};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Command line used when none is configured. `{output_dir}` and `{input}` are
/// replaced per chunk.
pub const DEFAULT_COMMAND: &str = "basic-pitch {output_dir} {input} --save-note-events";

/// Peak level below which a chunk counts as silence and is not transcribed.
const SILENCE_PEAK: f32 = 1e-4;

/// Runs an external note transcriber on each chunk: the chunk is written to a
/// scratch WAV, the command is run, and its note-event CSV is read back.
pub struct CliTranscriber {
    command: Vec<String>,
    work_root: PathBuf,
    jobs: AtomicU64,
}

impl CliTranscriber {
    pub fn new(command: Option<String>) -> Self {
        let template = command.unwrap_or_else(|| DEFAULT_COMMAND.to_string());
        Self {
            command: template.split_whitespace().map(str::to_string).collect(),
            work_root: std::env::temp_dir().join("encore-transcribe"),
            jobs: AtomicU64::new(0),
        }
    }

    pub fn with_work_root(mut self, work_root: PathBuf) -> Self {
        self.work_root = work_root;
        self
    }

    fn make_workdir(&self) -> Result<PathBuf, TranscriptionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?
            .as_millis();
        let job = self.jobs.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .work_root
            .join(format!("job-{}-{}-{}", std::process::id(), now, job));
        fs::create_dir_all(&dir).map_err(|e| TranscriptionError::Io(e.to_string()))?;
        Ok(dir)
    }

    fn run(
        &self,
        workdir: &Path,
        samples: &[f32],
        sample_rate_hz: u32,
    ) -> Result<Vec<NoteEvent>, TranscriptionError> {
        let input_path = workdir.join("chunk.wav");
        write_wav(&input_path, samples, sample_rate_hz)?;
        let output_dir = workdir.join("out");
        fs::create_dir_all(&output_dir).map_err(|e| TranscriptionError::Io(e.to_string()))?;

        let (program, args) = self.command.split_first().ok_or_else(|| {
            TranscriptionError::Unavailable("empty transcriber command".to_string())
        })?;
        let expand = |arg: &String| {
            arg.replace("{input}", &input_path.to_string_lossy())
                .replace("{output_dir}", &output_dir.to_string_lossy())
        };

        let output = Command::new(expand(program))
            .args(args.iter().map(expand))
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TranscriptionError::Unavailable(program.clone()),
                _ => TranscriptionError::Backend(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(TranscriptionError::Failed(stderr));
        }

        let csv_path = find_output_csv(&output_dir, "chunk")
            .ok_or_else(|| TranscriptionError::Failed("note events csv not found".to_string()))?;
        let notes = import_note_csv_path(&csv_path)
            .map_err(|e| TranscriptionError::Failed(e.to_string()))?;
        Ok(notes.events())
    }
}

impl Default for CliTranscriber {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TranscriptionPort for CliTranscriber {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
    ) -> Result<Vec<NoteEvent>, TranscriptionError> {
        if is_silent(samples) {
            return Ok(Vec::new());
        }

        let workdir = self.make_workdir()?;
        let result = self.run(&workdir, samples, sample_rate_hz);
        if let Err(err) = fs::remove_dir_all(&workdir) {
            debug!(error = %err, path = %workdir.display(), "failed to clean transcriber workdir");
        }
        result
    }
}

fn is_silent(samples: &[f32]) -> bool {
    samples.iter().all(|s| s.abs() < SILENCE_PEAK)
}

fn write_wav(path: &Path, samples: &[f32], sample_rate_hz: u32) -> Result<(), TranscriptionError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let io_err = |e: hound::Error| TranscriptionError::Io(e.to_string());
    let mut writer = WavWriter::create(path, spec).map_err(io_err)?;
    for &s in samples {
        writer.write_sample(s).map_err(io_err)?;
    }
    writer.finalize().map_err(io_err)
}

fn find_output_csv(output_dir: &Path, stem: &str) -> Option<PathBuf> {
    let named = output_dir.join(format!("{}_basic_pitch.csv", stem));
    if named.exists() {
        return Some(named);
    }
    let entries = fs::read_dir(output_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if ext.eq_ignore_ascii_case("csv") {
                return Some(path);
            }
        }
    }
    None
}
