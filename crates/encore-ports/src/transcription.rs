use crate::notes::NoteEvent;

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("transcriber unavailable: {0}")]
    Unavailable(String),
    #[error("transcription failed: {0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Thread model: called from pipeline workers only, never from the audio thread.
/// Implementations may block for as long as they need.
///
/// Onset times in the returned events are relative to the first sample of `samples`.
pub trait TranscriptionPort: Send + Sync {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
    ) -> Result<Vec<NoteEvent>, TranscriptionError>;
}
