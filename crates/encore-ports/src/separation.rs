use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct SeparatedSong {
    pub primary_path: PathBuf,
    pub accompaniment_path: PathBuf,
    pub reference_notes_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum SeparationError {
    #[error("song not separated: {0}")]
    NotSeparated(String),
    #[error("missing output: {0}")]
    MissingOutput(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Locates the pre-rendered outputs of the separation service for a source recording.
pub trait SeparationPort: Send + Sync {
    fn separated(&self, source: &Path) -> Result<SeparatedSong, SeparationError>;
}
