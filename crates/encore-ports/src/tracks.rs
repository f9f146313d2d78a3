use std::path::Path;

/// A decoded, mono, pre-rendered track.
#[derive(Clone, Debug)]
pub struct PcmTrack {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl PcmTrack {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("decode error: {0}")]
    Decode(String),
}

pub trait TrackSourcePort: Send + Sync {
    fn load_track(&self, path: &Path) -> Result<PcmTrack, TrackError>;
}
