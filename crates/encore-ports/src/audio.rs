use crate::types::*;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Duplex audio callback: must be realtime-safe.
///
/// `input` and `output` always have the same length (mono frames). The
/// implementation must not allocate, lock, perform I/O, or block.
pub trait AudioCallback: Send + 'static {
    fn process(&mut self, input: &[f32], output: &mut [f32]);
}

pub trait AudioStreamHandle: Send {
    fn close(self: Box<Self>);
}

pub trait AudioDuplexPort: Send + Sync {
    fn list_inputs(&self) -> Result<Vec<AudioDevice>, AudioError>;
    fn list_outputs(&self) -> Result<Vec<AudioDevice>, AudioError>;

    /// Open a capture + playback pair driven by a single callback.
    /// An unsupported sample rate or channel count fails here and is not retried.
    fn open_duplex(
        &self,
        input: &DeviceId,
        output: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError>;
}
