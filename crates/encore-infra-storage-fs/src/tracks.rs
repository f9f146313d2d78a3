use encore_ports::tracks::{PcmTrack, TrackError, TrackSourcePort};
use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;

/// Loads WAV files and folds every channel down to one.
#[derive(Clone, Copy, Debug, Default)]
pub struct HoundTrackSource;

impl HoundTrackSource {
    pub fn new() -> Self {
        Self
    }

    pub fn decode<R: Read>(reader: WavReader<R>) -> Result<PcmTrack, TrackError> {
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(TrackError::UnsupportedFormat("zero channels".to_string()));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(TrackError::UnsupportedFormat(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                reader
                    .into_samples::<f32>()
                    .collect::<Result<_, _>>()
                    .map_err(|e| TrackError::Decode(e.to_string()))?
            }
            SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(TrackError::UnsupportedFormat(format!(
                        "{}-bit integer",
                        spec.bits_per_sample
                    )));
                }
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| TrackError::Decode(e.to_string()))?
            }
        };

        Ok(PcmTrack {
            samples: downmix(&interleaved, spec.channels as usize),
            sample_rate_hz: spec.sample_rate,
        })
    }
}

impl TrackSourcePort for HoundTrackSource {
    fn load_track(&self, path: &Path) -> Result<PcmTrack, TrackError> {
        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => TrackError::Io(format!("{}: {}", path.display(), io)),
            other => TrackError::UnsupportedFormat(format!("{}: {}", path.display(), other)),
        })?;
        Self::decode(reader)
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
