use encore_infra_storage_fs::HoundTrackSource;
use encore_ports::tracks::{TrackError, TrackSourcePort};
use hound::{SampleFormat, WavSpec, WavWriter};
use pretty_assertions::assert_eq;
use std::path::Path;

fn write_wav<S: hound::Sample + Copy>(path: &Path, spec: WavSpec, samples: &[S]) {
    let mut writer = WavWriter::create(path, spec).expect("create wav");
    for &s in samples {
        writer.write_sample(s).expect("write sample");
    }
    writer.finalize().expect("finalize");
}

#[test]
fn float_mono_is_loaded_as_is() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("guitar.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    write_wav(&path, spec, &[0.0f32, 0.5, -0.25]);

    let track = HoundTrackSource::new().load_track(&path).expect("load");

    assert_eq!(track.sample_rate_hz, 22_050);
    assert_eq!(track.samples, vec![0.0, 0.5, -0.25]);
}

#[test]
fn integer_stereo_is_scaled_and_downmixed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("no_guitar.wav");
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    write_wav(&path, spec, &[16_384i16, 0, -32_768, -32_768]);

    let track = HoundTrackSource::new().load_track(&path).expect("load");

    assert_eq!(track.samples, vec![0.25, -1.0]);
    assert!((track.duration_secs() - 2.0 / 44_100.0).abs() < 1e-12);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let err = HoundTrackSource::new()
        .load_track(&dir.path().join("absent.wav"))
        .unwrap_err();

    assert!(matches!(err, TrackError::Io(_)));
}

#[test]
fn non_wav_data_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("song.wav");
    std::fs::write(&path, b"ID3 definitely an mp3").expect("write");

    let err = HoundTrackSource::new().load_track(&path).unwrap_err();

    assert!(matches!(err, TrackError::UnsupportedFormat(_)));
}
