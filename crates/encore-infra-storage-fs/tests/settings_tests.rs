use encore_infra_storage_fs::FsStorage;
use encore_ports::storage::{OverlapCredit, SettingsDto, StorageError, StoragePort};
use encore_ports::types::{DeviceId, Gain01};
use pretty_assertions::assert_eq;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().join("nested"));

    let settings = storage.load_settings().expect("load");

    assert_eq!(settings.hit_window_ms, 50);
    assert_eq!(settings.sample_rate_hz, 44_100);
    assert_eq!(settings.overlap_credit, OverlapCredit::Halve);
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().join("nested"));
    let settings = SettingsDto {
        selected_audio_in: Some(DeviceId("cpal:Alsa:in:0:mic".to_string())),
        mix_gain: Gain01::new(0.25),
        hit_window_ms: 70,
        latency_compensation_enabled: true,
        latency_compensation_ms: -12,
        overlap_credit: OverlapCredit::Full,
        transcriber_command: Some("basic-pitch {output_dir} {input}".to_string()),
        ..SettingsDto::default()
    };

    storage.save_settings(&settings).expect("save");
    let loaded = storage.load_settings().expect("load");

    assert_eq!(loaded.selected_audio_in, settings.selected_audio_in);
    assert_eq!(loaded.mix_gain, settings.mix_gain);
    assert_eq!(loaded.hit_window_ms, 70);
    assert_eq!(loaded.latency_compensation_ms, -12);
    assert_eq!(loaded.overlap_credit, OverlapCredit::Full);
    assert_eq!(loaded.transcriber_command, settings.transcriber_command);
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().to_path_buf());
    std::fs::write(storage.settings_path(), r#"{ "hit_window_ms": 30 }"#).expect("write");

    let loaded = storage.load_settings().expect("load");

    assert_eq!(loaded.hit_window_ms, 30);
    assert_eq!(loaded.chunk_secs, 6.0);
    assert_eq!(loaded.worker_count, 1);
    assert!(!loaded.count_in_enabled);
    assert_eq!(loaded.count_in_bpm, 120.0);
    assert_eq!(loaded.count_in_beats, 4);
}

#[test]
fn corrupt_file_is_a_serde_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().to_path_buf());
    std::fs::write(storage.settings_path(), "not json").expect("write");

    let err = storage.load_settings().unwrap_err();

    assert!(matches!(err, StorageError::Serde(_)));
}
