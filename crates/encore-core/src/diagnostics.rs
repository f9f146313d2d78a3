use crate::aggregator::ScoreSnapshot;
use crate::pipeline::PipelineMetricsSnapshot;
use crate::status::StatusSnapshot;
use encore_ports::storage::{SettingsDto, StorageError};
use encore_ports::types::AudioDevice;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct AppVersion {
    name: String,
    version: String,
}

#[derive(Serialize)]
struct PlatformInfo {
    os: String,
    arch: String,
}

#[derive(Serialize)]
struct DeviceSnapshot {
    inputs: Vec<AudioDevice>,
    outputs: Vec<AudioDevice>,
}

#[derive(Serialize)]
struct SessionSnapshot {
    transport: Option<StatusSnapshot>,
    score: ScoreSnapshot,
    pipeline: Option<PipelineMetricsSnapshot>,
}

pub struct DiagnosticsReport<'a> {
    pub settings: &'a SettingsDto,
    pub inputs: Vec<AudioDevice>,
    pub outputs: Vec<AudioDevice>,
    pub transport: Option<StatusSnapshot>,
    pub score: ScoreSnapshot,
    pub pipeline: Option<PipelineMetricsSnapshot>,
}

/// Write a directory of JSON files describing the current session.
pub fn export_diagnostics(dir: &Path, report: DiagnosticsReport<'_>) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;

    let app_version = AppVersion {
        name: "Encore".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let platform = PlatformInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    };

    write_json(&dir.join("app_version.json"), &app_version)?;
    write_json(&dir.join("platform.json"), &platform)?;
    write_json(&dir.join("settings.json"), report.settings)?;
    write_json(
        &dir.join("device_snapshot.json"),
        &DeviceSnapshot {
            inputs: report.inputs,
            outputs: report.outputs,
        },
    )?;
    write_json(
        &dir.join("session.json"),
        &SessionSnapshot {
            transport: report.transport,
            score: report.score,
            pipeline: report.pipeline,
        },
    )?;

    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
}
