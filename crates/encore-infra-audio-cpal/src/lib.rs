use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use encore_ports::audio::{AudioCallback, AudioDuplexPort, AudioError, AudioStreamHandle};
use encore_ports::types::{AudioConfig, AudioDevice, DeviceDirection, DeviceId};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, warn};

const DEFAULT_SCRATCH_FRAMES: usize = 8192;
/// Captured audio the output side may hold back, in output periods.
const BACKLOG_PERIODS: usize = 2;

/// Duplex adapter over two cpal streams. Captured audio is downmixed to mono
/// and handed to the output callback through a lock-free ring.
pub struct CpalAudioDuplexPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: SampleFormat,
}

#[derive(Debug, Default)]
struct XrunCounters {
    input_overflow_frames: AtomicU64,
    output_underrun_frames: AtomicU64,
    backlog_trimmed_frames: AtomicU64,
}

impl CpalAudioDuplexPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
        direction: DeviceDirection,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let (devices, tag): (Vec<cpal::Device>, &str) = match direction {
            DeviceDirection::Input => (
                host.input_devices()
                    .map_err(|e| AudioError::Backend(e.to_string()))?
                    .collect(),
                "in",
            ),
            DeviceDirection::Output => (
                host.output_devices()
                    .map_err(|e| AudioError::Backend(e.to_string()))?
                    .collect(),
                "out",
            ),
        };

        let mut list = Vec::new();
        for (index, device) in devices.into_iter().enumerate() {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let id = DeviceId(format!("cpal:{}:{}:{}:{}", host_id, tag, index, name));
            list.push((id, device));
        }

        Ok(list)
    }

    fn describe(&self, direction: DeviceDirection) -> Result<Vec<AudioDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host, direction)?;
        let mut results = Vec::new();

        for (id, device) in devices {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let default_config = match direction {
                DeviceDirection::Input => device.default_input_config(),
                DeviceDirection::Output => device.default_output_config(),
            };
            let Ok(default_config) = default_config else {
                continue;
            };

            results.push(AudioDevice {
                id,
                name,
                direction,
                default_config: AudioConfig {
                    sample_rate_hz: default_config.sample_rate().0,
                    channels: default_config.channels(),
                    buffer_size_frames: None,
                },
            });
        }

        Ok(results)
    }

    fn find_device(
        host: &cpal::Host,
        direction: DeviceDirection,
        device_id: &DeviceId,
    ) -> Result<cpal::Device, AudioError> {
        Self::list_devices_from_host(host, direction)?
            .into_iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, device)| device)
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
    }

    fn select_stream_config(
        device: &cpal::Device,
        direction: DeviceDirection,
        desired: AudioConfig,
    ) -> Result<SelectedStreamConfig, AudioError> {
        let chosen = match direction {
            DeviceDirection::Input => {
                let mut supported = device
                    .supported_input_configs()
                    .map_err(|e| AudioError::Backend(e.to_string()))?;
                select_supported_config(&mut supported, desired)?
            }
            DeviceDirection::Output => {
                let mut supported = device
                    .supported_output_configs()
                    .map_err(|e| AudioError::Backend(e.to_string()))?;
                select_supported_config(&mut supported, desired)?
            }
        };

        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        Ok(SelectedStreamConfig {
            config,
            sample_format,
        })
    }
}

impl Default for CpalAudioDuplexPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioStreamHandle {
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioDuplexPort for CpalAudioDuplexPort {
    fn list_inputs(&self) -> Result<Vec<AudioDevice>, AudioError> {
        self.describe(DeviceDirection::Input)
    }

    fn list_outputs(&self) -> Result<Vec<AudioDevice>, AudioError> {
        self.describe(DeviceDirection::Output)
    }

    fn open_duplex(
        &self,
        input: &DeviceId,
        output: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let host_id = self.host.id();
        let input_id = input.clone();
        let output_id = output.clone();
        let desired = config;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join_handle = thread::Builder::new()
            .name("encore-audio-stream".to_string())
            .spawn(move || {
                let streams = cpal::host_from_id(host_id)
                    .map_err(|e| AudioError::Backend(e.to_string()))
                    .and_then(|host| build_duplex(&host, &input_id, &output_id, desired, cb));
                let (input_stream, output_stream, counters) = match streams {
                    Ok(streams) => streams,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(output_stream);
                drop(input_stream);
                info!(
                    input_overflow_frames = counters.input_overflow_frames.load(Ordering::Relaxed),
                    output_underrun_frames = counters.output_underrun_frames.load(Ordering::Relaxed),
                    backlog_trimmed_frames = counters.backlog_trimmed_frames.load(Ordering::Relaxed),
                    "duplex stream closed"
                );
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        match ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))?
        {
            Ok(()) => Ok(Box::new(CpalAudioStreamHandle {
                stop_tx,
                join_handle: Some(join_handle),
            })),
            Err(err) => {
                let _ = join_handle.join();
                Err(err)
            }
        }
    }
}

fn build_duplex(
    host: &cpal::Host,
    input_id: &DeviceId,
    output_id: &DeviceId,
    desired: AudioConfig,
    cb: Box<dyn AudioCallback>,
) -> Result<(cpal::Stream, cpal::Stream, Arc<XrunCounters>), AudioError> {
    let input_device = CpalAudioDuplexPort::find_device(host, DeviceDirection::Input, input_id)?;
    let output_device =
        CpalAudioDuplexPort::find_device(host, DeviceDirection::Output, output_id)?;

    let input_config =
        CpalAudioDuplexPort::select_stream_config(&input_device, DeviceDirection::Input, desired)?;
    let output_config = CpalAudioDuplexPort::select_stream_config(
        &output_device,
        DeviceDirection::Output,
        desired,
    )?;

    // One second of mono capture between the two device clocks.
    let (producer, consumer) = RingBuffer::<f32>::new(desired.sample_rate_hz.max(1) as usize);
    let counters = Arc::new(XrunCounters::default());
    let scratch_frames = match desired.buffer_size_frames {
        Some(frames) => frames as usize,
        None => DEFAULT_SCRATCH_FRAMES,
    };

    let input_stream = match input_config.sample_format {
        SampleFormat::F32 => build_input::<f32>(
            &input_device,
            &input_config.config,
            producer,
            counters.clone(),
        ),
        SampleFormat::I16 => build_input::<i16>(
            &input_device,
            &input_config.config,
            producer,
            counters.clone(),
        ),
        SampleFormat::U16 => build_input::<u16>(
            &input_device,
            &input_config.config,
            producer,
            counters.clone(),
        ),
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "input sample format {other:?}"
            )))
        }
    }?;

    let output_stream = match output_config.sample_format {
        SampleFormat::F32 => build_output::<f32>(
            &output_device,
            &output_config.config,
            consumer,
            cb,
            scratch_frames,
            counters.clone(),
        ),
        SampleFormat::I16 => build_output::<i16>(
            &output_device,
            &output_config.config,
            consumer,
            cb,
            scratch_frames,
            counters.clone(),
        ),
        SampleFormat::U16 => build_output::<u16>(
            &output_device,
            &output_config.config,
            consumer,
            cb,
            scratch_frames,
            counters.clone(),
        ),
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "output sample format {other:?}"
            )))
        }
    }?;

    input_stream
        .play()
        .map_err(|e| AudioError::Backend(e.to_string()))?;
    output_stream
        .play()
        .map_err(|e| AudioError::Backend(e.to_string()))?;

    info!(
        input = %input_id,
        output = %output_id,
        sample_rate_hz = desired.sample_rate_hz,
        input_channels = input_config.config.channels,
        output_channels = output_config.config.channels,
        "duplex stream started"
    );
    Ok((input_stream, output_stream, counters))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: Producer<f32>,
    counters: Arc<XrunCounters>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                let dropped = push_downmixed(data, channels, &mut producer);
                if dropped > 0 {
                    counters
                        .input_overflow_frames
                        .fetch_add(dropped as u64, Ordering::Relaxed);
                }
            },
            |err| warn!(error = %err, "cpal input stream error"),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: Consumer<f32>,
    mut cb: Box<dyn AudioCallback>,
    scratch_frames: usize,
    counters: Arc<XrunCounters>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut input: Vec<f32> = vec![0.0; scratch_frames];
    let mut mono: Vec<f32> = vec![0.0; scratch_frames];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                if frames > input.len() {
                    input.resize(frames, 0.0);
                    mono.resize(frames, 0.0);
                }
                let trimmed = trim_backlog(&mut consumer, frames * BACKLOG_PERIODS);
                if trimmed > 0 {
                    counters
                        .backlog_trimmed_frames
                        .fetch_add(trimmed as u64, Ordering::Relaxed);
                }
                let missing = pop_input(&mut consumer, &mut input[..frames]);
                if missing > 0 {
                    counters
                        .output_underrun_frames
                        .fetch_add(missing as u64, Ordering::Relaxed);
                }
                cb.process(&input[..frames], &mut mono[..frames]);
                write_interleaved(data, channels, &mono[..frames]);
            },
            |err| warn!(error = %err, "cpal output stream error"),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

/// Average each frame's channels and push it. Returns the frames that did not
/// fit in the ring.
fn push_downmixed<T>(data: &[T], channels: usize, producer: &mut Producer<f32>) -> usize
where
    T: Sample,
    f32: FromSample<T>,
{
    if channels == 0 {
        return 0;
    }
    let scale = 1.0 / channels as f32;
    let mut dropped = 0;
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
        if producer.push(sum * scale).is_err() {
            dropped += 1;
        }
    }
    dropped
}

/// Drop the oldest captured frames beyond `keep`, so a head start of the
/// input stream or clock drift cannot grow into a lasting capture delay.
/// Returns the frames dropped.
fn trim_backlog(consumer: &mut Consumer<f32>, keep: usize) -> usize {
    let excess = consumer.slots().saturating_sub(keep);
    if excess == 0 {
        return 0;
    }
    match consumer.read_chunk(excess) {
        Ok(chunk) => {
            chunk.commit_all();
            excess
        }
        Err(_) => 0,
    }
}

/// Fill `input` from the ring and zero the rest. Returns the frames that were
/// not yet captured.
fn pop_input(consumer: &mut Consumer<f32>, input: &mut [f32]) -> usize {
    let mut filled = 0;
    while filled < input.len() {
        match consumer.pop() {
            Ok(sample) => {
                input[filled] = sample;
                filled += 1;
            }
            Err(_) => break,
        }
    }
    input[filled..].fill(0.0);
    input.len() - filled
}

/// Copy the mono mix to every output channel.
fn write_interleaved<T>(data: &mut [T], channels: usize, mono: &[f32])
where
    T: Sample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, &value) in data.chunks_exact_mut(channels).zip(mono) {
        let sample = T::from_sample(value.clamp(-1.0, 1.0));
        frame.fill(sample);
    }
}

fn format_rank(format: SampleFormat) -> i32 {
    match format {
        SampleFormat::F32 => 3,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 1,
        _ => 0,
    }
}

/// Pick a config range that supports the requested rate. Channel counts that
/// match the request win, then sample formats in f32, i16, u16 order. A rate
/// no range supports is an error; the engine does not resample.
fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score: i32 = 0;

    for config_range in supported {
        let min = config_range.min_sample_rate().0;
        let max = config_range.max_sample_rate().0;
        if desired.sample_rate_hz < min || desired.sample_rate_hz > max {
            continue;
        }

        let format_score = format_rank(config_range.sample_format());
        if format_score == 0 {
            continue;
        }
        let channel_score = if config_range.channels() == desired.channels {
            10
        } else {
            0
        };
        let score = channel_score + format_score;

        if score > best_score {
            best = Some(config_range.with_sample_rate(SampleRate(desired.sample_rate_hz)));
            best_score = score;
        }
    }

    best.ok_or_else(|| {
        AudioError::UnsupportedConfig(format!(
            "no stream config at {} Hz",
            desired.sample_rate_hz
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn desired(rate: u32) -> AudioConfig {
        AudioConfig {
            sample_rate_hz: rate,
            channels: 1,
            buffer_size_frames: None,
        }
    }

    #[test]
    fn prefers_matching_channels_then_float() {
        let ranges = vec![
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
            range(1, 8_000, 96_000, SampleFormat::F32),
        ];

        let chosen = select_supported_config(&mut ranges.into_iter(), desired(44_100))
            .expect("config");

        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
        assert_eq!(chosen.sample_rate().0, 44_100);
    }

    #[test]
    fn falls_back_to_other_channel_counts() {
        let ranges = vec![range(2, 44_100, 48_000, SampleFormat::I16)];

        let chosen = select_supported_config(&mut ranges.into_iter(), desired(48_000))
            .expect("config");

        assert_eq!(chosen.channels(), 2);
    }

    #[test]
    fn unsupported_rate_is_fatal() {
        let ranges = vec![range(1, 44_100, 48_000, SampleFormat::F32)];

        let err = select_supported_config(&mut ranges.into_iter(), desired(22_050)).unwrap_err();

        assert!(matches!(err, AudioError::UnsupportedConfig(_)));
    }

    #[test]
    fn capture_is_downmixed_to_mono() {
        let (mut producer, mut consumer) = RingBuffer::<f32>::new(4);

        let dropped = push_downmixed(&[0.5f32, -0.5, 1.0, 0.0], 2, &mut producer);

        assert_eq!(dropped, 0);
        assert_eq!(consumer.pop(), Ok(0.0));
        assert_eq!(consumer.pop(), Ok(0.5));
    }

    #[test]
    fn full_ring_reports_dropped_frames() {
        let (mut producer, _consumer) = RingBuffer::<f32>::new(2);

        let dropped = push_downmixed(&[0.1f32, 0.2, 0.3], 1, &mut producer);

        assert_eq!(dropped, 1);
    }

    #[test]
    fn missing_capture_is_zero_filled() {
        let (mut producer, mut consumer) = RingBuffer::<f32>::new(4);
        producer.push(0.25).expect("push");
        let mut input = [9.0f32; 3];

        let missing = pop_input(&mut consumer, &mut input);

        assert_eq!(missing, 2);
        assert_eq!(input, [0.25, 0.0, 0.0]);
    }

    #[test]
    fn backlog_beyond_the_allowance_is_dropped_oldest_first() {
        let (mut producer, mut consumer) = RingBuffer::<f32>::new(16);
        for i in 0..10 {
            producer.push(i as f32).expect("push");
        }

        assert_eq!(trim_backlog(&mut consumer, 4), 6);
        assert_eq!(consumer.slots(), 4);
        assert_eq!(consumer.pop(), Ok(6.0));

        assert_eq!(trim_backlog(&mut consumer, 4), 0);
        assert_eq!(consumer.slots(), 3);
    }

    #[test]
    fn mono_mix_is_copied_to_every_channel() {
        let mut data = [0i16; 6];

        write_interleaved(&mut data, 2, &[1.0, 0.0, -2.0]);

        assert_eq!(data[0], data[1]);
        assert!(data[0] >= i16::MAX - 1);
        assert_eq!(data[2..4], [0, 0]);
        assert_eq!(data[4], data[5]);
        assert!(data[4] <= -i16::MAX);
    }
}
