use crate::aggregator::{AggregatorMsg, ChunkScore};
use crate::analysis_params::AnalysisParams;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use encore_domain_eval::score;
use encore_domain_notes::NoteSequence;
use encore_ports::transcription::{TranscriptionError, TranscriptionPort};
use encore_ports::types::SampleTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub sample_rate_hz: u32,
    /// Length of every chunk handed to the workers.
    pub main_frames: usize,
    pub queue_capacity: usize,
    pub worker_count: usize,
}

/// One captured chunk waiting for analysis.
#[derive(Debug)]
pub struct ChunkJob {
    pub samples: Vec<f32>,
    /// Playback frame aligned with the last captured sample.
    pub end_frame: SampleTime,
    /// Seconds of the chunk that hold captured audio.
    pub span_secs: f64,
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Queued after evicting the oldest waiting chunk.
    ReplacedOldest,
    Dropped,
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    submitted: AtomicU64,
    dropped: AtomicU64,
    analysed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetricsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub analysed: u64,
    pub failed: u64,
}

impl PipelineMetrics {
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            analysed: self.analysed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Audio-thread end of the work queue.
///
/// Buffers come from a fixed pool and go back to it after analysis, so
/// `submit` neither allocates nor blocks.
pub struct ChunkSink {
    work_tx: Sender<ChunkJob>,
    work_rx: Receiver<ChunkJob>,
    free_tx: Sender<Vec<f32>>,
    free_rx: Receiver<Vec<f32>>,
    metrics: Arc<PipelineMetrics>,
}

impl ChunkSink {
    pub fn submit(
        &self,
        samples: &[f32],
        end_frame: SampleTime,
        span_secs: f64,
        generation: u64,
    ) -> SubmitOutcome {
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);

        let mut evicted = false;
        let mut buffer = match self.free_rx.try_recv() {
            Ok(buffer) => buffer,
            Err(_) => match self.work_rx.try_recv() {
                Ok(oldest) => {
                    evicted = true;
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    oldest.samples
                }
                Err(_) => {
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    return SubmitOutcome::Dropped;
                }
            },
        };

        buffer.clear();
        buffer.extend_from_slice(samples);
        let mut job = ChunkJob {
            samples: buffer,
            end_frame,
            span_secs,
            generation,
        };

        loop {
            match self.work_tx.try_send(job) {
                Ok(()) => {
                    return if evicted {
                        SubmitOutcome::ReplacedOldest
                    } else {
                        SubmitOutcome::Queued
                    };
                }
                Err(err) => {
                    job = err.into_inner();
                    match self.work_rx.try_recv() {
                        Ok(oldest) => {
                            evicted = true;
                            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                            self.recycle(oldest.samples);
                        }
                        Err(_) => {
                            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                            self.recycle(job.samples);
                            return SubmitOutcome::Dropped;
                        }
                    }
                }
            }
        }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    // The pool channel holds every buffer ever created, so this never fails
    // and the buffer is never freed on the audio thread.
    fn recycle(&self, buffer: Vec<f32>) {
        let _ = self.free_tx.try_send(buffer);
    }
}

/// Worker end of the work queue.
#[derive(Clone)]
pub struct ChunkReceiver {
    work_rx: Receiver<ChunkJob>,
    free_tx: Sender<Vec<f32>>,
}

impl ChunkReceiver {
    pub fn try_recv(&self) -> Option<ChunkJob> {
        self.work_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChunkJob> {
        self.work_rx.recv_timeout(timeout).ok()
    }

    /// Return a job's buffer to the pool.
    pub fn recycle(&self, buffer: Vec<f32>) {
        let _ = self.free_tx.try_send(buffer);
    }
}

/// Bounded work queue with a pool of `queue_capacity + spare_buffers + 1`
/// buffers of `main_frames` samples each.
pub fn chunk_queue(
    main_frames: usize,
    queue_capacity: usize,
    spare_buffers: usize,
) -> (ChunkSink, ChunkReceiver) {
    let queue_capacity = queue_capacity.max(1);
    let pool_size = queue_capacity + spare_buffers + 1;

    let (work_tx, work_rx) = bounded::<ChunkJob>(queue_capacity);
    let (free_tx, free_rx) = bounded::<Vec<f32>>(pool_size);
    for _ in 0..pool_size {
        let _ = free_tx.try_send(Vec::with_capacity(main_frames));
    }

    let sink = ChunkSink {
        work_tx,
        work_rx: work_rx.clone(),
        free_tx: free_tx.clone(),
        free_rx,
        metrics: Arc::new(PipelineMetrics::default()),
    };
    (sink, ChunkReceiver { work_rx, free_tx })
}

/// Worker pool that transcribes chunks, scores them against the reference and
/// posts the results to the aggregator.
pub struct ScoringPipeline {
    stop_tx: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<PipelineMetrics>,
}

impl ScoringPipeline {
    pub fn spawn(
        config: PipelineConfig,
        reference: Arc<NoteSequence>,
        transcriber: Arc<dyn TranscriptionPort>,
        params: Arc<AnalysisParams>,
        results: Sender<AggregatorMsg>,
    ) -> (Self, ChunkSink) {
        let worker_count = config.worker_count.max(1);
        let (sink, queue) = chunk_queue(config.main_frames, config.queue_capacity, worker_count);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let metrics = sink.metrics();

        let buffer_secs = config.main_frames as f64 / config.sample_rate_hz as f64;
        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let ctx = WorkerContext {
                sample_rate_hz: config.sample_rate_hz,
                buffer_secs,
                reference: reference.clone(),
                transcriber: transcriber.clone(),
                params: params.clone(),
                results: results.clone(),
                metrics: metrics.clone(),
            };
            let queue = queue.clone();
            let stop_rx = stop_rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("encore-score-worker-{idx}"))
                .spawn(move || worker_loop(ctx, queue, stop_rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(error = %err, "failed to spawn scoring worker"),
            }
        }
        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "scoring pipeline started"
        );

        let pipeline = Self {
            stop_tx: Some(stop_tx),
            workers,
            metrics,
        };
        (pipeline, sink)
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the workers once their current chunk is done. Queued chunks are
    /// discarded.
    pub fn shutdown(&mut self) {
        self.stop_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ScoringPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerContext {
    sample_rate_hz: u32,
    buffer_secs: f64,
    reference: Arc<NoteSequence>,
    transcriber: Arc<dyn TranscriptionPort>,
    params: Arc<AnalysisParams>,
    results: Sender<AggregatorMsg>,
    metrics: Arc<PipelineMetrics>,
}

fn worker_loop(ctx: WorkerContext, queue: ChunkReceiver, stop_rx: Receiver<()>) {
    loop {
        let job = select! {
            recv(stop_rx) -> _ => break,
            recv(queue.work_rx) -> job => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let outcome = analyze_chunk(&ctx, &job);
        queue.recycle(job.samples);

        match outcome {
            Ok(chunk) => {
                ctx.metrics.analysed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    generation = chunk.generation,
                    end_secs = chunk.end_secs,
                    score = chunk.result.score,
                    notes_hit = chunk.result.notes_hit,
                    total_notes = chunk.result.total_notes,
                    "chunk scored"
                );
                if ctx.results.send(AggregatorMsg::Apply(chunk)).is_err() {
                    break;
                }
            }
            Err(err) => {
                ctx.metrics.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, end_frame = job.end_frame, "chunk skipped");
            }
        }
    }
}

fn analyze_chunk(ctx: &WorkerContext, job: &ChunkJob) -> Result<ChunkScore, TranscriptionError> {
    let events = ctx.transcriber.transcribe(&job.samples, ctx.sample_rate_hz)?;

    let end_secs = job.end_frame as f64 / ctx.sample_rate_hz as f64;
    let offset = end_secs - ctx.buffer_secs - ctx.params.latency_secs();
    let performed = NoteSequence::from_events(events).shifted(offset);
    let reference = ctx.reference.slice(end_secs - job.span_secs, end_secs);

    let result = score(&reference, &performed, &ctx.params.match_config());
    Ok(ChunkScore {
        generation: job.generation,
        end_secs,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_ports::notes::NoteEvent;
    use encore_ports::storage::SettingsDto;

    struct FixedNotes(Vec<NoteEvent>);

    impl TranscriptionPort for FixedNotes {
        fn transcribe(
            &self,
            _samples: &[f32],
            _sample_rate_hz: u32,
        ) -> Result<Vec<NoteEvent>, TranscriptionError> {
            Ok(self.0.clone())
        }
    }

    fn context(notes: Vec<NoteEvent>, reference: &[(u8, f64)], settings: &SettingsDto) -> WorkerContext {
        let (results, _rx) = bounded(1);
        WorkerContext {
            sample_rate_hz: 100,
            buffer_secs: 6.0,
            reference: Arc::new(
                reference
                    .iter()
                    .filter_map(|&(p, t)| NoteEvent::new(p, t))
                    .collect(),
            ),
            transcriber: Arc::new(FixedNotes(notes)),
            params: Arc::new(AnalysisParams::new(settings)),
            results,
            metrics: Arc::new(PipelineMetrics::default()),
        }
    }

    fn job(end_frame: u64, span_secs: f64) -> ChunkJob {
        ChunkJob {
            samples: vec![0.0; 600],
            end_frame,
            span_secs,
            generation: 3,
        }
    }

    #[test]
    fn performed_onsets_are_placed_relative_to_chunk_end() {
        // Chunk ends at 10 s and covers 4..10 s; a note 5 s into it is at 9 s.
        let notes = vec![NoteEvent { pitch: 60, onset_secs: 5.0 }];
        let ctx = context(notes, &[(60, 9.0)], &SettingsDto::default());

        let chunk = analyze_chunk(&ctx, &job(1000, 6.0)).expect("analysis should succeed");

        assert_eq!(chunk.generation, 3);
        assert_eq!(chunk.result.total_notes, 1);
        assert_eq!(chunk.result.score, 100);
    }

    #[test]
    fn reference_slice_is_limited_to_captured_span() {
        // Only the last 2 s were captured; the 5 s reference note is outside.
        let ctx = context(Vec::new(), &[(60, 5.0), (62, 9.5)], &SettingsDto::default());

        let chunk = analyze_chunk(&ctx, &job(1000, 2.0)).expect("analysis should succeed");

        assert_eq!(chunk.result.total_notes, 1);
        assert_eq!(chunk.result.matches[0].pitch, 62);
    }

    #[test]
    fn latency_compensation_shifts_performed_onsets_earlier() {
        let settings = SettingsDto {
            latency_compensation_enabled: true,
            latency_compensation_ms: 200,
            ..SettingsDto::default()
        };
        let notes = vec![NoteEvent { pitch: 60, onset_secs: 5.2 }];
        let ctx = context(notes, &[(60, 9.0)], &settings);

        let chunk = analyze_chunk(&ctx, &job(1000, 6.0)).expect("analysis should succeed");

        assert_eq!(chunk.result.score, 100);
        assert!(chunk.result.swing_offsets[0].abs() < 1e-9);
    }
}
