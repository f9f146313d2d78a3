use crossbeam_channel::{bounded, Receiver};
use encore_core::{
    chunk_queue, AggregatorMsg, AnalysisParams, ChunkScore, PipelineConfig, ScoringPipeline,
    SubmitOutcome,
};
use encore_domain_notes::NoteSequence;
use encore_ports::notes::NoteEvent;
use encore_ports::storage::SettingsDto;
use encore_ports::transcription::{TranscriptionError, TranscriptionPort};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RATE: u32 = 100;
const MAIN_FRAMES: usize = 600;

/// Reports a pitch-60 note at every rising edge above 0.5.
struct ClickTranscriber;

impl TranscriptionPort for ClickTranscriber {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
    ) -> Result<Vec<NoteEvent>, TranscriptionError> {
        let mut prev = 0.0f32;
        let mut out = Vec::new();
        for (idx, &s) in samples.iter().enumerate() {
            if s >= 0.5 && prev < 0.5 {
                out.extend(NoteEvent::new(60, idx as f64 / sample_rate_hz as f64));
            }
            prev = s;
        }
        Ok(out)
    }
}

struct BrokenTranscriber;

impl TranscriptionPort for BrokenTranscriber {
    fn transcribe(
        &self,
        _samples: &[f32],
        _sample_rate_hz: u32,
    ) -> Result<Vec<NoteEvent>, TranscriptionError> {
        Err(TranscriptionError::Failed("model crashed".to_string()))
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        sample_rate_hz: RATE,
        main_frames: MAIN_FRAMES,
        queue_capacity: 4,
        worker_count: 2,
    }
}

fn reference(onsets: &[f64]) -> Arc<NoteSequence> {
    Arc::new(onsets.iter().filter_map(|&t| NoteEvent::new(60, t)).collect())
}

fn recv_chunk(rx: &Receiver<AggregatorMsg>) -> ChunkScore {
    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(AggregatorMsg::Apply(chunk)) => chunk,
        other => panic!("expected a chunk result, got {other:?}"),
    }
}

#[test]
fn silent_chunk_reports_every_reference_note_as_missed() {
    let (tx, rx) = bounded(8);
    let params = Arc::new(AnalysisParams::default());
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        config(),
        reference(&[1.0, 2.0, 3.5]),
        Arc::new(ClickTranscriber),
        params,
        tx,
    );

    let silence = vec![0.0f32; MAIN_FRAMES];
    assert_eq!(sink.submit(&silence, 600, 6.0, 0), SubmitOutcome::Queued);

    let chunk = recv_chunk(&rx);
    assert_eq!(chunk.result.total_notes, 3);
    assert_eq!(chunk.result.score, 0);
    assert!(chunk.result.swing_offsets.is_empty());

    pipeline.shutdown();
    assert_eq!(pipeline.metrics().analysed, 1);
}

#[test]
fn silent_chunk_over_a_rest_contributes_nothing() {
    let (tx, rx) = bounded(8);
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        config(),
        reference(&[10.0]),
        Arc::new(ClickTranscriber),
        Arc::new(AnalysisParams::default()),
        tx,
    );

    sink.submit(&vec![0.0f32; MAIN_FRAMES], 600, 6.0, 0);

    let chunk = recv_chunk(&rx);
    assert_eq!(chunk.result.total_notes, 0);
    assert_eq!(chunk.result.notes_hit, 0.0);
    assert_eq!(chunk.result.score, 0);

    pipeline.shutdown();
}

#[test]
fn clicks_on_the_reference_grid_score_full_marks() {
    let (tx, rx) = bounded(8);
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        config(),
        reference(&[7.0, 8.5]),
        Arc::new(ClickTranscriber),
        Arc::new(AnalysisParams::default()),
        tx,
    );

    // Chunk covers 6..12 s: clicks at 1.0 s and 2.5 s into it.
    let mut samples = vec![0.0f32; MAIN_FRAMES];
    samples[100] = 1.0;
    samples[250] = 1.0;
    sink.submit(&samples, 1200, 6.0, 2);

    let chunk = recv_chunk(&rx);
    assert_eq!(chunk.generation, 2);
    assert!((chunk.end_secs - 12.0).abs() < 1e-9);
    assert_eq!(chunk.result.score, 200);
    assert_eq!(chunk.result.total_notes, 2);

    pipeline.shutdown();
}

#[test]
fn hit_window_changes_apply_to_later_chunks() {
    let (tx, rx) = bounded(8);
    let params = Arc::new(AnalysisParams::default());
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        PipelineConfig {
            worker_count: 1,
            ..config()
        },
        reference(&[1.0]),
        Arc::new(ClickTranscriber),
        params.clone(),
        tx,
    );

    // Click lands 80 ms late.
    let mut samples = vec![0.0f32; MAIN_FRAMES];
    samples[108] = 1.0;

    sink.submit(&samples, 600, 6.0, 0);
    let before = recv_chunk(&rx);
    assert!(before.result.notes_hit > 0.0 && before.result.notes_hit < 1.0);

    params.set_hit_window_ms(100);
    sink.submit(&samples, 600, 6.0, 0);
    let after = recv_chunk(&rx);
    assert_eq!(after.result.score, 100);

    pipeline.shutdown();
}

#[test]
fn transcription_failure_skips_the_chunk() {
    let (tx, rx) = bounded(8);
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        config(),
        reference(&[1.0]),
        Arc::new(BrokenTranscriber),
        Arc::new(AnalysisParams::default()),
        tx,
    );

    sink.submit(&vec![0.0f32; MAIN_FRAMES], 600, 6.0, 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.metrics().failed == 0 {
        assert!(Instant::now() < deadline, "worker never reported the failure");
        std::thread::sleep(Duration::from_millis(5));
    }
    pipeline.shutdown();

    assert!(rx.try_recv().is_err());
    assert_eq!(pipeline.metrics().analysed, 0);
}

#[test]
fn full_queue_evicts_the_oldest_chunk() {
    let (sink, queue) = chunk_queue(MAIN_FRAMES, 2, 0);
    let samples = vec![0.25f32; MAIN_FRAMES];

    assert_eq!(sink.submit(&samples, 600, 6.0, 0), SubmitOutcome::Queued);
    assert_eq!(sink.submit(&samples, 1200, 6.0, 0), SubmitOutcome::Queued);
    assert_eq!(sink.submit(&samples, 1800, 6.0, 0), SubmitOutcome::ReplacedOldest);

    let first = queue.try_recv().expect("queued chunk");
    let second = queue.try_recv().expect("queued chunk");
    assert_eq!((first.end_frame, second.end_frame), (1200, 1800));
    assert!(queue.try_recv().is_none());

    let metrics = sink.metrics().snapshot();
    assert_eq!(metrics.submitted, 3);
    assert_eq!(metrics.dropped, 1);

    queue.recycle(first.samples);
    queue.recycle(second.samples);
}

#[test]
fn recycled_buffers_keep_their_capacity() {
    let (sink, queue) = chunk_queue(MAIN_FRAMES, 1, 0);
    let samples = vec![0.5f32; MAIN_FRAMES];

    for round in 0..10u64 {
        sink.submit(&samples, round * 600, 6.0, 0);
        let job = queue.try_recv().expect("queued chunk");
        assert_eq!(job.samples.len(), MAIN_FRAMES);
        assert!(job.samples.capacity() >= MAIN_FRAMES);
        queue.recycle(job.samples);
    }
    assert_eq!(sink.metrics().snapshot().dropped, 0);
}

#[test]
fn settings_latency_is_read_per_chunk() {
    let settings = SettingsDto {
        latency_compensation_enabled: true,
        latency_compensation_ms: 80,
        ..SettingsDto::default()
    };
    let (tx, rx) = bounded(8);
    let (mut pipeline, sink) = ScoringPipeline::spawn(
        PipelineConfig {
            worker_count: 1,
            ..config()
        },
        reference(&[1.0]),
        Arc::new(ClickTranscriber),
        Arc::new(AnalysisParams::new(&settings)),
        tx,
    );

    let mut samples = vec![0.0f32; MAIN_FRAMES];
    samples[108] = 1.0;
    sink.submit(&samples, 600, 6.0, 0);

    let chunk = recv_chunk(&rx);
    assert_eq!(chunk.result.score, 100);

    pipeline.shutdown();
}
