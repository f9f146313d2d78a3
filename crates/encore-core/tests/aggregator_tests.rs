use approx::assert_relative_eq;
use encore_core::{AggregatorMsg, ChunkScore, ScoreAggregator, ScoreSnapshot, ScoreState};
use encore_domain_eval::MatchResult;
use encore_ports::storage::OverlapCredit;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn chunk(generation: u64, score: i64, notes_hit: f64, total_notes: u32, swing: &[f64]) -> ChunkScore {
    ChunkScore {
        generation,
        end_secs: 6.0,
        result: MatchResult {
            score,
            notes_hit,
            total_notes,
            swing_offsets: swing.to_vec(),
            matches: Vec::new(),
        },
    }
}

#[test]
fn reset_without_results_is_all_zero() {
    let mut state = ScoreState::new(OverlapCredit::Halve, 5);
    state.apply(&chunk(0, 300, 3.0, 4, &[0.01]));

    state.reset(1);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.score, 0);
    assert_relative_eq!(snapshot.notes_hit, 0.0);
    assert_relative_eq!(snapshot.total_notes, 0.0);
    assert_relative_eq!(snapshot.accuracy, 0.0);
    assert_eq!(snapshot.swing_secs, None);
    assert_eq!(snapshot.generation, 1);
}

#[test]
fn halve_policy_weights_every_chunk() {
    let mut state = ScoreState::new(OverlapCredit::Halve, 5);

    assert!(state.apply(&chunk(0, 100, 1.0, 1, &[0.0])));
    assert!(state.apply(&chunk(0, 75, 0.75, 2, &[0.06])));

    let snapshot = state.snapshot();
    assert_eq!(snapshot.score, 88);
    assert_relative_eq!(snapshot.notes_hit, 0.875);
    assert_relative_eq!(snapshot.total_notes, 1.5);
    assert_relative_eq!(snapshot.accuracy, 0.875 / 1.5 * 100.0);
    assert!(snapshot.notes_hit <= snapshot.total_notes);
}

#[test]
fn full_policy_adds_results_unchanged() {
    let mut state = ScoreState::new(OverlapCredit::Full, 5);

    state.apply(&chunk(0, 150, 1.5, 2, &[]));

    let snapshot = state.snapshot();
    assert_eq!(snapshot.score, 150);
    assert_relative_eq!(snapshot.accuracy, 75.0);
}

#[test]
fn score_rounds_the_summed_credit_not_each_chunk() {
    let mut state = ScoreState::new(OverlapCredit::Full, 5);

    // Each chunk alone rounds up to 75.
    for _ in 0..4 {
        state.apply(&chunk(0, 75, 0.746, 1, &[0.07]));
    }

    let snapshot = state.snapshot();
    assert_relative_eq!(snapshot.notes_hit, 2.984, epsilon = 1e-9);
    assert_eq!(snapshot.score, 298);

    let mut halved = ScoreState::new(OverlapCredit::Halve, 5);
    for _ in 0..4 {
        halved.apply(&chunk(0, 75, 0.746, 1, &[0.07]));
    }
    assert_eq!(halved.snapshot().score, 149);
}

#[test]
fn results_from_before_a_reset_are_discarded() {
    let mut state = ScoreState::new(OverlapCredit::Full, 5);
    state.reset(3);

    assert!(!state.apply(&chunk(2, 100, 1.0, 1, &[0.0])));
    assert!(state.apply(&chunk(3, 100, 1.0, 1, &[0.0])));
    assert!(state.apply(&chunk(4, 100, 1.0, 1, &[0.0])));

    assert_eq!(state.snapshot().score, 200);
}

#[test]
fn invalidate_keeps_totals() {
    let mut state = ScoreState::new(OverlapCredit::Full, 5);
    state.apply(&chunk(0, 100, 1.0, 1, &[]));

    state.invalidate(1);

    assert!(!state.apply(&chunk(0, 100, 1.0, 1, &[])));
    assert_eq!(state.snapshot().score, 100);
}

#[test]
fn swing_is_median_of_recent_chunks() {
    let mut state = ScoreState::new(OverlapCredit::Full, 2);
    state.apply(&chunk(0, 0, 0.0, 1, &[0.5, 0.5, 0.5]));
    state.apply(&chunk(0, 100, 1.0, 1, &[-0.03]));
    state.apply(&chunk(0, 100, 1.0, 1, &[-0.01, 0.02]));

    let swing = state.snapshot().swing_secs.expect("swing");
    assert_relative_eq!(swing, -0.01);
}

fn wait_for(aggregator: &ScoreAggregator, pred: impl Fn(&ScoreSnapshot) -> bool) -> ScoreSnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(snapshot) = aggregator.drain_updates().into_iter().find(|s| pred(s)) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "timed out waiting for score update");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn aggregator_thread_publishes_snapshots() {
    let mut aggregator = ScoreAggregator::spawn(OverlapCredit::Halve, 5);
    let tx = aggregator.sender();

    tx.send(AggregatorMsg::Apply(chunk(0, 200, 2.0, 2, &[0.01])))
        .expect("send");
    let snapshot = wait_for(&aggregator, |s| s.score == 100);
    assert_relative_eq!(snapshot.accuracy, 100.0);
    assert_eq!(aggregator.latest().score, 100);

    aggregator.reset(1);
    tx.send(AggregatorMsg::Apply(chunk(0, 200, 2.0, 2, &[])))
        .expect("send");
    tx.send(AggregatorMsg::Apply(chunk(1, 50, 0.5, 1, &[])))
        .expect("send");
    let snapshot = wait_for(&aggregator, |s| s.generation == 1 && s.total_notes > 0.0);
    assert_eq!(snapshot.score, 25);

    aggregator.shutdown();
}
