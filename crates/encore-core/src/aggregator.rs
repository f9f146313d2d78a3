use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use encore_domain_eval::{MatchResult, SwingHistory};
use encore_ports::storage::OverlapCredit;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

const MAILBOX_CAPACITY: usize = 64;
const UPDATE_CAPACITY: usize = 64;

/// Matcher output for one chunk, tagged with the generation it was captured in.
#[derive(Clone, Debug)]
pub struct ChunkScore {
    pub generation: u64,
    pub end_secs: f64,
    pub result: MatchResult,
}

#[derive(Clone, Debug)]
pub enum AggregatorMsg {
    Apply(ChunkScore),
    /// Zero the totals and drop results older than `generation`.
    Reset { generation: u64 },
    /// Drop results older than `generation` but keep the totals.
    Invalidate { generation: u64 },
    Shutdown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub score: i64,
    /// Percent of reference notes hit.
    pub accuracy: f64,
    /// Median signed offset of recent hits; negative rushes, positive drags.
    pub swing_secs: Option<f64>,
    pub notes_hit: f64,
    pub total_notes: f64,
    pub generation: u64,
}

/// Running totals. The only mutation points are `apply`, `reset` and
/// `invalidate`.
#[derive(Clone, Debug)]
pub struct ScoreState {
    notes_hit: f64,
    total_notes: f64,
    swing: SwingHistory,
    generation_floor: u64,
    credit: OverlapCredit,
}

impl ScoreState {
    pub fn new(credit: OverlapCredit, swing_history_chunks: usize) -> Self {
        Self {
            notes_hit: 0.0,
            total_notes: 0.0,
            swing: SwingHistory::new(swing_history_chunks),
            generation_floor: 0,
            credit,
        }
    }

    /// Add a chunk's result. Returns `false` when the chunk predates the
    /// latest reset or invalidation and was ignored.
    pub fn apply(&mut self, chunk: &ChunkScore) -> bool {
        if chunk.generation < self.generation_floor {
            return false;
        }
        let weight = self.credit.weight();
        let result = &chunk.result;
        self.notes_hit += result.notes_hit.min(result.total_notes as f64) * weight;
        self.total_notes += result.total_notes as f64 * weight;
        self.swing.push_chunk(result.swing_offsets.clone());
        true
    }

    pub fn reset(&mut self, generation: u64) {
        self.notes_hit = 0.0;
        self.total_notes = 0.0;
        self.swing.clear();
        self.generation_floor = self.generation_floor.max(generation);
    }

    pub fn invalidate(&mut self, generation: u64) {
        self.generation_floor = self.generation_floor.max(generation);
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_notes <= 0.0 {
            return 0.0;
        }
        self.notes_hit / self.total_notes * 100.0
    }

    /// Credited hits times 100, rounded once here rather than per chunk.
    pub fn score(&self) -> i64 {
        (self.notes_hit * 100.0).round() as i64
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot {
            score: self.score(),
            accuracy: self.accuracy(),
            swing_secs: self.swing.median(),
            notes_hit: self.notes_hit,
            total_notes: self.total_notes,
            generation: self.generation_floor,
        }
    }
}

/// Handle to the aggregator thread.
pub struct ScoreAggregator {
    tx: Sender<AggregatorMsg>,
    updates: Receiver<ScoreSnapshot>,
    latest: Arc<Mutex<ScoreSnapshot>>,
    join: Option<JoinHandle<()>>,
}

impl ScoreAggregator {
    pub fn spawn(credit: OverlapCredit, swing_history_chunks: usize) -> Self {
        let (tx, rx) = bounded::<AggregatorMsg>(MAILBOX_CAPACITY);
        let (update_tx, updates) = bounded::<ScoreSnapshot>(UPDATE_CAPACITY);
        let latest = Arc::new(Mutex::new(ScoreSnapshot::default()));
        let latest_thread = latest.clone();

        let join = std::thread::Builder::new()
            .name("encore-score-aggregator".to_string())
            .spawn(move || {
                let mut state = ScoreState::new(credit, swing_history_chunks);
                run_aggregator(&mut state, rx, update_tx, latest_thread);
            })
            .ok();
        if join.is_none() {
            tracing::error!("failed to spawn score aggregator thread");
        }

        Self {
            tx,
            updates,
            latest,
            join,
        }
    }

    /// Mailbox for pipeline workers.
    pub fn sender(&self) -> Sender<AggregatorMsg> {
        self.tx.clone()
    }

    pub fn reset(&self, generation: u64) {
        let _ = self.tx.send(AggregatorMsg::Reset { generation });
    }

    pub fn invalidate(&self, generation: u64) {
        let _ = self.tx.send(AggregatorMsg::Invalidate { generation });
    }

    pub fn latest(&self) -> ScoreSnapshot {
        *self.latest.lock()
    }

    /// Snapshots published since the last call, oldest first.
    pub fn drain_updates(&self) -> Vec<ScoreSnapshot> {
        let mut out = Vec::new();
        loop {
            match self.updates.try_recv() {
                Ok(snapshot) => out.push(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn shutdown(&mut self) {
        let _ = self.tx.send(AggregatorMsg::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ScoreAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_aggregator(
    state: &mut ScoreState,
    rx: Receiver<AggregatorMsg>,
    update_tx: Sender<ScoreSnapshot>,
    latest: Arc<Mutex<ScoreSnapshot>>,
) {
    for msg in rx.iter() {
        match msg {
            AggregatorMsg::Apply(chunk) => {
                if !state.apply(&chunk) {
                    debug!(
                        generation = chunk.generation,
                        "discarded stale chunk result"
                    );
                    continue;
                }
            }
            AggregatorMsg::Reset { generation } => {
                info!(generation, "score reset");
                state.reset(generation);
            }
            AggregatorMsg::Invalidate { generation } => {
                state.invalidate(generation);
                continue;
            }
            AggregatorMsg::Shutdown => break,
        }

        let snapshot = state.snapshot();
        *latest.lock() = snapshot;
        if update_tx.try_send(snapshot).is_err() {
            debug!("score update channel full; consumer reads the latest snapshot");
        }
    }
}
