use encore_domain_notes::NoteSequence;
use encore_ports::notes::PITCH_COUNT;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Distance (seconds) within which a performed onset counts as a full hit.
    pub hit_window_secs: f64,
    /// Largest credit reduction for a partial hit.
    pub max_partial_penalty: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            hit_window_secs: 0.050,
            max_partial_penalty: 0.5,
        }
    }
}

impl MatchConfig {
    pub fn from_millis(hit_window_ms: u32, max_partial_penalty: f64) -> Self {
        Self {
            hit_window_secs: hit_window_ms as f64 / 1000.0,
            max_partial_penalty: max_partial_penalty.clamp(0.0, 1.0),
        }
    }

    /// Credit for a reference onset whose nearest unique performed onset is
    /// `distance` seconds away.
    pub fn grade(&self, distance: f64) -> (Grade, f64) {
        let window = self.hit_window_secs;
        if distance <= window {
            return (Grade::Hit, 1.0);
        }
        if distance <= window * 2.0 && window > 0.0 {
            let penalty = (self.max_partial_penalty * (distance - window) / window)
                .min(self.max_partial_penalty);
            return (Grade::Partial, 1.0 - penalty);
        }
        (Grade::Miss, 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Hit,
    Partial,
    Miss,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteMatch {
    pub pitch: u8,
    pub reference_time: f64,
    pub matched_time: Option<f64>,
    pub grade: Grade,
    pub credit: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub score: i64,
    pub notes_hit: f64,
    pub total_notes: u32,
    /// Signed `performed - reference` offsets of every hit and partial hit.
    pub swing_offsets: Vec<f64>,
    pub matches: Vec<NoteMatch>,
}

impl MatchResult {
    pub fn accuracy(&self) -> f64 {
        if self.total_notes == 0 {
            return 0.0;
        }
        self.notes_hit / self.total_notes as f64 * 100.0
    }
}

/// Score a performance against the reference onsets of the same time span.
///
/// Each pitch is matched independently. Every reference onset is paired with
/// at most one performed onset and no performed onset serves two reference
/// onsets of the same pitch.
pub fn score(reference: &NoteSequence, performed: &NoteSequence, cfg: &MatchConfig) -> MatchResult {
    let mut result = MatchResult::default();

    for pitch in 0..PITCH_COUNT as u8 {
        let reference_times = reference.onsets(pitch);
        if reference_times.is_empty() {
            continue;
        }
        result.total_notes += reference_times.len() as u32;

        let performed_times = performed.onsets(pitch);
        if performed_times.is_empty() {
            result
                .matches
                .extend(reference_times.iter().map(|&t| missed(pitch, t)));
            continue;
        }

        let candidates = nearest_candidates(reference_times, performed_times);
        let assigned = resolve_unique(candidates, reference_times);

        for (&reference_time, matched) in reference_times.iter().zip(assigned) {
            let Some(matched_time) = matched else {
                result.matches.push(missed(pitch, reference_time));
                continue;
            };
            let (grade, credit) = cfg.grade((matched_time - reference_time).abs());
            if grade != Grade::Miss {
                result.notes_hit += credit;
                result.swing_offsets.push(matched_time - reference_time);
            }
            result.matches.push(NoteMatch {
                pitch,
                reference_time,
                matched_time: Some(matched_time),
                grade,
                credit,
            });
        }
    }

    result.score = (result.notes_hit * 100.0).round() as i64;
    result
}

fn missed(pitch: u8, reference_time: f64) -> NoteMatch {
    NoteMatch {
        pitch,
        reference_time,
        matched_time: None,
        grade: Grade::Miss,
        credit: 0.0,
    }
}

/// For each reference onset, every performed onset ordered by distance.
/// Equal distances keep the performed order.
fn nearest_candidates(reference_times: &[f64], performed_times: &[f64]) -> Vec<Vec<f64>> {
    reference_times
        .iter()
        .map(|&reference| {
            let mut sorted = performed_times.to_vec();
            sorted.sort_by(|a, b| (a - reference).abs().total_cmp(&(b - reference).abs()));
            sorted
        })
        .collect()
}

/// Drop shared front candidates until no two reference onsets point at the
/// same performed onset. Of two reference onsets sharing a front, the farther
/// one gives it up; on a tie the later one does.
fn resolve_unique(candidates: Vec<Vec<f64>>, reference_times: &[f64]) -> Vec<Option<f64>> {
    let mut cursors = vec![0usize; candidates.len()];
    let front = |cursors: &[usize], k: usize| candidates[k].get(cursors[k]).copied();

    loop {
        for i in 0..candidates.len().saturating_sub(1) {
            for j in i + 1..candidates.len() {
                let Some(fi) = front(&cursors, i) else {
                    break;
                };
                let Some(fj) = front(&cursors, j) else {
                    continue;
                };
                if fi != fj {
                    continue;
                }
                let i_dist = (reference_times[i] - fi).abs();
                let j_dist = (reference_times[j] - fj).abs();
                if i_dist > j_dist {
                    cursors[i] += 1;
                } else {
                    cursors[j] += 1;
                }
            }
        }

        let mut fronts: Vec<f64> = (0..candidates.len())
            .filter_map(|k| front(&cursors, k))
            .collect();
        fronts.sort_by(f64::total_cmp);
        if fronts.windows(2).all(|w| w[0] != w[1]) {
            break;
        }
    }

    (0..candidates.len()).map(|k| front(&cursors, k)).collect()
}
