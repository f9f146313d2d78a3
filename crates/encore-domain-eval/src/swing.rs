use std::collections::VecDeque;

/// Median of `values`, or `None` when empty. Even counts average the two
/// middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Rolling window of per-chunk timing offsets.
///
/// Negative swing means the performer rushes, positive means they drag.
#[derive(Clone, Debug)]
pub struct SwingHistory {
    capacity: usize,
    chunks: VecDeque<Vec<f64>>,
}

impl SwingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            chunks: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record one chunk's offsets. Chunks with no hits still take a slot.
    pub fn push_chunk(&mut self, offsets: Vec<f64>) {
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(offsets);
    }

    pub fn median(&self) -> Option<f64> {
        let all: Vec<f64> = self.chunks.iter().flatten().copied().collect();
        median(&all)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for SwingHistory {
    fn default() -> Self {
        Self::new(5)
    }
}
