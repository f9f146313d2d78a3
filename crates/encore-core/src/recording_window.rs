/// Overlapping capture window.
///
/// Captured samples collect in an overlap accumulator. Once it holds
/// `overlap_frames` samples, the main buffer shifts left by that amount, the
/// accumulator is appended at the tail, and a chunk is ready. Both buffers are
/// allocated once; `append` never grows them.
#[derive(Debug)]
pub struct RecordingWindow {
    main: Vec<f32>,
    overlap: Vec<f32>,
    overlap_frames: usize,
    valid_frames: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowAdvance {
    /// Input frames taken by this call.
    pub consumed: usize,
    pub chunk_ready: bool,
}

/// View of the main buffer right after a shift.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub samples: &'a [f32],
    /// Trailing frames that hold captured audio; the rest is silence left
    /// over from a reset.
    pub valid_frames: usize,
}

impl RecordingWindow {
    /// `overlap_frames` must be non-zero and no larger than `main_frames`.
    pub fn new(main_frames: usize, overlap_frames: usize) -> Self {
        let overlap_frames = overlap_frames.clamp(1, main_frames.max(1));
        Self {
            main: vec![0.0; main_frames.max(1)],
            overlap: Vec::with_capacity(overlap_frames),
            overlap_frames,
            valid_frames: 0,
        }
    }

    pub fn main_frames(&self) -> usize {
        self.main.len()
    }

    pub fn overlap_frames(&self) -> usize {
        self.overlap_frames
    }

    /// Samples waiting in the accumulator.
    pub fn pending_frames(&self) -> usize {
        self.overlap.len()
    }

    pub fn valid_frames(&self) -> usize {
        self.valid_frames
    }

    /// Feed captured samples. Stops early once a chunk becomes ready so the
    /// caller can hand it off before feeding the remainder.
    pub fn append(&mut self, input: &[f32]) -> WindowAdvance {
        let room = self.overlap_frames - self.overlap.len();
        let consumed = room.min(input.len());
        self.overlap.extend_from_slice(&input[..consumed]);

        let chunk_ready = self.overlap.len() >= self.overlap_frames;
        if chunk_ready {
            self.shift();
        }
        WindowAdvance {
            consumed,
            chunk_ready,
        }
    }

    pub fn chunk(&self) -> Chunk<'_> {
        Chunk {
            samples: &self.main,
            valid_frames: self.valid_frames,
        }
    }

    /// Shift whatever the accumulator holds into the main buffer, short of a
    /// full overlap. Returns `false` when nothing was pending.
    pub fn flush(&mut self) -> bool {
        if self.overlap.is_empty() {
            return false;
        }
        self.shift();
        true
    }

    /// Zero both buffers. The next chunk only counts audio captured after this.
    pub fn reset(&mut self) {
        self.main.fill(0.0);
        self.overlap.clear();
        self.valid_frames = 0;
    }

    fn shift(&mut self) {
        let n = self.overlap.len();
        let len = self.main.len();
        self.main.copy_within(n.., 0);
        self.main[len - n..].copy_from_slice(&self.overlap);
        self.overlap.clear();
        self.valid_frames = (self.valid_frames + n).min(len);
    }
}
