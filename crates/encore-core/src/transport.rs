use encore_ports::types::{Gain01, SampleTime};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("position {secs}s outside track range [0, {duration_secs}s)")]
    PositionOutOfRange { secs: f64, duration_secs: f64 },
    #[error("loop marker {secs}s outside track range [0, {duration_secs}s]")]
    MarkerOutOfRange { secs: f64, duration_secs: f64 },
    #[error("loop of {len_secs}s is shorter than the minimum {min_secs}s")]
    LoopTooShort { len_secs: f64, min_secs: f64 },
    #[error("looping requested without loop markers")]
    NoLoopMarkers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    Paused,
    Ended,
}

/// Static bounds of a loaded track, shared by the audio thread and the
/// control thread so both validate identically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportLimits {
    pub sample_rate_hz: u32,
    pub length_frames: SampleTime,
    pub min_loop_frames: SampleTime,
}

impl TransportLimits {
    pub fn new(sample_rate_hz: u32, length_frames: SampleTime, min_loop_secs: f64) -> Self {
        let min_loop_frames = (min_loop_secs.max(0.0) * sample_rate_hz as f64).round() as u64;
        Self {
            sample_rate_hz,
            length_frames,
            min_loop_frames: min_loop_frames.max(1),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames_to_secs(self.length_frames)
    }

    pub fn frames_to_secs(&self, frames: SampleTime) -> f64 {
        frames as f64 / self.sample_rate_hz as f64
    }

    /// Seek target for `secs`. Positions outside `[0, duration)` are rejected.
    pub fn seek_frame(&self, secs: f64) -> Result<SampleTime, TransportError> {
        let out_of_range = TransportError::PositionOutOfRange {
            secs,
            duration_secs: self.duration_secs(),
        };
        if !secs.is_finite() || secs < 0.0 {
            return Err(out_of_range);
        }
        let frame = (secs * self.sample_rate_hz as f64).floor() as u64;
        if frame >= self.length_frames {
            return Err(out_of_range);
        }
        Ok(frame)
    }

    /// Loop region for a marker pair. A reversed pair is reordered; the
    /// region is never clamped to fit.
    pub fn loop_frames(
        &self,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<(SampleTime, SampleTime), TransportError> {
        let (start_secs, end_secs) = if start_secs > end_secs {
            (end_secs, start_secs)
        } else {
            (start_secs, end_secs)
        };
        let start = self.marker_frame(start_secs)?;
        let end = self.marker_frame(end_secs)?;
        if end - start < self.min_loop_frames {
            return Err(TransportError::LoopTooShort {
                len_secs: end_secs - start_secs,
                min_secs: self.frames_to_secs(self.min_loop_frames),
            });
        }
        Ok((start, end))
    }

    fn marker_frame(&self, secs: f64) -> Result<SampleTime, TransportError> {
        let frame = (secs * self.sample_rate_hz as f64).round();
        if !secs.is_finite() || secs < 0.0 || frame > self.length_frames as f64 {
            return Err(TransportError::MarkerOutOfRange {
                secs,
                duration_secs: self.duration_secs(),
            });
        }
        Ok(frame as u64)
    }
}

/// A contiguous run of track frames to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadSegment {
    pub start: SampleTime,
    pub len: usize,
    /// Playback jumped back to the loop start right after this segment.
    pub wrapped: bool,
}

/// Playback position, pause/end flags, loop region and mix gain of the
/// loaded track pair. Owned by the audio thread.
#[derive(Clone, Debug)]
pub struct Transport {
    limits: TransportLimits,
    position: SampleTime,
    state: TransportState,
    loop_region: Option<(SampleTime, SampleTime)>,
    looping: bool,
    gain: Gain01,
}

impl Transport {
    pub fn new(limits: TransportLimits, gain: Gain01) -> Self {
        Self {
            limits,
            position: 0,
            state: TransportState::Paused,
            loop_region: None,
            looping: false,
            gain,
        }
    }

    pub fn limits(&self) -> &TransportLimits {
        &self.limits
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_ended(&self) -> bool {
        self.state == TransportState::Ended
    }

    pub fn position(&self) -> SampleTime {
        self.position
    }

    pub fn position_secs(&self) -> f64 {
        self.limits.frames_to_secs(self.position)
    }

    pub fn loop_region(&self) -> Option<(SampleTime, SampleTime)> {
        self.loop_region
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn gain(&self) -> Gain01 {
        self.gain
    }

    /// Resume playback. Returns `true` when the track had ended and playback
    /// restarted from the beginning (or the loop start when looping).
    pub fn play(&mut self) -> bool {
        let restarted = self.state == TransportState::Ended;
        if restarted {
            self.position = match (self.looping, self.loop_region) {
                (true, Some((start, _))) => start,
                _ => 0,
            };
        }
        self.state = TransportState::Playing;
        restarted
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Jump to `frame`, clearing the ended flag. Playback stays paused or
    /// playing as it was; an ended track becomes paused.
    pub fn seek(&mut self, frame: SampleTime) {
        self.position = frame.min(self.limits.length_frames.saturating_sub(1));
        if self.state == TransportState::Ended {
            self.state = TransportState::Paused;
        }
    }

    pub fn set_loop_region(&mut self, start: SampleTime, end: SampleTime) {
        self.loop_region = Some((start, end));
        self.looping = true;
    }

    pub fn clear_loop(&mut self) {
        self.loop_region = None;
        self.looping = false;
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), TransportError> {
        if looping && self.loop_region.is_none() {
            return Err(TransportError::NoLoopMarkers);
        }
        self.looping = looping;
        Ok(())
    }

    pub fn set_gain(&mut self, gain: Gain01) {
        self.gain = gain;
    }

    pub fn in_loop_bounds(&self, frame: SampleTime) -> bool {
        match (self.looping, self.loop_region) {
            (true, Some((start, end))) => start <= frame && frame < end,
            _ => false,
        }
    }

    /// Take the next run of at most `max_frames` frames and advance past it.
    ///
    /// Returns `None` when paused, ended, or when the read reaches the end of
    /// the track (which sets the ended flag). A read that reaches the loop end
    /// while looping wraps to the loop start; the caller asks again for the rest.
    pub fn advance(&mut self, max_frames: usize) -> Option<ReadSegment> {
        if self.state != TransportState::Playing || max_frames == 0 {
            return None;
        }

        let in_loop = self.in_loop_bounds(self.position);
        let bound = match (in_loop, self.loop_region) {
            (true, Some((_, end))) => end,
            _ => self.limits.length_frames,
        };
        let available = bound.saturating_sub(self.position);
        if available == 0 {
            self.state = TransportState::Ended;
            return None;
        }

        let len = (max_frames as u64).min(available);
        let start = self.position;
        self.position += len;

        let mut wrapped = false;
        if self.position >= bound {
            match (in_loop, self.loop_region) {
                (true, Some((loop_start, _))) => {
                    self.position = loop_start;
                    wrapped = true;
                }
                _ => self.state = TransportState::Ended,
            }
        }

        Some(ReadSegment {
            start,
            len: len as usize,
            wrapped,
        })
    }
}
