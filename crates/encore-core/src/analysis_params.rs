use encore_domain_eval::MatchConfig;
use encore_ports::storage::SettingsDto;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Scoring parameters adjustable while a session runs. Read by pipeline
/// workers once per chunk.
#[derive(Debug)]
pub struct AnalysisParams {
    hit_window_secs: AtomicU64,
    max_partial_penalty: AtomicU64,
    latency_enabled: AtomicBool,
    latency_ms: AtomicI32,
}

impl AnalysisParams {
    pub fn new(settings: &SettingsDto) -> Self {
        Self {
            hit_window_secs: AtomicU64::new(
                (settings.hit_window_ms as f64 / 1000.0).to_bits(),
            ),
            max_partial_penalty: AtomicU64::new(
                settings.max_partial_penalty.clamp(0.0, 1.0).to_bits(),
            ),
            latency_enabled: AtomicBool::new(settings.latency_compensation_enabled),
            latency_ms: AtomicI32::new(settings.latency_compensation_ms),
        }
    }

    pub fn set_hit_window_ms(&self, ms: u32) {
        self.hit_window_secs
            .store((ms as f64 / 1000.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_latency_compensation(&self, enabled: bool, ms: i32) {
        self.latency_ms.store(ms, Ordering::Relaxed);
        self.latency_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            hit_window_secs: f64::from_bits(self.hit_window_secs.load(Ordering::Relaxed)),
            max_partial_penalty: f64::from_bits(self.max_partial_penalty.load(Ordering::Relaxed)),
        }
    }

    /// Round-trip latency to subtract from performed onsets; zero when disabled.
    pub fn latency_secs(&self) -> f64 {
        if !self.latency_enabled.load(Ordering::Relaxed) {
            return 0.0;
        }
        self.latency_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self::new(&SettingsDto::default())
    }
}
