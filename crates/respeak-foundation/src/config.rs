use serde::Deserialize;
use std::time::Duration;

/// What happens to a frame arriving at a full handoff queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the incoming frame, keep the earliest queued ones.
    DropNewest,
    /// Discard the oldest queued frame to make room for the incoming one.
    EvictOldest,
}

/// Pipeline configuration, consumed read-only by every component.
///
/// Every field has a statically known default; `sanitize()` resolves invalid
/// values per-field instead of rejecting the whole configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate_hz: u32,
    pub channels: u16,
    /// Samples per frame, per channel.
    pub chunk_size: usize,
    /// Case-insensitive substring matched against device names.
    pub preferred_device: Option<String>,
    pub gate_enabled: bool,
    /// Normalized RMS threshold in [0, 1] over i16 full scale.
    pub activity_threshold: f32,
    /// Below-threshold frames still classified as speech after the last
    /// above-threshold frame.
    pub hangover_frames: u32,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub diagnostics_enabled: bool,
    pub diagnostics_interval_ms: u64,
    /// Observed/target sample-rate deviation that flags drift.
    pub drift_tolerance: f32,
    pub read_retry_attempts: u32,
    pub read_retry_backoff_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Defaults match the Seeed 2-mic voicecard deployment this pipeline
        // was built around.
        Self {
            sample_rate_hz: 48_000,
            channels: 2,
            chunk_size: 1024,
            preferred_device: Some("seeed".to_string()),
            gate_enabled: true,
            activity_threshold: 0.003,
            hangover_frames: 14,
            queue_capacity: 64,
            overflow_policy: OverflowPolicy::DropNewest,
            diagnostics_enabled: true,
            diagnostics_interval_ms: 1000,
            drift_tolerance: 0.05,
            read_retry_attempts: 3,
            read_retry_backoff_ms: 50,
            stop_timeout_ms: 2000,
        }
    }
}

impl PipelineConfig {
    /// Resolve invalid fields to their defaults, warning for each one.
    /// Never fails: a broken field is not a reason to lose the microphone.
    pub fn sanitize(mut self) -> Self {
        let defaults = Self::default();

        if self.sample_rate_hz == 0 {
            tracing::warn!(
                "invalid sample_rate_hz 0, falling back to {}",
                defaults.sample_rate_hz
            );
            self.sample_rate_hz = defaults.sample_rate_hz;
        }
        if self.channels == 0 {
            tracing::warn!("invalid channels 0, falling back to {}", defaults.channels);
            self.channels = defaults.channels;
        }
        if self.chunk_size == 0 {
            tracing::warn!(
                "invalid chunk_size 0, falling back to {}",
                defaults.chunk_size
            );
            self.chunk_size = defaults.chunk_size;
        }
        if !self.activity_threshold.is_finite() || self.activity_threshold < 0.0 {
            tracing::warn!(
                "invalid activity_threshold {}, falling back to {}",
                self.activity_threshold,
                defaults.activity_threshold
            );
            self.activity_threshold = defaults.activity_threshold;
        }
        if self.queue_capacity == 0 {
            tracing::warn!(
                "invalid queue_capacity 0, falling back to {}",
                defaults.queue_capacity
            );
            self.queue_capacity = defaults.queue_capacity;
        }
        if self.diagnostics_interval_ms == 0 {
            tracing::warn!(
                "invalid diagnostics_interval_ms 0, falling back to {}",
                defaults.diagnostics_interval_ms
            );
            self.diagnostics_interval_ms = defaults.diagnostics_interval_ms;
        }
        if !self.drift_tolerance.is_finite() || self.drift_tolerance <= 0.0 {
            tracing::warn!(
                "invalid drift_tolerance {}, falling back to {}",
                self.drift_tolerance,
                defaults.drift_tolerance
            );
            self.drift_tolerance = defaults.drift_tolerance;
        }

        self
    }

    /// Interleaved samples per frame.
    pub fn frame_len(&self) -> usize {
        self.chunk_size * self.channels as usize
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate_hz as f64)
    }

    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_millis(self.diagnostics_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
