use crate::energy::EnergyCalculator;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub enabled: bool,
    /// Normalized RMS threshold in [0, 1].
    pub threshold: f32,
    /// Below-threshold frames still classified as speech after the last
    /// above-threshold frame.
    pub hangover_frames: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.003,
            hangover_frames: 14,
        }
    }
}

/// Runtime-adjustable threshold. A new value takes effect on the next
/// classified frame, never retroactively.
#[derive(Clone)]
pub struct ThresholdHandle(Arc<AtomicU32>);

impl ThresholdHandle {
    pub fn new(threshold: f32) -> Self {
        Self(Arc::new(AtomicU32::new(threshold.to_bits())))
    }

    pub fn set(&self, threshold: f32) {
        self.0.store(threshold.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub is_speech: bool,
    /// Hangover counter value that produced this decision,
    /// always within [0, hangover_frames].
    pub hangover_remaining: u32,
    pub energy: f32,
}

/// Per-frame speech/silence classifier with hangover hysteresis.
///
/// Pure function of (frame, prior counter): never reorders or buffers frames
/// across calls.
pub struct VoiceActivityGate {
    threshold: ThresholdHandle,
    hangover_max: u32,
    hangover: u32,
    energy_calc: EnergyCalculator,
}

impl VoiceActivityGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            threshold: ThresholdHandle::new(config.threshold),
            hangover_max: config.hangover_frames,
            hangover: 0,
            energy_calc: EnergyCalculator::new(),
        }
    }

    /// Handle for operator tuning of the threshold while the gate runs.
    pub fn threshold_handle(&self) -> ThresholdHandle {
        self.threshold.clone()
    }

    pub fn classify(&mut self, samples: &[i16]) -> GateDecision {
        let energy = self.energy_calc.calculate_rms(samples);
        let threshold = self.threshold.get();

        if energy >= threshold {
            self.hangover = self.hangover_max;
            GateDecision {
                is_speech: true,
                hangover_remaining: self.hangover,
                energy,
            }
        } else if self.hangover > 0 {
            // Trailing speech tail: keep passing frames while the counter
            // drains so low-energy endings are not cut off.
            self.hangover -= 1;
            GateDecision {
                is_speech: true,
                hangover_remaining: self.hangover,
                energy,
            }
        } else {
            GateDecision {
                is_speech: false,
                hangover_remaining: 0,
                energy,
            }
        }
    }

    pub fn reset(&mut self) {
        self.hangover = 0;
    }
}
