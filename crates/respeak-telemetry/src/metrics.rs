use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared counters for cross-thread pipeline monitoring.
///
/// Updated by the capture thread and the handoff queue, read by the
/// diagnostics monitor. All fields are lock-free except the last-frame
/// timestamp, which is never touched while the capture thread is inside a
/// device read.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    /// Frames successfully read from the device.
    pub frames_read: Arc<AtomicU64>,
    /// Frames discarded by the queue overflow policy.
    pub frames_dropped: Arc<AtomicU64>,
    /// Sample blocks lost inside the device callback before framing.
    pub capture_overruns: Arc<AtomicU64>,
    /// Current handoff queue occupancy.
    pub queue_depth: Arc<AtomicUsize>,
    pub last_frame_time: Arc<RwLock<Option<Instant>>>,
}

impl PipelineMetrics {
    pub fn record_frame_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame and stamp it for stall reporting. The capture loop
    /// calls this only while diagnostics are enabled; otherwise the plain
    /// counter skips the lock write entirely.
    pub fn record_frame_read_at(&self, timestamp: Instant) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
        *self.last_frame_time.write() = Some(timestamp);
    }

    pub fn record_dropped_frame(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_overrun(&self) {
        self.capture_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn last_frame_time(&self) -> Option<Instant> {
        *self.last_frame_time.read()
    }
}
