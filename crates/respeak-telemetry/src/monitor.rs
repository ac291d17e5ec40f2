use crate::metrics::PipelineMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub target_sample_rate_hz: u32,
    /// Samples per frame, per channel.
    pub chunk_size: usize,
    /// Relative deviation at which a snapshot is flagged as drifting.
    pub drift_tolerance: f32,
}

/// One periodic reading of pipeline health. The previous snapshot is
/// discarded; no history is retained here.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub target_sample_rate_hz: u32,
    pub observed_sample_rate_hz: f64,
    pub drifting: bool,
    /// Process CPU load, percent of one core.
    pub process_load_pct: f32,
    pub queue_depth: usize,
    pub frames_dropped: u64,
    /// When the capture loop last produced a frame, if it has yet.
    pub last_frame_at: Option<Instant>,
    pub taken_at: Instant,
}

impl DiagnosticsSnapshot {
    /// Time since the last captured frame, measured at snapshot time.
    pub fn idle(&self) -> Option<Duration> {
        self.last_frame_at
            .map(|at| self.taken_at.saturating_duration_since(at))
    }
}

/// Receives snapshots; the monitor makes no assumption about how they are
/// persisted or displayed.
pub trait DiagnosticsSink: Send {
    fn publish(&self, snapshot: &DiagnosticsSnapshot);
}

/// Default sink: one structured log line per snapshot, warning on drift.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn publish(&self, snapshot: &DiagnosticsSnapshot) {
        let idle_ms = snapshot.idle().map(|idle| idle.as_millis() as u64);
        if snapshot.drifting {
            warn!(
                observed_hz = snapshot.observed_sample_rate_hz,
                target_hz = snapshot.target_sample_rate_hz,
                load_pct = snapshot.process_load_pct,
                queue_depth = snapshot.queue_depth,
                dropped = snapshot.frames_dropped,
                idle_ms = ?idle_ms,
                "sample rate drifting"
            );
        } else {
            debug!(
                observed_hz = snapshot.observed_sample_rate_hz,
                target_hz = snapshot.target_sample_rate_hz,
                load_pct = snapshot.process_load_pct,
                queue_depth = snapshot.queue_depth,
                dropped = snapshot.frames_dropped,
                idle_ms = ?idle_ms,
                "diagnostics"
            );
        }
    }
}

pub fn observed_rate(delta_frames: u64, chunk_size: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    delta_frames as f64 * chunk_size as f64 / secs
}

/// A stalled interval observes 0 Hz, which is 100% deviation and flags.
pub fn is_drifting(observed_hz: f64, target_hz: u32, tolerance: f32) -> bool {
    if target_hz == 0 {
        return false;
    }
    let deviation = (observed_hz - target_hz as f64).abs() / target_hz as f64;
    deviation >= tolerance as f64
}

/// Periodic sampler of throughput, load, and queue depth.
///
/// Runs on its own timer-driven thread and only reads the shared counters;
/// it never touches a lock the capture path holds during a device read.
/// Advisory only: a drifting flag never alters pipeline behavior.
pub struct DiagnosticsMonitor {
    config: MonitorConfig,
    metrics: PipelineMetrics,
    sink: Box<dyn DiagnosticsSink>,
}

impl DiagnosticsMonitor {
    pub fn new(config: MonitorConfig, metrics: PipelineMetrics, sink: Box<dyn DiagnosticsSink>) -> Self {
        Self {
            config,
            metrics,
            sink,
        }
    }

    pub fn spawn(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("diagnostics".to_string())
            .spawn(move || self.run(running))
            .expect("failed to spawn diagnostics thread")
    }

    fn run(self, running: Arc<AtomicBool>) {
        let mut system = System::new_all();
        system.refresh_all();
        let pid = sysinfo::get_current_pid().ok();

        let mut last_sample = Instant::now();
        let mut last_frames = self.metrics.frames_read();

        while running.load(Ordering::Relaxed) {
            // Sleep in slices so shutdown is not delayed by a full interval.
            let deadline = last_sample + self.config.interval;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let remaining = deadline.saturating_duration_since(now);
                thread::sleep(remaining.min(Duration::from_millis(50)));
            }

            let now = Instant::now();
            let frames = self.metrics.frames_read();
            let delta = frames.saturating_sub(last_frames);
            let elapsed = now.duration_since(last_sample);
            last_sample = now;
            last_frames = frames;

            let observed = observed_rate(delta, self.config.chunk_size, elapsed);
            let snapshot = DiagnosticsSnapshot {
                target_sample_rate_hz: self.config.target_sample_rate_hz,
                observed_sample_rate_hz: observed,
                drifting: is_drifting(
                    observed,
                    self.config.target_sample_rate_hz,
                    self.config.drift_tolerance,
                ),
                process_load_pct: process_load(&mut system, pid),
                queue_depth: self.metrics.queue_depth(),
                frames_dropped: self.metrics.frames_dropped(),
                last_frame_at: self.metrics.last_frame_time(),
                taken_at: now,
            };

            self.sink.publish(&snapshot);
        }
    }
}

fn process_load(system: &mut System, pid: Option<Pid>) -> f32 {
    let Some(pid) = pid else {
        return 0.0;
    };
    system.refresh_all();
    system.process(pid).map(|p| p.cpu_usage()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_rate_from_frame_deltas() {
        // 48 frames of 1000 samples over one second.
        let rate = observed_rate(48, 1000, Duration::from_secs(1));
        assert!((rate - 48_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn five_percent_tolerance_against_48khz() {
        assert!(is_drifting(45_000.0, 48_000, 0.05));
        assert!(!is_drifting(47_000.0, 48_000, 0.05));
    }

    #[test]
    fn tolerance_boundary_divides_drift() {
        // 45600 is 5% below 48000.
        assert!(is_drifting(45_599.0, 48_000, 0.05));
        assert!(!is_drifting(45_601.0, 48_000, 0.05));
    }

    #[test]
    fn stalled_capture_is_maximal_drift() {
        assert!(is_drifting(0.0, 48_000, 0.05));
        assert_eq!(observed_rate(0, 1024, Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn unset_target_never_flags() {
        assert!(!is_drifting(0.0, 0, 0.05));
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        assert_eq!(observed_rate(10, 1024, Duration::ZERO), 0.0);
    }

    struct CollectingSink(std::sync::mpsc::Sender<DiagnosticsSnapshot>);

    impl DiagnosticsSink for CollectingSink {
        fn publish(&self, snapshot: &DiagnosticsSnapshot) {
            let _ = self.0.send(snapshot.clone());
        }
    }

    #[test]
    fn monitor_publishes_and_stops() {
        let metrics = PipelineMetrics::default();
        for _ in 0..10 {
            metrics.record_frame_read_at(Instant::now());
        }
        metrics.set_queue_depth(3);

        let (tx, rx) = std::sync::mpsc::channel();
        let monitor = DiagnosticsMonitor::new(
            MonitorConfig {
                interval: Duration::from_millis(100),
                target_sample_rate_hz: 48_000,
                chunk_size: 1024,
                drift_tolerance: 0.05,
            },
            metrics,
            Box::new(CollectingSink(tx)),
        );

        let running = Arc::new(AtomicBool::new(true));
        let handle = monitor.spawn(running.clone());

        let snapshot = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.target_sample_rate_hz, 48_000);
        assert!(snapshot.last_frame_at.is_some());
        assert!(snapshot.idle().is_some());
        // No frames arrived during the interval: a stall, flagged as drift.
        assert!(snapshot.drifting);

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn short_intervals_fire_on_time() {
        let (tx, rx) = std::sync::mpsc::channel();
        let monitor = DiagnosticsMonitor::new(
            MonitorConfig {
                interval: Duration::from_millis(10),
                target_sample_rate_hz: 48_000,
                chunk_size: 1024,
                drift_tolerance: 0.05,
            },
            PipelineMetrics::default(),
            Box::new(CollectingSink(tx)),
        );

        let running = Arc::new(AtomicBool::new(true));
        let handle = monitor.spawn(running.clone());

        let started = Instant::now();
        for _ in 0..5 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        // Five 10ms intervals; quantizing to the 50ms shutdown-poll slice
        // would take at least 250ms.
        assert!(started.elapsed() < Duration::from_millis(200));

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
