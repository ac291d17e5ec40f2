use crate::recognizer::{spawn_consumer, RecognizerAdapter};
use respeak_audio::{CaptureSession, DeviceResolver, HandoffQueue};
use respeak_foundation::{AudioError, CaptureState, PipelineConfig};
use respeak_telemetry::{DiagnosticsMonitor, MonitorConfig, PipelineMetrics, TracingSink};
use respeak_vad::{GateConfig, ThresholdHandle, VoiceActivityGate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// The assembled capture pipeline: device capture feeding the gate, the
/// handoff queue, the recognizer consumer, and the diagnostics monitor.
pub struct Pipeline {
    session: CaptureSession,
    consumer: JoinHandle<u64>,
    monitor: Option<JoinHandle<()>>,
    monitor_running: Arc<AtomicBool>,
    threshold: ThresholdHandle,
    metrics: PipelineMetrics,
}

impl Pipeline {
    /// Resolve the device and start every pipeline thread.
    pub fn start(
        config: PipelineConfig,
        adapter: Box<dyn RecognizerAdapter>,
    ) -> Result<Self, AudioError> {
        let resolver = DeviceResolver::new();
        let descriptor = resolver.resolve(config.preferred_device.as_deref())?;

        let metrics = PipelineMetrics::default();
        let queue = Arc::new(HandoffQueue::new(
            config.queue_capacity,
            config.overflow_policy,
            metrics.clone(),
        ));

        let gate = VoiceActivityGate::new(&GateConfig {
            enabled: config.gate_enabled,
            threshold: config.activity_threshold,
            hangover_frames: config.hangover_frames,
        });
        let threshold = gate.threshold_handle();

        let monitor_config = MonitorConfig {
            interval: config.diagnostics_interval(),
            target_sample_rate_hz: config.sample_rate_hz,
            chunk_size: config.chunk_size,
            drift_tolerance: config.drift_tolerance,
        };
        let diagnostics_enabled = config.diagnostics_enabled;

        let session = CaptureSession::start(
            descriptor,
            config,
            gate,
            Arc::clone(&queue),
            metrics.clone(),
        )?;

        let consumer = spawn_consumer(queue, adapter);

        let monitor_running = Arc::new(AtomicBool::new(true));
        let monitor = if diagnostics_enabled {
            let monitor =
                DiagnosticsMonitor::new(monitor_config, metrics.clone(), Box::new(TracingSink));
            Some(monitor.spawn(Arc::clone(&monitor_running)))
        } else {
            None
        };

        Ok(Self {
            session,
            consumer,
            monitor,
            monitor_running,
            threshold,
            metrics,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Handle for operator tuning of the activity threshold at runtime.
    pub fn threshold_handle(&self) -> ThresholdHandle {
        self.threshold.clone()
    }

    /// Stop capture, wait for the consumer to observe the sentinel, and
    /// shut the monitor down. Returns the terminal fault if the session
    /// died rather than drained.
    pub fn shutdown(self) -> Result<(), AudioError> {
        let result = self.session.stop();

        // The sentinel is guaranteed by stop(), so this join terminates.
        match self.consumer.join() {
            Ok(submitted) => tracing::info!(frames = submitted, "recognizer consumer finished"),
            Err(_) => tracing::error!("recognizer consumer panicked"),
        }

        self.monitor_running.store(false, Ordering::Relaxed);
        if let Some(monitor) = self.monitor {
            let _ = monitor.join();
        }

        result
    }
}
