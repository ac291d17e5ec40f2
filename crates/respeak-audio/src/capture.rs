use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::device::{DeviceDescriptor, DeviceResolver};
use crate::frame::AudioFrame;
use crate::queue::HandoffQueue;
use respeak_foundation::{AudioError, CaptureState, PipelineConfig, SessionState, ShutdownToken};
use respeak_telemetry::PipelineMetrics;
use respeak_vad::VoiceActivityGate;

const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    TimedOut,
    Disconnected(String),
}

/// Blocking source of interleaved sample blocks. Implemented by the cpal
/// stream in production and by scripted sources in tests.
///
/// Sources are constructed on the capture thread, so no `Send` bound.
pub trait FrameSource {
    fn read(&mut self, timeout: Duration) -> Result<Vec<i16>, ReadError>;
}

/// cpal-backed frame source: the device callback converts samples to i16 and
/// hands blocks to the capture thread over a bounded channel. The callback
/// never blocks; blocks that would overflow the channel are counted as
/// capture overruns.
pub struct CpalFrameSource {
    _stream: cpal::Stream,
    rx: Receiver<Vec<i16>>,
    stream_failed: Arc<AtomicBool>,
}

impl CpalFrameSource {
    pub fn open(
        descriptor: &DeviceDescriptor,
        config: &PipelineConfig,
        metrics: PipelineMetrics,
    ) -> Result<Self, AudioError> {
        let resolver = DeviceResolver::new();
        let device = resolver.open(descriptor)?;
        let (stream_config, sample_format) = negotiate_format(&device, descriptor, config)?;

        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(32);
        let stream_failed = Arc::new(AtomicBool::new(false));

        let err_failed = Arc::clone(&stream_failed);
        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("audio stream error: {}", err);
            err_failed.store(true, Ordering::SeqCst);
        };

        let deliver = move |samples: Vec<i16>| {
            if tx.try_send(samples).is_err() {
                metrics.record_capture_overrun();
            }
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &_| deliver(data.to_vec()),
                err_fn,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &_| {
                    let converted = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
                        .collect();
                    deliver(converted);
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &_| {
                    let converted = data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                    deliver(converted);
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(AudioError::DeviceOpenError {
                    device: descriptor.name.clone(),
                    sample_rate: config.sample_rate_hz,
                    channels: config.channels,
                    reason: format!("unsupported sample format {:?}", other),
                });
            }
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            rx,
            stream_failed,
        })
    }
}

impl FrameSource for CpalFrameSource {
    fn read(&mut self, timeout: Duration) -> Result<Vec<i16>, ReadError> {
        if self.stream_failed.load(Ordering::SeqCst) {
            return Err(ReadError::Disconnected("stream reported an error".into()));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(block) => Ok(block),
            Err(RecvTimeoutError::Timeout) => Err(ReadError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ReadError::Disconnected("stream callback gone".into()))
            }
        }
    }
}

/// No automatic rate conversion: the device must accept the configured
/// rate and channel count exactly, or opening fails.
fn negotiate_format(
    device: &cpal::Device,
    descriptor: &DeviceDescriptor,
    config: &PipelineConfig,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let requested = cpal::SampleRate(config.sample_rate_hz);
    for supported in device.supported_input_configs()? {
        if supported.channels() == config.channels
            && supported.min_sample_rate() <= requested
            && requested <= supported.max_sample_rate()
        {
            return Ok((
                StreamConfig {
                    channels: config.channels,
                    sample_rate: requested,
                    buffer_size: cpal::BufferSize::Default,
                },
                supported.sample_format(),
            ));
        }
    }
    Err(AudioError::DeviceOpenError {
        device: descriptor.name.clone(),
        sample_rate: config.sample_rate_hz,
        channels: config.channels,
        reason: "no supported input config matches the requested format".into(),
    })
}

/// Handle to a running capture session. Owns the dedicated capture thread;
/// `stop()` is safe to call from any thread and never blocks indefinitely.
pub struct CaptureSession {
    handle: Option<JoinHandle<()>>,
    shutdown: ShutdownToken,
    state: SessionState,
    fault: Arc<Mutex<Option<AudioError>>>,
    queue: Arc<HandoffQueue>,
    stop_timeout: Duration,
}

impl CaptureSession {
    /// Open the resolved device and start the continuous read loop on a
    /// dedicated thread. Returns once the device is running, or with the
    /// fatal error that prevented it.
    pub fn start(
        descriptor: DeviceDescriptor,
        config: PipelineConfig,
        gate: VoiceActivityGate,
        queue: Arc<HandoffQueue>,
        metrics: PipelineMetrics,
    ) -> Result<Self, AudioError> {
        let source_metrics = metrics.clone();
        let source_config = config.clone();
        Self::start_with(
            move || CpalFrameSource::open(&descriptor, &source_config, source_metrics),
            config,
            gate,
            queue,
            metrics,
        )
    }

    /// Like `start`, but with an arbitrary frame source factory. The factory
    /// runs on the capture thread, so the source itself need not be `Send`.
    pub fn start_with<S, F>(
        factory: F,
        config: PipelineConfig,
        gate: VoiceActivityGate,
        queue: Arc<HandoffQueue>,
        metrics: PipelineMetrics,
    ) -> Result<Self, AudioError>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S, AudioError> + Send + 'static,
    {
        let shutdown = ShutdownToken::new();
        let state = SessionState::new();
        let fault: Arc<Mutex<Option<AudioError>>> = Arc::new(Mutex::new(None));
        let stop_timeout = config.stop_timeout();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        let worker = CaptureWorker {
            config,
            gate,
            queue: Arc::clone(&queue),
            metrics,
            shutdown: shutdown.clone(),
            state: state.clone(),
            fault: Arc::clone(&fault),
        };

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || worker.run(factory, ready_tx))
            .map_err(|e| AudioError::Fatal(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                handle: Some(handle),
                shutdown,
                state,
                fault,
                queue,
                stop_timeout,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                shutdown.trigger();
                Err(AudioError::Fatal(
                    "capture thread did not report readiness in time".into(),
                ))
            }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.current()
    }

    /// Fatal error recorded by the capture thread, if any.
    pub fn take_fault(&self) -> Option<AudioError> {
        self.fault.lock().take()
    }

    /// Stop issuing reads, drain, and deliver the end-of-stream sentinel.
    ///
    /// Waits up to the configured stop timeout for the capture thread to
    /// reach a terminal state; if the device read is wedged, the thread is
    /// abandoned and the sentinel is pushed here so the consumer still
    /// terminates. Returns the terminal fault when the session died rather
    /// than drained.
    pub fn stop(mut self) -> Result<(), AudioError> {
        self.shutdown.trigger();

        let deadline = Instant::now() + self.stop_timeout;
        while Instant::now() < deadline && !self.state.current().is_terminal() {
            thread::sleep(Duration::from_millis(10));
        }

        if self.state.current().is_terminal() {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        } else {
            tracing::warn!("capture thread did not drain in time, forcing close");
            self.handle.take();
            self.queue.close();
        }

        match self.fault.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // A dropped session must still unblock the consumer.
        if self.handle.is_some() {
            self.shutdown.trigger();
            self.queue.close();
        }
    }
}

struct CaptureWorker {
    config: PipelineConfig,
    gate: VoiceActivityGate,
    queue: Arc<HandoffQueue>,
    metrics: PipelineMetrics,
    shutdown: ShutdownToken,
    state: SessionState,
    fault: Arc<Mutex<Option<AudioError>>>,
}

impl CaptureWorker {
    fn run<S, F>(mut self, factory: F, ready_tx: Sender<Result<(), AudioError>>)
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, AudioError>,
    {
        self.transition(CaptureState::Opening);

        let source = match factory() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("failed to open capture device: {}", e);
                self.transition(CaptureState::Faulted);
                self.queue.close();
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        self.transition(CaptureState::Running);
        let _ = ready_tx.send(Ok(()));

        if self.read_loop(source) {
            self.transition(CaptureState::Draining);
            self.queue.close();
            self.transition(CaptureState::Closed);
            tracing::info!("capture session closed");
        } else {
            // Retry budget exhausted.
            self.transition(CaptureState::Faulted);
            self.queue.close();
        }
    }

    /// Continuous read loop. Returns true on cooperative shutdown, false
    /// after the retry budget is exhausted (fault already recorded).
    fn read_loop<S: FrameSource>(&mut self, mut source: S) -> bool {
        let frame_len = self.config.frame_len();
        // Generous read timeout: several frame periods, floor of 100ms.
        let read_timeout = (self.config.frame_duration() * 4).max(Duration::from_millis(100));

        let mut pending: Vec<i16> = Vec::with_capacity(frame_len * 2);
        let mut mono_scratch: Vec<i16> = Vec::new();
        let mut seq: u64 = 0;
        let mut failed_reads: u32 = 0;

        while !self.shutdown.is_triggered() {
            match source.read(read_timeout) {
                Ok(block) => {
                    failed_reads = 0;
                    pending.extend_from_slice(&block);
                    while pending.len() >= frame_len {
                        let samples: Vec<i16> = pending.drain(..frame_len).collect();
                        seq += 1;
                        self.process_frame(samples, seq, &mut mono_scratch);
                    }
                }
                Err(err) => {
                    failed_reads += 1;
                    if failed_reads > self.config.read_retry_attempts {
                        let fault = AudioError::CaptureLost {
                            attempts: failed_reads,
                            reason: match err {
                                ReadError::TimedOut => "read timed out".into(),
                                ReadError::Disconnected(reason) => reason,
                            },
                        };
                        tracing::error!("{}", fault);
                        *self.fault.lock() = Some(fault);
                        return false;
                    }
                    // Cancellation wins over retry.
                    if self.shutdown.is_triggered() {
                        break;
                    }
                    let backoff = Duration::from_millis(
                        self.config.read_retry_backoff_ms << (failed_reads - 1).min(10),
                    )
                    .min(MAX_BACKOFF);
                    tracing::warn!(
                        attempt = failed_reads,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient read failure, retrying"
                    );
                    thread::sleep(backoff);
                }
            }
        }
        true
    }

    fn process_frame(&mut self, samples: Vec<i16>, seq: u64, mono_scratch: &mut Vec<i16>) {
        let frame = AudioFrame {
            samples,
            seq,
            timestamp: Instant::now(),
            sample_rate: self.config.sample_rate_hz,
            channels: self.config.channels,
        };
        // The stall timestamp only feeds diagnostics; skip the lock write
        // when the monitor is off.
        if self.config.diagnostics_enabled {
            self.metrics.record_frame_read_at(frame.timestamp);
        } else {
            self.metrics.record_frame_read();
        }

        let pass = if self.config.gate_enabled {
            let decision = if frame.channels > 1 {
                frame.fold_mono_into(mono_scratch);
                self.gate.classify(mono_scratch)
            } else {
                self.gate.classify(&frame.samples)
            };
            tracing::trace!(
                seq = frame.seq,
                is_speech = decision.is_speech,
                energy = decision.energy,
                hangover = decision.hangover_remaining,
                "gate decision"
            );
            decision.is_speech
        } else {
            true
        };

        if pass {
            self.queue.push(frame);
        }
    }

    fn transition(&self, next: CaptureState) {
        if let Err(e) = self.state.transition(next) {
            tracing::error!("capture state error: {}", e);
        }
    }
}
