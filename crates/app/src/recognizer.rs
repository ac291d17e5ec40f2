use respeak_audio::{AudioFrame, HandoffQueue};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One recognition hypothesis for the current speech segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hypothesis {
    Partial(String),
    Final(String),
}

/// External recognition engine boundary.
///
/// The pipeline has no dependency on hypothesis content, only on the adapter
/// draining frames at or above the rate they are produced; sustained slower
/// draining is absorbed by the handoff queue's overflow policy.
pub trait RecognizerAdapter: Send {
    /// Feed one frame; returns any hypotheses ready so far.
    fn submit(&mut self, frame: &AudioFrame) -> anyhow::Result<Vec<Hypothesis>>;

    /// Flush at end-of-stream; returns the last final hypothesis, if any.
    fn finalize(&mut self) -> anyhow::Result<Option<Hypothesis>>;
}

/// Debug adapter: counts frames and logs, produces no hypotheses.
#[derive(Default)]
pub struct LoggingRecognizer {
    frames: u64,
}

impl RecognizerAdapter for LoggingRecognizer {
    fn submit(&mut self, frame: &AudioFrame) -> anyhow::Result<Vec<Hypothesis>> {
        self.frames += 1;
        tracing::trace!(seq = frame.seq, "recognizer received frame");
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> anyhow::Result<Option<Hypothesis>> {
        tracing::info!(frames = self.frames, "recognizer stream finished");
        Ok(None)
    }
}

/// Drain the handoff queue into the adapter until the end-of-stream sentinel.
///
/// Runs on its own thread; terminates when the sentinel is observed, never
/// blocks forever past shutdown.
pub fn spawn_consumer(
    queue: Arc<HandoffQueue>,
    mut adapter: Box<dyn RecognizerAdapter>,
) -> JoinHandle<u64> {
    thread::Builder::new()
        .name("recognizer".to_string())
        .spawn(move || {
            let mut submitted = 0u64;
            while let Some(frame) = queue.pop() {
                match adapter.submit(&frame) {
                    Ok(hypotheses) => {
                        submitted += 1;
                        for hypothesis in hypotheses {
                            match hypothesis {
                                Hypothesis::Partial(text) => {
                                    tracing::debug!(%text, "partial hypothesis")
                                }
                                Hypothesis::Final(text) => {
                                    tracing::info!(%text, "final hypothesis")
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Recognition errors do not stop capture; the frame
                        // is simply lost to recognition.
                        tracing::error!("recognizer rejected frame {}: {}", frame.seq, e);
                    }
                }
            }
            if let Ok(Some(Hypothesis::Final(text))) = adapter.finalize() {
                tracing::info!(%text, "final hypothesis");
            }
            submitted
        })
        .expect("failed to spawn recognizer thread")
}
