use crate::frame::AudioFrame;
use parking_lot::{Condvar, Mutex};
use respeak_foundation::OverflowPolicy;
use respeak_telemetry::PipelineMetrics;
use std::time::Duration;

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full under drop-newest: the incoming frame was discarded.
    DroppedNewest,
    /// Queue full under evict-oldest: the oldest queued frame was discarded.
    EvictedOldest,
}

struct Inner {
    frames: std::collections::VecDeque<AudioFrame>,
    closed: bool,
}

/// Bounded FIFO decoupling the capture producer from the recognition
/// consumer.
///
/// `push` never blocks: a full queue resolves per the configured overflow
/// policy and counts the discarded frame. `pop` blocks until a frame or
/// end-of-stream is available. The end-of-stream signal is observed only
/// after every retained frame ahead of it, and is sticky once observed.
pub struct HandoffQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    metrics: PipelineMetrics,
}

impl HandoffQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy, metrics: PipelineMetrics) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");
        Self {
            inner: Mutex::new(Inner {
                frames: std::collections::VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            policy,
            metrics,
        }
    }

    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        let mut inner = self.inner.lock();
        if inner.closed {
            // Late frame racing shutdown; the consumer already saw (or will
            // see) end-of-stream, so this frame cannot be delivered in order.
            self.metrics.record_dropped_frame();
            return PushOutcome::DroppedNewest;
        }

        let outcome = if inner.frames.len() < self.capacity {
            inner.frames.push_back(frame);
            PushOutcome::Queued
        } else {
            match self.policy {
                OverflowPolicy::DropNewest => {
                    self.metrics.record_dropped_frame();
                    PushOutcome::DroppedNewest
                }
                OverflowPolicy::EvictOldest => {
                    inner.frames.pop_front();
                    inner.frames.push_back(frame);
                    self.metrics.record_dropped_frame();
                    PushOutcome::EvictedOldest
                }
            }
        };

        self.metrics.set_queue_depth(inner.frames.len());
        drop(inner);
        self.available.notify_one();
        outcome
    }

    /// Blocks until a frame is available; `None` means end-of-stream.
    pub fn pop(&self) -> Option<AudioFrame> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                self.metrics.set_queue_depth(inner.frames.len());
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like `pop`, but gives up after `timeout`. `Ok(None)` is end-of-stream;
    /// `Err(())` is a timeout with the stream still open.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<AudioFrame>, ()> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                self.metrics.set_queue_depth(inner.frames.len());
                return Ok(Some(frame));
            }
            if inner.closed {
                return Ok(None);
            }
            if self.available.wait_for(&mut inner, timeout).timed_out() {
                return Err(());
            }
        }
    }

    /// Mark end-of-stream. Retained frames stay poppable; idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![0i16; 8],
            seq,
            timestamp: Instant::now(),
            sample_rate: 48_000,
            channels: 1,
        }
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> (HandoffQueue, PipelineMetrics) {
        let metrics = PipelineMetrics::default();
        (
            HandoffQueue::new(capacity, policy, metrics.clone()),
            metrics,
        )
    }

    #[test]
    fn fifo_order_preserved() {
        let (q, _) = queue(4, OverflowPolicy::DropNewest);
        for seq in 0..4 {
            assert_eq!(q.push(frame(seq)), PushOutcome::Queued);
        }
        for seq in 0..4 {
            assert_eq!(q.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn depth_never_exceeds_capacity() {
        for policy in [OverflowPolicy::DropNewest, OverflowPolicy::EvictOldest] {
            let (q, _) = queue(3, policy);
            for seq in 0..20 {
                q.push(frame(seq));
                assert!(q.depth() <= 3);
            }
        }
    }

    #[test]
    fn drop_newest_retains_earliest() {
        let (q, metrics) = queue(3, OverflowPolicy::DropNewest);
        for seq in 0..8 {
            q.push(frame(seq));
        }
        assert_eq!(metrics.frames_dropped(), 5);
        assert_eq!(q.depth(), 3);
        for seq in 0..3 {
            assert_eq!(q.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn evict_oldest_retains_most_recent_in_order() {
        let (q, metrics) = queue(3, OverflowPolicy::EvictOldest);
        for seq in 0..8 {
            q.push(frame(seq));
        }
        assert_eq!(metrics.frames_dropped(), 5);
        // Exactly the most recent `capacity` frames, FIFO among them.
        for seq in 5..8 {
            assert_eq!(q.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn overflow_by_five_drops_exactly_five() {
        let capacity = 16;
        let (q, metrics) = queue(capacity, OverflowPolicy::DropNewest);
        for seq in 0..(capacity as u64 + 5) {
            q.push(frame(seq));
        }
        assert_eq!(metrics.frames_dropped(), 5);
        assert_eq!(q.depth(), capacity);
    }

    #[test]
    fn sentinel_after_all_retained_frames() {
        let (q, _) = queue(8, OverflowPolicy::DropNewest);
        for seq in 0..3 {
            q.push(frame(seq));
        }
        q.close();
        for seq in 0..3 {
            assert_eq!(q.pop().unwrap().seq, seq);
        }
        assert!(q.pop().is_none());
        // End-of-stream is sticky.
        assert!(q.pop().is_none());
    }

    #[test]
    fn push_after_close_is_counted_not_delivered() {
        let (q, metrics) = queue(8, OverflowPolicy::EvictOldest);
        q.close();
        assert_eq!(q.push(frame(0)), PushOutcome::DroppedNewest);
        assert_eq!(metrics.frames_dropped(), 1);
        assert!(q.pop().is_none());
    }

    #[test]
    fn pop_blocks_until_push() {
        let (q, _) = queue(4, OverflowPolicy::DropNewest);
        let q = Arc::new(q);
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                q.push(frame(42));
            })
        };
        let popped = q.pop().unwrap();
        assert_eq!(popped.seq, 42);
        producer.join().unwrap();
    }

    #[test]
    fn pop_timeout_reports_still_open() {
        let (q, _) = queue(4, OverflowPolicy::DropNewest);
        assert!(q.pop_timeout(Duration::from_millis(20)).is_err());
        q.close();
        assert!(matches!(q.pop_timeout(Duration::from_millis(20)), Ok(None)));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let (q, _) = queue(4, OverflowPolicy::DropNewest);
        let q = Arc::new(q);
        let consumer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || q.pop())
        };
        std::thread::sleep(Duration::from_millis(50));
        q.close();
        assert!(consumer.join().unwrap().is_none());
    }
}
