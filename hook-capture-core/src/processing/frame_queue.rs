use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::models::audio_models::AudioFrame;

/// Returned by `dequeue` once the queue has been closed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("frame queue closed")]
pub struct Cancelled;

#[derive(Debug)]
struct QueueInner {
    frames: VecDeque<AudioFrame>,
    closed: bool,
}

/// Bounded FIFO hand-off between capture producers and pipeline workers.
///
/// Overflow behavior: the new frame is dropped and counted. Producers sit on
/// the real-time capture path, so `enqueue` never waits for space.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a frame without blocking.
    ///
    /// Returns `false` if the queue is full or closed; the frame is dropped.
    pub fn enqueue(&self, frame: AudioFrame) -> bool {
        let rejected_closed = {
            let mut inner = self.inner.lock();
            if !inner.closed && inner.frames.len() < self.capacity {
                inner.frames.push_back(frame);
                None
            } else {
                Some(inner.closed)
            }
        };

        match rejected_closed {
            None => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                self.available.notify_one();
                true
            }
            Some(closed) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if closed {
                    log::debug!("frame queue closed, dropping frame");
                } else if dropped == 1 || dropped % 100 == 0 {
                    log::warn!("frame queue full ({} frames), {} frames dropped so far", self.capacity, dropped);
                }
                false
            }
        }
    }

    /// Take the oldest frame, waiting while the queue is empty.
    ///
    /// Returns `Cancelled` as soon as the queue is closed, even if frames
    /// are still pending.
    pub fn dequeue(&self) -> Result<AudioFrame, Cancelled> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(Cancelled);
            }
            if let Some(frame) = inner.frames.pop_front() {
                return Ok(frame);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like `dequeue`, but gives up after `timeout` with `Ok(None)`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<AudioFrame>, Cancelled> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Cancelled);
        }
        if inner.frames.is_empty() {
            self.available.wait_for(&mut inner, timeout);
        }
        if inner.closed {
            return Err(Cancelled);
        }
        Ok(inner.frames.pop_front())
    }

    /// Close the queue: wake every waiting consumer and reject new frames.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Discard all pending frames, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let pending = inner.frames.len();
        inner.frames.clear();
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of frames currently waiting.
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames accepted since creation.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Total frames dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use crate::models::audio_models::SourceTag;

    fn frame(byte: u8) -> AudioFrame {
        AudioFrame::copy_from(&[byte; 4], SourceTag::new("test"))
    }

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::new(10);
        assert!(queue.enqueue(frame(1)));
        assert!(queue.enqueue(frame(2)));
        assert!(queue.enqueue(frame(3)));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue().unwrap().bytes()[0], 1);
        assert_eq!(queue.dequeue().unwrap().bytes()[0], 2);
        assert_eq!(queue.dequeue().unwrap().bytes()[0], 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let queue = FrameQueue::new(1000);
        let started = Instant::now();
        let accepted = (0..1500).filter(|i| queue.enqueue(frame(*i as u8))).count();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(accepted, 1000);
        assert_eq!(queue.accepted(), 1000);
        assert_eq!(queue.dropped(), 500);
        assert_eq!(queue.len(), 1000);
        // The oldest frame survives.
        assert_eq!(queue.dequeue().unwrap().bytes()[0], 0);
    }

    #[test]
    fn close_interrupts_waiting_consumer() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(consumer.join().unwrap(), Err(Cancelled));
        assert!(queue.is_closed());
    }

    #[test]
    fn closed_queue_rejects_frames() {
        let queue = FrameQueue::new(4);
        queue.close();
        assert!(!queue.enqueue(frame(1)));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.dequeue(), Err(Cancelled));
    }

    #[test]
    fn consumer_wakes_on_enqueue() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue().map(|f| f.bytes()[0]))
        };

        thread::sleep(Duration::from_millis(20));
        assert!(queue.enqueue(frame(7)));
        assert_eq!(consumer.join().unwrap(), Ok(7));
    }

    #[test]
    fn dequeue_timeout_returns_none_when_idle() {
        let queue = FrameQueue::new(4);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(10)), Ok(None));
        queue.enqueue(frame(5));
        let got = queue.dequeue_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(got.map(|f| f.bytes()[0]), Some(5));
    }

    #[test]
    fn clear_discards_pending() {
        let queue = FrameQueue::new(4);
        queue.enqueue(frame(1));
        queue.enqueue(frame(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }
}
