//! Input provider fed by the external trigger's `on_frame_captured` calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashMap;

use crate::models::audio_models::SourceTag;
use crate::models::error::CaptureError;
use crate::traits::audio_input::{AudioInput, InputProvider};

struct Subscriber {
    source: SourceTag,
    tx: Sender<Arc<[u8]>>,
    dropped: u64,
}

/// Outcome of one `HookFeed::deliver` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedDelivery {
    /// Subscribers that accepted the chunk.
    pub delivered: usize,
    /// Subscribers whose buffer was full; the chunk was dropped for them.
    pub dropped: usize,
}

/// Routes intercepted buffers to the capture inputs subscribed to their
/// source tag.
///
/// Each `open` registers one subscriber with room for `buffer_chunks`
/// pending chunks. Delivering never blocks: a subscriber whose capture loop
/// has fallen behind loses the chunk and the drop is counted.
pub struct HookFeed {
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_key: AtomicU64,
    poll_interval: Duration,
    buffer_chunks: usize,
    dropped: AtomicU64,
}

impl HookFeed {
    pub fn new(poll_interval: Duration, buffer_chunks: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_key: AtomicU64::new(0),
            poll_interval,
            buffer_chunks: buffer_chunks.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Copy `bytes` once and offer it to every input subscribed to `source`.
    pub fn deliver(&self, source: &SourceTag, bytes: &[u8]) -> FeedDelivery {
        let mut chunk: Option<Arc<[u8]>> = None;
        let mut result = FeedDelivery::default();
        for mut entry in self.subscribers.iter_mut() {
            if entry.source != *source {
                continue;
            }
            let chunk = chunk.get_or_insert_with(|| Arc::from(bytes));
            match entry.tx.try_send(Arc::clone(chunk)) {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    entry.dropped += 1;
                    result.dropped += 1;
                    let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if entry.dropped == 1 || entry.dropped % 100 == 0 {
                        log::warn!(
                            "capture input for {} is {} chunks behind, {} chunks dropped ({} across all inputs)",
                            source,
                            self.buffer_chunks,
                            entry.dropped,
                            total
                        );
                    }
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        result
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Pending chunks a single input may hold before new ones are dropped.
    pub fn buffer_chunks(&self) -> usize {
        self.buffer_chunks
    }

    /// Total chunks dropped because an input's buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl InputProvider for HookFeed {
    fn is_available(&self) -> bool {
        true
    }

    fn open(&self, source: &SourceTag) -> Result<Box<dyn AudioInput>, CaptureError> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(self.buffer_chunks);
        self.subscribers.insert(
            key,
            Subscriber {
                source: source.clone(),
                tx,
                dropped: 0,
            },
        );
        Ok(Box::new(FeedInput {
            key,
            rx,
            pending: None,
            subscribers: Arc::clone(&self.subscribers),
            poll_interval: self.poll_interval,
        }))
    }
}

/// One subscription to a `HookFeed`.
///
/// Delivered buffers larger than the caller's read size are handed out over
/// several reads.
pub struct FeedInput {
    key: u64,
    rx: Receiver<Arc<[u8]>>,
    pending: Option<(Arc<[u8]>, usize)>,
    subscribers: Arc<DashMap<u64, Subscriber>>,
    poll_interval: Duration,
}

impl FeedInput {
    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let Some((chunk, offset)) = self.pending.as_mut() else {
            return 0;
        };
        let n = (chunk.len() - *offset).min(buf.len());
        buf[..n].copy_from_slice(&chunk[*offset..*offset + n]);
        *offset += n;
        if *offset >= chunk.len() {
            self.pending = None;
        }
        n
    }
}

impl AudioInput for FeedInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        if self.pending.is_some() {
            return Ok(self.take_pending(buf));
        }
        match self.rx.recv_timeout(self.poll_interval) {
            Ok(chunk) => {
                self.pending = Some((chunk, 0));
                Ok(self.take_pending(buf))
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::InputFailed("hook feed closed".into())),
        }
    }

    fn release(&mut self) {
        self.subscribers.remove(&self.key);
    }
}

impl Drop for FeedInput {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> HookFeed {
        HookFeed::new(Duration::from_millis(5), 8)
    }

    #[test]
    fn delivers_only_to_matching_source() {
        let feed = feed();
        let mut a = feed.open(&SourceTag::new("a")).unwrap();
        let mut b = feed.open(&SourceTag::new("b")).unwrap();

        assert_eq!(feed.deliver(&SourceTag::new("a"), &[1, 2, 3]).delivered, 1);

        let mut buf = [0u8; 8];
        assert_eq!(a.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(b.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn unsubscribed_source_is_not_delivered() {
        let feed = feed();
        assert_eq!(feed.deliver(&SourceTag::new("nobody"), &[1]), FeedDelivery::default());
    }

    #[test]
    fn large_buffers_split_across_reads() {
        let feed = feed();
        let mut input = feed.open(&SourceTag::new("s1")).unwrap();
        let data: Vec<u8> = (0..10).collect();
        feed.deliver(&SourceTag::new("s1"), &data);

        let mut buf = [0u8; 4];
        let mut collected = Vec::new();
        for _ in 0..3 {
            let n = input.read(&mut buf).unwrap();
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, data);
    }

    #[test]
    fn release_unsubscribes() {
        let feed = feed();
        let mut input = feed.open(&SourceTag::new("s1")).unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        input.release();
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.deliver(&SourceTag::new("s1"), &[1]), FeedDelivery::default());
        assert!(matches!(input.read(&mut [0u8; 4]), Err(CaptureError::InputFailed(_))));
    }

    #[test]
    fn stalled_input_drops_overflow_and_counts_it() {
        let feed = HookFeed::new(Duration::from_millis(5), 4);
        let source = SourceTag::new("s1");
        let mut stalled = feed.open(&source).unwrap();
        let mut other = feed.open(&source).unwrap();

        let mut dropped = 0;
        for i in 0..10u8 {
            let result = feed.deliver(&source, &[i; 4096]);
            assert_eq!(result.delivered + result.dropped, 2);
            dropped += result.dropped;
            // The second input keeps up.
            let mut buf = [0u8; 4096];
            assert_eq!(other.read(&mut buf).unwrap(), 4096);
            assert_eq!(buf[0], i);
        }
        assert_eq!(dropped, 6);
        assert_eq!(feed.dropped(), 6);

        // The stalled input still holds the oldest chunks, in order.
        let mut buf = [0u8; 4096];
        for i in 0..4u8 {
            assert_eq!(stalled.read(&mut buf).unwrap(), 4096);
            assert_eq!(buf[0], i);
        }
        assert_eq!(stalled.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn drop_unsubscribes() {
        let feed = feed();
        drop(feed.open(&SourceTag::new("s1")).unwrap());
        assert_eq!(feed.subscriber_count(), 0);
    }
}
