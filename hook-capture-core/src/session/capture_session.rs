use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{SessionId, SourceTag};
use crate::models::session_info::SessionSummary;

/// Shared runtime state of one recording.
///
/// The sink itself lives in the capture loop; this struct only carries the
/// flags and counters that the registry and stop path coordinate on.
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    generation: u64,
    source: SourceTag,
    started_at: DateTime<Utc>,
    started: Instant,
    sink_path: PathBuf,
    active: AtomicBool,
    exited: AtomicBool,
    sink_size: AtomicU64,
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    loop_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CaptureSession {
    pub(crate) fn new(
        id: SessionId,
        generation: u64,
        source: SourceTag,
        started_at: DateTime<Utc>,
        sink_path: PathBuf,
        initial_sink_size: u64,
    ) -> Self {
        Self {
            id,
            generation,
            source,
            started_at,
            started: Instant::now(),
            sink_path,
            active: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            sink_size: AtomicU64::new(initial_sink_size),
            frames_captured: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Registry epoch this session was created in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &SourceTag {
        &self.source
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn sink_path(&self) -> &Path {
        &self.sink_path
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Clear the active flag. Returns whether it was set.
    pub fn request_stop(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Whether the capture loop has finished and released the sink.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn sink_size(&self) -> u64 {
        self.sink_size.load(Ordering::Relaxed)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            source: self.source.clone(),
            started_at: self.started_at,
            elapsed: self.elapsed(),
            active: self.is_active(),
            sink_size: self.sink_size(),
            frames_captured: self.frames_captured(),
            sink_path: self.sink_path.clone(),
        }
    }

    pub(crate) fn record_capture(&self, bytes: usize, queued: bool) {
        self.sink_size.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        if !queued {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub(crate) fn attach_loop(&self, handle: thread::JoinHandle<()>) {
        *self.loop_handle.lock() = Some(handle);
    }

    /// Join the capture loop thread if it has already exited.
    pub(crate) fn join_loop(&self) {
        if !self.has_exited() {
            return;
        }
        if let Some(handle) = self.loop_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("capture loop for {} panicked", self.id);
            }
        }
    }
}
