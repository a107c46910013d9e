use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use dashmap::DashMap;

use crate::models::audio_models::{SessionId, SourceTag};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::session_info::SessionSummary;
use crate::processing::frame_queue::FrameQueue;
use crate::session::capture_loop::CaptureLoop;
use crate::session::capture_session::CaptureSession;
use crate::storage::session_sink::SessionSink;
use crate::traits::audio_input::AudioInput;
use crate::traits::capture_delegate::CaptureDelegate;

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The capture loop exited within the wait budget.
    Exited,
    /// The wait budget ran out and the entry was removed anyway. The loop may
    /// still be running and will reconcile when it exits.
    ForceRemoved,
}

/// State shared between the registry and its capture loops.
#[derive(Debug, Default)]
pub(crate) struct RegistryShared {
    sessions: DashMap<SessionId, Arc<CaptureSession>>,
    running_loops: AtomicUsize,
}

impl RegistryShared {
    /// Bookkeeping for a capture loop that has finished.
    ///
    /// Removes the entry only if it still belongs to the same generation, so a
    /// late exit after a force-remove cannot evict anything else.
    pub(crate) fn loop_exited(&self, session: &CaptureSession) {
        self.running_loops.fetch_sub(1, Ordering::SeqCst);
        let removed = self
            .sessions
            .remove_if(session.id(), |_, s| s.generation() == session.generation())
            .is_some();
        if !removed {
            log::info!(
                "late exit of session {} (generation {}) reconciled",
                session.id(),
                session.generation()
            );
        }
    }
}

/// Tracks the active capture sessions.
///
/// Backed by a concurrent map: listing never blocks session creation or
/// removal, and no map guard is held across sink I/O or waiting.
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
    config: CaptureConfiguration,
    queue: Arc<FrameQueue>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    next_generation: AtomicU64,
    force_removed: AtomicU64,
    accepting: AtomicBool,
}

impl SessionRegistry {
    pub fn new(
        config: CaptureConfiguration,
        queue: Arc<FrameQueue>,
        delegate: Option<Arc<dyn CaptureDelegate>>,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared::default()),
            config,
            queue,
            delegate,
            next_generation: AtomicU64::new(0),
            force_removed: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
        }
    }

    /// Open a sink, register the session and start its capture loop.
    ///
    /// A sink that cannot be created is fatal to the session: the error is
    /// returned and reported, and nothing is registered.
    pub fn create_session(
        &self,
        source: SourceTag,
        mut input: Box<dyn AudioInput>,
    ) -> Result<Arc<CaptureSession>, CaptureError> {
        if !self.is_accepting() {
            input.release();
            return Err(CaptureError::NotRunning);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = SessionId::generate(&source);
        let started_at = Utc::now();
        let sink_path = self.config.sessions_directory().join(format!(
            "{}_{}_{}.{}",
            source.file_stem(),
            started_at.format("%Y%m%dT%H%M%S%.3f"),
            generation,
            self.config.sink_format.extension()
        ));

        let sink = match SessionSink::open(sink_path.clone(), &self.config) {
            Ok(sink) => sink,
            Err(e) => {
                input.release();
                log::error!("failed to start capture session for {}: {}", source, e);
                if let Some(ref d) = self.delegate {
                    d.on_error(&e);
                }
                return Err(e);
            }
        };

        let session = Arc::new(CaptureSession::new(
            id.clone(),
            generation,
            source.clone(),
            started_at,
            sink_path,
            sink.bytes_written(),
        ));

        self.shared.sessions.insert(id.clone(), Arc::clone(&session));
        self.shared.running_loops.fetch_add(1, Ordering::SeqCst);

        let capture_loop = CaptureLoop::new(
            Arc::clone(&session),
            input,
            sink,
            Arc::clone(&self.queue),
            Arc::clone(&self.shared),
            self.delegate.clone(),
            self.config.clone(),
        );

        match capture_loop.spawn() {
            Ok(handle) => session.attach_loop(handle),
            Err(e) => {
                self.shared.sessions.remove(&id);
                self.shared.running_loops.fetch_sub(1, Ordering::SeqCst);
                log::error!("failed to start capture session for {}: {}", source, e);
                return Err(e);
            }
        }

        // Lost a race with `close`: the loop winds itself down and reconciles.
        if !self.is_accepting() {
            session.request_stop();
            return Err(CaptureError::NotRunning);
        }

        log::info!("capture session started: {} ({})", id, source);
        if let Some(ref d) = self.delegate {
            d.on_session_started(&id, &source);
        }
        Ok(session)
    }

    /// Refuse new sessions, then stop every registered one.
    pub fn close(&self) -> usize {
        self.accepting.store(false, Ordering::SeqCst);
        self.stop_all()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop one session, waiting a bounded time for its loop to exit.
    pub fn stop_session(&self, id: &SessionId) -> Result<StopOutcome, CaptureError> {
        let session = self.get(id).ok_or_else(|| CaptureError::SessionNotFound(id.to_string()))?;
        session.request_stop();
        Ok(self.await_exit(&session))
    }

    /// Stop every registered session. Flags are cleared for all sessions
    /// before any waiting starts.
    pub fn stop_all(&self) -> usize {
        let sessions: Vec<Arc<CaptureSession>> =
            self.shared.sessions.iter().map(|entry| Arc::clone(entry.value())).collect();
        for session in &sessions {
            session.request_stop();
        }
        for session in &sessions {
            self.await_exit(session);
        }
        if !sessions.is_empty() {
            log::info!("all capture sessions stopped ({})", sessions.len());
        }
        sessions.len()
    }

    fn await_exit(&self, session: &CaptureSession) -> StopOutcome {
        let mut attempts = 0;
        while !session.has_exited() && attempts < self.config.stop_poll_attempts {
            thread::sleep(self.config.stop_poll_interval());
            attempts += 1;
        }

        let outcome = if session.has_exited() {
            session.join_loop();
            log::info!("capture session stopped: {}", session.id());
            StopOutcome::Exited
        } else {
            self.force_removed.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "capture loop for {} did not exit after {} polls, removing it from the registry",
                session.id(),
                attempts
            );
            StopOutcome::ForceRemoved
        };

        self.shared
            .sessions
            .remove_if(session.id(), |_, s| s.generation() == session.generation());
        outcome
    }

    /// Read-only snapshot of all registered sessions, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> =
            self.shared.sessions.iter().map(|entry| entry.value().summary()).collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<CaptureSession>> {
        self.shared.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of capture loops currently running.
    pub fn active_count(&self) -> usize {
        self.shared.running_loops.load(Ordering::SeqCst)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.shared.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.sessions.is_empty()
    }

    /// Sessions removed after their wait budget ran out.
    pub fn force_removed(&self) -> u64 {
        self.force_removed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use crate::models::session_info::{ExitReason, SessionRecord};
    use crate::storage::metadata;

    /// Input that replays a fixed script, then idles.
    struct ScriptedInput {
        steps: VecDeque<Result<Vec<u8>, CaptureError>>,
        released: Arc<AtomicBool>,
    }

    impl ScriptedInput {
        fn new(steps: Vec<Result<Vec<u8>, CaptureError>>) -> (Box<dyn AudioInput>, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let input = Box::new(Self {
                steps: steps.into(),
                released: Arc::clone(&released),
            });
            (input, released)
        }
    }

    impl AudioInput for ScriptedInput {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(2));
                    Ok(0)
                }
            }
        }

        fn release(&mut self) {
            assert!(!self.released.swap(true, Ordering::SeqCst), "released twice");
        }
    }

    /// Input whose read ignores the stop flag for a while.
    struct StuckInput {
        hold: Duration,
    }

    impl AudioInput for StuckInput {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, CaptureError> {
            thread::sleep(self.hold);
            Ok(0)
        }
    }

    #[derive(Default)]
    struct Records(Mutex<Vec<SessionRecord>>);

    impl CaptureDelegate for Records {
        fn on_session_finished(&self, record: &SessionRecord) {
            self.0.lock().push(record.clone());
        }
    }

    fn registry(dir: &std::path::Path, queue_capacity: usize) -> (SessionRegistry, Arc<FrameQueue>, Arc<Records>) {
        let config = CaptureConfiguration {
            output_directory: dir.to_path_buf(),
            stop_poll_interval_ms: 10,
            ..Default::default()
        };
        let queue = Arc::new(FrameQueue::new(queue_capacity));
        let records = Arc::new(Records::default());
        let registry = SessionRegistry::new(config, Arc::clone(&queue), Some(records.clone()));
        (registry, queue, records)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn loop_writes_sink_and_queues_copies() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, queue, records) = registry(dir.path(), 1000);
        let (input, released) = ScriptedInput::new(vec![Ok(vec![1; 4096]), Ok(vec![2; 4096]), Ok(vec![3; 4096])]);

        let session = registry.create_session(SourceTag::new("s1"), input).unwrap();
        let id = session.id().clone();
        wait_until(|| session.frames_captured() == 3);

        assert_eq!(registry.stop_session(&id).unwrap(), StopOutcome::Exited);
        assert!(released.load(Ordering::SeqCst));
        assert!(registry.is_empty());
        assert_eq!(registry.active_count(), 0);

        assert_eq!(fs::metadata(session.sink_path()).unwrap().len(), 12288);
        assert_eq!(queue.len(), 3);
        assert!((0..3).all(|_| queue.dequeue().unwrap().source == SourceTag::new("s1")));

        let records = records.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].exit_reason, ExitReason::Stopped);
        assert_eq!(records[0].frames_captured, 3);
        assert_eq!(records[0].frames_dropped, 0);
        let sidecar = metadata::read_record(session.sink_path()).unwrap();
        assert_eq!(sidecar.id, id);
        assert_eq!(sidecar.bytes_written, 12288);
        assert_eq!(sidecar.checksum, records[0].checksum);
    }

    #[test]
    fn read_error_ends_session_and_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _queue, records) = registry(dir.path(), 1000);
        let (input, released) = ScriptedInput::new(vec![
            Ok(vec![7; 16]),
            Ok(vec![7; 16]),
            Err(CaptureError::InputFailed("device lost".into())),
            Ok(vec![9; 16]),
        ]);

        let session = registry.create_session(SourceTag::new("call"), input).unwrap();
        let id = session.id().clone();
        wait_until(|| session.has_exited());

        assert!(!session.is_active());
        assert!(released.load(Ordering::SeqCst));
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(fs::read(session.sink_path()).unwrap(), vec![7; 32]);
        assert!(matches!(registry.stop_session(&id), Err(CaptureError::SessionNotFound(_))));

        let records = records.0.lock();
        assert!(matches!(records[0].exit_reason, ExitReason::InputFailed(_)));
    }

    #[test]
    fn full_queue_drops_frames_but_keeps_sink_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, queue, _records) = registry(dir.path(), 2);
        let (input, _) = ScriptedInput::new((0..5).map(|i| Ok(vec![i; 10])).collect());

        let session = registry.create_session(SourceTag::new("s1"), input).unwrap();
        let id = session.id().clone();
        wait_until(|| session.frames_captured() == 5);
        registry.stop_session(&id).unwrap();

        assert_eq!(session.frames_dropped(), 3);
        assert_eq!(queue.dropped(), 3);
        assert_eq!(fs::metadata(session.sink_path()).unwrap().len(), 50);
    }

    #[test]
    fn sink_failure_is_fatal_to_creation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let (registry, _queue, _records) = registry(&blocker, 10);
        let (input, released) = ScriptedInput::new(vec![]);

        let result = registry.create_session(SourceTag::new("s1"), input);
        assert!(matches!(result, Err(CaptureError::StorageError(_))));
        assert!(released.load(Ordering::SeqCst));
        assert!(registry.is_empty());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn stuck_loop_is_force_removed_then_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfiguration {
            output_directory: dir.path().to_path_buf(),
            stop_poll_attempts: 2,
            stop_poll_interval_ms: 10,
            write_metadata: false,
            ..Default::default()
        };
        let registry = SessionRegistry::new(config, Arc::new(FrameQueue::new(4)), None);

        let session = registry
            .create_session(
                SourceTag::new("slow"),
                Box::new(StuckInput {
                    hold: Duration::from_millis(300),
                }),
            )
            .unwrap();
        let id = session.id().clone();
        // Let the loop enter its first read.
        thread::sleep(Duration::from_millis(20));

        assert_eq!(registry.stop_session(&id).unwrap(), StopOutcome::ForceRemoved);
        assert_eq!(registry.force_removed(), 1);
        assert!(registry.list_sessions().is_empty());
        assert_eq!(registry.active_count(), 1);

        wait_until(|| session.has_exited());
        assert_eq!(registry.active_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn start_stop_sequences_leave_nothing_active() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _queue, records) = registry(dir.path(), 1000);

        let mut ids = Vec::new();
        for round in 0..3 {
            for n in 0..4 {
                let (input, _) = ScriptedInput::new(vec![Ok(vec![n; 8])]);
                let session = registry.create_session(SourceTag::new(format!("src{}", n % 2)), input).unwrap();
                ids.push(session.id().clone());
            }
            // Stop every other session this round.
            for id in ids.iter().skip(round).step_by(2) {
                let _ = registry.stop_session(id);
            }
        }
        assert!(registry.active_count() > 0);

        registry.stop_all();
        assert!(registry.list_sessions().iter().all(|s| !s.active));
        assert!(registry.list_sessions().is_empty());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(records.0.lock().len(), 12);
    }

    #[test]
    fn list_sessions_is_a_consistent_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _queue, _records) = registry(dir.path(), 1000);
        let (a, _) = ScriptedInput::new(vec![Ok(vec![1; 100])]);
        let (b, _) = ScriptedInput::new(vec![]);

        let session = registry.create_session(SourceTag::new("a"), a).unwrap();
        let first = session.id().clone();
        let second = registry.create_session(SourceTag::new("b"), b).unwrap().id().clone();
        wait_until(|| session.frames_captured() == 1);

        let listed = registry.list_sessions();
        assert_eq!(listed.len(), 2);
        let a = listed.iter().find(|s| s.id == first).unwrap();
        assert_eq!(a.source, SourceTag::new("a"));
        assert_eq!(a.sink_size, 100);
        assert!(a.active);
        assert!(listed.iter().any(|s| s.id == second));
        assert_eq!(registry.active_count(), 2);

        registry.stop_all();
    }

    #[test]
    fn closed_registry_refuses_new_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _queue, _records) = registry(dir.path(), 10);
        let (input, _) = ScriptedInput::new(vec![]);
        registry.create_session(SourceTag::new("s1"), input).unwrap();

        assert_eq!(registry.close(), 1);
        assert!(!registry.is_accepting());

        let (input, released) = ScriptedInput::new(vec![]);
        let result = registry.create_session(SourceTag::new("s2"), input);
        assert!(matches!(result, Err(CaptureError::NotRunning)));
        assert!(released.load(Ordering::SeqCst));
        wait_until(|| registry.is_empty());
        assert_eq!(registry.active_count(), 0);
    }
}
