use std::fs;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::input::hook_feed::HookFeed;
use crate::models::audio_models::{AudioFrame, SessionId, SourceTag};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::session_info::SessionSummary;
use crate::models::state::CoordinatorState;
use crate::processing::frame_queue::FrameQueue;
use crate::processing::pipeline::{PipelineStages, PipelineStats, ProcessingPipeline};
use crate::session::registry::{SessionRegistry, StopOutcome};
use crate::traits::audio_input::InputProvider;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::effect_sink::EffectSink;
use crate::traits::frame_stage::{FrameConverter, FrameEffect};

/// Where an intercepted buffer went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    /// Handed to this many capture sessions subscribed to the source.
    ToSessions(usize),
    /// No session for the source; queued straight for processing.
    Queued,
    /// No session for the source and the queue was full.
    Dropped,
    /// Offset/length outside the buffer.
    Rejected,
    /// The coordinator is not running.
    Ignored,
}

/// Everything built by `initialize` and torn down by `shutdown`.
struct Runtime {
    queue: Arc<FrameQueue>,
    registry: SessionRegistry,
    pipeline: Mutex<ProcessingPipeline>,
}

/// Composition root for capture and processing.
///
/// ```text
/// on_session_start ─→ [SessionRegistry] ─→ CaptureLoop per session ─→ sink
/// on_frame_captured ─→ [HookFeed] ─┘                 │
///                   └─(no session)──→ [FrameQueue] ←─┘
///                                          │
///                                   [ProcessingPipeline] ─→ frames/ + effect sink
/// ```
///
/// Entry points are no-ops unless the coordinator is running. Stage and
/// provider setters take effect on the next `initialize`.
pub struct Coordinator {
    config: CaptureConfiguration,
    feed: Arc<HookFeed>,
    /// Custom provider; `None` means sessions read from `feed`.
    input: Option<Arc<dyn InputProvider>>,
    stages: PipelineStages,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    state: Mutex<CoordinatorState>,
    /// Cloned out by entry points; the guard is never held across I/O or
    /// waiting.
    runtime: RwLock<Option<Arc<Runtime>>>,
}

impl Coordinator {
    pub fn new(config: CaptureConfiguration) -> Self {
        let feed = Arc::new(HookFeed::new(config.read_poll_interval(), config.session_buffer_chunks));
        let stages = PipelineStages::with_gain(config.effect_gain);
        Self {
            config,
            feed,
            input: None,
            stages,
            delegate: None,
            state: Mutex::new(CoordinatorState::Uninitialized),
            runtime: RwLock::new(None),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Replace the default hook feed as the source of session input.
    pub fn set_input_provider(&mut self, provider: Arc<dyn InputProvider>) {
        self.input = Some(provider);
    }

    pub fn set_converter(&mut self, converter: Arc<dyn FrameConverter>) {
        self.stages.converter = converter;
    }

    pub fn set_effect(&mut self, effect: Arc<dyn FrameEffect>) {
        self.stages.effect = effect;
    }

    pub fn set_effect_sink(&mut self, sink: Arc<dyn EffectSink>) {
        self.stages.effect_sink = sink;
    }

    /// Replace the configuration. Not allowed while running.
    pub fn configure(&mut self, config: CaptureConfiguration) -> Result<(), CaptureError> {
        if self.state().is_running() {
            return Err(CaptureError::ConfigurationFailed(
                "cannot reconfigure while running".into(),
            ));
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        self.feed = Arc::new(HookFeed::new(config.read_poll_interval(), config.session_buffer_chunks));
        self.stages.effect = PipelineStages::with_gain(config.effect_gain).effect;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// Build the queue, registry and worker pool and start accepting
    /// triggers. Calling it again while running only logs a warning.
    pub fn initialize(&self) -> Result<(), CaptureError> {
        let mut transitions = Vec::new();
        let result = self.initialize_locked(&mut transitions);
        for state in transitions {
            self.notify_state(state);
        }
        if let Err(ref e) = result {
            log::error!("failed to initialize capture coordinator: {}", e);
            self.report(e);
        }
        result
    }

    fn initialize_locked(&self, transitions: &mut Vec<CoordinatorState>) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.is_running() {
            log::warn!("capture coordinator already initialized");
            return Ok(());
        }
        if !state.can_initialize() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "cannot initialize from state {}",
                state.name()
            )));
        }

        self.config.validate().map_err(CaptureError::ConfigurationFailed)?;
        if !self.provider().is_available() {
            return Err(CaptureError::DeviceNotAvailable);
        }
        for dir in [self.config.sessions_directory(), self.config.frames_directory()] {
            fs::create_dir_all(&dir).map_err(|e| {
                CaptureError::StorageError(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        let previous = *state;
        *state = CoordinatorState::Initialized;
        transitions.push(*state);

        let queue = Arc::new(FrameQueue::new(self.config.queue_capacity));
        let registry = SessionRegistry::new(self.config.clone(), Arc::clone(&queue), self.delegate.clone());
        let pipeline = match ProcessingPipeline::start(
            Arc::clone(&queue),
            &self.config,
            self.stages.clone(),
            self.delegate.clone(),
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                *state = previous;
                transitions.push(previous);
                return Err(e);
            }
        };

        *self.runtime.write() = Some(Arc::new(Runtime {
            queue,
            registry,
            pipeline: Mutex::new(pipeline),
        }));
        *state = CoordinatorState::Running;
        transitions.push(*state);

        log::info!(
            "capture coordinator running: output {}, {} workers, queue capacity {}",
            self.config.output_directory.display(),
            self.config.worker_threads,
            self.config.queue_capacity
        );
        Ok(())
    }

    /// Stop every session, discard queued frames and join the workers.
    ///
    /// Safe to call when never initialized, and more than once.
    pub fn shutdown(&self) {
        let runtime = {
            let mut state = self.state.lock();
            if !state.is_running() {
                return;
            }
            *state = CoordinatorState::Shutdown;
            self.runtime.write().take()
        };

        if let Some(runtime) = runtime {
            let stopped = runtime.registry.close();
            runtime.queue.close();
            let discarded = runtime.queue.clear();
            runtime.pipeline.lock().stop();
            log::info!(
                "capture coordinator shut down: {} sessions stopped, {} queued frames discarded",
                stopped,
                discarded
            );
        }
        self.notify_state(CoordinatorState::Shutdown);
    }

    /// Start capturing `source`. Returns `None` when not running or when the
    /// session could not be created.
    pub fn on_session_start(&self, source: &str) -> Option<SessionId> {
        let Some(runtime) = self.runtime() else {
            log::debug!("session start for {} ignored, coordinator not running", source);
            return None;
        };

        let source = SourceTag::new(source);
        let input = match self.provider().open(&source) {
            Ok(input) => input,
            Err(e) => {
                log::error!("failed to open input for {}: {}", source, e);
                self.report(&e);
                return None;
            }
        };

        runtime
            .registry
            .create_session(source, input)
            .ok()
            .map(|session| session.id().clone())
    }

    /// Stop one session, waiting a bounded time for its loop to exit.
    pub fn on_session_stop(&self, id: &SessionId) -> Option<StopOutcome> {
        let runtime = self.runtime()?;
        match runtime.registry.stop_session(id) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("stop for session {} ignored: {}", id, e);
                None
            }
        }
    }

    /// Accept an intercepted buffer. `buffer[offset..offset + length]` is
    /// copied before this returns.
    pub fn on_frame_captured(&self, buffer: &[u8], offset: usize, length: usize, source: &str) -> FrameDelivery {
        let Some(runtime) = self.runtime() else {
            return FrameDelivery::Ignored;
        };

        let Some(bytes) = offset.checked_add(length).and_then(|end| buffer.get(offset..end)) else {
            log::warn!(
                "rejected frame from {}: offset {} length {} outside buffer of {} bytes",
                source,
                offset,
                length,
                buffer.len()
            );
            return FrameDelivery::Rejected;
        };

        let source = SourceTag::new(source);
        let fed = self.feed.deliver(&source, bytes);
        if fed.delivered > 0 {
            return FrameDelivery::ToSessions(fed.delivered);
        }
        if fed.dropped > 0 {
            return FrameDelivery::Dropped;
        }
        if runtime.queue.enqueue(AudioFrame::copy_from(bytes, source)) {
            FrameDelivery::Queued
        } else {
            FrameDelivery::Dropped
        }
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.runtime()
            .map(|runtime| runtime.registry.list_sessions())
            .unwrap_or_default()
    }

    pub fn active_session_count(&self) -> usize {
        self.runtime().map_or(0, |runtime| runtime.registry.active_count())
    }

    /// Pipeline counters plus chunks the hook feed dropped for sessions
    /// that fell behind.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self
            .runtime()
            .map(|runtime| runtime.pipeline.lock().stats())
            .unwrap_or_default();
        stats.feed_dropped = self.feed.dropped();
        stats
    }

    pub fn worker_count(&self) -> usize {
        self.runtime().map_or(0, |runtime| runtime.pipeline.lock().worker_count())
    }

    /// The hook feed that `on_frame_captured` routes session frames through.
    pub fn feed(&self) -> &Arc<HookFeed> {
        &self.feed
    }

    fn runtime(&self) -> Option<Arc<Runtime>> {
        self.runtime.read().clone()
    }

    fn provider(&self) -> &dyn InputProvider {
        match self.input {
            Some(ref provider) => provider.as_ref(),
            None => self.feed.as_ref(),
        }
    }

    fn notify_state(&self, state: CoordinatorState) {
        log::debug!("capture coordinator state: {}", state.name());
        if let Some(ref d) = self.delegate {
            d.on_state_changed(state);
        }
    }

    fn report(&self, error: &CaptureError) {
        if let Some(ref d) = self.delegate {
            d.on_error(error);
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
