use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::models::audio_models::AudioFrame;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::processing::analysis;
use crate::processing::frame_queue::FrameQueue;
use crate::processing::transforms::{GainEffect, IdentityConverter};
use crate::storage::frame_store::FrameStore;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::effect_sink::{DiscardEffectSink, EffectSink};
use crate::traits::frame_stage::{FrameConverter, FrameEffect};

/// Pluggable convert/effect stages and the effect side channel.
#[derive(Clone)]
pub struct PipelineStages {
    pub converter: Arc<dyn FrameConverter>,
    pub effect: Arc<dyn FrameEffect>,
    pub effect_sink: Arc<dyn EffectSink>,
}

impl PipelineStages {
    /// Identity conversion, fixed gain, discarded effect output.
    pub fn with_gain(gain: f32) -> Self {
        Self {
            converter: Arc::new(IdentityConverter),
            effect: Arc::new(GainEffect::new(gain)),
            effect_sink: Arc::new(DiscardEffectSink),
        }
    }
}

impl Default for PipelineStages {
    fn default() -> Self {
        Self::with_gain(GainEffect::default().gain)
    }
}

/// Snapshot of queue and pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub queued: usize,
    pub accepted: u64,
    pub dropped: u64,
    pub processed: u64,
    pub stage_failures: u64,
    pub persisted: u64,
    pub effects_applied: u64,
    pub low_amplitude_frames: u64,
    /// Chunks dropped before reaching a capture loop because its input
    /// buffer was full. Filled in by the coordinator.
    pub feed_dropped: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    processed: AtomicU64,
    stage_failures: AtomicU64,
    persisted: AtomicU64,
    effects_applied: AtomicU64,
    low_amplitude: AtomicU64,
}

/// Per-worker view of everything needed to run the stage chain.
struct FrameProcessor {
    stages: PipelineStages,
    store: FrameStore,
    enable_persistence: bool,
    enable_effects: bool,
    low_amplitude_threshold: f64,
    counters: Arc<PipelineCounters>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl FrameProcessor {
    /// Run analyze → convert → persist → effect. The first failing stage
    /// ends processing of this frame; the worker carries on.
    fn process(&self, frame: &AudioFrame) {
        if let Err(e) = self.run_stages(frame) {
            self.counters.stage_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("dropping frame {} from {}: {}", frame.sequence, frame.source, e);
            if let Some(ref d) = self.delegate {
                d.on_error(&e);
            }
        }
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn run_stages(&self, frame: &AudioFrame) -> Result<(), CaptureError> {
        guarded("analyze", || {
            let stats = analysis::analyze(frame.bytes());
            if analysis::is_low_amplitude(&stats, self.low_amplitude_threshold) {
                self.counters.low_amplitude.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "low audio amplitude from {} (mean {:.3})",
                    frame.source,
                    stats.mean_abs_amplitude
                );
            }
            log::debug!(
                "frame {} from {}: mean {:.1}, max {}, min {}, range {}",
                frame.sequence,
                frame.source,
                stats.mean_abs_amplitude,
                stats.max,
                stats.min,
                stats.dynamic_range
            );
            if let Some(ref d) = self.delegate {
                d.on_frame_analyzed(frame, &stats);
            }
            Ok(())
        })?;

        let converted = guarded("convert", || self.stages.converter.convert(frame))?;

        if self.enable_persistence {
            guarded("persist", || self.store.write(frame, &converted))?;
            self.counters.persisted.fetch_add(1, Ordering::Relaxed);
        }

        if self.enable_effects {
            guarded("effect", || {
                let output = self.stages.effect.apply(&converted)?;
                self.stages.effect_sink.inject(&frame.source, &output);
                Ok(())
            })?;
            self.counters.effects_applied.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

/// Run one stage, turning both errors and panics into a stage failure.
fn guarded<T>(stage: &'static str, f: impl FnOnce() -> Result<T, CaptureError>) -> Result<T, CaptureError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(CaptureError::ProcessingFailed { reason, .. })) => Err(CaptureError::ProcessingFailed { stage, reason }),
        Ok(Err(e)) => Err(CaptureError::ProcessingFailed {
            stage,
            reason: e.to_string(),
        }),
        Err(payload) => Err(CaptureError::ProcessingFailed {
            stage,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Fixed worker pool draining the frame queue.
///
/// Frames from different sessions may be processed out of order when more
/// than one worker runs; each frame carries its own timestamp and source.
pub struct ProcessingPipeline {
    queue: Arc<FrameQueue>,
    counters: Arc<PipelineCounters>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ProcessingPipeline {
    /// Spawn `config.worker_threads` workers on `queue`.
    pub fn start(
        queue: Arc<FrameQueue>,
        config: &CaptureConfiguration,
        stages: PipelineStages,
        delegate: Option<Arc<dyn CaptureDelegate>>,
    ) -> Result<Self, CaptureError> {
        let counters = Arc::new(PipelineCounters::default());
        let processor = Arc::new(FrameProcessor {
            stages,
            store: FrameStore::new(config.frames_directory()),
            enable_persistence: config.enable_persistence,
            enable_effects: config.enable_effects,
            low_amplitude_threshold: config.low_amplitude_threshold,
            counters: Arc::clone(&counters),
            delegate,
        });

        let mut pipeline = Self {
            queue,
            counters,
            workers: Vec::with_capacity(config.worker_threads),
        };

        for index in 0..config.worker_threads {
            let queue = Arc::clone(&pipeline.queue);
            let processor = Arc::clone(&processor);
            let spawned = thread::Builder::new()
                .name(format!("frame-worker-{}", index))
                .spawn(move || {
                    while let Ok(frame) = queue.dequeue() {
                        processor.process(&frame);
                    }
                    log::debug!("frame worker {} exiting", index);
                });

            match spawned {
                Ok(handle) => pipeline.workers.push(handle),
                Err(e) => {
                    pipeline.stop();
                    return Err(CaptureError::Unknown(format!("failed to spawn frame worker: {}", e)));
                }
            }
        }

        log::info!("processing pipeline started with {} workers", pipeline.workers.len());
        Ok(pipeline)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            queued: self.queue.len(),
            accepted: self.queue.accepted(),
            dropped: self.queue.dropped(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            stage_failures: self.counters.stage_failures.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            effects_applied: self.counters.effects_applied.load(Ordering::Relaxed),
            low_amplitude_frames: self.counters.low_amplitude.load(Ordering::Relaxed),
            feed_dropped: 0,
        }
    }

    /// Close the queue and join every worker. Frames still queued are not
    /// processed.
    pub fn stop(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("frame worker panicked outside a stage");
            }
        }
    }
}

impl Drop for ProcessingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
