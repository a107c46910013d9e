use std::sync::Arc;
use std::thread;

use chrono::Utc;

use crate::models::audio_models::AudioFrame;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::session_info::{ExitReason, SessionRecord};
use crate::processing::frame_queue::FrameQueue;
use crate::session::capture_session::CaptureSession;
use crate::session::registry::RegistryShared;
use crate::storage::metadata;
use crate::storage::session_sink::SessionSink;
use crate::traits::audio_input::AudioInput;
use crate::traits::capture_delegate::CaptureDelegate;

/// Per-session worker: input → sink + frame queue.
///
/// ```text
/// [AudioInput] → read chunk → [SessionSink]
///                     └──────→ [FrameQueue] (copy, dropped when full)
/// ```
pub(crate) struct CaptureLoop {
    session: Arc<CaptureSession>,
    input: Box<dyn AudioInput>,
    sink: SessionSink,
    queue: Arc<FrameQueue>,
    shared: Arc<RegistryShared>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    config: CaptureConfiguration,
}

impl CaptureLoop {
    pub(crate) fn new(
        session: Arc<CaptureSession>,
        input: Box<dyn AudioInput>,
        sink: SessionSink,
        queue: Arc<FrameQueue>,
        shared: Arc<RegistryShared>,
        delegate: Option<Arc<dyn CaptureDelegate>>,
        config: CaptureConfiguration,
    ) -> Self {
        Self {
            session,
            input,
            sink,
            queue,
            shared,
            delegate,
            config,
        }
    }

    /// Run the loop on its own named thread.
    pub(crate) fn spawn(self) -> Result<thread::JoinHandle<()>, CaptureError> {
        thread::Builder::new()
            .name(format!("capture-{}", self.session.source().file_stem()))
            .spawn(move || self.run())
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)))
    }

    fn run(mut self) {
        log::info!("audio capture started for session {}", self.session.id());
        let reason = self.pump();
        self.finish(reason);
    }

    /// Read until the session is stopped or the stream breaks.
    fn pump(&mut self) -> ExitReason {
        let mut buffer = vec![0u8; self.config.read_chunk_bytes];

        while self.session.is_active() {
            let read = match self.input.read(&mut buffer) {
                Ok(n) => n.min(buffer.len()),
                Err(e) => return ExitReason::InputFailed(e.to_string()),
            };
            if read == 0 {
                continue;
            }
            // Stop may have been requested while the read was blocked.
            if !self.session.is_active() {
                break;
            }

            let bytes = &buffer[..read];
            if let Err(e) = self.sink.write(bytes) {
                return ExitReason::SinkFailed(e.to_string());
            }
            let queued = self.queue.enqueue(AudioFrame::copy_from(bytes, self.session.source().clone()));
            self.session.record_capture(read, queued);
            log::debug!("captured {} bytes for session {}", read, self.session.id());
        }

        ExitReason::Stopped
    }

    fn finish(mut self, reason: ExitReason) {
        let session = Arc::clone(&self.session);
        session.request_stop();

        let checksum = match self.sink.close() {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                log::error!("failed to close sink for session {}: {}", session.id(), e);
                None
            }
        };
        self.input.release();

        let stopped_at = Utc::now();
        let record = SessionRecord {
            id: session.id().clone(),
            source: session.source().clone(),
            started_at: session.started_at(),
            stopped_at,
            duration_secs: session.elapsed().as_secs_f64(),
            sink_path: session.sink_path().to_string_lossy().to_string(),
            sink_format: self.sink.format(),
            bytes_written: self.sink.bytes_written(),
            frames_captured: session.frames_captured(),
            frames_dropped: session.frames_dropped(),
            checksum,
            exit_reason: reason,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bit_depth: self.config.bit_depth,
        };

        match &record.exit_reason {
            ExitReason::Stopped => {
                log::info!("audio capture stopped for session {}", session.id());
            }
            ExitReason::InputFailed(msg) => {
                log::error!("error in capture session {}: {}", session.id(), msg);
                self.report(CaptureError::InputFailed(msg.clone()));
            }
            ExitReason::SinkFailed(msg) => {
                log::error!("error in capture session {}: {}", session.id(), msg);
                self.report(CaptureError::StorageError(msg.clone()));
            }
        }

        if self.config.write_metadata {
            if let Err(e) = metadata::write_record(&record, session.sink_path()) {
                log::warn!("failed to write metadata for session {}: {}", session.id(), e);
            }
        }

        if let Some(ref d) = self.delegate {
            d.on_session_finished(&record);
        }

        self.shared.loop_exited(&session);
        session.mark_exited();
    }

    fn report(&self, error: CaptureError) {
        if let Some(ref d) = self.delegate {
            d.on_error(&error);
        }
    }
}
