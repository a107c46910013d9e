use crate::models::audio_models::{AudioFrame, FrameStats, SessionId, SourceTag};
use crate::models::error::CaptureError;
use crate::models::session_info::SessionRecord;
use crate::models::state::CoordinatorState;

/// Event delegate for coordinator, session and pipeline notifications.
///
/// Frame and session-end callbacks run on capture-loop and pipeline worker
/// threads. State changes, `on_session_started` and setup failures reported
/// through `on_error` (initialization, input open, sink open) run on the
/// thread that called into the coordinator. Implementations must be cheap
/// and must not call back into the coordinator's stop paths.
pub trait CaptureDelegate: Send + Sync {
    /// Called on every coordinator state transition.
    fn on_state_changed(&self, _state: CoordinatorState) {}

    /// Called once a session is registered and its capture loop is running.
    fn on_session_started(&self, _id: &SessionId, _source: &SourceTag) {}

    /// Called when a capture loop has exited and its sink is closed.
    fn on_session_finished(&self, _record: &SessionRecord) {}

    /// Called with the statistics of every analyzed frame.
    fn on_frame_analyzed(&self, _frame: &AudioFrame, _stats: &FrameStats) {}

    /// Called for session-fatal and per-frame stage failures.
    fn on_error(&self, _error: &CaptureError) {}
}
