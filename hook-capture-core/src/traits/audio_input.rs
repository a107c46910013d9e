use crate::models::audio_models::SourceTag;
use crate::models::error::CaptureError;

/// One opened capture stream from the originating audio API.
///
/// Owned by exactly one capture loop; `read` is only ever called from that
/// loop's thread.
pub trait AudioInput: Send {
    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when nothing arrived within the input's poll interval,
    /// so the caller can re-check its stop flag. An `Err` is unrecoverable for
    /// the session.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError>;

    /// Release device-level recording resources. Called exactly once, after
    /// the last `read`.
    fn release(&mut self) {}
}

/// Opens `AudioInput`s for new sessions.
pub trait InputProvider: Send + Sync {
    /// Whether the underlying audio resource can be used at all.
    fn is_available(&self) -> bool;

    /// Open a capture stream for a session created by `source`.
    fn open(&self, source: &SourceTag) -> Result<Box<dyn AudioInput>, CaptureError>;
}
