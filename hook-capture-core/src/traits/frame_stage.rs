use crate::models::audio_models::AudioFrame;
use crate::models::error::CaptureError;

/// Convert stage: turns a captured frame into the canonical output bytes.
///
/// Both persistence and the effect stage consume the converted bytes.
pub trait FrameConverter: Send + Sync {
    fn convert(&self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError>;
}

/// Effect stage: a per-sample transform over converted bytes.
pub trait FrameEffect: Send + Sync {
    fn apply(&self, pcm: &[u8]) -> Result<Vec<u8>, CaptureError>;
}
