use crate::models::audio_models::SourceTag;

/// Downstream side channel for effect output (re-injection into the
/// originating stream). Called from pipeline worker threads.
pub trait EffectSink: Send + Sync {
    fn inject(&self, source: &SourceTag, pcm: &[u8]);
}

/// Default effect sink: logs the injection and discards the buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEffectSink;

impl EffectSink for DiscardEffectSink {
    fn inject(&self, source: &SourceTag, pcm: &[u8]) {
        log::debug!("effect output for {}: {} bytes discarded", source, pcm.len());
    }
}
