//! Reference convert and effect stages.

use crate::models::audio_models::AudioFrame;
use crate::models::error::CaptureError;
use crate::traits::frame_stage::{FrameConverter, FrameEffect};

/// Passes the captured bytes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl FrameConverter for IdentityConverter {
    fn convert(&self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError> {
        Ok(frame.bytes().to_vec())
    }
}

/// Fixed-gain amplification of 16-bit little-endian samples.
///
/// Scaled values are truncated toward zero and saturate at the i16 bounds.
/// A trailing odd byte is copied through untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEffect {
    pub gain: f32,
}

impl GainEffect {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Default for GainEffect {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl FrameEffect for GainEffect {
    fn apply(&self, pcm: &[u8]) -> Result<Vec<u8>, CaptureError> {
        if !self.gain.is_finite() {
            return Err(CaptureError::ProcessingFailed {
                stage: "effect",
                reason: format!("non-finite gain {}", self.gain),
            });
        }

        let mut out = Vec::with_capacity(pcm.len());
        let pairs = pcm.chunks_exact(2);
        let tail = pairs.remainder();
        for pair in pairs {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            // `as` from f32 saturates.
            let amplified = (sample as f32 * self.gain) as i16;
            out.extend_from_slice(&amplified.to_le_bytes());
        }
        out.extend_from_slice(tail);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::SourceTag;

    fn samples(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2).map(|p| i16::from_le_bytes([p[0], p[1]])).collect()
    }

    fn to_pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn identity_copies_payload() {
        let frame = AudioFrame::copy_from(&[9, 8, 7], SourceTag::new("s"));
        assert_eq!(IdentityConverter.convert(&frame).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn gain_scales_and_truncates() {
        let out = GainEffect::default().apply(&to_pcm(&[1000, -1001, 0, 3])).unwrap();
        assert_eq!(samples(&out), vec![1500, -1501, 0, 4]);
    }

    #[test]
    fn gain_saturates_at_bounds() {
        let out = GainEffect::default().apply(&to_pcm(&[30000, -30000])).unwrap();
        assert_eq!(samples(&out), vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn odd_tail_passes_through() {
        let mut pcm = to_pcm(&[100]);
        pcm.push(0xAB);
        let out = GainEffect::new(2.0).apply(&pcm).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], 0xAB);
        assert_eq!(samples(&out), vec![200]);
    }

    #[test]
    fn non_finite_gain_is_a_stage_error() {
        let err = GainEffect::new(f32::NAN).apply(&[0, 0]).unwrap_err();
        assert!(matches!(err, CaptureError::ProcessingFailed { stage: "effect", .. }));
    }
}
