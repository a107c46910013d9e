//! Per-frame signal statistics over 16-bit little-endian PCM.

use crate::models::audio_models::FrameStats;

/// Compute amplitude statistics for `pcm`.
///
/// Samples are read as signed 16-bit little-endian; a trailing odd byte is
/// ignored. An empty buffer yields all-zero stats.
pub fn analyze(pcm: &[u8]) -> FrameStats {
    let mut sum_abs = 0.0f64;
    let mut max = i16::MIN;
    let mut min = i16::MAX;
    let mut count = 0usize;

    for pair in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        sum_abs += (sample as f64).abs();
        max = max.max(sample);
        min = min.min(sample);
        count += 1;
    }

    if count == 0 {
        return FrameStats::default();
    }

    FrameStats {
        sample_count: count,
        mean_abs_amplitude: sum_abs / count as f64,
        max,
        min,
        dynamic_range: max as i32 - min as i32,
    }
}

/// Whether the frame is implausibly quiet for live capture.
///
/// Empty frames are never flagged; there is nothing to judge.
pub fn is_low_amplitude(stats: &FrameStats, threshold: f64) -> bool {
    stats.sample_count > 0 && stats.mean_abs_amplitude < threshold
}
