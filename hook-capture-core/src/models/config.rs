use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// On-disk layout of a session sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// Raw little-endian PCM, exactly the bytes that were captured.
    Pcm,
    /// 44-byte RIFF header followed by the captured PCM; sizes patched on close.
    Wav,
}

impl SinkFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Wav => "wav",
        }
    }
}

/// Configuration for the capture coordinator and its processing pipeline.
///
/// Sample rate, channels and bit depth describe the intercepted stream. They
/// are used for buffer-size bookkeeping and WAV headers only; the core never
/// negotiates or converts formats on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Sample rate of the intercepted stream in Hz (default: 16000).
    pub sample_rate: u32,

    /// Number of interleaved channels (default: 1).
    pub channels: u16,

    /// Bits per sample (default: 16). Valid values: 8, 16, 24, 32.
    pub bit_depth: u16,

    /// Layout of per-session sink files (default: raw PCM).
    pub sink_format: SinkFormat,

    /// Maximum number of frames waiting for the pipeline (default: 1000).
    pub queue_capacity: usize,

    /// Chunks a session's hook-feed input may hold before new ones are
    /// dropped (default: 64).
    pub session_buffer_chunks: usize,

    /// Number of pipeline worker threads (default: 2).
    pub worker_threads: usize,

    /// Size of one capture-loop read in bytes (default: 4096).
    pub read_chunk_bytes: usize,

    /// Write every processed frame to `frames/` (default: true).
    pub enable_persistence: bool,

    /// Run the effect stage and feed the effect sink (default: true).
    pub enable_effects: bool,

    /// Gain applied by the reference effect (default: 1.5).
    pub effect_gain: f32,

    /// Mean absolute amplitude below which a frame is flagged as low quality.
    pub low_amplitude_threshold: f64,

    /// Write a JSON sidecar next to each finished session sink (default: true).
    pub write_metadata: bool,

    /// How many times `stop_session` polls for the capture loop to exit.
    pub stop_poll_attempts: u32,

    /// Delay between stop polls in milliseconds (default: 100).
    pub stop_poll_interval_ms: u64,

    /// How long one input read waits for data in milliseconds (default: 20).
    pub read_poll_interval_ms: u64,

    /// Root directory for session sinks, metadata and persisted frames.
    pub output_directory: PathBuf,
}

/// Highest sample rate accepted by `validate`.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(format!(
                "sample rate must be between 1 and {} Hz, got {}",
                MAX_SAMPLE_RATE, self.sample_rate
            ));
        }
        if ![8, 16, 24, 32].contains(&self.bit_depth) {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.queue_capacity == 0 {
            return Err("queue capacity must be at least 1".into());
        }
        if self.session_buffer_chunks == 0 {
            return Err("session buffer must hold at least one chunk".into());
        }
        if self.worker_threads == 0 {
            return Err("at least one worker thread is required".into());
        }
        if self.read_chunk_bytes == 0 {
            return Err("read chunk size must be positive".into());
        }
        if !self.effect_gain.is_finite() {
            return Err(format!("invalid effect gain: {}", self.effect_gain));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err("output directory must be set".into());
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bit_depth as usize / 8
    }

    /// Bytes in one interleaved sample frame (all channels).
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Playback duration represented by `bytes` of captured audio.
    pub fn duration_of(&self, bytes: u64) -> Duration {
        let per_second = self.bytes_per_second() as f64;
        if per_second == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.read_poll_interval_ms)
    }

    pub fn sessions_directory(&self) -> PathBuf {
        self.output_directory.join("sessions")
    }

    pub fn frames_directory(&self) -> PathBuf {
        self.output_directory.join("frames")
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
            sink_format: SinkFormat::Pcm,
            queue_capacity: 1000,
            session_buffer_chunks: 64,
            worker_threads: 2,
            read_chunk_bytes: 4096,
            enable_persistence: true,
            enable_effects: true,
            effect_gain: 1.5,
            low_amplitude_threshold: 0.1,
            write_metadata: true,
            stop_poll_attempts: 10,
            stop_poll_interval_ms: 100,
            read_poll_interval_ms: 20,
            output_directory: PathBuf::from("audio_captures"),
        }
    }
}
