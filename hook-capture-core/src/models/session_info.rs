use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_models::{SessionId, SourceTag};
use super::config::SinkFormat;

/// Point-in-time view of a registered session, as returned by `list_sessions`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub source: SourceTag,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub active: bool,
    /// Current sink size in bytes, header included.
    pub sink_size: u64,
    pub frames_captured: u64,
    pub sink_path: PathBuf,
}

/// Why a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExitReason {
    Stopped,
    InputFailed(String),
    SinkFailed(String),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Final record of a finished session.
///
/// Serialized as the JSON sidecar next to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub source: SourceTag,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub sink_path: String,
    pub sink_format: SinkFormat,
    pub bytes_written: u64,
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub checksum: Option<String>,
    pub exit_reason: ExitReason,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}
