use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static NEXT_FRAME_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Tag naming the external trigger that produced a session or frame
/// (capture API, a specific call, ...). Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag reduced to `[A-Za-z0-9_-]`, for use in file names.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if stem.is_empty() {
            "unknown".into()
        } else {
            stem
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Unique identifier of a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh id. The random part keeps concurrently active
    /// sessions from the same source distinct.
    pub fn generate(source: &SourceTag) -> Self {
        Self(format!("{}-{}", source.file_stem(), uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One captured chunk of raw sample bytes, queued for processing.
///
/// Frames are values: the payload is an owned copy shared immutably between
/// pipeline stages, and there is no link back to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub payload: Arc<[u8]>,
    pub timestamp: DateTime<Utc>,
    pub source: SourceTag,
    pub sequence: u64,
}

impl AudioFrame {
    /// Copy `bytes` into a new frame stamped with the current time.
    pub fn copy_from(bytes: &[u8], source: SourceTag) -> Self {
        Self {
            payload: Arc::from(bytes),
            timestamp: Utc::now(),
            source,
            sequence: NEXT_FRAME_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Valid byte count.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }
}

/// Summary statistics over a frame's 16-bit little-endian samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub sample_count: usize,
    pub mean_abs_amplitude: f64,
    pub max: i16,
    pub min: i16,
    /// `max - min`, widened so a full-scale frame does not overflow.
    pub dynamic_range: i32,
}
