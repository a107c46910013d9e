use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::session_info::SessionRecord;

/// Sidecar path for a sink: `{sink}.metadata.json`.
pub fn metadata_path(sink_path: &Path) -> PathBuf {
    let mut name = sink_path.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write a finished session's record as a JSON sidecar next to its sink.
pub fn write_record(record: &SessionRecord, sink_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = metadata_path(sink_path);
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read the sidecar record of a sink.
pub fn read_record(sink_path: &Path) -> Result<SessionRecord, CaptureError> {
    let json = fs::read_to_string(metadata_path(sink_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::{SessionId, SourceTag};
    use crate::models::config::SinkFormat;
    use crate::models::session_info::ExitReason;

    #[test]
    fn sidecar_sits_next_to_sink() {
        let path = metadata_path(Path::new("/out/sessions/s1_20260101T000000.000_1.pcm"));
        assert_eq!(path, PathBuf::from("/out/sessions/s1_20260101T000000.000_1.pcm.metadata.json"));
    }

    #[test]
    fn record_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let sink_path = dir.path().join("s1.pcm");
        let now = chrono::Utc::now();
        let record = SessionRecord {
            id: SessionId::from("s1-abc"),
            source: SourceTag::new("s1"),
            started_at: now,
            stopped_at: now,
            duration_secs: 1.25,
            sink_path: sink_path.to_string_lossy().to_string(),
            sink_format: SinkFormat::Pcm,
            bytes_written: 12288,
            frames_captured: 3,
            frames_dropped: 0,
            checksum: Some("00".repeat(32)),
            exit_reason: ExitReason::InputFailed("device gone".into()),
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        };

        write_record(&record, &sink_path).unwrap();
        let json = fs::read_to_string(metadata_path(&sink_path)).unwrap();
        assert!(json.contains("\"kind\": \"input_failed\""));
        assert_eq!(read_record(&sink_path).unwrap(), record);
    }
}
