use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::audio_models::AudioFrame;
use crate::models::error::CaptureError;

/// Writes processed frames as individual files under one directory.
///
/// File names are `<source>_<timestamp-millis>_<sequence>.pcm`, so the same
/// frame always maps to the same path.
#[derive(Debug, Clone)]
pub struct FrameStore {
    directory: PathBuf,
}

impl FrameStore {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, frame: &AudioFrame) -> PathBuf {
        self.directory.join(format!(
            "{}_{}_{:06}.pcm",
            frame.source.file_stem(),
            frame.timestamp.timestamp_millis(),
            frame.sequence
        ))
    }

    /// Persist `data` (the converted form of `frame`).
    pub fn write(&self, frame: &AudioFrame, data: &[u8]) -> Result<PathBuf, CaptureError> {
        let path = self.path_for(frame);
        let mut file = File::create(&path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", path.display(), e)))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("failed to write {}: {}", path.display(), e)))?;
        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        Ok(path)
    }
}
