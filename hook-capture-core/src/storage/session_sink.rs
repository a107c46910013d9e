use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::config::{CaptureConfiguration, SinkFormat};
use crate::models::error::CaptureError;
use crate::processing::wav_format;

/// Exclusive raw-capture destination of one session.
///
/// Owned by the session's capture loop; nothing else writes to it.
///
/// ## File Format
///
/// **Pcm:** the captured bytes, nothing else.
///
/// **Wav:**
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [captured 16-bit PCM...]
/// ```
#[derive(Debug)]
pub struct SessionSink {
    path: PathBuf,
    format: SinkFormat,
    file: Option<File>,
    total_bytes_written: u64,
    data_bytes: u64,
}

impl SessionSink {
    /// Create the sink file (and its parent directory).
    pub fn open(path: PathBuf, config: &CaptureConfiguration) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create sink {}: {}", path.display(), e)))?;

        let mut sink = Self {
            path,
            format: config.sink_format,
            file: Some(file),
            total_bytes_written: 0,
            data_bytes: 0,
        };

        if sink.format == SinkFormat::Wav {
            let header = wav_format::header(config.sample_rate, config.channels, config.bit_depth, 0);
            sink.write_raw(&header)?;
        }
        Ok(sink)
    }

    /// Append captured bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.write_raw(data)?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Finalize and close the sink, returning the SHA-256 of the file.
    ///
    /// Fails if the sink was already closed.
    pub fn close(&mut self) -> Result<String, CaptureError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("sink already closed".into()))?;

        if self.format == SinkFormat::Wav {
            wav_format::patch_sizes(&mut file, self.data_bytes)
                .map_err(|e| CaptureError::StorageError(format!("failed to patch WAV header: {}", e)))?;
        }
        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.sync_all().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        drop(file);

        sha256_file(&self.path)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Total bytes on disk so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Captured audio bytes, header excluded.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("sink is closed".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("sink write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

/// SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
