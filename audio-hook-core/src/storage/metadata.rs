use std::fs;
use std::path::{Path, PathBuf};

use crate::models::capture_summary::CaptureSummary;
use crate::models::error::HookError;

/// Path of the JSON sidecar for a stream file: `{stream_file}.summary.json`.
pub fn summary_path(stream_file: &Path) -> PathBuf {
    let mut name = stream_file.as_os_str().to_owned();
    name.push(".summary.json");
    PathBuf::from(name)
}

/// Write a capture summary as a JSON sidecar file.
pub fn write_summary(summary: &CaptureSummary, stream_file: &Path) -> Result<PathBuf, HookError> {
    let path = summary_path(stream_file);
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| HookError::Storage(format!("failed to serialize summary: {}", e)))?;
    fs::write(&path, json).map_err(|e| HookError::Storage(format!("failed to write summary: {}", e)))?;
    Ok(path)
}

/// Read a capture summary from its JSON sidecar file.
pub fn read_summary(stream_file: &Path) -> Result<CaptureSummary, HookError> {
    let json = fs::read_to_string(summary_path(stream_file))
        .map_err(|e| HookError::Storage(format!("failed to read summary: {}", e)))?;
    let summary: CaptureSummary = serde_json::from_str(&json)
        .map_err(|e| HookError::Storage(format!("failed to parse summary: {}", e)))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::StreamDiagnostics;

    #[test]
    fn sidecar_sits_next_to_stream_file() {
        assert_eq!(
            summary_path(Path::new("/tmp/capture.ahks")),
            PathBuf::from("/tmp/capture.ahks.summary.json")
        );
    }

    #[test]
    fn summary_survives_the_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let stream_file = dir.path().join("capture.ahks");
        let summary = CaptureSummary::new(
            &stream_file,
            "abc123",
            vec![StreamDiagnostics {
                device: Some("hw:0".into()),
                stream_id: Some(1),
                buffers_written: 4,
                bytes_written: 64,
                buffers_dropped: 1,
                ..Default::default()
            }],
        );

        let written = write_summary(&summary, &stream_file).unwrap();
        assert!(written.exists());

        let loaded = read_summary(&stream_file).unwrap();
        assert_eq!(loaded, summary);
        assert_eq!(loaded.total_bytes_written(), 64);
        assert_eq!(loaded.total_buffers_dropped(), 1);
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_summary(&dir.path().join("none.ahks")).unwrap_err();
        assert!(matches!(err, HookError::Storage(_)));
    }
}
