use std::path::Path;

use serde::{Deserialize, Serialize};

use super::audio_models::StreamDiagnostics;

/// Summary of a finished capture, stored as a JSON sidecar next to the
/// stream file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub id: String,
    pub created_at: String,
    pub stream_file: String,
    pub checksum: String,
    pub streams: Vec<StreamDiagnostics>,
}

impl CaptureSummary {
    pub fn new(stream_file: &Path, checksum: &str, streams: Vec<StreamDiagnostics>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            stream_file: stream_file.to_string_lossy().into_owned(),
            checksum: checksum.to_string(),
            streams,
        }
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.streams.iter().map(|s| s.bytes_written).sum()
    }

    pub fn total_buffers_dropped(&self) -> u64 {
        self.streams.iter().map(|s| s.buffers_dropped).sum()
    }
}
