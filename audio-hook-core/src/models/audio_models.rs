use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a device stream, as handed over by the device
/// collaborator (typically the address of its PCM handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Stable index of a stream entry in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub(crate) usize);

impl StreamId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of a stream's capture counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDiagnostics {
    pub device: Option<String>,
    /// Session-unique id announced downstream, once initialized.
    pub stream_id: Option<u32>,
    pub buffers_staged: u64,
    pub buffers_written: u64,
    pub bytes_written: u64,
    pub buffers_dropped: u64,
    /// Overwritten before the worker emitted them (unacknowledged handoff only).
    #[serde(default)]
    pub buffers_replaced: u64,
    pub write_failures: u64,
}
