use serde::{Deserialize, Serialize};

/// Calling context of a stream's producer, fixed when the stream is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingMode {
    /// Producer runs on a normal thread and may block.
    #[default]
    Blocking,
    /// Producer may run in a signal or realtime callback and must never block.
    NonBlocking,
}

impl CallingMode {
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// Capture worker state machine.
///
/// ```text
/// Ready → Draining → Ready
///   ↓
/// Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the producer to fill the slot.
    Ready,
    /// Serializing the staged buffer into the sink.
    Draining,
    /// Asked to exit; no data is flushed.
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}
