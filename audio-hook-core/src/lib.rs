//! # audio-hook-core
//!
//! Capture core of an audio device hook.
//!
//! Moves captured PCM buffers out of the device's calling context (a normal
//! thread, or a signal/realtime callback that must never block) into one
//! capture worker per stream, which frames them and forwards them to a
//! downstream packet sink.
//!
//! ## Architecture
//!
//! ```text
//! audio-hook-core (this crate)
//! ├── traits/       ← PacketSink, PacketChannel, Clock, HookDelegate
//! ├── models/       ← HookError, HookConfiguration, StreamFormat, CallingMode, diagnostics
//! ├── processing/   ← format negotiation, planar → interleaved layout, wire format
//! ├── sync/         ← semaphore, mode-selected critical section
//! ├── session/      ← AudioHook (control surface + producer calls), registry, capture worker
//! └── storage/      ← MemorySink, StreamFileWriter, summary sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod sync;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{DeviceHandle, StreamDiagnostics, StreamId};
pub use models::capture_summary::CaptureSummary;
pub use models::config::{AsyncHandoff, HookConfiguration, ZeroChannelCommit};
pub use models::error::HookError;
pub use models::format::{AccessLayout, HardwareParams, SampleFormat, StreamFormat};
pub use models::state::{CallingMode, WorkerState};
pub use processing::layout::MmapArea;
pub use processing::wire_format::{AudioFormatMessage, AudioHeader, Message, MessageType};
pub use session::hook::AudioHook;
pub use storage::memory_sink::MemorySink;
pub use storage::stream_file::{read_stream_file, StreamFileWriter};
pub use traits::clock::{Clock, ManualClock, MonotonicClock};
pub use traits::hook_delegate::HookDelegate;
pub use traits::sink::{PacketChannel, PacketSink};
