use crate::models::error::HookError;
use crate::models::format::StreamFormat;

/// Session-level observer for capture events.
///
/// `on_error` and `on_buffer_dropped` may be called from capture worker
/// threads and from producer calls, including non-blocking ones. Keep
/// implementations short and non-blocking.
pub trait HookDelegate: Send + Sync {
    /// A stream's worker was (re)started with `format`.
    fn on_stream_initialized(&self, stream_id: u32, format: &StreamFormat);

    /// A producer buffer was dropped because the worker was busy.
    fn on_buffer_dropped(&self, stream_id: u32);

    /// A worker failed to write, or a stream failed to initialize.
    fn on_error(&self, stream_id: u32, error: &HookError);
}
