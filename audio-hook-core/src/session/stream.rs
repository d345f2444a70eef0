use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{DeviceHandle, StreamDiagnostics, StreamId};
use crate::models::error::HookError;
use crate::models::format::StreamFormat;
use crate::models::state::CallingMode;
use crate::processing::layout::MmapArea;
use crate::session::worker::WorkerHandle;
use crate::sync::critical_section::CriticalSection;
use crate::sync::semaphore::Semaphore;

/// Registry entry for one device stream.
///
/// Producer-side state lives in a critical section whose kind follows the
/// calling mode the entry was created with. The handoff and counters are
/// shared with the stream's capture worker.
pub(crate) struct StreamState {
    pub(crate) id: StreamId,
    pub(crate) handle: DeviceHandle,
    pub(crate) producer: CriticalSection<ProducerState>,
    pub(crate) handoff: Arc<Handoff>,
    pub(crate) counters: Arc<StreamCounters>,
}

impl StreamState {
    pub(crate) fn new(id: StreamId, handle: DeviceHandle, mode: CallingMode) -> Self {
        Self {
            id,
            handle,
            producer: CriticalSection::new(mode, ProducerState::default()),
            handoff: Arc::new(Handoff::new()),
            counters: Arc::new(StreamCounters::default()),
        }
    }

    pub(crate) fn mode(&self) -> CallingMode {
        self.producer.mode()
    }

    pub(crate) fn diagnostics(&self) -> StreamDiagnostics {
        let (device, stream_id) = {
            let producer = self.producer.lock();
            (producer.name.clone(), producer.audio_id)
        };
        self.counters.snapshot(device, stream_id)
    }
}

/// Worker started for a stream, with the format it was started for.
pub(crate) struct ActiveStream {
    pub(crate) format: StreamFormat,
    pub(crate) worker: WorkerHandle,
}

#[derive(Default)]
pub(crate) struct ProducerState {
    pub(crate) name: Option<String>,
    /// Latest successfully negotiated format; cleared when the device closes.
    pub(crate) known_format: Option<StreamFormat>,
    pub(crate) active: Option<ActiveStream>,
    /// Downstream stream id, assigned on first initialization.
    pub(crate) audio_id: Option<u32>,
    pub(crate) mmap_areas: Vec<MmapArea>,
    /// `(offset, frames)` recorded by the last mmap begin.
    pub(crate) mmap_window: Option<(usize, usize)>,
}

impl ProducerState {
    pub(crate) fn active_format(&self) -> Result<StreamFormat, HookError> {
        self.active
            .as_ref()
            .map(|active| active.format)
            .ok_or(HookError::StreamNotInitialized)
    }

    /// Has a format but no worker yet.
    pub(crate) fn is_pending(&self) -> bool {
        self.known_format.is_some() && self.active.is_none()
    }
}

/// Depth-one handoff between a stream's producer and its worker.
pub(crate) struct Handoff {
    /// Worker is parked waiting for `slot_full`. Polled by non-blocking producers.
    pub(crate) ready: AtomicBool,
    /// Cleared to ask the worker to exit.
    pub(crate) running: AtomicBool,
    pub(crate) slot_full: Semaphore,
    pub(crate) slot_empty: Semaphore,
    pub(crate) terminated: Semaphore,
    pub(crate) slot: Mutex<Slot>,
}

impl Handoff {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            running: AtomicBool::new(false),
            slot_full: Semaphore::new(0),
            slot_empty: Semaphore::new(1),
            terminated: Semaphore::new(0),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Return the signals to their initial states. Only valid while no
    /// worker runs and the producer lock is held.
    pub(crate) fn reset(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.slot_full.reset(0);
        self.slot_empty.reset(1);
        self.terminated.reset(0);
        self.slot.lock().pending = false;
    }
}

/// Reusable capture buffer. Grows, never shrinks.
#[derive(Default)]
pub(crate) struct Slot {
    pub(crate) data: Vec<u8>,
    pub(crate) size: usize,
    pub(crate) timestamp: u64,
    /// Staged and not yet picked up by the worker.
    pub(crate) pending: bool,
}

impl Slot {
    pub(crate) fn ensure_capacity(&mut self, bytes: usize) -> Result<(), HookError> {
        if self.data.len() < bytes {
            self.data
                .try_reserve_exact(bytes - self.data.len())
                .map_err(|_| HookError::AllocationFailure { requested: bytes })?;
            self.data.resize(bytes, 0);
        }
        Ok(())
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.data[..self.size]
    }
}

#[derive(Default)]
pub(crate) struct StreamCounters {
    pub(crate) buffers_staged: AtomicU64,
    pub(crate) buffers_written: AtomicU64,
    pub(crate) bytes_written: AtomicU64,
    pub(crate) buffers_dropped: AtomicU64,
    /// Staged over a buffer the worker never picked up.
    pub(crate) buffers_replaced: AtomicU64,
    pub(crate) write_failures: AtomicU64,
}

impl StreamCounters {
    fn snapshot(&self, device: Option<String>, stream_id: Option<u32>) -> StreamDiagnostics {
        StreamDiagnostics {
            device,
            stream_id,
            buffers_staged: self.buffers_staged.load(Ordering::Relaxed),
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            buffers_replaced: self.buffers_replaced.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_starts_with_initial_signal_states() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::NonBlocking);
        assert_eq!(stream.mode(), CallingMode::NonBlocking);
        assert_eq!(stream.handoff.slot_full.available(), 0);
        assert_eq!(stream.handoff.slot_empty.available(), 1);
        assert_eq!(stream.handoff.terminated.available(), 0);
        assert!(!stream.handoff.ready.load(Ordering::SeqCst));
        assert!(stream.producer.lock().active.is_none());
    }

    #[test]
    fn reset_restores_initial_signal_states() {
        let handoff = Handoff::new();
        handoff.slot_full.release();
        assert!(handoff.slot_empty.try_acquire());
        handoff.terminated.release();
        handoff.slot.lock().pending = true;

        handoff.reset();
        assert_eq!(handoff.slot_full.available(), 0);
        assert_eq!(handoff.slot_empty.available(), 1);
        assert_eq!(handoff.terminated.available(), 0);
        assert!(!handoff.slot.lock().pending);
    }

    #[test]
    fn slot_grows_and_never_shrinks() {
        let mut slot = Slot::default();
        slot.ensure_capacity(64).unwrap();
        assert_eq!(slot.data.len(), 64);
        slot.ensure_capacity(16).unwrap();
        assert_eq!(slot.data.len(), 64);

        slot.size = 4;
        assert_eq!(slot.payload().len(), 4);
    }

    #[test]
    fn oversized_growth_is_an_allocation_failure() {
        let mut slot = Slot::default();
        let err = slot.ensure_capacity(usize::MAX).unwrap_err();
        assert_eq!(err, HookError::AllocationFailure { requested: usize::MAX });
        assert!(slot.data.is_empty());
    }
}
