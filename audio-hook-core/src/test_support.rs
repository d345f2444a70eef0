//! Shared harness for session tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::HookError;
use crate::models::format::{AccessLayout, HardwareParams, SampleFormat, StreamFormat};
use crate::processing::wire_format::Message;
use crate::storage::memory_sink::MemorySink;
use crate::traits::hook_delegate::HookDelegate;
use crate::traits::sink::{PacketChannel, PacketSink};

/// Mono S16 interleaved at 48 kHz, 256-frame periods.
pub(crate) fn mono_s16() -> HardwareParams {
    HardwareParams {
        format: SampleFormat::S16Le,
        channels: 1,
        rate: 48000,
        access: AccessLayout::Interleaved,
        period_frames: Some(256),
    }
}

pub(crate) fn params(format: SampleFormat, channels: u32, access: AccessLayout) -> HardwareParams {
    HardwareParams {
        format,
        channels,
        rate: 44100,
        access,
        period_frames: None,
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

/// `(stream id, timestamp, payload)` of every audio packet, in order.
pub(crate) fn audio_packets(sink: &MemorySink) -> Vec<(u32, u64, Vec<u8>)> {
    sink.packets()
        .iter()
        .filter_map(|packet| match Message::decode(packet) {
            Ok(Message::Audio { header, payload }) => Some((header.stream_id, header.timestamp, payload.to_vec())),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
pub(crate) struct RecordingDelegate {
    initialized: Mutex<Vec<(u32, StreamFormat)>>,
    dropped: Mutex<Vec<u32>>,
    errors: Mutex<Vec<(u32, HookError)>>,
}

impl RecordingDelegate {
    pub(crate) fn initialized(&self) -> Vec<(u32, StreamFormat)> {
        self.initialized.lock().clone()
    }

    pub(crate) fn dropped(&self) -> Vec<u32> {
        self.dropped.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<(u32, HookError)> {
        self.errors.lock().clone()
    }
}

impl HookDelegate for RecordingDelegate {
    fn on_stream_initialized(&self, stream_id: u32, format: &StreamFormat) {
        self.initialized.lock().push((stream_id, *format));
    }

    fn on_buffer_dropped(&self, stream_id: u32) {
        self.dropped.lock().push(stream_id);
    }

    fn on_error(&self, stream_id: u32, error: &HookError) {
        self.errors.lock().push((stream_id, error.clone()));
    }
}

/// Memory sink whose writes fail while the switch is on.
#[derive(Clone, Default)]
pub(crate) struct FailingSink {
    pub(crate) inner: MemorySink,
    failing: Arc<AtomicBool>,
}

impl FailingSink {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PacketSink for FailingSink {
    fn open_channel(&self) -> Result<Box<dyn PacketChannel>, HookError> {
        Ok(Box::new(FailingChannel {
            inner: self.inner.open_channel()?,
            failing: Arc::clone(&self.failing),
        }))
    }
}

struct FailingChannel {
    inner: Box<dyn PacketChannel>,
    failing: Arc<AtomicBool>,
}

impl PacketChannel for FailingChannel {
    fn open_transaction(&mut self) -> Result<(), HookError> {
        self.inner.open_transaction()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HookError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HookError::ChannelWrite("sink unavailable".into()));
        }
        self.inner.write(bytes)
    }

    fn close_transaction(&mut self) -> Result<(), HookError> {
        self.inner.close_transaction()
    }
}

#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
    blocked: AtomicUsize,
}

/// Memory sink that can hold publishing workers at a closed gate.
#[derive(Clone, Default)]
pub(crate) struct GatedSink {
    pub(crate) inner: MemorySink,
    gate: Arc<Gate>,
}

impl GatedSink {
    pub(crate) fn close(&self) {
        *self.gate.closed.lock() = true;
    }

    pub(crate) fn open(&self) {
        *self.gate.closed.lock() = false;
        self.gate.changed.notify_all();
    }

    /// Wait until `count` writers are held at the gate.
    pub(crate) fn wait_for_blocked(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.gate.blocked.load(Ordering::SeqCst) >= count)
    }
}

impl PacketSink for GatedSink {
    fn open_channel(&self) -> Result<Box<dyn PacketChannel>, HookError> {
        Ok(Box::new(GatedChannel {
            inner: self.inner.open_channel()?,
            gate: Arc::clone(&self.gate),
        }))
    }
}

struct GatedChannel {
    inner: Box<dyn PacketChannel>,
    gate: Arc<Gate>,
}

impl PacketChannel for GatedChannel {
    fn open_transaction(&mut self) -> Result<(), HookError> {
        self.inner.open_transaction()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HookError> {
        self.inner.write(bytes)
    }

    fn close_transaction(&mut self) -> Result<(), HookError> {
        let mut closed = self.gate.closed.lock();
        if *closed {
            self.gate.blocked.fetch_add(1, Ordering::SeqCst);
            while *closed {
                self.gate.changed.wait(&mut closed);
            }
            self.gate.blocked.fetch_sub(1, Ordering::SeqCst);
        }
        drop(closed);
        self.inner.close_transaction()
    }
}
