use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::models::config::AsyncHandoff;
use crate::models::error::HookError;
use crate::models::state::{CallingMode, WorkerState};
use crate::processing::wire_format::{AudioHeader, MessageType};
use crate::session::context::HookContext;
use crate::session::stream::{Handoff, StreamCounters};
use crate::traits::sink::PacketChannel;

/// Everything a capture worker owns or shares with its stream.
pub(crate) struct WorkerContext {
    pub(crate) stream_id: u32,
    pub(crate) mode: CallingMode,
    pub(crate) handoff: Arc<Handoff>,
    pub(crate) counters: Arc<StreamCounters>,
    pub(crate) channel: Box<dyn PacketChannel>,
    pub(crate) hook: Arc<HookContext>,
}

/// Handle to a running capture worker thread.
pub(crate) struct WorkerHandle {
    handoff: Arc<Handoff>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn the worker for a freshly reset handoff.
    pub(crate) fn spawn(context: WorkerContext, name: String) -> Result<Self, HookError> {
        let handoff = Arc::clone(&context.handoff);
        handoff.running.store(true, Ordering::SeqCst);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || CaptureWorker::new(context).run())
            .map_err(|e| {
                handoff.running.store(false, Ordering::SeqCst);
                HookError::WorkerSpawn(e.to_string())
            })?;

        Ok(Self {
            handoff,
            thread: Some(thread),
        })
    }

    /// Ask the worker to exit and wait until it has.
    ///
    /// Nothing still staged is flushed. Blocks for as long as an in-flight
    /// sink write takes.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.handoff.running.store(false, Ordering::SeqCst);
        self.handoff.slot_full.release();
        self.handoff.terminated.acquire();

        if thread.join().is_err() {
            log::error!("Capture worker panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs however the worker loop ends, panics included: marks the worker
/// gone, hands back the slot-empty permit a producer may be waiting on and
/// posts the terminated signal.
struct ExitSignal {
    handoff: Arc<Handoff>,
    acknowledges_drain: bool,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.handoff.ready.store(false, Ordering::SeqCst);
        self.handoff.running.store(false, Ordering::SeqCst);
        if self.acknowledges_drain {
            self.handoff.slot_empty.release();
        }
        self.handoff.terminated.release();
    }
}

struct CaptureWorker {
    context: WorkerContext,
    state: WorkerState,
}

impl CaptureWorker {
    fn new(context: WorkerContext) -> Self {
        Self {
            context,
            state: WorkerState::Ready,
        }
    }

    fn run(mut self) {
        let _exit = ExitSignal {
            handoff: Arc::clone(&self.context.handoff),
            acknowledges_drain: self.acknowledges_drain(),
        };
        log::debug!("Capture worker for stream {} started", self.context.stream_id);

        while !self.state.is_terminal() {
            self.state = match self.state {
                WorkerState::Ready => self.wait_for_buffer(),
                WorkerState::Draining => {
                    self.drain();
                    if self.acknowledges_drain() {
                        self.context.handoff.slot_empty.release();
                    }
                    WorkerState::Ready
                }
                WorkerState::Terminated => WorkerState::Terminated,
            };
        }

        log::debug!("Capture worker for stream {} exiting", self.context.stream_id);
    }

    fn wait_for_buffer(&self) -> WorkerState {
        let handoff = &self.context.handoff;
        handoff.ready.store(true, Ordering::SeqCst);
        handoff.slot_full.acquire();
        handoff.ready.store(false, Ordering::SeqCst);

        if handoff.running.load(Ordering::SeqCst) {
            WorkerState::Draining
        } else {
            WorkerState::Terminated
        }
    }

    /// Whether the producer waits for this worker to finish each buffer.
    fn acknowledges_drain(&self) -> bool {
        self.context.mode.is_blocking() || self.context.hook.config.async_handoff == AsyncHandoff::Acknowledged
    }

    /// Emit the staged buffer, if a new one was staged since the last drain.
    fn drain(&mut self) {
        let context = &mut self.context;
        let mut slot = context.handoff.slot.lock();
        if !slot.pending {
            return;
        }
        slot.pending = false;

        let header = AudioHeader {
            stream_id: context.stream_id,
            timestamp: slot.timestamp,
            size: slot.size as u64,
        }
        .encode();
        let result = context
            .channel
            .write_packet(&[&MessageType::Audio.header(), &header, slot.payload()]);
        let size = slot.size as u64;
        drop(slot);

        match result {
            Ok(()) => {
                context.counters.buffers_written.fetch_add(1, Ordering::Relaxed);
                context.counters.bytes_written.fetch_add(size, Ordering::Relaxed);
            }
            Err(e) => {
                let error = if matches!(e, HookError::ChannelWrite(_)) {
                    e
                } else {
                    HookError::ChannelWrite(e.to_string())
                };
                log::error!("Failed to write audio data for stream {}: {}", context.stream_id, error);
                context.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                context.hook.notify_error(context.stream_id, &error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::audio_models::{DeviceHandle, StreamId};
    use crate::models::config::HookConfiguration;
    use crate::session::stream::StreamState;
    use crate::storage::memory_sink::MemorySink;
    use crate::test_support::{audio_packets, wait_until};
    use crate::traits::clock::ManualClock;
    use crate::traits::sink::PacketSink;

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn_worker(stream: &StreamState, channel: Box<dyn PacketChannel>) -> WorkerHandle {
        let hook = Arc::new(HookContext::new(HookConfiguration::default(), Arc::new(ManualClock::new(0))));
        WorkerHandle::spawn(
            WorkerContext {
                stream_id: 4,
                mode: stream.mode(),
                handoff: Arc::clone(&stream.handoff),
                counters: Arc::clone(&stream.counters),
                channel,
                hook,
            },
            "audio-hook-test".into(),
        )
        .unwrap()
    }

    fn stage(stream: &StreamState, payload: &[u8], timestamp: u64) {
        let mut slot = stream.handoff.slot.lock();
        slot.ensure_capacity(payload.len()).unwrap();
        slot.data[..payload.len()].copy_from_slice(payload);
        slot.size = payload.len();
        slot.timestamp = timestamp;
        slot.pending = true;
        drop(slot);
        stream.handoff.slot_full.release();
    }

    #[test]
    fn emits_staged_buffer_once() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::NonBlocking);
        let sink = MemorySink::new();
        let worker = spawn_worker(&stream, sink.open_channel().unwrap());

        stage(&stream, &[1, 2, 3], 42);
        // Second wake-up with nothing new staged.
        stream.handoff.slot_full.release();

        assert!(sink.wait_for_packets(1, WAIT));
        assert!(wait_until(WAIT, || stream.handoff.ready.load(Ordering::SeqCst)
            && stream.handoff.slot_full.available() == 0));
        assert_eq!(audio_packets(&sink), vec![(4, 42, vec![1, 2, 3])]);

        worker.stop();
        assert!(!stream.handoff.ready.load(Ordering::SeqCst));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn blocking_mode_acknowledges_each_drain() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::Blocking);
        let sink = MemorySink::new();
        let worker = spawn_worker(&stream, sink.open_channel().unwrap());

        assert!(stream.handoff.slot_empty.try_acquire());
        stage(&stream, &[9], 1);
        assert!(wait_until(WAIT, || stream.handoff.slot_empty.available() == 1));

        worker.stop();
        assert_eq!(stream.counters.buffers_written.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_does_not_flush_staged_data() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::Blocking);
        let sink = MemorySink::new();
        let worker = spawn_worker(&stream, sink.open_channel().unwrap());
        assert!(wait_until(WAIT, || stream.handoff.ready.load(Ordering::SeqCst)));

        stream.handoff.running.store(false, Ordering::SeqCst);
        stage(&stream, &[1], 1);
        worker.stop();
        assert!(sink.is_empty());
    }

    struct PanickingChannel;

    impl PacketChannel for PanickingChannel {
        fn open_transaction(&mut self) -> Result<(), HookError> {
            Ok(())
        }

        fn write(&mut self, _bytes: &[u8]) -> Result<(), HookError> {
            panic!("sink exploded");
        }

        fn close_transaction(&mut self) -> Result<(), HookError> {
            Ok(())
        }
    }

    #[test]
    fn panicking_sink_does_not_hang_stop() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::Blocking);
        let worker = spawn_worker(&stream, Box::new(PanickingChannel));

        assert!(stream.handoff.slot_empty.try_acquire());
        stage(&stream, &[1], 1);
        assert!(wait_until(WAIT, || stream.handoff.terminated.available() == 1));
        assert!(!stream.handoff.running.load(Ordering::SeqCst));
        // The permit taken for the lost buffer comes back for the next producer.
        assert_eq!(stream.handoff.slot_empty.available(), 1);
        worker.stop();
    }

    #[test]
    fn dropping_the_handle_stops_and_joins_the_worker() {
        let stream = StreamState::new(StreamId(0), DeviceHandle(1), CallingMode::NonBlocking);
        let sink = MemorySink::new();
        let worker = spawn_worker(&stream, sink.open_channel().unwrap());
        assert!(wait_until(WAIT, || stream.handoff.ready.load(Ordering::SeqCst)));

        drop(worker);
        assert!(!stream.handoff.running.load(Ordering::SeqCst));
        assert!(!stream.handoff.ready.load(Ordering::SeqCst));
        // The joined thread released its share of the handoff.
        assert_eq!(Arc::strong_count(&stream.handoff), 1);
    }
}
