use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::models::audio_models::{DeviceHandle, StreamDiagnostics, StreamId};
use crate::models::config::HookConfiguration;
use crate::models::error::HookError;
use crate::models::format::{HardwareParams, StreamFormat};
use crate::models::state::CallingMode;
use crate::processing::negotiator;
use crate::processing::wire_format::{AudioFormatMessage, MessageType};
use crate::session::context::HookContext;
use crate::session::registry::StreamRegistry;
use crate::session::stream::{ActiveStream, ProducerState, StreamState};
use crate::session::worker::{WorkerContext, WorkerHandle};
use crate::traits::clock::{Clock, MonotonicClock};
use crate::traits::hook_delegate::HookDelegate;
use crate::traits::sink::PacketSink;

/// Capture hook session: the explicit context every device notification
/// and producer call goes through.
///
/// Lifecycle: construct → [`bind_sink`](Self::bind_sink) once →
/// [`start`](Self::start)/[`stop`](Self::stop) any number of times →
/// [`teardown`](Self::teardown). Dropping the hook tears it down.
///
/// ```text
/// device callback → AudioHook::write_* → [stream slot] → capture worker → PacketSink
///                                 ↑
///   open_stream / configure_stream / close_stream (device notifications)
/// ```
///
/// All methods take `&self`; share the hook between the control thread and
/// device callbacks with an `Arc`.
pub struct AudioHook {
    pub(crate) context: Arc<HookContext>,
    pub(crate) registry: StreamRegistry,
    sink: OnceLock<Arc<dyn PacketSink>>,
    started: AtomicBool,
    next_stream_id: AtomicU32,
}

impl AudioHook {
    pub fn new(config: HookConfiguration) -> Result<Self, HookError> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Build a hook whose capture timestamps come from `clock`.
    pub fn with_clock(config: HookConfiguration, clock: Arc<dyn Clock>) -> Result<Self, HookError> {
        config.validate().map_err(HookError::Configuration)?;
        log::debug!("Audio hook configuration: {:?}", config);

        Ok(Self {
            context: Arc::new(HookContext::new(config, clock)),
            registry: StreamRegistry::new(),
            sink: OnceLock::new(),
            started: AtomicBool::new(false),
            next_stream_id: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &HookConfiguration {
        &self.context.config
    }

    pub fn set_delegate(&self, delegate: Arc<dyn HookDelegate>) {
        self.context.set_delegate(delegate);
    }

    /// Bind the downstream sink. Only the first call succeeds.
    pub fn bind_sink(&self, sink: Arc<dyn PacketSink>) -> Result<(), HookError> {
        self.sink.set(sink).map_err(|_| HookError::AlreadyBound)
    }

    /// Enable capturing and initialize every stream whose format is known.
    ///
    /// Streams that fail to initialize are reported to the delegate and
    /// skipped; they are retried when their format is configured again.
    pub fn start(&self) -> Result<(), HookError> {
        if self.sink.get().is_none() {
            return Err(HookError::SinkNotBound);
        }

        if self.context.capturing.swap(true, Ordering::SeqCst) {
            log::warn!("Audio capture already started");
        } else {
            log::info!("Audio capture started");
        }

        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for snapshot in self.registry.all() {
            self.with_current_stream(snapshot.handle, snapshot.mode(), |stream, producer| {
                if !producer.is_pending() {
                    return;
                }
                if let Err(e) = self.initialize_stream(stream, producer) {
                    let stream_id = producer.audio_id.unwrap_or(0);
                    log::error!("Failed to initialize stream {}: {}", stream.handle, e);
                    self.context.notify_error(stream_id, &e);
                }
            });
        }
        Ok(())
    }

    /// Disable capturing. Producer calls become pass-through no-ops; workers
    /// keep running.
    pub fn stop(&self) {
        if self.context.capturing.swap(false, Ordering::SeqCst) {
            log::info!("Audio capture stopped");
        } else {
            log::warn!("Audio capture already stopped");
        }
    }

    pub fn set_skip_on_busy(&self, enabled: bool) {
        self.context.skip_on_busy.store(enabled, Ordering::SeqCst);
        log::info!("Skip on busy {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_capturing(&self) -> bool {
        self.context.is_capturing()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Stop every capture worker and release all streams.
    ///
    /// Blocks until each running worker has acknowledged its exit. Safe to
    /// call with uninitialized streams and more than once.
    pub fn teardown(&self) {
        let streams = self.registry.drain();
        let mut stopped = 0;
        for stream in streams {
            let active = stream.producer.lock().active.take();
            if let Some(active) = active {
                active.worker.stop();
                stopped += 1;
            }
        }
        self.started.store(false, Ordering::SeqCst);
        log::info!("Audio hook torn down ({} workers stopped)", stopped);
    }

    /// Device opened: register the stream with its calling mode.
    ///
    /// A stream created earlier with another mode is recreated under the
    /// same id, unless its worker is already running.
    pub fn open_stream(&self, handle: DeviceHandle, name: &str, mode: CallingMode) -> StreamId {
        self.with_current_stream(handle, mode, |stream, producer| {
            if stream.mode() != mode {
                if producer.active.is_none() {
                    let fresh = StreamState::new(stream.id, handle, mode);
                    {
                        let mut fresh_producer = fresh.producer.lock();
                        fresh_producer.known_format = producer.known_format;
                        fresh_producer.audio_id = producer.audio_id;
                        fresh_producer.name = Some(name.to_string());
                    }
                    self.registry.replace(Arc::new(fresh));
                    log::info!("Opened {} stream {} on {} ({:?})", name, stream.id, handle, mode);
                    return stream.id;
                }
                log::warn!(
                    "Stream {} already running in {:?} mode, ignoring {:?}",
                    stream.id,
                    stream.mode(),
                    mode
                );
            }

            producer.name = Some(name.to_string());
            log::info!("Opened {} stream {} on {} ({:?})", name, stream.id, handle, stream.mode());
            stream.id
        })
    }

    /// Device closed: forget the stream's format so it is not initialized
    /// again. A running worker keeps running until teardown.
    pub fn close_stream(&self, handle: DeviceHandle) {
        let Some(stream) = self.registry.lookup(handle) else {
            log::debug!("Close for unknown device {}", handle);
            return;
        };
        let mut producer = stream.producer.lock();
        producer.known_format = None;
        log::info!(
            "Closed stream {} on {}",
            stream.id,
            producer.name.as_deref().unwrap_or("unnamed device")
        );
    }

    /// Device reported hardware parameters.
    ///
    /// On negotiation failure the previous format is kept. On success the
    /// stream's worker is (re)started right away if the session is started.
    pub fn configure_stream(&self, handle: DeviceHandle, params: &HardwareParams) -> Result<StreamFormat, HookError> {
        self.with_current_stream(handle, CallingMode::default(), |stream, producer| -> Result<StreamFormat, HookError> {
            let format = negotiator::negotiate(params).map_err(|e| {
                log::error!("Failed to negotiate format for stream {}: {}", stream.id, e);
                e
            })?;
            producer.known_format = Some(format);
            log::debug!("Stream {} format: {:?}", stream.id, format);

            if self.is_started() {
                self.initialize_stream(stream, producer)?;
            }
            Ok(format)
        })
    }

    pub fn stream_diagnostics(&self, handle: DeviceHandle) -> Option<StreamDiagnostics> {
        self.registry.lookup(handle).map(|stream| stream.diagnostics())
    }

    /// Diagnostics of every registered stream, in registration order.
    pub fn diagnostics(&self) -> Vec<StreamDiagnostics> {
        self.registry.all().iter().map(|stream| stream.diagnostics()).collect()
    }

    /// Run `f` under the producer lock of the entry registered for `handle`,
    /// creating it with `mode` if needed.
    ///
    /// An entry replaced by `open_stream` between lookup and lock is
    /// skipped, so work never lands on a state the registry no longer holds.
    fn with_current_stream<R>(
        &self,
        handle: DeviceHandle,
        mode: CallingMode,
        f: impl FnOnce(&StreamState, &mut ProducerState) -> R,
    ) -> R {
        loop {
            let stream = self.registry.get_or_create(handle, mode);
            let mut producer = stream.producer.lock();
            if self.registry.is_current(&stream) {
                return f(&*stream, &mut *producer);
            }
            log::debug!("Stream {} was replaced, retrying", stream.id);
        }
    }

    /// Bind a fresh sink channel, announce the format and (re)start the
    /// stream's worker. The caller holds the stream's producer lock.
    fn initialize_stream(&self, stream: &StreamState, producer: &mut ProducerState) -> Result<(), HookError> {
        let format = producer.known_format.ok_or(HookError::StreamNotInitialized)?;
        let sink = self.sink.get().ok_or(HookError::SinkNotBound)?;
        let stream_id = *producer
            .audio_id
            .get_or_insert_with(|| self.next_stream_id.fetch_add(1, Ordering::SeqCst));

        if let Some(previous) = producer.active.take() {
            previous.worker.stop();
        }
        producer.mmap_window = None;

        let mut channel = sink.open_channel()?;
        let announcement = AudioFormatMessage {
            stream_id,
            flags: format.flags(),
            rate: format.rate,
            channels: format.channels,
        }
        .encode();
        channel.write_packet(&[&MessageType::AudioFormat.header(), &announcement])?;

        stream.handoff.reset();
        let preallocate = format
            .period_frames
            .map(|frames| format.frames_to_bytes(frames) * self.context.config.preallocate_periods as usize)
            .unwrap_or(0);
        stream.handoff.slot.lock().ensure_capacity(preallocate)?;

        let worker = WorkerHandle::spawn(
            WorkerContext {
                stream_id,
                mode: stream.mode(),
                handoff: Arc::clone(&stream.handoff),
                counters: Arc::clone(&stream.counters),
                channel,
                hook: Arc::clone(&self.context),
            },
            format!("{}-{}", self.context.config.thread_name_prefix, stream_id),
        )?;
        producer.active = Some(ActiveStream { format, worker });

        log::info!(
            "Initialized stream {} (id {}): {:?} {} ch @ {} Hz",
            stream.id,
            stream_id,
            format.encoding,
            format.channels,
            format.rate
        );
        self.context.notify_initialized(stream_id, &format);
        Ok(())
    }
}

impl Drop for AudioHook {
    fn drop(&mut self) {
        self.teardown();
    }
}
