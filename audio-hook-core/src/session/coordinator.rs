//! Producer-side entry points, run inside the device's calling context.
//!
//! Every call follows the same cycle: capturing check → stream lookup →
//! producer lock → validation → slot claim → stage → signal the worker.
//! Guards release the producer lock and any claimed slot permit on every
//! exit path.

use std::sync::atomic::Ordering;
use std::thread;

use parking_lot::MutexGuard;

use crate::models::audio_models::DeviceHandle;
use crate::models::config::{AsyncHandoff, ZeroChannelCommit};
use crate::models::error::HookError;
use crate::models::format::StreamFormat;
use crate::models::state::CallingMode;
use crate::processing::layout::{self, MmapArea};
use crate::processing::negotiator;
use crate::session::hook::AudioHook;
use crate::session::stream::{Handoff, Slot, StreamState};

/// Exclusive hold on a stream's slot for one producer cycle.
struct SlotClaim<'a> {
    handoff: &'a Handoff,
    slot: MutexGuard<'a, Slot>,
    /// A slot-empty permit was taken and must be returned if the cycle aborts.
    holds_permit: bool,
}

impl SlotClaim<'_> {
    /// Grow the slot to `bytes`, record `timestamp` and let `fill` write the payload.
    fn stage(
        &mut self,
        bytes: usize,
        timestamp: u64,
        fill: impl FnOnce(&mut [u8]) -> Result<(), HookError>,
    ) -> Result<(), HookError> {
        self.slot.ensure_capacity(bytes)?;
        self.slot.size = bytes;
        self.slot.timestamp = timestamp;
        fill(&mut self.slot.data[..bytes])
    }

    /// Hand the staged buffer to the worker. Returns whether it replaced a
    /// buffer the worker had not picked up yet.
    fn commit(mut self) -> bool {
        let replaced = std::mem::replace(&mut self.slot.pending, true);
        self.holds_permit = false;
        self.handoff.slot_full.release();
        replaced
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        if self.holds_permit {
            self.handoff.slot_empty.release();
        }
    }
}

impl AudioHook {
    /// Stage one interleaved buffer of `frames` frames.
    pub fn write_interleaved(&self, handle: DeviceHandle, data: &[u8], frames: usize) -> Result<(), HookError> {
        if !self.is_capturing() {
            return Ok(());
        }
        let stream = self.registry.get_or_create(handle, CallingMode::default());
        let producer = stream.producer.lock();
        let format = producer.active_format()?;

        if !format.interleaved {
            return Err(HookError::IncompatibleLayout(
                "interleaved write on a non-interleaved stream".into(),
            ));
        }
        let bytes = format.frames_to_bytes(frames);
        if data.len() < bytes {
            return Err(HookError::ShortBuffer {
                expected: bytes,
                actual: data.len(),
            });
        }

        self.run_cycle(&stream, producer.audio_id, bytes, |out| {
            out.copy_from_slice(&data[..bytes]);
            Ok(())
        })
    }

    /// Stage one buffer per channel, `frames` samples each.
    ///
    /// The payload carries the channel blocks back to back.
    pub fn write_noninterleaved(&self, handle: DeviceHandle, buffers: &[&[u8]], frames: usize) -> Result<(), HookError> {
        if !self.is_capturing() {
            return Ok(());
        }
        let stream = self.registry.get_or_create(handle, CallingMode::default());
        let producer = stream.producer.lock();
        let format = producer.active_format()?;

        if format.interleaved {
            return Err(HookError::IncompatibleLayout(
                "per-channel write on an interleaved stream".into(),
            ));
        }
        if buffers.len() != format.channels as usize {
            return Err(HookError::IncompatibleLayout(format!(
                "expected {} channel buffers, got {}",
                format.channels,
                buffers.len()
            )));
        }
        let block = format.samples_to_bytes(frames);
        if let Some(short) = buffers.iter().find(|buffer| buffer.len() < block) {
            return Err(HookError::ShortBuffer {
                expected: block,
                actual: short.len(),
            });
        }
        let bytes = format.frames_to_bytes(frames);

        self.run_cycle(&stream, producer.audio_id, bytes, |out| {
            layout::copy_channel_blocks(buffers, block, out)
        })
    }

    /// Record the device areas for the next commit.
    pub fn mmap_begin(&self, handle: DeviceHandle, areas: &[MmapArea], offset: usize, frames: usize) -> Result<(), HookError> {
        if !self.is_capturing() {
            return Ok(());
        }
        let stream = self.registry.get_or_create(handle, CallingMode::default());
        let mut producer = stream.producer.lock();
        if let Ok(format) = producer.active_format() {
            negotiator::check_mmap_compatible(&format)?;
        }

        producer.mmap_areas.clear();
        producer.mmap_areas.extend_from_slice(areas);
        producer.mmap_window = Some((offset, frames));
        Ok(())
    }

    /// Capture `frames` frames at `offset` from the areas recorded by the
    /// matching begin. The commit window wins over the begin window.
    pub fn mmap_commit(&self, handle: DeviceHandle, offset: usize, frames: usize) -> Result<(), HookError> {
        if !self.is_capturing() {
            return Ok(());
        }
        let stream = self.registry.get_or_create(handle, CallingMode::default());
        let mut producer = stream.producer.lock();

        let Some((begin_offset, begin_frames)) = producer.mmap_window.take() else {
            log::warn!("mmap commit without begin on stream {}", stream.id);
            return Err(HookError::ProtocolViolation("commit without begin".into()));
        };
        let format = producer.active_format()?;
        if format.channels == 0 {
            return match self.context.config.zero_channel_commit {
                ZeroChannelCommit::Ignore => Ok(()),
                ZeroChannelCommit::Reject => Err(HookError::ProtocolViolation(
                    "commit on a zero-channel stream".into(),
                )),
            };
        }
        if offset != begin_offset || frames != begin_frames {
            log::warn!(
                "mmap commit window ({}, {} frames) differs from begin ({}, {} frames) on stream {}",
                offset,
                frames,
                begin_offset,
                begin_frames,
                stream.id
            );
        }
        negotiator::check_mmap_compatible(&format)?;
        check_area_count(&format, producer.mmap_areas.len())?;

        let areas = &producer.mmap_areas[..format.channels as usize];
        let bytes = format.frames_to_bytes(frames);
        self.run_cycle(&stream, producer.audio_id, bytes, |out| {
            // SAFETY: areas recorded by begin stay valid until this commit
            // returns, per the `MmapArea::from_raw_parts` contract.
            unsafe {
                if format.needs_conversion {
                    layout::mmap_to_interleaved(areas, offset, frames, format.sample_bytes(), out)
                } else {
                    let region = layout::interleaved_region(&areas[0].channel_area(), offset, bytes)?;
                    out.copy_from_slice(region);
                    Ok(())
                }
            }
        })
    }

    /// Claim the slot, stage `bytes` through `fill` and wake the worker.
    /// The caller holds the stream's producer lock.
    fn run_cycle(
        &self,
        stream: &StreamState,
        audio_id: Option<u32>,
        bytes: usize,
        fill: impl FnOnce(&mut [u8]) -> Result<(), HookError>,
    ) -> Result<(), HookError> {
        let mut claim = self.claim_slot(stream, audio_id.unwrap_or(0))?;
        claim.stage(bytes, self.context.clock.now(), fill)?;
        if claim.commit() {
            log::debug!("Replaced an unsent buffer on stream {}", stream.id);
            stream.counters.buffers_replaced.fetch_add(1, Ordering::Relaxed);
        }
        stream.counters.buffers_staged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn claim_slot<'a>(&self, stream: &'a StreamState, audio_id: u32) -> Result<SlotClaim<'a>, HookError> {
        let handoff = &*stream.handoff;
        check_worker_running(stream)?;
        if stream.mode().is_blocking() {
            handoff.slot_empty.acquire();
            return Ok(SlotClaim {
                handoff,
                slot: handoff.slot.lock(),
                holds_permit: true,
            });
        }

        loop {
            if let Some(claim) = self.try_claim(handoff) {
                return Ok(claim);
            }
            check_worker_running(stream)?;
            if self.context.skip_on_busy() {
                log::warn!("Dropped audio data on stream {}, capture thread not ready", stream.id);
                stream.counters.buffers_dropped.fetch_add(1, Ordering::Relaxed);
                self.context.notify_dropped(audio_id);
                return Err(HookError::Busy);
            }
            thread::yield_now();
        }
    }

    /// Non-blocking claim: the worker must be parked and the slot free.
    fn try_claim<'a>(&self, handoff: &'a Handoff) -> Option<SlotClaim<'a>> {
        if !handoff.ready.load(Ordering::SeqCst) {
            return None;
        }
        let slot = handoff.slot.try_lock()?;
        let holds_permit = match self.context.config.async_handoff {
            AsyncHandoff::Unsynchronized => false,
            AsyncHandoff::Acknowledged => {
                if !handoff.slot_empty.try_acquire() {
                    return None;
                }
                true
            }
        };
        Some(SlotClaim {
            handoff,
            slot,
            holds_permit,
        })
    }
}

/// A worker that exited without being stopped will never drain the slot.
fn check_worker_running(stream: &StreamState) -> Result<(), HookError> {
    if stream.handoff.running.load(Ordering::SeqCst) {
        return Ok(());
    }
    log::error!("Capture worker for stream {} is gone", stream.id);
    Err(HookError::WorkerExited)
}

fn check_area_count(format: &StreamFormat, areas: usize) -> Result<(), HookError> {
    let needed = format.channels as usize;
    if areas < needed {
        return Err(HookError::InvalidArea(format!(
            "{} areas recorded, {} needed",
            areas, needed
        )));
    }
    Ok(())
}
