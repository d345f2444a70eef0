//! Channel area addressing and planar → interleaved conversion.
//!
//! A channel area describes where one channel's samples live: a byte region,
//! the bit offset of the first sample and the bit stride between
//! consecutive samples. Sample `n` of an area starts at
//! `first_bits / 8 + n * (step_bits / 8)`.

use std::slice;

use crate::models::error::HookError;

/// Borrowed view of one channel's samples.
#[derive(Debug, Clone, Copy)]
pub struct ChannelArea<'a> {
    data: &'a [u8],
    first_bits: usize,
    step_bits: usize,
}

impl<'a> ChannelArea<'a> {
    pub fn new(data: &'a [u8], first_bits: usize, step_bits: usize) -> Self {
        Self {
            data,
            first_bits,
            step_bits,
        }
    }

    /// Byte offset of the sample at `frame`.
    pub fn byte_offset(&self, frame: usize) -> usize {
        self.first_bits / 8 + frame * (self.step_bits / 8)
    }

    /// Check that `frames` samples of `sample_bytes` starting at `start`
    /// are byte aligned and inside the area.
    fn validate(&self, channel: usize, start: usize, frames: usize, sample_bytes: usize) -> Result<(), HookError> {
        if self.first_bits % 8 != 0 || self.step_bits % 8 != 0 {
            return Err(HookError::InvalidArea(format!(
                "channel {}: first={} step={} bits not byte aligned",
                channel, self.first_bits, self.step_bits
            )));
        }
        if frames == 0 {
            return Ok(());
        }

        let end = (start + frames - 1)
            .checked_mul(self.step_bits / 8)
            .and_then(|v| v.checked_add(self.first_bits / 8))
            .and_then(|v| v.checked_add(sample_bytes));
        match end {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(HookError::InvalidArea(format!(
                "channel {}: frames {}..{} exceed {} byte area",
                channel,
                start,
                start + frames,
                self.data.len()
            ))),
        }
    }
}

/// Descriptor of a device-owned mmap area, recorded by an mmap begin and
/// read by the matching commit.
#[derive(Debug, Clone, Copy)]
pub struct MmapArea {
    addr: *const u8,
    len: usize,
    first_bits: usize,
    step_bits: usize,
}

// SAFETY: the descriptor itself is plain data. Validity of the memory it
// points to is the contract of `MmapArea::from_raw_parts`.
unsafe impl Send for MmapArea {}
unsafe impl Sync for MmapArea {}

impl MmapArea {
    /// Describe a device mmap area.
    ///
    /// # Safety
    ///
    /// Unless `len` is zero, `addr` must be valid for reads of `len` bytes
    /// from the mmap begin that records this area until the matching commit
    /// returns, and the region must not be written while that commit runs.
    pub unsafe fn from_raw_parts(addr: *const u8, len: usize, first_bits: usize, step_bits: usize) -> Self {
        Self {
            addr,
            len,
            first_bits,
            step_bits,
        }
    }

    /// Borrow the described memory.
    ///
    /// # Safety
    ///
    /// The contract of [`MmapArea::from_raw_parts`] must still hold.
    pub(crate) unsafe fn channel_area(&self) -> ChannelArea<'_> {
        let data = if self.len == 0 || self.addr.is_null() {
            &[][..]
        } else {
            slice::from_raw_parts(self.addr, self.len)
        };
        ChannelArea::new(data, self.first_bits, self.step_bits)
    }
}

/// Convert planar channel areas into one interleaved buffer.
///
/// Writes `frames × areas.len() × sample_bytes` bytes to `out`; sample `s`
/// of channel `c` lands at `c * sample_bytes + s * frame_bytes`. All areas
/// are validated before anything is written. No allocation.
pub fn complex_to_interleaved(
    areas: &[ChannelArea<'_>],
    start_frame: usize,
    frames: usize,
    sample_bytes: usize,
    out: &mut [u8],
) -> Result<(), HookError> {
    interleave(areas.len(), |c| areas[c], start_frame, frames, sample_bytes, out)
}

/// [`complex_to_interleaved`] over recorded mmap areas.
///
/// # Safety
///
/// The contract of [`MmapArea::from_raw_parts`] must hold for every area.
pub(crate) unsafe fn mmap_to_interleaved(
    areas: &[MmapArea],
    start_frame: usize,
    frames: usize,
    sample_bytes: usize,
    out: &mut [u8],
) -> Result<(), HookError> {
    interleave(
        areas.len(),
        |c| areas[c].channel_area(),
        start_frame,
        frames,
        sample_bytes,
        out,
    )
}

fn interleave<'a>(
    channels: usize,
    area: impl Fn(usize) -> ChannelArea<'a>,
    start_frame: usize,
    frames: usize,
    sample_bytes: usize,
    out: &mut [u8],
) -> Result<(), HookError> {
    let frame_bytes = channels * sample_bytes;
    let needed = frames * frame_bytes;
    if out.len() < needed {
        return Err(HookError::ShortBuffer {
            expected: needed,
            actual: out.len(),
        });
    }
    for channel in 0..channels {
        area(channel).validate(channel, start_frame, frames, sample_bytes)?;
    }

    for channel in 0..channels {
        let area = area(channel);
        let mut dst = channel * sample_bytes;
        for frame in 0..frames {
            let src = area.byte_offset(start_frame + frame);
            out[dst..dst + sample_bytes].copy_from_slice(&area.data[src..src + sample_bytes]);
            dst += frame_bytes;
        }
    }
    Ok(())
}

/// Contiguous `bytes` of an interleaved area starting at `start_frame`.
pub fn interleaved_region<'a>(area: &ChannelArea<'a>, start_frame: usize, bytes: usize) -> Result<&'a [u8], HookError> {
    area.validate(0, start_frame, 1, 0)?;
    let start = area.byte_offset(start_frame);
    start
        .checked_add(bytes)
        .filter(|end| *end <= area.data.len())
        .map(|end| &area.data[start..end])
        .ok_or_else(|| {
            HookError::InvalidArea(format!(
                "{} bytes at frame {} exceed {} byte area",
                bytes,
                start_frame,
                area.data.len()
            ))
        })
}

/// Copy one block per channel back to back: `[ch0 block][ch1 block]...`.
pub fn copy_channel_blocks(sources: &[&[u8]], block_bytes: usize, out: &mut [u8]) -> Result<(), HookError> {
    let needed = sources.len() * block_bytes;
    if out.len() < needed {
        return Err(HookError::ShortBuffer {
            expected: needed,
            actual: out.len(),
        });
    }
    for source in sources {
        if source.len() < block_bytes {
            return Err(HookError::ShortBuffer {
                expected: block_bytes,
                actual: source.len(),
            });
        }
    }

    if block_bytes == 0 {
        return Ok(());
    }
    for (block, source) in out.chunks_exact_mut(block_bytes).zip(sources) {
        block.copy_from_slice(&source[..block_bytes]);
    }
    Ok(())
}
