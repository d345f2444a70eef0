//! Derives the canonical stream format from device-reported hardware parameters.

use crate::models::error::HookError;
use crate::models::format::{AccessLayout, HardwareParams, SampleFormat, StreamFormat};

/// Negotiate a stream format.
///
/// Planar-mmap ("complex") access is accepted and marked as needing
/// conversion; the converted payload is interleaved. Pure: the caller has
/// already read `params` from the device.
pub fn negotiate(params: &HardwareParams) -> Result<StreamFormat, HookError> {
    if let SampleFormat::Other(tag) = params.format {
        return Err(HookError::UnsupportedFormat(tag));
    }

    let (interleaved, needs_conversion) = match params.access {
        AccessLayout::Interleaved => (true, false),
        AccessLayout::NonInterleaved => (false, false),
        AccessLayout::MmapComplex => (true, true),
        AccessLayout::Other(tag) => return Err(HookError::UnsupportedLayout(tag)),
    };

    Ok(StreamFormat {
        encoding: params.format,
        channels: params.channels,
        rate: params.rate,
        interleaved,
        needs_conversion,
        period_frames: params.period_frames,
    })
}

/// Check that a negotiated format can be fed through the mmap producer path.
///
/// Non-interleaved read/write layouts have no mmap areas to read from.
pub fn check_mmap_compatible(format: &StreamFormat) -> Result<(), HookError> {
    if !format.interleaved && !format.needs_conversion {
        return Err(HookError::IncompatibleLayout(
            "non-interleaved stream used with mmap begin/commit".into(),
        ));
    }
    Ok(())
}
