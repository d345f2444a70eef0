//! Synthetic capture devices standing in for hooked PCM handles.

use std::f64::consts::TAU;

use audio_hook_core::{
    AccessLayout, AudioHook, CallingMode, DeviceHandle, HardwareParams, HookError, MmapArea, SampleFormat,
};

/// A device that periodically hands the hook one period of audio.
pub trait SyntheticDevice: Send {
    fn handle(&self) -> DeviceHandle;
    fn name(&self) -> &str;
    fn mode(&self) -> CallingMode;
    fn params(&self) -> HardwareParams;

    /// Produce one period and pass it to the hook.
    fn produce(&mut self, hook: &AudioHook) -> Result<(), HookError>;
}

/// Stereo S16 sine tone delivered through interleaved read/write calls on
/// a blocking thread.
pub struct SineDevice {
    handle: DeviceHandle,
    rate: u32,
    period_frames: usize,
    frequency: f64,
    phase: f64,
    buffer: Vec<u8>,
}

impl SineDevice {
    const CHANNELS: usize = 2;

    pub fn new(handle: DeviceHandle, rate: u32, period_frames: usize, frequency: f64) -> Self {
        Self {
            handle,
            rate,
            period_frames,
            frequency,
            phase: 0.0,
            buffer: vec![0; period_frames * Self::CHANNELS * 2],
        }
    }
}

impl SyntheticDevice for SineDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle
    }

    fn name(&self) -> &str {
        "synthetic sine"
    }

    fn mode(&self) -> CallingMode {
        CallingMode::Blocking
    }

    fn params(&self) -> HardwareParams {
        HardwareParams {
            format: SampleFormat::S16Le,
            channels: Self::CHANNELS as u32,
            rate: self.rate,
            access: AccessLayout::Interleaved,
            period_frames: Some(self.period_frames),
        }
    }

    fn produce(&mut self, hook: &AudioHook) -> Result<(), HookError> {
        let step = TAU * self.frequency / self.rate as f64;
        for frame in self.buffer.chunks_exact_mut(Self::CHANNELS * 2) {
            let sample = ((self.phase.sin() * 0.5) * i16::MAX as f64) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + step) % TAU;
        }
        hook.write_interleaved(self.handle, &self.buffer, self.period_frames)
    }
}

/// Stereo S32 ramp exposed as planar mmap areas, one buffer per channel,
/// as a non-blocking (callback context) device would.
pub struct PlanarMmapDevice {
    handle: DeviceHandle,
    rate: u32,
    period_frames: usize,
    planes: Vec<Vec<u8>>,
    counter: i32,
}

impl PlanarMmapDevice {
    pub fn new(handle: DeviceHandle, rate: u32, period_frames: usize) -> Self {
        Self {
            handle,
            rate,
            period_frames,
            planes: vec![vec![0; period_frames * 4]; 2],
            counter: 0,
        }
    }
}

impl SyntheticDevice for PlanarMmapDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle
    }

    fn name(&self) -> &str {
        "synthetic planar mmap"
    }

    fn mode(&self) -> CallingMode {
        CallingMode::NonBlocking
    }

    fn params(&self) -> HardwareParams {
        HardwareParams {
            format: SampleFormat::S32Le,
            channels: self.planes.len() as u32,
            rate: self.rate,
            access: AccessLayout::MmapComplex,
            period_frames: Some(self.period_frames),
        }
    }

    fn produce(&mut self, hook: &AudioHook) -> Result<(), HookError> {
        for (channel, plane) in self.planes.iter_mut().enumerate() {
            for (frame, sample) in plane.chunks_exact_mut(4).enumerate() {
                let value = self.counter.wrapping_add(frame as i32).wrapping_mul(channel as i32 + 1);
                sample.copy_from_slice(&value.to_le_bytes());
            }
        }
        self.counter = self.counter.wrapping_add(self.period_frames as i32);

        // SAFETY: the planes are neither moved nor written until the
        // commit below returns.
        let areas: Vec<MmapArea> = self
            .planes
            .iter()
            .map(|plane| unsafe { MmapArea::from_raw_parts(plane.as_ptr(), plane.len(), 0, 32) })
            .collect();
        hook.mmap_begin(self.handle, &areas, 0, self.period_frames)?;
        hook.mmap_commit(self.handle, 0, self.period_frames)
    }
}
