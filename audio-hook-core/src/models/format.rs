use serde::{Deserialize, Serialize};

/// Flag bits carried in the format announcement.
pub mod flags {
    /// Samples of one frame are stored contiguously.
    pub const INTERLEAVED: u32 = 0x1;
    pub const S16_LE: u32 = 0x2;
    pub const S24_LE: u32 = 0x4;
    pub const S32_LE: u32 = 0x8;
}

/// Sample encoding as reported by the device.
///
/// Unknown encodings are carried through as their raw tag so the
/// negotiator can report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    S16Le,
    S24Le,
    S32Le,
    Other(i32),
}

impl SampleFormat {
    /// Map a raw ALSA `snd_pcm_format_t` value.
    pub fn from_alsa(tag: i32) -> Self {
        match tag {
            2 => Self::S16Le,
            6 => Self::S24Le,
            10 => Self::S32Le,
            other => Self::Other(other),
        }
    }

    /// Physical width of one sample in bytes. S24_LE lives in a 32-bit container.
    pub fn sample_bytes(self) -> Option<usize> {
        match self {
            Self::S16Le => Some(2),
            Self::S24Le | Self::S32Le => Some(4),
            Self::Other(_) => None,
        }
    }

    fn flag(self) -> u32 {
        match self {
            Self::S16Le => flags::S16_LE,
            Self::S24Le => flags::S24_LE,
            Self::S32Le => flags::S32_LE,
            Self::Other(_) => 0,
        }
    }
}

/// Buffer access layout as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLayout {
    /// One buffer, frames stored channel-interleaved (read/write or mmap).
    Interleaved,
    /// One buffer per channel, handed over through the read/write path.
    NonInterleaved,
    /// Per-channel mmap areas with arbitrary offset and stride ("complex").
    MmapComplex,
    Other(i32),
}

impl AccessLayout {
    /// Map a raw ALSA `snd_pcm_access_t` value.
    pub fn from_alsa(tag: i32) -> Self {
        match tag {
            0 | 3 => Self::Interleaved,
            2 => Self::MmapComplex,
            4 => Self::NonInterleaved,
            other => Self::Other(other),
        }
    }
}

/// Hardware parameters read from the device collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareParams {
    pub format: SampleFormat,
    pub channels: u32,
    pub rate: u32,
    pub access: AccessLayout,
    /// Period size in frames, when the device reports one.
    pub period_frames: Option<usize>,
}

/// Canonical format of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub encoding: SampleFormat,
    pub channels: u32,
    pub rate: u32,
    /// Payload handed to the worker is channel-interleaved.
    pub interleaved: bool,
    /// Source areas are planar and must go through the layout converter.
    pub needs_conversion: bool,
    pub period_frames: Option<usize>,
}

impl StreamFormat {
    pub fn sample_bytes(&self) -> usize {
        self.encoding.sample_bytes().unwrap_or(0)
    }

    pub fn frame_bytes(&self) -> usize {
        self.sample_bytes() * self.channels as usize
    }

    /// Saturates instead of overflowing; an oversized request then fails
    /// as an allocation.
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames.saturating_mul(self.frame_bytes())
    }

    /// Bytes of one channel's worth of `frames` samples.
    pub fn samples_to_bytes(&self, frames: usize) -> usize {
        frames.saturating_mul(self.sample_bytes())
    }

    /// Flag word sent in the format announcement.
    pub fn flags(&self) -> u32 {
        let mut bits = self.encoding.flag();
        if self.interleaved {
            bits |= flags::INTERLEAVED;
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alsa_tags_map_to_known_variants() {
        assert_eq!(SampleFormat::from_alsa(2), SampleFormat::S16Le);
        assert_eq!(SampleFormat::from_alsa(6), SampleFormat::S24Le);
        assert_eq!(SampleFormat::from_alsa(10), SampleFormat::S32Le);
        assert_eq!(SampleFormat::from_alsa(14), SampleFormat::Other(14));

        assert_eq!(AccessLayout::from_alsa(0), AccessLayout::Interleaved);
        assert_eq!(AccessLayout::from_alsa(3), AccessLayout::Interleaved);
        assert_eq!(AccessLayout::from_alsa(2), AccessLayout::MmapComplex);
        assert_eq!(AccessLayout::from_alsa(4), AccessLayout::NonInterleaved);
        assert_eq!(AccessLayout::from_alsa(1), AccessLayout::Other(1));
    }

    #[test]
    fn byte_sizes_follow_container_width() {
        let format = StreamFormat {
            encoding: SampleFormat::S24Le,
            channels: 2,
            rate: 48000,
            interleaved: true,
            needs_conversion: false,
            period_frames: None,
        };
        assert_eq!(format.sample_bytes(), 4);
        assert_eq!(format.frame_bytes(), 8);
        assert_eq!(format.frames_to_bytes(10), 80);
        assert_eq!(format.samples_to_bytes(10), 40);
        assert_eq!(format.flags(), flags::S24_LE | flags::INTERLEAVED);
    }
}
