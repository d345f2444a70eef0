//! Packet layout of the messages a capture stream emits downstream.
//!
//! Every packet starts with a one-byte message header followed by a
//! fixed-size, little-endian body:
//!
//! ```text
//! audio format announcement (17 bytes)
//! [0]      message type 0x01
//! [1-4]    stream id
//! [5-8]    format flags
//! [9-12]   sample rate
//! [13-16]  channels
//!
//! audio buffer (21 + size bytes)
//! [0]      message type 0x02
//! [1-4]    stream id
//! [5-12]   timestamp
//! [13-20]  payload size
//! [21..]   payload
//! ```

use crate::models::error::HookError;

pub const MESSAGE_HEADER_SIZE: usize = 1;
pub const AUDIO_FORMAT_MESSAGE_SIZE: usize = 16;
pub const AUDIO_HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    AudioFormat = 0x01,
    Audio = 0x02,
}

impl MessageType {
    pub fn header(self) -> [u8; MESSAGE_HEADER_SIZE] {
        [self as u8]
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::AudioFormat),
            0x02 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Announces a stream's format; sent whenever the stream (re)initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormatMessage {
    pub stream_id: u32,
    pub flags: u32,
    pub rate: u32,
    pub channels: u32,
}

impl AudioFormatMessage {
    pub fn encode(&self) -> [u8; AUDIO_FORMAT_MESSAGE_SIZE] {
        let mut body = [0u8; AUDIO_FORMAT_MESSAGE_SIZE];
        body[0..4].copy_from_slice(&self.stream_id.to_le_bytes());
        body[4..8].copy_from_slice(&self.flags.to_le_bytes());
        body[8..12].copy_from_slice(&self.rate.to_le_bytes());
        body[12..16].copy_from_slice(&self.channels.to_le_bytes());
        body
    }

    fn decode(body: &[u8]) -> Self {
        Self {
            stream_id: read_u32(body, 0),
            flags: read_u32(body, 4),
            rate: read_u32(body, 8),
            channels: read_u32(body, 12),
        }
    }
}

/// Per-buffer chunk header preceding the raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    pub stream_id: u32,
    pub timestamp: u64,
    pub size: u64,
}

impl AudioHeader {
    pub fn encode(&self) -> [u8; AUDIO_HEADER_SIZE] {
        let mut header = [0u8; AUDIO_HEADER_SIZE];
        header[0..4].copy_from_slice(&self.stream_id.to_le_bytes());
        header[4..12].copy_from_slice(&self.timestamp.to_le_bytes());
        header[12..20].copy_from_slice(&self.size.to_le_bytes());
        header
    }

    fn decode(header: &[u8]) -> Self {
        Self {
            stream_id: read_u32(header, 0),
            timestamp: read_u64(header, 4),
            size: read_u64(header, 12),
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    AudioFormat(AudioFormatMessage),
    Audio { header: AudioHeader, payload: &'a [u8] },
}

impl<'a> Message<'a> {
    pub fn decode(packet: &'a [u8]) -> Result<Self, HookError> {
        let (&kind, body) = packet
            .split_first()
            .ok_or_else(|| HookError::MalformedPacket("empty packet".into()))?;

        match MessageType::from_byte(kind) {
            Some(MessageType::AudioFormat) => {
                if body.len() != AUDIO_FORMAT_MESSAGE_SIZE {
                    return Err(HookError::MalformedPacket(format!(
                        "format message body is {} bytes",
                        body.len()
                    )));
                }
                Ok(Self::AudioFormat(AudioFormatMessage::decode(body)))
            }
            Some(MessageType::Audio) => {
                if body.len() < AUDIO_HEADER_SIZE {
                    return Err(HookError::MalformedPacket(format!(
                        "audio header truncated at {} bytes",
                        body.len()
                    )));
                }
                let header = AudioHeader::decode(&body[..AUDIO_HEADER_SIZE]);
                let payload = &body[AUDIO_HEADER_SIZE..];
                if payload.len() as u64 != header.size {
                    return Err(HookError::MalformedPacket(format!(
                        "payload is {} bytes, header says {}",
                        payload.len(),
                        header.size
                    )));
                }
                Ok(Self::Audio { header, payload })
            }
            None => Err(HookError::MalformedPacket(format!(
                "unknown message type 0x{:02x}",
                kind
            ))),
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            Self::AudioFormat(msg) => msg.stream_id,
            Self::Audio { header, .. } => header.stream_id,
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_message_layout() {
        let body = AudioFormatMessage {
            stream_id: 3,
            flags: 0x3,
            rate: 48000,
            channels: 2,
        }
        .encode();

        assert_eq!(body.len(), 16);
        assert_eq!(u32::from_le_bytes([body[0], body[1], body[2], body[3]]), 3);
        assert_eq!(u32::from_le_bytes([body[4], body[5], body[6], body[7]]), 0x3);
        assert_eq!(u32::from_le_bytes([body[8], body[9], body[10], body[11]]), 48000);
        assert_eq!(u32::from_le_bytes([body[12], body[13], body[14], body[15]]), 2);
    }

    #[test]
    fn audio_header_layout() {
        let header = AudioHeader {
            stream_id: 1,
            timestamp: 0x0102_0304_0506_0708,
            size: 4,
        }
        .encode();

        assert_eq!(header.len(), 20);
        assert_eq!(&header[0..4], &[1, 0, 0, 0]);
        assert_eq!(&header[4..12], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&header[12..20], &[4, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn decodes_audio_packet() {
        let header = AudioHeader {
            stream_id: 7,
            timestamp: 100,
            size: 3,
        };
        let mut packet = MessageType::Audio.header().to_vec();
        packet.extend_from_slice(&header.encode());
        packet.extend_from_slice(&[9, 8, 7]);

        match Message::decode(&packet).unwrap() {
            Message::Audio { header: decoded, payload } => {
                assert_eq!(decoded, header);
                assert_eq!(payload, &[9, 8, 7]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(Message::decode(&[]).is_err());
        assert!(Message::decode(&[0x7f]).is_err());
        assert!(Message::decode(&[0x01, 0, 0]).is_err());

        let mut packet = MessageType::Audio.header().to_vec();
        packet.extend_from_slice(
            &AudioHeader {
                stream_id: 1,
                timestamp: 0,
                size: 10,
            }
            .encode(),
        );
        packet.extend_from_slice(&[1, 2]);
        assert!(matches!(Message::decode(&packet), Err(HookError::MalformedPacket(_))));
    }
}
